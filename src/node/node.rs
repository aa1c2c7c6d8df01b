//! Node wrapper
//!
//! Serialises every mutation of the chain behind one mutex and parks
//! blocks and transactions that arrive before what they depend on. After
//! each accepted block both queues are replayed once.

use std::sync::{Mutex, MutexGuard};

use log::{debug, info};
use thiserror::Error;

use crate::chain::{AddResult, Blockchain, ChainError};
use crate::config::ChainParams;
use crate::consensus::Block;
use crate::crypto::Hash;
use crate::storage::Ledger;
use crate::validation::{Transaction, ValidationError};
use crate::views::ChainSummary;

/// Orphan blocks kept at most
pub const MAX_ORPHAN_BLOCKS: usize = 64;

/// Orphan transactions kept at most
pub const MAX_ORPHAN_TRANSACTIONS: usize = 256;

/// Node errors
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),
    #[error("Transaction rejected: {0}")]
    Rejected(ValidationError),
    #[error("Node state lock poisoned")]
    Poisoned,
}

/// What happened to a submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// Admitted to the pending pool
    Pooled,
    /// Spends an unknown output; parked until a block lands
    Queued,
}

#[derive(Debug, Default)]
struct Orphans {
    blocks: Vec<Block>,
    transactions: Vec<Transaction>,
}

/// A chain plus its orphan queues
#[derive(Debug)]
pub struct Node<L: Ledger> {
    chain: Mutex<Blockchain<L>>,
    orphans: Mutex<Orphans>,
}

impl<L: Ledger> Node<L> {
    /// Wrap an opened chain
    pub fn new(chain: Blockchain<L>) -> Self {
        Self {
            chain: Mutex::new(chain),
            orphans: Mutex::new(Orphans::default()),
        }
    }

    /// Open the chain on `ledger` and wrap it
    pub fn open(ledger: L, params: ChainParams) -> Result<Self, NodeError> {
        Ok(Self::new(Blockchain::open(ledger, params)?))
    }

    // Lock order: chain before orphans.
    fn chain(&self) -> Result<MutexGuard<'_, Blockchain<L>>, NodeError> {
        self.chain.lock().map_err(|_| NodeError::Poisoned)
    }

    fn orphans(&self) -> Result<MutexGuard<'_, Orphans>, NodeError> {
        self.orphans.lock().map_err(|_| NodeError::Poisoned)
    }

    /// Offer a block to the chain.
    ///
    /// A rejected block that sits beyond the next height is kept as an
    /// orphan and retried after the next accepted block.
    pub fn submit_block(&self, block: Block) -> Result<AddResult, NodeError> {
        let mut chain = self.chain()?;
        let height = block.height();
        let result = chain.add_block(block.clone(), false)?;
        match result {
            AddResult::Accepted => self.replay(&mut chain)?,
            AddResult::Rejected if height > chain.height() + 1 => self.park_block(block)?,
            _ => {}
        }
        Ok(result)
    }

    /// Offer a transaction to the pending pool
    pub fn submit_transaction(&self, tx: Transaction) -> Result<TxStatus, NodeError> {
        let mut chain = self.chain()?;
        match chain.add_transaction(tx.clone()) {
            Ok(()) => Ok(TxStatus::Pooled),
            Err(ValidationError::Storage(e)) => Err(NodeError::Chain(e.into())),
            Err(e) if e.is_orphan() => {
                let mut orphans = self.orphans()?;
                if orphans.transactions.len() >= MAX_ORPHAN_TRANSACTIONS {
                    orphans.transactions.remove(0);
                }
                debug!("Queued orphan transaction {}", tx.id());
                orphans.transactions.push(tx);
                Ok(TxStatus::Queued)
            }
            Err(e) => Err(NodeError::Rejected(e)),
        }
    }

    fn park_block(&self, block: Block) -> Result<(), NodeError> {
        let mut orphans = self.orphans()?;
        let id = block.id();
        if orphans.blocks.iter().any(|b| b.id() == id) {
            return Ok(());
        }
        if orphans.blocks.len() >= MAX_ORPHAN_BLOCKS {
            orphans.blocks.remove(0);
        }
        debug!("Queued orphan block {} at height {}", id, block.height());
        orphans.blocks.push(block);
        Ok(())
    }

    /// Retry every queued block, lowest height first, then every queued
    /// transaction
    fn replay(&self, chain: &mut Blockchain<L>) -> Result<(), NodeError> {
        let mut orphans = self.orphans()?;
        let mut blocks = std::mem::take(&mut orphans.blocks);
        blocks.sort_by_key(Block::height);
        for block in blocks {
            let height = block.height();
            if height <= chain.height() {
                continue;
            }
            match chain.add_block(block.clone(), false)? {
                AddResult::Accepted => info!("Connected orphan block at height {}", height),
                AddResult::Rejected if height > chain.height() + 1 => orphans.blocks.push(block),
                _ => {}
            }
        }

        for tx in std::mem::take(&mut orphans.transactions) {
            match chain.add_transaction(tx.clone()) {
                Ok(()) => debug!("Pooled orphan transaction {}", tx.id()),
                Err(ValidationError::Storage(e)) => return Err(NodeError::Chain(e.into())),
                Err(e) if e.is_orphan() => orphans.transactions.push(tx),
                Err(e) => debug!("Dropped orphan transaction {}: {}", tx.id(), e),
            }
        }
        Ok(())
    }

    /// Run `f` with shared access to the chain
    pub fn with_chain<R>(&self, f: impl FnOnce(&Blockchain<L>) -> R) -> Result<R, NodeError> {
        Ok(f(&*self.chain()?))
    }

    /// Run `f` with exclusive access to the chain
    pub fn with_chain_mut<R>(&self, f: impl FnOnce(&mut Blockchain<L>) -> R) -> Result<R, NodeError> {
        Ok(f(&mut *self.chain()?))
    }

    pub fn height(&self) -> Result<u64, NodeError> {
        self.with_chain(Blockchain::height)
    }

    pub fn tip_id(&self) -> Result<Option<Hash>, NodeError> {
        self.with_chain(Blockchain::tip_id)
    }

    pub fn summary(&self) -> Result<ChainSummary, NodeError> {
        self.with_chain(ChainSummary::of)
    }

    pub fn orphan_block_count(&self) -> Result<usize, NodeError> {
        Ok(self.orphans()?.blocks.len())
    }

    pub fn orphan_transaction_count(&self) -> Result<usize, NodeError> {
        Ok(self.orphans()?.transactions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{address_from_pubkey, PrivateKey};
    use crate::mining::assemble_block;
    use crate::storage::MemoryLedger;
    use crate::validation::{TxInput, TxOutput};

    fn open_chain() -> Blockchain<MemoryLedger> {
        open_chain_with(ChainParams::for_testing())
    }

    fn open_chain_with(params: ChainParams) -> Blockchain<MemoryLedger> {
        Blockchain::open(MemoryLedger::new(), params).unwrap()
    }

    fn mine_next(chain: &mut Blockchain<MemoryLedger>, address: &str, timestamp: u64) -> Block {
        let mut block = assemble_block(chain, address, timestamp).unwrap();
        while !block.header.meets_target() {
            block.header.nonce += 1;
        }
        assert_eq!(chain.add_block(block.clone(), false).unwrap(), AddResult::Accepted);
        block
    }

    #[test]
    fn test_orphan_block_connects_after_parent() {
        let address = address_from_pubkey(&PrivateKey::generate().public_key());
        let mut source = open_chain();
        let b1 = mine_next(&mut source, &address, 1_767_225_610);
        let b2 = mine_next(&mut source, &address, 1_767_225_620);

        let node = Node::new(open_chain());
        assert_eq!(node.submit_block(b2.clone()).unwrap(), AddResult::Rejected);
        assert_eq!(node.orphan_block_count().unwrap(), 1);

        assert_eq!(node.submit_block(b1).unwrap(), AddResult::Accepted);
        assert_eq!(node.height().unwrap(), 2);
        assert_eq!(node.tip_id().unwrap(), Some(b2.id()));
        assert_eq!(node.orphan_block_count().unwrap(), 0);
    }

    #[test]
    fn test_orphan_transaction_pooled_after_block() {
        let params = ChainParams {
            mining_delay: 1,
            ..ChainParams::for_testing()
        };
        let key = PrivateKey::generate();
        let address = address_from_pubkey(&key.public_key());
        let mut source = open_chain_with(params.clone());
        let b1 = mine_next(&mut source, &address, 1_767_225_610);

        // spends b1's mining output, which unlocks at height 2
        let funding = b1.mining_tx.id();
        let tx = Transaction::new(
            vec![TxInput::new(funding, 0, key.sign(&funding))],
            vec![TxOutput::new(b1.mining_tx.mining_output.amount - 5, &address, 0)],
        );

        let node = Node::new(open_chain_with(params));
        assert_eq!(node.submit_transaction(tx.clone()).unwrap(), TxStatus::Queued);
        assert_eq!(node.orphan_transaction_count().unwrap(), 1);
        assert_eq!(node.submit_block(b1).unwrap(), AddResult::Accepted);

        assert_eq!(node.orphan_transaction_count().unwrap(), 0);
        let pending = node
            .with_chain(|chain| chain.pending_transactions().to_vec())
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].tx, tx);
        assert_eq!(pending[0].fee, 5);
    }

    #[test]
    fn test_invalid_transaction_rejected() {
        let node = Node::new(open_chain());
        let tx = Transaction::new(vec![], vec![TxOutput::new(1, "x", 0)]);
        assert!(matches!(
            node.submit_transaction(tx),
            Err(NodeError::Rejected(ValidationError::NoInputs))
        ));
        assert_eq!(node.summary().unwrap().height, 0);
    }
}
