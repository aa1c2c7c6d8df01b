//! Chain state machine
//!
//! Owns height, target, reward bookkeeping, the in-memory tail
//! `[genesis, last heartbeat blocks]` and the fork table. It is the only
//! writer of the ledger. Not internally synchronised: callers serialise
//! access (see [`crate::node::Node`]).

use std::collections::{BTreeMap, HashSet};

use log::{debug, info, warn};
use thiserror::Error;

use crate::codec::{FormatError, WireFormat};
use crate::config::ChainParams;
use crate::consensus::{
    apply_block_reward, calculate_next_target, period_start_height, revert_block_reward,
    should_adjust_difficulty, verify_block, Block, BlockError, BlockExpectations, BlockReceipt,
    CompactTarget, RewardState,
};
use crate::crypto::Hash;
use crate::node::create_genesis_block;
use crate::storage::{BlockChange, Ledger, LedgerBatch, RetryingLedger, StorageError};
use crate::validation::{MiningTransaction, Transaction, TxOutput, UtxoKey};

use super::pool::PendingTx;

/// Outcome of [`Blockchain::add_block`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddResult {
    /// The block extends the active chain (possibly through a reorg)
    Accepted,
    Rejected,
    /// The block was kept in the fork table
    Forked,
    /// The block is the current tip
    DuplicateTip,
}

/// Fatal state machine errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Ledger holds no genesis block")]
    MissingGenesis,
    #[error("Persisted block at height {height} cannot be decoded: {source}")]
    Decode {
        height: u64,
        #[source]
        source: FormatError,
    },
    #[error("Inconsistent ledger: {0}")]
    Inconsistent(String),
}

/// A transaction found in the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainTx {
    Mining(MiningTransaction),
    Regular(Transaction),
}

impl ChainTx {
    pub fn id(&self) -> Hash {
        match self {
            ChainTx::Mining(tx) => tx.id(),
            ChainTx::Regular(tx) => tx.id(),
        }
    }

    /// Output at `index`; a mining transaction has exactly one
    pub fn output(&self, index: u32) -> Option<&TxOutput> {
        match self {
            ChainTx::Mining(tx) if index == 0 => Some(&tx.mining_output),
            ChainTx::Mining(_) => None,
            ChainTx::Regular(tx) => tx.outputs.get(index as usize),
        }
    }
}

/// Mutable consensus values restored when a reorg is unwound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct ChainSnapshot {
    pub target: CompactTarget,
    pub rewards: RewardState,
}

/// The chain state machine
#[derive(Debug)]
pub struct Blockchain<L: Ledger> {
    pub(super) params: ChainParams,
    pub(super) ledger: RetryingLedger<L>,
    pub(super) height: u64,
    pub(super) target: CompactTarget,
    pub(super) rewards: RewardState,
    /// `[genesis, last heartbeat blocks]`, tip last
    pub(super) tail: Vec<Block>,
    pub(super) fork_table: BTreeMap<u64, Block>,
    pub(super) pool: Vec<PendingTx>,
    pub(super) pool_spent: HashSet<UtxoKey>,
}

impl<L: Ledger> Blockchain<L> {
    /// Empty state machine; nothing is read from the ledger yet
    pub fn new(ledger: L, params: ChainParams) -> Self {
        let retry = params.retry;
        Self {
            ledger: RetryingLedger::new(ledger, retry),
            height: 0,
            target: params.genesis_target,
            rewards: RewardState {
                mining_reward: params.genesis_reward,
                total_remaining: params.total_supply,
            },
            tail: Vec::new(),
            fork_table: BTreeMap::new(),
            pool: Vec::new(),
            pool_spent: HashSet::new(),
            params,
        }
    }

    /// Open a chain: create genesis on an empty ledger, otherwise replay
    /// the persisted blocks.
    pub fn open(ledger: L, params: ChainParams) -> Result<Self, ChainError> {
        let mut chain = Self::new(ledger, params);
        if chain.ledger.block_count()? == 0 {
            let genesis = create_genesis_block(&chain.params);
            info!("Creating genesis block {}", genesis.id());
            chain.add_block(genesis, false)?;
        } else {
            chain.load_chain()?;
        }
        if chain.tail.is_empty() {
            return Err(ChainError::MissingGenesis);
        }
        Ok(chain)
    }

    /// Catch up with blocks persisted beyond the in-memory height.
    ///
    /// Replays them as trusted blocks without touching the ledger. Returns
    /// the number of blocks loaded; a block that cannot be decoded or
    /// placed aborts the load with a warning.
    pub fn load_chain(&mut self) -> Result<u64, ChainError> {
        let persisted = self.ledger.block_count()?;
        let mut loaded = 0;
        loop {
            let next = if self.tail.is_empty() { 0 } else { self.height + 1 };
            if next >= persisted {
                break;
            }
            let Some(raw) = self.ledger.get_block(next)? else {
                warn!("Load aborted: block {} missing from ledger", next);
                break;
            };
            let block = match Block::decode(&raw) {
                Ok(block) => block,
                Err(e) => {
                    warn!("Load aborted: block {} is malformed: {}", next, e);
                    break;
                }
            };
            match self.add_block(block, true)? {
                AddResult::Accepted => loaded += 1,
                other => {
                    warn!("Load aborted at height {}: {:?}", next, other);
                    break;
                }
            }
        }
        if loaded > 0 {
            info!("Loaded {} blocks, height {}", loaded, self.height);
        }
        Ok(loaded)
    }

    /// Add a block to the chain.
    ///
    /// With `is_loading` (or on an empty chain) the block is trusted and only
    /// its position is checked; while loading the ledger is not written.
    pub fn add_block(&mut self, block: Block, is_loading: bool) -> Result<AddResult, ChainError> {
        self.add_block_inner(block, is_loading, true)
    }

    pub(super) fn add_block_inner(
        &mut self,
        block: Block,
        is_loading: bool,
        allow_fork: bool,
    ) -> Result<AddResult, ChainError> {
        if self.tail.is_empty() || is_loading {
            return self.add_trusted(block, !is_loading);
        }

        let block_id = block.id();
        if self.tip_id() == Some(block_id) {
            return Ok(AddResult::DuplicateTip);
        }

        let block_height = block.height();
        let window_start = self.height.saturating_sub(self.params.heartbeat).max(1);
        if allow_fork && (window_start..=self.height).contains(&block_height) {
            return self.offer_fork(block);
        }

        let Some(expected) = self.next_expectations() else {
            return Err(ChainError::MissingGenesis);
        };
        match verify_block(&block, &expected, &self.ledger) {
            Ok(receipt) => {
                self.accept(block, receipt, true)?;
                Ok(AddResult::Accepted)
            }
            Err(BlockError::Storage(e)) => Err(e.into()),
            Err(e) if allow_fork && e.is_fork_pending() && block_height == self.height + 1 => {
                debug!("Block {} does not extend the tip, trying fork handling", block_id);
                Ok(self.handle_fork(block)?.into())
            }
            Err(e) => {
                warn!("Rejected block {} at height {}: {}", block_id, block_height, e);
                Ok(AddResult::Rejected)
            }
        }
    }

    fn add_trusted(&mut self, block: Block, persist: bool) -> Result<AddResult, ChainError> {
        let expected_height = if self.tail.is_empty() { 0 } else { self.height + 1 };
        if block.height() != expected_height {
            warn!(
                "Rejected trusted block {}: height {} where {} expected",
                block.id(),
                block.height(),
                expected_height
            );
            return Ok(AddResult::Rejected);
        }
        let receipt = BlockReceipt::for_trusted(&block);
        self.accept(block, receipt, persist)?;
        Ok(AddResult::Accepted)
    }

    /// Apply a verified block: ledger effects, tail, reward and target policy
    pub(super) fn accept(&mut self, block: Block, receipt: BlockReceipt, persist: bool) -> Result<(), ChainError> {
        if persist {
            self.ledger.commit(&receipt.into_batch(&block))?;
        }

        let height = block.height();
        let block_id = block.id();
        let timestamp = block.header.timestamp;
        let paid = RewardState {
            mining_reward: block.mining_tx.reward,
            total_remaining: self.rewards.total_remaining,
        };
        self.height = height;
        self.tail.push(block);

        self.rewards = apply_block_reward(paid, height, self.params.halving_number, &self.ledger)?;
        if self.rewards.mining_reward != paid.mining_reward {
            info!(
                "Mining reward changed at height {}: {} -> {}",
                height, paid.mining_reward, self.rewards.mining_reward
            );
        }

        let heartbeat = self.params.heartbeat;
        if should_adjust_difficulty(height, heartbeat) {
            let start = period_start_height(height, heartbeat);
            let first = self
                .block_at(start)?
                .ok_or_else(|| ChainError::Inconsistent(format!("no block at height {start}")))?;
            let next = calculate_next_target(self.target, first.header.timestamp, timestamp, heartbeat);
            if next != self.target {
                info!("Retarget at height {}: {} -> {}", height, self.target, next);
            }
            self.target = next;
        }

        let keep = heartbeat as usize + 1;
        while self.tail.len() > keep {
            self.tail.remove(1);
        }

        let horizon = height.saturating_sub(heartbeat);
        let before = self.fork_table.len();
        self.fork_table.retain(|h, _| *h >= horizon);
        if self.fork_table.len() != before {
            debug!("Dropped {} stale fork blocks", before - self.fork_table.len());
        }

        if persist {
            info!("Accepted block {} at height {}", block_id, height);
        }
        self.revalidate_pool()
    }

    /// Remove the tip, undoing its ledger effects.
    ///
    /// Returns `Ok(false)` at genesis. The block's transactions are offered
    /// back to the pending pool.
    pub fn pop_block(&mut self) -> Result<bool, ChainError> {
        if self.height == 0 || self.tail.len() < 2 {
            return Ok(false);
        }
        let Some(block) = self.tail.last().cloned() else {
            return Ok(false);
        };

        let mut batch = LedgerBatch::new();
        batch.block = BlockChange::RemoveLast;
        for (key, _) in BlockReceipt::for_trusted(&block).created {
            batch.spend.push(key);
        }
        for tx in &block.transactions {
            for input in &tx.inputs {
                let (tx_id, index) = input.key();
                let output = self.find_output(&tx_id, index)?.ok_or_else(|| {
                    ChainError::Inconsistent(format!("spent output {tx_id}:{index} not found"))
                })?;
                batch.create(tx_id, index, output);
            }
        }
        self.ledger.commit(&batch)?;

        self.tail.pop();
        self.height -= 1;
        self.rewards = revert_block_reward(self.rewards, block.mining_tx.reward);
        self.target = block.header.target;
        self.refill_tail()?;
        info!("Popped block {} at height {}", block.id(), block.height());

        self.revalidate_pool()?;
        for tx in block.transactions {
            if let Err(e) = self.add_transaction(tx) {
                debug!("Transaction from popped block not re-pooled: {}", e);
            }
        }
        Ok(true)
    }

    /// Splice older blocks back in after a pop shrank the tail
    fn refill_tail(&mut self) -> Result<(), ChainError> {
        let keep = self.params.heartbeat as usize + 1;
        while self.tail.len() < keep {
            let lowest = match self.tail.get(1) {
                Some(block) => block.height(),
                None => self.height + 1,
            };
            if lowest <= 1 {
                break;
            }
            match self.ledger_block(lowest - 1)? {
                Some(block) => self.tail.insert(1, block),
                None => break,
            }
        }
        Ok(())
    }

    pub(super) fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            target: self.target,
            rewards: self.rewards,
        }
    }

    pub(super) fn restore_snapshot(&mut self, snapshot: ChainSnapshot) {
        self.target = snapshot.target;
        self.rewards = snapshot.rewards;
    }

    /// Expectations the next block must meet
    pub fn next_expectations(&self) -> Option<BlockExpectations> {
        Some(BlockExpectations {
            prev_id: self.tip_id()?,
            height: self.height + 1,
            target: self.target,
            mining_reward: self.rewards.mining_reward,
            mining_delay: self.params.mining_delay,
        })
    }

    fn ledger_block(&self, height: u64) -> Result<Option<Block>, ChainError> {
        match self.ledger.get_block(height)? {
            Some(raw) => Block::decode(&raw)
                .map(Some)
                .map_err(|source| ChainError::Decode { height, source }),
            None => Ok(None),
        }
    }

    /// Block at `height` on the active chain, from the tail or the ledger
    pub fn block_at(&self, height: u64) -> Result<Option<Block>, ChainError> {
        if height > self.height {
            return Ok(None);
        }
        if let Some(block) = self.tail.iter().rev().find(|b| b.height() == height) {
            return Ok(Some(block.clone()));
        }
        self.ledger_block(height)
    }

    /// Block containing `tx_id`, scanning backward from the tip.
    ///
    /// O(height): every block is decoded until a match is found.
    pub fn find_block_by_tx_id(&self, tx_id: &Hash) -> Result<Option<Block>, ChainError> {
        if self.tail.is_empty() {
            return Ok(None);
        }
        for height in (0..=self.height).rev() {
            if let Some(block) = self.block_at(height)? {
                if block.contains_tx(tx_id) {
                    return Ok(Some(block));
                }
            }
        }
        Ok(None)
    }

    /// Transaction with `tx_id`, by the same backward scan
    pub fn get_tx_by_id(&self, tx_id: &Hash) -> Result<Option<ChainTx>, ChainError> {
        let Some(block) = self.find_block_by_tx_id(tx_id)? else {
            return Ok(None);
        };
        if block.mining_tx.id() == *tx_id {
            return Ok(Some(ChainTx::Mining(block.mining_tx)));
        }
        Ok(block
            .transactions
            .into_iter()
            .find(|tx| tx.id() == *tx_id)
            .map(ChainTx::Regular))
    }

    fn find_output(&self, tx_id: &Hash, index: u32) -> Result<Option<TxOutput>, ChainError> {
        Ok(self
            .get_tx_by_id(tx_id)?
            .and_then(|tx| tx.output(index).cloned()))
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn last_block(&self) -> Option<&Block> {
        self.tail.last()
    }

    pub fn tip_id(&self) -> Option<Hash> {
        self.tail.last().map(Block::id)
    }

    pub fn target(&self) -> CompactTarget {
        self.target
    }

    pub fn mining_reward(&self) -> u64 {
        self.rewards.mining_reward
    }

    pub fn total_mining_amount_remaining(&self) -> u64 {
        self.rewards.total_remaining
    }

    /// In-memory window, genesis first and tip last
    pub fn tail(&self) -> &[Block] {
        &self.tail
    }

    pub fn fork_table(&self) -> &BTreeMap<u64, Block> {
        &self.fork_table
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn ledger(&self) -> &RetryingLedger<L> {
        &self.ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{address_from_pubkey, PrivateKey};
    use crate::mining::assemble_block;
    use crate::storage::MemoryLedger;

    fn chain() -> Blockchain<MemoryLedger> {
        Blockchain::open(MemoryLedger::new(), ChainParams::for_testing()).unwrap()
    }

    fn miner_address() -> String {
        address_from_pubkey(&PrivateKey::generate().public_key())
    }

    fn mine_next(chain: &Blockchain<MemoryLedger>, address: &str, timestamp: u64) -> Block {
        let mut block = assemble_block(chain, address, timestamp).unwrap();
        while !block.header.meets_target() {
            block.header.nonce += 1;
        }
        block
    }

    #[test]
    fn test_open_creates_genesis() {
        let chain = chain();
        assert_eq!(chain.height(), 0);
        assert_eq!(chain.tail().len(), 1);
        assert_eq!(chain.ledger().block_count().unwrap(), 1);
        let params = ChainParams::for_testing();
        assert_eq!(
            chain.total_mining_amount_remaining(),
            params.total_supply - params.genesis_reward
        );
    }

    #[test]
    fn test_add_and_duplicate_tip() {
        let mut chain = chain();
        let address = miner_address();
        let block = mine_next(&chain, &address, 1_767_225_601);
        assert_eq!(chain.add_block(block.clone(), false).unwrap(), AddResult::Accepted);
        assert_eq!(chain.height(), 1);
        assert_eq!(chain.add_block(block, false).unwrap(), AddResult::DuplicateTip);
    }

    #[test]
    fn test_tail_is_bounded() {
        let mut chain = chain();
        let address = miner_address();
        for i in 1..=8 {
            let block = mine_next(&chain, &address, 1_767_225_600 + i * 3);
            assert_eq!(chain.add_block(block, false).unwrap(), AddResult::Accepted);
        }
        let heights: Vec<u64> = chain.tail().iter().map(Block::height).collect();
        assert_eq!(heights, vec![0, 6, 7, 8]);
    }

    #[test]
    fn test_pop_refills_tail() {
        let mut chain = chain();
        let address = miner_address();
        for i in 1..=6 {
            let block = mine_next(&chain, &address, 1_767_225_600 + i * 3);
            chain.add_block(block, false).unwrap();
        }
        assert!(chain.pop_block().unwrap());
        let heights: Vec<u64> = chain.tail().iter().map(Block::height).collect();
        assert_eq!(heights, vec![0, 3, 4, 5]);
    }

    #[test]
    fn test_pop_refuses_genesis() {
        let mut chain = chain();
        assert!(!chain.pop_block().unwrap());
        assert_eq!(chain.height(), 0);
    }

    #[test]
    fn test_far_future_block_rejected() {
        let mut chain = chain();
        let address = miner_address();
        let mut block = mine_next(&chain, &address, 1_767_225_601);
        block.mining_tx = MiningTransaction::new(5, block.mining_tx.reward, 0, &address, 2);
        block.header.merkle_root = block.compute_merkle_root();
        assert_eq!(chain.add_block(block, false).unwrap(), AddResult::Rejected);
    }

    #[test]
    fn test_tx_lookup() {
        let mut chain = chain();
        let address = miner_address();
        let block = mine_next(&chain, &address, 1_767_225_601);
        let mining_id = block.mining_tx.id();
        chain.add_block(block.clone(), false).unwrap();

        let found = chain.find_block_by_tx_id(&mining_id).unwrap().unwrap();
        assert_eq!(found.id(), block.id());
        match chain.get_tx_by_id(&mining_id).unwrap() {
            Some(ChainTx::Mining(tx)) => assert_eq!(tx.mining_output.address, address),
            other => panic!("unexpected {other:?}"),
        }
        assert!(chain.get_tx_by_id(&Hash::zero()).unwrap().is_none());
    }

    /// Chain of `n` blocks above genesis, returned with its blocks in order
    fn mined(n: u64) -> Vec<Block> {
        let mut chain = chain();
        let address = miner_address();
        for i in 1..=n {
            let block = mine_next(&chain, &address, 1_767_225_600 + i * 3);
            chain.add_block(block, false).unwrap();
        }
        (0..=n).map(|h| chain.block_at(h).unwrap().unwrap()).collect()
    }

    #[test]
    fn test_load_stops_at_malformed_block() {
        let blocks = mined(4);
        let ledger = MemoryLedger::new();
        for block in &blocks[..3] {
            ledger.append_block(&block.encode()).unwrap();
        }
        ledger.append_block("0601zz").unwrap();
        ledger.append_block(&blocks[4].encode()).unwrap();

        let chain = Blockchain::open(ledger, ChainParams::for_testing()).unwrap();
        assert_eq!(chain.height(), 2);
        assert_eq!(chain.tip_id(), Some(blocks[2].id()));
        assert_eq!(chain.ledger().block_count().unwrap(), 5);
    }

    #[test]
    fn test_load_stops_at_misplaced_block() {
        let blocks = mined(3);
        let ledger = MemoryLedger::new();
        for block in [&blocks[0], &blocks[1], &blocks[1], &blocks[3]] {
            ledger.append_block(&block.encode()).unwrap();
        }

        let mut chain = Blockchain::new(ledger, ChainParams::for_testing());
        assert_eq!(chain.load_chain().unwrap(), 2);
        assert_eq!(chain.height(), 1);
        assert_eq!(chain.tip_id(), Some(blocks[1].id()));
    }
}
