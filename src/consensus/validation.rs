//! Block validation
//!
//! Pure checks of a candidate block against the expected chain position.
//! Nothing is written here; the returned receipt lists the ledger effects the
//! caller applies on acceptance.

use std::collections::HashSet;

use thiserror::Error;

use crate::codec::WireFormat;
use crate::consensus::{Block, CompactTarget};
use crate::crypto::{validate_address, Hash};
use crate::storage::{BlockChange, Ledger, LedgerBatch, StorageError};
use crate::validation::{fee, validate_and_consume, TxOutput, UtxoKey, ValidationError};

/// Block validation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BlockError {
    #[error("Wrong parent: expected {expected}, found {found}")]
    WrongParent { expected: Hash, found: Hash },
    #[error("Wrong target {found}, chain expects {expected}")]
    WrongTarget {
        expected: CompactTarget,
        found: CompactTarget,
    },
    #[error("Block id does not meet target")]
    TargetNotMet,
    #[error("Wrong height: expected {expected}, found {found}")]
    WrongHeight { expected: u64, found: u64 },
    #[error("Mining output unlocks at {found}, must be at least {minimum}")]
    WrongUnlockHeight { minimum: u64, found: u64 },
    #[error("Wrong reward: expected {expected}, found {found}")]
    WrongReward { expected: u64, found: u64 },
    #[error("Mining output amount does not equal reward plus fees")]
    RewardMismatch,
    #[error("Invalid miner address {0:?}")]
    InvalidMinerAddress(String),
    #[error("Transaction {index} invalid: {source}")]
    TxInvalid {
        index: usize,
        #[source]
        source: ValidationError,
    },
    #[error("Declared fees {declared}, actual {actual}")]
    FeeMismatch { declared: u64, actual: u64 },
    #[error("Merkle root does not match the block's transactions")]
    MerkleMismatch,
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl BlockError {
    /// Whether the block may still land through fork handling
    pub fn is_fork_pending(&self) -> bool {
        matches!(self, BlockError::WrongParent { .. })
    }
}

/// Where a block must fit to be accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockExpectations {
    pub prev_id: Hash,
    pub height: u64,
    pub target: CompactTarget,
    pub mining_reward: u64,
    pub mining_delay: u64,
}

/// Ledger effects of a verified block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockReceipt {
    pub block_id: Hash,
    pub height: u64,
    pub fees: u64,
    /// Outputs consumed by the block's transactions
    pub spent: Vec<UtxoKey>,
    /// Outputs created, mining output first
    pub created: Vec<(UtxoKey, TxOutput)>,
}

impl BlockReceipt {
    /// Effects of a block without re-validating it, as used when replaying
    /// trusted blocks
    pub fn for_trusted(block: &Block) -> Self {
        let spent = block
            .transactions
            .iter()
            .flat_map(|tx| tx.inputs.iter().map(|i| i.key()))
            .collect();
        Self {
            block_id: block.id(),
            height: block.height(),
            fees: block.mining_tx.block_fees,
            spent,
            created: created_outputs(block),
        }
    }

    /// Batch applying the receipt and appending the raw block
    pub fn into_batch(self, block: &Block) -> LedgerBatch {
        LedgerBatch {
            spend: self.spent,
            create: self.created,
            block: BlockChange::Append(block.encode()),
        }
    }
}

fn created_outputs(block: &Block) -> Vec<(UtxoKey, TxOutput)> {
    let mut created = vec![((block.mining_tx.id(), 0), block.mining_tx.mining_output.clone())];
    for tx in &block.transactions {
        let id = tx.id();
        created.extend(
            tx.outputs
                .iter()
                .enumerate()
                .map(|(index, output)| ((id, index as u32), output.clone())),
        );
    }
    created
}

/// Validate `block` as the next block of the chain.
pub fn verify_block(
    block: &Block,
    expected: &BlockExpectations,
    ledger: &dyn Ledger,
) -> Result<BlockReceipt, BlockError> {
    let header = &block.header;
    let mining = &block.mining_tx;

    if header.prev_id != expected.prev_id {
        return Err(BlockError::WrongParent {
            expected: expected.prev_id,
            found: header.prev_id,
        });
    }

    if header.target != expected.target {
        return Err(BlockError::WrongTarget {
            expected: expected.target,
            found: header.target,
        });
    }

    let block_id = block.id();
    if !expected.target.is_met_by(&block_id) {
        return Err(BlockError::TargetNotMet);
    }

    if mining.height != expected.height {
        return Err(BlockError::WrongHeight {
            expected: expected.height,
            found: mining.height,
        });
    }

    let minimum_unlock = expected.height.saturating_add(expected.mining_delay);
    if mining.mining_output.unlock_height < minimum_unlock {
        return Err(BlockError::WrongUnlockHeight {
            minimum: minimum_unlock,
            found: mining.mining_output.unlock_height,
        });
    }

    if mining.reward != expected.mining_reward {
        return Err(BlockError::WrongReward {
            expected: expected.mining_reward,
            found: mining.reward,
        });
    }

    if mining.reward.checked_add(mining.block_fees) != Some(mining.mining_output.amount) {
        return Err(BlockError::RewardMismatch);
    }

    if !validate_address(&mining.mining_output.address) {
        return Err(BlockError::InvalidMinerAddress(mining.mining_output.address.clone()));
    }

    let mut spent_in_block: HashSet<UtxoKey> = HashSet::new();
    let mut sum_fees = 0u64;
    for (index, tx) in block.transactions.iter().enumerate() {
        let total_input = validate_and_consume(tx, expected.height, ledger, &mut spent_in_block)
            .map_err(|source| match source {
                ValidationError::Storage(e) => BlockError::Storage(e),
                source => BlockError::TxInvalid { index, source },
            })?;
        sum_fees = sum_fees
            .checked_add(fee(tx, total_input))
            .ok_or(BlockError::TxInvalid {
                index,
                source: ValidationError::AmountOverflow,
            })?;
    }

    if sum_fees != mining.block_fees {
        return Err(BlockError::FeeMismatch {
            declared: mining.block_fees,
            actual: sum_fees,
        });
    }

    if !block.has_valid_merkle_root() {
        return Err(BlockError::MerkleMismatch);
    }

    Ok(BlockReceipt {
        block_id,
        height: expected.height,
        fees: sum_fees,
        spent: block
            .transactions
            .iter()
            .flat_map(|tx| tx.inputs.iter().map(|i| i.key()))
            .collect(),
        created: created_outputs(block),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{address_from_pubkey, hash_bytes, PrivateKey};
    use crate::storage::MemoryLedger;
    use crate::validation::{MiningTransaction, Transaction, TxInput};

    const EASY: CompactTarget = CompactTarget::new(0x7fffff, 0x20);

    struct Fixture {
        ledger: MemoryLedger,
        key: PrivateKey,
        address: String,
        funding: Hash,
        expected: BlockExpectations,
    }

    fn fixture() -> Fixture {
        let ledger = MemoryLedger::new();
        let key = PrivateKey::generate();
        let address = address_from_pubkey(&key.public_key());
        let funding = hash_bytes(b"funding");
        ledger.put(&funding, 0, &TxOutput::new(1_000, &address, 0)).unwrap();
        Fixture {
            ledger,
            key,
            address,
            funding,
            expected: BlockExpectations {
                prev_id: hash_bytes(b"tip"),
                height: 7,
                target: EASY,
                mining_reward: 50,
                mining_delay: 2,
            },
        }
    }

    /// Block meeting `f.expected`, nonce searched until the target is met
    fn build(f: &Fixture, fees: u64, transactions: Vec<Transaction>) -> Block {
        let mining = MiningTransaction::new(7, 50, fees, &f.address, 2);
        let mut block = Block::new(f.expected.prev_id, EASY, 0, 1_000, mining, transactions);
        mine(&mut block);
        block
    }

    fn mine(block: &mut Block) {
        while !block.header.meets_target() {
            block.header.nonce += 1;
        }
    }

    fn spend(f: &Fixture, amount: u64) -> Transaction {
        Transaction::new(
            vec![TxInput::new(f.funding, 0, f.key.sign(&f.funding))],
            vec![TxOutput::new(amount, &f.address, 0)],
        )
    }

    #[test]
    fn test_valid_block_receipt() {
        let f = fixture();
        let tx = spend(&f, 900);
        let block = build(&f, 100, vec![tx.clone()]);
        let receipt = verify_block(&block, &f.expected, &f.ledger).unwrap();

        assert_eq!(receipt.fees, 100);
        assert_eq!(receipt.spent, vec![(f.funding, 0)]);
        assert_eq!(receipt.created[0].0, (block.mining_tx.id(), 0));
        assert_eq!(receipt.created[0].1.amount, 150);
        assert_eq!(receipt.created[1].0, (tx.id(), 0));
        assert_eq!(receipt, BlockReceipt::for_trusted(&block));
    }

    #[test]
    fn test_wrong_parent_is_fork_pending() {
        let f = fixture();
        let mut block = build(&f, 0, vec![]);
        block.header.prev_id = hash_bytes(b"elsewhere");
        let err = verify_block(&block, &f.expected, &f.ledger).unwrap_err();
        assert!(err.is_fork_pending());
    }

    #[test]
    fn test_target_not_met() {
        let f = fixture();
        let mut expected = f.expected;
        expected.target = CompactTarget::min_target();
        let mut block = build(&f, 0, vec![]);
        block.header.target = expected.target;
        assert_eq!(
            verify_block(&block, &expected, &f.ledger),
            Err(BlockError::TargetNotMet)
        );
    }

    #[test]
    fn test_wrong_height_and_unlock() {
        let f = fixture();
        let mut block = build(&f, 0, vec![]);
        block.mining_tx.height = 8;
        block.header.merkle_root = block.compute_merkle_root();
        mine(&mut block);
        assert!(matches!(
            verify_block(&block, &f.expected, &f.ledger),
            Err(BlockError::WrongHeight { expected: 7, found: 8 })
        ));

        let mut block = build(&f, 0, vec![]);
        block.mining_tx.mining_output.unlock_height = 8;
        block.header.merkle_root = block.compute_merkle_root();
        mine(&mut block);
        assert!(matches!(
            verify_block(&block, &f.expected, &f.ledger),
            Err(BlockError::WrongUnlockHeight { minimum: 9, found: 8 })
        ));
    }

    #[test]
    fn test_reward_checks() {
        let f = fixture();
        let mut block = build(&f, 0, vec![]);
        block.mining_tx.mining_output.amount = 51;
        block.header.merkle_root = block.compute_merkle_root();
        mine(&mut block);
        assert_eq!(
            verify_block(&block, &f.expected, &f.ledger),
            Err(BlockError::RewardMismatch)
        );

        let mut expected = f.expected;
        expected.mining_reward = 25;
        let block = build(&f, 0, vec![]);
        assert!(matches!(
            verify_block(&block, &expected, &f.ledger),
            Err(BlockError::WrongReward { expected: 25, found: 50 })
        ));
    }

    #[test]
    fn test_fee_mismatch() {
        let f = fixture();
        let block = build(&f, 10, vec![spend(&f, 900)]);
        assert_eq!(
            verify_block(&block, &f.expected, &f.ledger),
            Err(BlockError::FeeMismatch { declared: 10, actual: 100 })
        );
    }

    #[test]
    fn test_double_spend_inside_block() {
        let f = fixture();
        let block = build(&f, 200, vec![spend(&f, 900), spend(&f, 800)]);
        assert!(matches!(
            verify_block(&block, &f.expected, &f.ledger),
            Err(BlockError::TxInvalid {
                index: 1,
                source: ValidationError::DoubleSpend { .. }
            })
        ));
    }

    #[test]
    fn test_programmatic_merkle_mismatch() {
        let f = fixture();
        let mut block = build(&f, 100, vec![spend(&f, 900)]);
        block.header.merkle_root = hash_bytes(b"bogus");
        mine(&mut block);
        assert_eq!(
            verify_block(&block, &f.expected, &f.ledger),
            Err(BlockError::MerkleMismatch)
        );
    }
}
