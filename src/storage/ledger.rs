//! Ledger contract
//!
//! The ledger persists the UTXO set and the height-ordered raw block store.
//! The chain state machine is its only writer.

use thiserror::Error;

use crate::crypto::Hash;
use crate::validation::{TxOutput, UtxoKey};

/// Storage failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// Transient contention; the operation may be retried unchanged
    #[error("Storage busy")]
    Busy,
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Corrupt ledger entry: {0}")]
    Corrupt(String),
    #[error("Storage still busy after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

impl StorageError {
    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Busy)
    }
}

/// Change to the block store applied together with a UTXO batch
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BlockChange {
    #[default]
    None,
    /// Append a raw block at height `block_count()`
    Append(String),
    /// Remove the highest block
    RemoveLast,
}

/// A set of ledger writes applied as one atomic unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerBatch {
    /// UTXOs deleted before `create` is applied
    pub spend: Vec<UtxoKey>,
    /// UTXOs inserted
    pub create: Vec<(UtxoKey, TxOutput)>,
    pub block: BlockChange,
}

impl LedgerBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spend(&mut self, tx_id: Hash, index: u32) {
        self.spend.push((tx_id, index));
    }

    pub fn create(&mut self, tx_id: Hash, index: u32, output: TxOutput) {
        self.create.push(((tx_id, index), output));
    }
}

/// Persisted UTXO set plus raw block store.
///
/// Every method is a single atomic statement against the backend. A
/// `StorageError::Busy` result means nothing was written.
pub trait Ledger {
    fn get(&self, tx_id: &Hash, index: u32) -> Result<Option<TxOutput>, StorageError>;

    fn put(&self, tx_id: &Hash, index: u32, output: &TxOutput) -> Result<(), StorageError>;

    fn delete(&self, tx_id: &Hash, index: u32) -> Result<(), StorageError>;

    /// Append a raw block at height `block_count()`
    fn append_block(&self, raw_block: &str) -> Result<(), StorageError>;

    fn get_block(&self, height: u64) -> Result<Option<String>, StorageError>;

    /// Remove the highest block, if any
    fn remove_last_block(&self) -> Result<(), StorageError>;

    /// Number of stored blocks; chain height is `block_count() - 1`
    fn block_count(&self) -> Result<u64, StorageError>;

    /// Sum of every UTXO whose `unlock_height >= height`
    fn total_amount_with_unlock_height_at_least(&self, height: u64) -> Result<u64, StorageError>;

    /// Snapshot of the whole UTXO set ordered by key
    fn utxos(&self) -> Result<Vec<(UtxoKey, TxOutput)>, StorageError>;

    /// Apply `batch` atomically
    fn commit(&self, batch: &LedgerBatch) -> Result<(), StorageError>;
}

impl<L: Ledger + ?Sized> Ledger for Box<L> {
    fn get(&self, tx_id: &Hash, index: u32) -> Result<Option<TxOutput>, StorageError> {
        (**self).get(tx_id, index)
    }

    fn put(&self, tx_id: &Hash, index: u32, output: &TxOutput) -> Result<(), StorageError> {
        (**self).put(tx_id, index, output)
    }

    fn delete(&self, tx_id: &Hash, index: u32) -> Result<(), StorageError> {
        (**self).delete(tx_id, index)
    }

    fn append_block(&self, raw_block: &str) -> Result<(), StorageError> {
        (**self).append_block(raw_block)
    }

    fn get_block(&self, height: u64) -> Result<Option<String>, StorageError> {
        (**self).get_block(height)
    }

    fn remove_last_block(&self) -> Result<(), StorageError> {
        (**self).remove_last_block()
    }

    fn block_count(&self) -> Result<u64, StorageError> {
        (**self).block_count()
    }

    fn total_amount_with_unlock_height_at_least(&self, height: u64) -> Result<u64, StorageError> {
        (**self).total_amount_with_unlock_height_at_least(height)
    }

    fn utxos(&self) -> Result<Vec<(UtxoKey, TxOutput)>, StorageError> {
        (**self).utxos()
    }

    fn commit(&self, batch: &LedgerBatch) -> Result<(), StorageError> {
        (**self).commit(batch)
    }
}
