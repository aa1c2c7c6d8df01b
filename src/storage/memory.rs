//! In-memory ledger
//!
//! `BTreeMap`-backed UTXO set plus a vector of raw blocks. Used by tests and
//! tooling; behaves like the persistent backend including atomic commits.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::crypto::Hash;
use crate::storage::{BlockChange, Ledger, LedgerBatch, StorageError};
use crate::validation::{TxOutput, UtxoKey};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    utxos: BTreeMap<UtxoKey, TxOutput>,
    blocks: Vec<String>,
}

/// Ledger held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
    /// Number of upcoming calls that report `Busy`
    busy_countdown: AtomicU32,
}

impl MemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `calls` operations fail with `StorageError::Busy`
    pub fn simulate_contention(&self, calls: u32) {
        self.busy_countdown.store(calls, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        let contended = self
            .busy_countdown
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if contended {
            return Err(StorageError::Busy);
        }
        self.state
            .lock()
            .map_err(|_| StorageError::Backend("ledger mutex poisoned".into()))
    }
}

impl Ledger for MemoryLedger {
    fn get(&self, tx_id: &Hash, index: u32) -> Result<Option<TxOutput>, StorageError> {
        Ok(self.lock()?.utxos.get(&(*tx_id, index)).cloned())
    }

    fn put(&self, tx_id: &Hash, index: u32, output: &TxOutput) -> Result<(), StorageError> {
        self.lock()?.utxos.insert((*tx_id, index), output.clone());
        Ok(())
    }

    fn delete(&self, tx_id: &Hash, index: u32) -> Result<(), StorageError> {
        self.lock()?.utxos.remove(&(*tx_id, index));
        Ok(())
    }

    fn append_block(&self, raw_block: &str) -> Result<(), StorageError> {
        self.lock()?.blocks.push(raw_block.to_string());
        Ok(())
    }

    fn get_block(&self, height: u64) -> Result<Option<String>, StorageError> {
        let state = self.lock()?;
        Ok(usize::try_from(height)
            .ok()
            .and_then(|h| state.blocks.get(h))
            .cloned())
    }

    fn remove_last_block(&self) -> Result<(), StorageError> {
        self.lock()?.blocks.pop();
        Ok(())
    }

    fn block_count(&self) -> Result<u64, StorageError> {
        Ok(self.lock()?.blocks.len() as u64)
    }

    fn total_amount_with_unlock_height_at_least(&self, height: u64) -> Result<u64, StorageError> {
        Ok(self
            .lock()?
            .utxos
            .values()
            .filter(|o| o.unlock_height >= height)
            .fold(0u64, |acc, o| acc.saturating_add(o.amount)))
    }

    fn utxos(&self) -> Result<Vec<(UtxoKey, TxOutput)>, StorageError> {
        Ok(self
            .lock()?
            .utxos
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect())
    }

    fn commit(&self, batch: &LedgerBatch) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        for key in &batch.spend {
            state.utxos.remove(key);
        }
        for (key, output) in &batch.create {
            state.utxos.insert(*key, output.clone());
        }
        match &batch.block {
            BlockChange::None => {}
            BlockChange::Append(raw) => state.blocks.push(raw.clone()),
            BlockChange::RemoveLast => {
                state.blocks.pop();
            }
        }
        Ok(())
    }
}
