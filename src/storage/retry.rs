//! Bounded retry for transient storage contention

use std::thread;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::crypto::Hash;
use crate::storage::{Ledger, LedgerBatch, StorageError};
use crate::validation::{TxOutput, UtxoKey};

/// Longest single backoff sleep
const MAX_BACKOFF_MS: u64 = 2_000;

/// How often and how patiently to retry a `Busy` storage call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Sleep before the second attempt; doubled on every further attempt
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_backoff_ms: 5,
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt number `attempt + 1`
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_backoff_ms.saturating_mul(factor).min(MAX_BACKOFF_MS))
    }
}

/// Run `op`, retrying while it reports `StorageError::Busy`.
///
/// Non-transient errors are returned immediately. After `max_attempts`
/// busy results the call fails with `RetriesExhausted`.
pub fn with_retry<T, F>(policy: &RetryPolicy, mut op: F) -> Result<T, StorageError>
where
    F: FnMut() -> Result<T, StorageError>,
{
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        match op() {
            Err(e) if e.is_transient() => {
                if attempt < attempts {
                    warn!("Storage busy (attempt {}/{}), backing off", attempt, attempts);
                    thread::sleep(policy.backoff(attempt));
                }
            }
            other => return other,
        }
    }
    Err(StorageError::RetriesExhausted { attempts })
}

/// Ledger wrapper that applies a [`RetryPolicy`] to every call
#[derive(Debug)]
pub struct RetryingLedger<L> {
    inner: L,
    policy: RetryPolicy,
}

impl<L: Ledger> RetryingLedger<L> {
    pub fn new(inner: L, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// The wrapped backend
    pub fn inner(&self) -> &L {
        &self.inner
    }

    pub fn into_inner(self) -> L {
        self.inner
    }
}

impl<L: Ledger> Ledger for RetryingLedger<L> {
    fn get(&self, tx_id: &Hash, index: u32) -> Result<Option<TxOutput>, StorageError> {
        with_retry(&self.policy, || self.inner.get(tx_id, index))
    }

    fn put(&self, tx_id: &Hash, index: u32, output: &TxOutput) -> Result<(), StorageError> {
        with_retry(&self.policy, || self.inner.put(tx_id, index, output))
    }

    fn delete(&self, tx_id: &Hash, index: u32) -> Result<(), StorageError> {
        with_retry(&self.policy, || self.inner.delete(tx_id, index))
    }

    fn append_block(&self, raw_block: &str) -> Result<(), StorageError> {
        with_retry(&self.policy, || self.inner.append_block(raw_block))
    }

    fn get_block(&self, height: u64) -> Result<Option<String>, StorageError> {
        with_retry(&self.policy, || self.inner.get_block(height))
    }

    fn remove_last_block(&self) -> Result<(), StorageError> {
        with_retry(&self.policy, || self.inner.remove_last_block())
    }

    fn block_count(&self) -> Result<u64, StorageError> {
        with_retry(&self.policy, || self.inner.block_count())
    }

    fn total_amount_with_unlock_height_at_least(&self, height: u64) -> Result<u64, StorageError> {
        with_retry(&self.policy, || {
            self.inner.total_amount_with_unlock_height_at_least(height)
        })
    }

    fn utxos(&self) -> Result<Vec<(UtxoKey, TxOutput)>, StorageError> {
        with_retry(&self.policy, || self.inner.utxos())
    }

    fn commit(&self, batch: &LedgerBatch) -> Result<(), StorageError> {
        with_retry(&self.policy, || self.inner.commit(batch))
    }
}
