//! Pending transaction pool
//!
//! Transactions admitted for the next block share one spent set, so two
//! pending transactions can never consume the same output.

use std::mem;

use log::debug;

use crate::storage::Ledger;
use crate::validation::{fee, validate_and_consume, Transaction, ValidationError};

use super::blockchain::{Blockchain, ChainError};

/// A validated transaction waiting for a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTx {
    pub tx: Transaction,
    pub fee: u64,
}

impl<L: Ledger> Blockchain<L> {
    /// Admit `tx` to the pending pool.
    ///
    /// The transaction is validated for inclusion in the next block. An
    /// `OrphanInput` error means it may succeed later.
    pub fn add_transaction(&mut self, tx: Transaction) -> Result<(), ValidationError> {
        let total_input = validate_and_consume(&tx, self.height + 1, &self.ledger, &mut self.pool_spent)?;
        let fee = fee(&tx, total_input);
        debug!("Pooled transaction {} paying fee {}", tx.id(), fee);
        self.pool.push(PendingTx { tx, fee });
        Ok(())
    }

    /// Pending transactions in arrival order
    pub fn pending_transactions(&self) -> &[PendingTx] {
        &self.pool
    }

    /// Sum of the fees of every pending transaction
    pub fn pending_fees(&self) -> u64 {
        self.pool.iter().fold(0u64, |acc, p| acc.saturating_add(p.fee))
    }

    /// Re-check every pending transaction against the current ledger,
    /// dropping those that no longer apply
    pub(super) fn revalidate_pool(&mut self) -> Result<(), ChainError> {
        let pending = mem::take(&mut self.pool);
        self.pool_spent.clear();
        for entry in pending {
            match validate_and_consume(&entry.tx, self.height + 1, &self.ledger, &mut self.pool_spent) {
                Ok(total_input) => self.pool.push(PendingTx {
                    fee: fee(&entry.tx, total_input),
                    tx: entry.tx,
                }),
                Err(ValidationError::Storage(e)) => return Err(e.into()),
                Err(e) => debug!("Dropped pending transaction {}: {}", entry.tx.id(), e),
            }
        }
        Ok(())
    }
}
