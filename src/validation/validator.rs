//! Transaction validation against the UTXO ledger

use std::collections::HashSet;

use thiserror::Error;

use crate::crypto::{address_from_pubkey, validate_address, Hash};
use crate::storage::{Ledger, StorageError};
use crate::validation::{Transaction, UtxoKey};

/// Why a transaction cannot be applied
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Referenced output {tx_id}:{index} not found")]
    OrphanInput { tx_id: Hash, index: u32 },
    #[error("Output {tx_id}:{index} unlocks at {unlock_height}, current height {height}")]
    PrematureUnlock {
        tx_id: Hash,
        index: u32,
        unlock_height: u64,
        height: u64,
    },
    #[error("Input key does not own output {tx_id}:{index}")]
    AddressMismatch { tx_id: Hash, index: u32 },
    #[error("Invalid signature for input {tx_id}:{index}")]
    BadSignature { tx_id: Hash, index: u32 },
    #[error("Output {tx_id}:{index} already spent")]
    DoubleSpend { tx_id: Hash, index: u32 },
    #[error("Insufficient input: have {input}, need {output}")]
    InsufficientInput { input: u64, output: u64 },
    #[error("Transaction has no inputs")]
    NoInputs,
    #[error("Amount overflow")]
    AmountOverflow,
    #[error("Invalid output address {0:?}")]
    InvalidOutputAddress(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ValidationError {
    /// Whether the transaction may become valid once its inputs are known
    pub fn is_orphan(&self) -> bool {
        matches!(self, ValidationError::OrphanInput { .. })
    }
}

/// Validate `tx` for inclusion in the block at `height` and, on success,
/// record its inputs in `spent_in_this_batch`.
///
/// Returns the total input amount. On failure `spent_in_this_batch` is left
/// untouched. The ledger is only read.
pub fn validate_and_consume(
    tx: &Transaction,
    height: u64,
    ledger: &dyn Ledger,
    spent_in_this_batch: &mut HashSet<UtxoKey>,
) -> Result<u64, ValidationError> {
    if tx.inputs.is_empty() {
        return Err(ValidationError::NoInputs);
    }
    if let Some(bad) = tx.outputs.iter().find(|o| !validate_address(&o.address)) {
        return Err(ValidationError::InvalidOutputAddress(bad.address.clone()));
    }

    let mut consumed: Vec<UtxoKey> = Vec::with_capacity(tx.inputs.len());
    let mut total_input = 0u64;

    for input in &tx.inputs {
        let (tx_id, index) = input.key();

        let referenced = ledger
            .get(&tx_id, index)?
            .ok_or(ValidationError::OrphanInput { tx_id, index })?;

        if referenced.unlock_height > height {
            return Err(ValidationError::PrematureUnlock {
                tx_id,
                index,
                unlock_height: referenced.unlock_height,
                height,
            });
        }

        if address_from_pubkey(&input.signature.public_key) != referenced.address {
            return Err(ValidationError::AddressMismatch { tx_id, index });
        }

        if !input.signature.verify(&tx_id) {
            return Err(ValidationError::BadSignature { tx_id, index });
        }

        let key = (tx_id, index);
        if spent_in_this_batch.contains(&key) || consumed.contains(&key) {
            return Err(ValidationError::DoubleSpend { tx_id, index });
        }
        consumed.push(key);

        total_input = total_input
            .checked_add(referenced.amount)
            .ok_or(ValidationError::AmountOverflow)?;
    }

    let total_output = tx.total_output().ok_or(ValidationError::AmountOverflow)?;
    if total_output > total_input {
        return Err(ValidationError::InsufficientInput {
            input: total_input,
            output: total_output,
        });
    }

    spent_in_this_batch.extend(consumed);
    Ok(total_input)
}

/// Fee paid by `tx` given its already validated input total
pub fn fee(tx: &Transaction, total_input: u64) -> u64 {
    total_input.saturating_sub(tx.total_output().unwrap_or(u64::MAX))
}
