//! Database persistence layer using Sled
//!
//! Two trees: `utxos` keyed by `tx_id || index (u32 BE)` holding bincode
//! outputs, and `blocks` keyed by height (u64 BE) holding raw block hex.
//! Big-endian keys keep both trees ordered the natural way.

use std::io::ErrorKind;
use std::path::Path;

use sled::transaction::{TransactionError, TransactionResult};
use sled::{Db, Transactional, Tree};

use crate::crypto::Hash;
use crate::storage::{BlockChange, Ledger, LedgerBatch, StorageError};
use crate::validation::{TxOutput, UtxoKey};

const UTXO_KEY_LEN: usize = 36;

/// Sled-backed ledger
#[derive(Debug, Clone)]
pub struct SledLedger {
    db: Db,
    utxos_tree: Tree,
    blocks_tree: Tree,
}

fn utxo_key(tx_id: &Hash, index: u32) -> [u8; UTXO_KEY_LEN] {
    let mut key = [0u8; UTXO_KEY_LEN];
    key[..32].copy_from_slice(tx_id.as_bytes());
    key[32..].copy_from_slice(&index.to_be_bytes());
    key
}

fn parse_utxo_key(key: &[u8]) -> Result<UtxoKey, StorageError> {
    if key.len() != UTXO_KEY_LEN {
        return Err(StorageError::Corrupt(format!("utxo key of length {}", key.len())));
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&key[..32]);
    let mut index = [0u8; 4];
    index.copy_from_slice(&key[32..]);
    Ok((Hash(hash), u32::from_be_bytes(index)))
}

fn parse_height(key: &[u8]) -> Result<u64, StorageError> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| StorageError::Corrupt(format!("block key of length {}", key.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

fn encode_output(output: &TxOutput) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(output).map_err(|e| StorageError::Backend(e.to_string()))
}

fn decode_output(bytes: &[u8]) -> Result<TxOutput, StorageError> {
    bincode::deserialize(bytes).map_err(|e| StorageError::Corrupt(e.to_string()))
}

fn decode_raw_block(bytes: &[u8]) -> Result<String, StorageError> {
    String::from_utf8(bytes.to_vec()).map_err(|e| StorageError::Corrupt(e.to_string()))
}

fn map_sled(err: sled::Error) -> StorageError {
    match &err {
        sled::Error::Io(io)
            if matches!(
                io.kind(),
                ErrorKind::WouldBlock | ErrorKind::Interrupted | ErrorKind::TimedOut
            ) =>
        {
            StorageError::Busy
        }
        sled::Error::Corruption { .. } => StorageError::Corrupt(err.to_string()),
        _ => StorageError::Backend(err.to_string()),
    }
}

impl SledLedger {
    /// Open or create the database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(map_sled)?;
        Self::from_db(db)
    }

    /// Throwaway database that is removed on drop
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(map_sled)?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, StorageError> {
        let utxos_tree = db.open_tree("utxos").map_err(map_sled)?;
        let blocks_tree = db.open_tree("blocks").map_err(map_sled)?;
        Ok(Self {
            db,
            utxos_tree,
            blocks_tree,
        })
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(map_sled)?;
        Ok(())
    }

    fn last_height(&self) -> Result<Option<u64>, StorageError> {
        match self.blocks_tree.last().map_err(map_sled)? {
            Some((key, _)) => Ok(Some(parse_height(&key)?)),
            None => Ok(None),
        }
    }
}

impl Ledger for SledLedger {
    fn get(&self, tx_id: &Hash, index: u32) -> Result<Option<TxOutput>, StorageError> {
        match self.utxos_tree.get(utxo_key(tx_id, index)).map_err(map_sled)? {
            Some(bytes) => Ok(Some(decode_output(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put(&self, tx_id: &Hash, index: u32, output: &TxOutput) -> Result<(), StorageError> {
        let value = encode_output(output)?;
        self.utxos_tree
            .insert(&utxo_key(tx_id, index)[..], value)
            .map_err(map_sled)?;
        self.flush()
    }

    fn delete(&self, tx_id: &Hash, index: u32) -> Result<(), StorageError> {
        self.utxos_tree
            .remove(utxo_key(tx_id, index))
            .map_err(map_sled)?;
        self.flush()
    }

    fn append_block(&self, raw_block: &str) -> Result<(), StorageError> {
        let height = self.block_count()?;
        self.blocks_tree
            .insert(&height.to_be_bytes()[..], raw_block.as_bytes())
            .map_err(map_sled)?;
        self.flush()
    }

    fn get_block(&self, height: u64) -> Result<Option<String>, StorageError> {
        match self.blocks_tree.get(height.to_be_bytes()).map_err(map_sled)? {
            Some(bytes) => Ok(Some(decode_raw_block(&bytes)?)),
            None => Ok(None),
        }
    }

    fn remove_last_block(&self) -> Result<(), StorageError> {
        if let Some(height) = self.last_height()? {
            self.blocks_tree
                .remove(height.to_be_bytes())
                .map_err(map_sled)?;
            self.flush()?;
        }
        Ok(())
    }

    fn block_count(&self) -> Result<u64, StorageError> {
        Ok(self.last_height()?.map_or(0, |h| h + 1))
    }

    fn total_amount_with_unlock_height_at_least(&self, height: u64) -> Result<u64, StorageError> {
        let mut total = 0u64;
        for item in self.utxos_tree.iter() {
            let (_, value) = item.map_err(map_sled)?;
            let output = decode_output(&value)?;
            if output.unlock_height >= height {
                total = total.saturating_add(output.amount);
            }
        }
        Ok(total)
    }

    fn utxos(&self) -> Result<Vec<(UtxoKey, TxOutput)>, StorageError> {
        let mut set = Vec::new();
        for item in self.utxos_tree.iter() {
            let (key, value) = item.map_err(map_sled)?;
            set.push((parse_utxo_key(&key)?, decode_output(&value)?));
        }
        Ok(set)
    }

    fn commit(&self, batch: &LedgerBatch) -> Result<(), StorageError> {
        let spent: Vec<[u8; UTXO_KEY_LEN]> = batch
            .spend
            .iter()
            .map(|(id, index)| utxo_key(id, *index))
            .collect();
        let created = batch
            .create
            .iter()
            .map(|((id, index), output)| Ok((utxo_key(id, *index), encode_output(output)?)))
            .collect::<Result<Vec<_>, StorageError>>()?;

        // Block heights are resolved up front; the chain is the only writer.
        let block_op = match &batch.block {
            BlockChange::None => None,
            BlockChange::Append(raw) => Some((self.block_count()?, Some(raw.as_bytes()))),
            BlockChange::RemoveLast => self.last_height()?.map(|h| (h, None)),
        };

        let result: TransactionResult<(), ()> = (&self.utxos_tree, &self.blocks_tree)
            .transaction(|(utxos, blocks)| {
                for key in &spent {
                    utxos.remove(&key[..])?;
                }
                for (key, value) in &created {
                    utxos.insert(&key[..], value.as_slice())?;
                }
                match block_op {
                    Some((height, Some(raw))) => {
                        blocks.insert(&height.to_be_bytes()[..], raw)?;
                    }
                    Some((height, None)) => {
                        blocks.remove(&height.to_be_bytes()[..])?;
                    }
                    None => {}
                }
                Ok(())
            });

        result.map_err(|e| match e {
            TransactionError::Abort(()) => StorageError::Backend("transaction aborted".into()),
            TransactionError::Storage(e) => map_sled(e),
        })?;
        self.flush()
    }
}
