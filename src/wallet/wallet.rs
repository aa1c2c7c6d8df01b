//! Wallet implementation
//!
//! Handles key generation, UTXO selection, and transaction signing.
//! The wallet does NOT affect consensus - bugs here cannot affect supply.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{address_from_pubkey, validate_address, Hash, PrivateKey, PublicKey, SignatureBlob};
use crate::storage::{Ledger, StorageError};
use crate::validation::{Transaction, TxInput, TxOutput, UtxoKey};
use crate::wallet::Signer;

/// Wallet errors
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },
    #[error("Wallet has no keys")]
    NoKeys,
    #[error("Invalid private key")]
    InvalidKey,
    #[error("Invalid address {0:?}")]
    InvalidAddress(String),
    #[error("Amount overflow")]
    AmountOverflow,
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Wallet file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Wallet file is corrupt: {0}")]
    Corrupt(String),
}

/// A wallet key pair
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// Private key (for signing)
    private_key: PrivateKey,
    pub public_key: PublicKey,
    /// Address (derived from public key)
    pub address: String,
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        Self::from_private_key(PrivateKey::generate())
    }

    fn from_private_key(private_key: PrivateKey) -> Self {
        let public_key = private_key.public_key();
        let address = address_from_pubkey(&public_key);
        Self {
            private_key,
            public_key,
            address,
        }
    }

    /// Import from private key bytes
    pub fn from_private_key_bytes(bytes: &[u8; 32]) -> Result<Self, WalletError> {
        let private_key = PrivateKey::from_bytes(bytes).map_err(|_| WalletError::InvalidKey)?;
        Ok(Self::from_private_key(private_key))
    }

    /// Export private key bytes
    pub fn private_key_bytes(&self) -> [u8; 32] {
        self.private_key.to_bytes()
    }
}

impl Signer for KeyPair {
    fn sign(&self, tx_id: &Hash) -> SignatureBlob {
        self.private_key.sign(tx_id)
    }

    fn address(&self) -> &str {
        &self.address
    }
}

/// On-disk form: private keys only
#[derive(Serialize, Deserialize)]
struct WalletFile {
    keys: Vec<[u8; 32]>,
}

/// A simple wallet
#[derive(Debug, Default)]
pub struct Wallet {
    /// address -> keypair
    keys: BTreeMap<String, KeyPair>,
}

impl Wallet {
    /// Create a new empty wallet
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a new key and add to wallet
    pub fn generate_key(&mut self) -> &KeyPair {
        self.insert(KeyPair::generate())
    }

    /// Import a key
    pub fn import_key(&mut self, bytes: &[u8; 32]) -> Result<&KeyPair, WalletError> {
        let keypair = KeyPair::from_private_key_bytes(bytes)?;
        Ok(self.insert(keypair))
    }

    fn insert(&mut self, keypair: KeyPair) -> &KeyPair {
        self.keys.entry(keypair.address.clone()).or_insert(keypair)
    }

    /// Get a keypair by address
    pub fn get_key_for_address(&self, address: &str) -> Option<&KeyPair> {
        self.keys.get(address)
    }

    /// First key, used for change and mining rewards
    pub fn primary_key(&self) -> Option<&KeyPair> {
        self.keys.values().next()
    }

    /// Get all addresses
    pub fn get_addresses(&self) -> Vec<&str> {
        self.keys.keys().map(String::as_str).collect()
    }

    /// Outputs owned by this wallet that are spendable at `height`
    pub fn spendable_utxos(
        &self,
        ledger: &dyn Ledger,
        height: u64,
    ) -> Result<Vec<(UtxoKey, TxOutput)>, WalletError> {
        Ok(ledger
            .utxos()?
            .into_iter()
            .filter(|(_, out)| self.keys.contains_key(&out.address) && out.unlock_height <= height)
            .collect())
    }

    /// Balance spendable at `height`
    pub fn get_balance(&self, ledger: &dyn Ledger, height: u64) -> Result<u64, WalletError> {
        Ok(self
            .spendable_utxos(ledger, height)?
            .iter()
            .fold(0u64, |acc, (_, out)| acc.saturating_add(out.amount)))
    }

    /// Create and sign a transaction paying `amount` to `recipient` for
    /// inclusion at `height`, returning change to the primary key
    pub fn create_transaction(
        &self,
        ledger: &dyn Ledger,
        height: u64,
        recipient: &str,
        amount: u64,
        fee: u64,
    ) -> Result<Transaction, WalletError> {
        if !validate_address(recipient) {
            return Err(WalletError::InvalidAddress(recipient.to_string()));
        }
        let change_key = self.primary_key().ok_or(WalletError::NoKeys)?;
        let total_needed = amount.checked_add(fee).ok_or(WalletError::AmountOverflow)?;

        // Collect UTXOs until we have enough
        let mut selected: Vec<(UtxoKey, &KeyPair)> = Vec::new();
        let mut total_input: u64 = 0;
        for ((tx_id, index), output) in self.spendable_utxos(ledger, height)? {
            if total_input >= total_needed {
                break;
            }
            if let Some(keypair) = self.keys.get(&output.address) {
                selected.push(((tx_id, index), keypair));
                total_input = total_input.saturating_add(output.amount);
            }
        }

        if total_input < total_needed {
            return Err(WalletError::InsufficientFunds {
                have: total_input,
                need: total_needed,
            });
        }

        let mut outputs = vec![TxOutput::new(amount, recipient, 0)];
        let change = total_input - total_needed;
        if change > 0 {
            outputs.push(TxOutput::new(change, &change_key.address, 0));
        }

        // each input signs the id of the transaction it spends from
        let inputs = selected
            .iter()
            .map(|((tx_id, index), keypair)| TxInput::new(*tx_id, *index, keypair.sign(tx_id)))
            .collect();

        Ok(Transaction::new(inputs, outputs))
    }

    /// Save wallet to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), WalletError> {
        let file = WalletFile {
            keys: self.keys.values().map(KeyPair::private_key_bytes).collect(),
        };
        let bytes = bincode::serialize(&file).map_err(|e| WalletError::Corrupt(e.to_string()))?;
        File::create(path)?.write_all(&bytes)?;
        Ok(())
    }

    /// Load wallet from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, WalletError> {
        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;
        let file: WalletFile =
            bincode::deserialize(&bytes).map_err(|e| WalletError::Corrupt(e.to_string()))?;
        let mut wallet = Self::new();
        for key in &file.keys {
            wallet.import_key(key)?;
        }
        Ok(wallet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash_bytes;
    use crate::storage::MemoryLedger;
    use std::collections::HashSet;

    #[test]
    fn test_keypair_export_import() {
        let kp1 = KeyPair::generate();
        let bytes = kp1.private_key_bytes();
        let kp2 = KeyPair::from_private_key_bytes(&bytes).unwrap();

        assert_eq!(kp1.public_key, kp2.public_key);
        assert_eq!(kp1.address, kp2.address);
        assert!(validate_address(&kp1.address));
    }

    #[test]
    fn test_wallet_balance_respects_unlock() {
        let mut wallet = Wallet::new();
        let address = wallet.generate_key().address.clone();

        let ledger = MemoryLedger::new();
        ledger.put(&hash_bytes(b"tx1"), 0, &TxOutput::new(1000, &address, 1)).unwrap();
        ledger.put(&hash_bytes(b"tx2"), 0, &TxOutput::new(500, &address, 9)).unwrap();
        ledger.put(&hash_bytes(b"tx3"), 0, &TxOutput::new(700, "someone else", 0)).unwrap();

        assert_eq!(wallet.get_balance(&ledger, 5).unwrap(), 1000);
        assert_eq!(wallet.get_balance(&ledger, 9).unwrap(), 1500);
    }

    #[test]
    fn test_created_transaction_validates() {
        let mut wallet = Wallet::new();
        let address = wallet.generate_key().address.clone();
        let recipient = KeyPair::generate().address;

        let ledger = MemoryLedger::new();
        let funding = hash_bytes(b"funding");
        ledger.put(&funding, 0, &TxOutput::new(1000, &address, 0)).unwrap();

        let tx = wallet.create_transaction(&ledger, 1, &recipient, 600, 15).unwrap();
        assert_eq!(tx.outputs[0], TxOutput::new(600, &recipient, 0));
        assert_eq!(tx.outputs[1], TxOutput::new(385, &address, 0));

        let input = crate::validation::validate_and_consume(&tx, 1, &ledger, &mut HashSet::new()).unwrap();
        assert_eq!(crate::validation::fee(&tx, input), 15);
    }

    #[test]
    fn test_insufficient_funds() {
        let mut wallet = Wallet::new();
        wallet.generate_key();
        let recipient = KeyPair::generate().address;

        let result = wallet.create_transaction(&MemoryLedger::new(), 1, &recipient, 1000, 10);
        assert!(matches!(result, Err(WalletError::InsufficientFunds { have: 0, need: 1010 })));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.bin");
        let mut wallet = Wallet::new();
        wallet.generate_key();
        wallet.generate_key();
        wallet.save(&path).unwrap();

        let loaded = Wallet::load(&path).unwrap();
        assert_eq!(loaded.get_addresses(), wallet.get_addresses());
    }
}
