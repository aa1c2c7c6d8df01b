//! Wallet module - Key management and transaction signing

mod wallet;

pub use wallet::*;

use crate::crypto::{Hash, SignatureBlob};

/// Signing capability used when assembling transactions and mining rewards
pub trait Signer {
    /// Sign the id of the transaction whose output is being spent
    fn sign(&self, tx_id: &Hash) -> SignatureBlob;

    /// Address that receives funds for this signer
    fn address(&self) -> &str;
}
