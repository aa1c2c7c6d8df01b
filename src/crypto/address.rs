//! Base58 addresses
//!
//! `address = base58(type || version || ripemd160(sha256(pubkey)) || checksum)`
//! where the checksum is the first four bytes of `sha256(sha256(digest))`.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::{double_hash, PublicKey};

/// Address type byte
pub const ADDRESS_TYPE: u8 = 0x00;

/// Address version byte
pub const ADDRESS_VERSION: u8 = 0x01;

/// Length of the public key digest
pub const ADDRESS_DIGEST_LEN: usize = 20;

/// Length of the checksum suffix
pub const ADDRESS_CHECKSUM_LEN: usize = 4;

/// Decoded address length: type + version + digest + checksum
pub const ADDRESS_PAYLOAD_LEN: usize = 2 + ADDRESS_DIGEST_LEN + ADDRESS_CHECKSUM_LEN;

/// Address decoding errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid base58 encoding")]
    InvalidBase58,
    #[error("Invalid address length: {0}")]
    InvalidLength(usize),
    #[error("Unknown address type {0:#04x} or version {1:#04x}")]
    UnknownType(u8, u8),
    #[error("Invalid checksum")]
    InvalidChecksum,
}

/// `ripemd160(sha256(pubkey))`
pub fn pubkey_digest(public_key: &PublicKey) -> [u8; ADDRESS_DIGEST_LEN] {
    let sha = Sha256::digest(public_key.0);
    let mut hasher = Ripemd160::new();
    hasher.update(sha);
    hasher.finalize().into()
}

fn checksum(digest: &[u8]) -> [u8; ADDRESS_CHECKSUM_LEN] {
    let full = double_hash(digest);
    let mut out = [0u8; ADDRESS_CHECKSUM_LEN];
    out.copy_from_slice(&full.0[..ADDRESS_CHECKSUM_LEN]);
    out
}

/// Encode a public key digest as a text address
pub fn encode_address(digest: &[u8; ADDRESS_DIGEST_LEN]) -> String {
    let mut payload = Vec::with_capacity(ADDRESS_PAYLOAD_LEN);
    payload.push(ADDRESS_TYPE);
    payload.push(ADDRESS_VERSION);
    payload.extend_from_slice(digest);
    payload.extend_from_slice(&checksum(digest));
    bs58::encode(payload).into_string()
}

/// Derive the address owned by a public key
pub fn address_from_pubkey(public_key: &PublicKey) -> String {
    encode_address(&pubkey_digest(public_key))
}

/// Decode a text address back to its public key digest
pub fn decode_address(address: &str) -> Result<[u8; ADDRESS_DIGEST_LEN], AddressError> {
    let payload = bs58::decode(address)
        .into_vec()
        .map_err(|_| AddressError::InvalidBase58)?;

    if payload.len() != ADDRESS_PAYLOAD_LEN {
        return Err(AddressError::InvalidLength(payload.len()));
    }
    if payload[0] != ADDRESS_TYPE || payload[1] != ADDRESS_VERSION {
        return Err(AddressError::UnknownType(payload[0], payload[1]));
    }

    let mut digest = [0u8; ADDRESS_DIGEST_LEN];
    digest.copy_from_slice(&payload[2..2 + ADDRESS_DIGEST_LEN]);
    if payload[2 + ADDRESS_DIGEST_LEN..] != checksum(&digest) {
        return Err(AddressError::InvalidChecksum);
    }

    Ok(digest)
}

/// Check an address without keeping the digest
pub fn validate_address(address: &str) -> bool {
    decode_address(address).is_ok()
}
