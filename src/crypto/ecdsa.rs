//! ECDSA signature implementation
//!
//! Uses the secp256k1 curve (via `k256`) for transaction signing. A
//! signature travels as a [`SignatureBlob`]: the signer's compressed public
//! key followed by the `(r, s)` pair.

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;

use super::Hash;

/// Length of a SEC1 compressed public key
pub const COMPRESSED_PUBKEY_LEN: usize = 33;

/// Length of one signature scalar
pub const SCALAR_LEN: usize = 32;

/// Total length of a signature blob in bytes
pub const SIGNATURE_BLOB_LEN: usize = COMPRESSED_PUBKEY_LEN + 2 * SCALAR_LEN;

/// Signature errors
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid private key")]
    InvalidPrivateKey,
}

/// secp256k1 private key
#[derive(Clone)]
pub struct PrivateKey(SigningKey);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

/// 33-byte compressed public key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; COMPRESSED_PUBKEY_LEN]);

/// Compressed public key plus an ECDSA `(r, s)` pair
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignatureBlob {
    pub public_key: PublicKey,
    pub r: [u8; SCALAR_LEN],
    pub s: [u8; SCALAR_LEN],
}

impl PrivateKey {
    /// Generate a new random private key
    pub fn generate() -> Self {
        PrivateKey(SigningKey::random(&mut OsRng))
    }

    /// Create from 32 bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, SignatureError> {
        SigningKey::from_slice(bytes)
            .map(PrivateKey)
            .map_err(|_| SignatureError::InvalidPrivateKey)
    }

    /// Get the corresponding compressed public key
    pub fn public_key(&self) -> PublicKey {
        let point = self.0.verifying_key().to_encoded_point(true);
        let mut bytes = [0u8; COMPRESSED_PUBKEY_LEN];
        bytes.copy_from_slice(point.as_bytes());
        PublicKey(bytes)
    }

    /// Sign a message hash, embedding our public key in the blob
    pub fn sign(&self, message: &Hash) -> SignatureBlob {
        let signature: Signature = self.0.sign(&message.0);
        let bytes = signature.to_bytes();
        let mut r = [0u8; SCALAR_LEN];
        let mut s = [0u8; SCALAR_LEN];
        r.copy_from_slice(&bytes[..SCALAR_LEN]);
        s.copy_from_slice(&bytes[SCALAR_LEN..]);
        SignatureBlob {
            public_key: self.public_key(),
            r,
            s,
        }
    }

    /// Export to bytes
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes().into()
    }
}

impl PublicKey {
    /// Create from 33 compressed bytes, rejecting points not on the curve
    pub fn from_bytes(bytes: &[u8; COMPRESSED_PUBKEY_LEN]) -> Result<Self, SignatureError> {
        VerifyingKey::from_sec1_bytes(bytes).map_err(|_| SignatureError::InvalidPublicKey)?;
        Ok(PublicKey(*bytes))
    }

    /// Export to bytes
    pub fn to_bytes(&self) -> [u8; COMPRESSED_PUBKEY_LEN] {
        self.0
    }
}

impl SignatureBlob {
    /// Verify the `(r, s)` pair over `message` with the embedded key.
    ///
    /// Malformed keys or scalars verify as false rather than erroring.
    pub fn verify(&self, message: &Hash) -> bool {
        let verifying_key = match VerifyingKey::from_sec1_bytes(&self.public_key.0) {
            Ok(vk) => vk,
            Err(_) => return false,
        };

        let mut rs = [0u8; 2 * SCALAR_LEN];
        rs[..SCALAR_LEN].copy_from_slice(&self.r);
        rs[SCALAR_LEN..].copy_from_slice(&self.s);
        let signature = match Signature::from_slice(&rs) {
            Ok(sig) => sig,
            Err(_) => return false,
        };

        verifying_key.verify(&message.0, &signature).is_ok()
    }

    /// Export the blob as `pubkey || r || s`
    pub fn to_bytes(&self) -> [u8; SIGNATURE_BLOB_LEN] {
        let mut bytes = [0u8; SIGNATURE_BLOB_LEN];
        bytes[..COMPRESSED_PUBKEY_LEN].copy_from_slice(&self.public_key.0);
        bytes[COMPRESSED_PUBKEY_LEN..COMPRESSED_PUBKEY_LEN + SCALAR_LEN].copy_from_slice(&self.r);
        bytes[COMPRESSED_PUBKEY_LEN + SCALAR_LEN..].copy_from_slice(&self.s);
        bytes
    }

    /// Split `pubkey || r || s` back into a blob. Curve membership is
    /// checked at verification time, not here.
    pub fn from_bytes(bytes: &[u8; SIGNATURE_BLOB_LEN]) -> Self {
        let mut public_key = [0u8; COMPRESSED_PUBKEY_LEN];
        let mut r = [0u8; SCALAR_LEN];
        let mut s = [0u8; SCALAR_LEN];
        public_key.copy_from_slice(&bytes[..COMPRESSED_PUBKEY_LEN]);
        r.copy_from_slice(&bytes[COMPRESSED_PUBKEY_LEN..COMPRESSED_PUBKEY_LEN + SCALAR_LEN]);
        s.copy_from_slice(&bytes[COMPRESSED_PUBKEY_LEN + SCALAR_LEN..]);
        SignatureBlob {
            public_key: PublicKey(public_key),
            r,
            s,
        }
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0))
    }
}

impl std::fmt::Debug for SignatureBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SignatureBlob({})", hex::encode(self.to_bytes()))
    }
}
