//! Cryptography module - SHA-256 hashing, ECDSA signatures, addresses, Merkle trees

mod address;
mod ecdsa;
mod hash;
mod merkle;

pub use address::*;
pub use ecdsa::*;
pub use hash::*;
pub use merkle::*;
