//! HEXCHAIN Blockchain Core Library
//!
//! A proof-of-work UTXO chain with a fixed-width hex wire format,
//! ECDSA (secp256k1) signatures, single-tip chain selection with bounded
//! fork handling, and pluggable ledger storage.

pub mod chain;
pub mod codec;
pub mod config;
pub mod consensus;
pub mod crypto;
pub mod mining;
pub mod node;
pub mod storage;
pub mod validation;
pub mod views;
pub mod wallet;

pub use chain::{AddResult, Blockchain, ChainError};
pub use config::ChainParams;
pub use consensus::{Block, BlockHeader, CompactTarget};
pub use node::{create_genesis_block, Node};
pub use storage::{Ledger, MemoryLedger, SledLedger};
