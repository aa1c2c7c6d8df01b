//! Storage module - UTXO ledger backends and retry policy

mod ledger;
mod memory;
mod retry;
pub mod db;

pub use db::SledLedger;
pub use ledger::*;
pub use memory::MemoryLedger;
pub use retry::*;
