//! Mining module - block assembly and cancellable PoW workers

mod miner;
mod worker;

pub use miner::*;
pub use worker::*;
