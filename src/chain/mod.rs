//! Chain module - state machine, fork handling and pending pool

mod blockchain;
mod fork;
mod pool;

pub use blockchain::{AddResult, Blockchain, ChainError, ChainTx};
pub use fork::ForkOutcome;
pub use pool::PendingTx;
