//! Consensus module - Block structure, validation, difficulty, and rewards

mod block;
mod difficulty;
mod rewards;
mod target;
mod validation;

pub use block::*;
pub use difficulty::*;
pub use rewards::*;
pub use target::*;
pub use validation::*;
