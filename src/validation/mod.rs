//! Transactions and their validation

mod transaction;
mod validator;

pub use transaction::*;
pub use validator::*;
