//! Node module - genesis creation and the synchronised chain wrapper

mod genesis;
mod node;

pub use genesis::create_genesis_block;
pub use node::*;
