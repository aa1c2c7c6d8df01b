//! Genesis block generation
//!
//! The genesis block is reproducible from [`ChainParams`] alone: fixed
//! timestamp, target and receiver, and the first nonce counting up from
//! zero that satisfies the target.

use std::sync::atomic::AtomicBool;

use crate::config::ChainParams;
use crate::consensus::Block;
use crate::crypto::Hash;
use crate::mining::search_nonce;
use crate::validation::MiningTransaction;

/// Create the genesis block for `params`
///
/// Calling this twice with the same parameters yields byte-identical blocks.
pub fn create_genesis_block(params: &ChainParams) -> Block {
    let mining_tx = MiningTransaction::new(
        0,
        params.genesis_reward,
        0,
        params.genesis_address(),
        params.mining_delay,
    );
    let mut block = Block::new(
        Hash::zero(),
        params.genesis_target,
        0,
        params.genesis_timestamp,
        mining_tx,
        Vec::new(),
    );
    // never raised: the search runs until the target is met
    let never = AtomicBool::new(false);
    search_nonce(&mut block.header, &never);
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::WireFormat;

    #[test]
    fn test_genesis_deterministic() {
        let params = ChainParams::for_testing();
        let g1 = create_genesis_block(&params);
        let g2 = create_genesis_block(&params);

        assert_eq!(g1.id(), g2.id());
        assert_eq!(g1.encode(), g2.encode());
    }

    #[test]
    fn test_genesis_structure() {
        let params = ChainParams::for_testing();
        let genesis = create_genesis_block(&params);

        assert_eq!(genesis.height(), 0);
        assert_eq!(*genesis.prev_id(), Hash::zero());
        assert!(genesis.transactions.is_empty());
        assert!(genesis.header.meets_target());
        assert!(genesis.has_valid_merkle_root());
        assert_eq!(genesis.mining_tx.reward, params.genesis_reward);
        assert_eq!(genesis.mining_tx.mining_output.address, params.genesis_address());
        assert_eq!(genesis.mining_tx.mining_output.unlock_height, params.mining_delay);
    }

    #[test]
    fn test_default_genesis_meets_target() {
        let genesis = create_genesis_block(&ChainParams::default());
        assert!(genesis.header.meets_target());
        assert_eq!(genesis.header.timestamp, 1_767_225_600);
    }
}
