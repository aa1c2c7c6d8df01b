//! Property-based and adversarial tests for HEXCHAIN
//!
//! These tests verify invariants hold under random inputs and attack scenarios.

use hexchain_core::codec::{FormatError, WireFormat};
use hexchain_core::consensus::{
    apply_block_reward, calculate_next_target, Block, BlockHeader, CompactTarget, RewardState,
};
use hexchain_core::crypto::{build_merkle_proof, compute_merkle_root, hash_bytes, Hash, SignatureBlob};
use hexchain_core::storage::{Ledger, MemoryLedger};
use hexchain_core::validation::{MiningTransaction, Transaction, TxInput, TxOutput};
use proptest::prelude::*;

// ============================================================================
// STRATEGIES
// ============================================================================

fn arb_hash() -> impl Strategy<Value = Hash> {
    any::<[u8; 32]>().prop_map(Hash::from_bytes)
}

fn arb_signature() -> impl Strategy<Value = SignatureBlob> {
    (any::<[u8; 32]>(), any::<[u8; 32]>(), any::<[u8; 32]>(), any::<u8>()).prop_map(
        |(a, b, c, d)| {
            let mut bytes = [0u8; 97];
            bytes[..32].copy_from_slice(&a);
            bytes[32..64].copy_from_slice(&b);
            bytes[64..96].copy_from_slice(&c);
            bytes[96] = d;
            SignatureBlob::from_bytes(&bytes)
        },
    )
}

fn arb_output() -> impl Strategy<Value = TxOutput> {
    (any::<u64>(), "[1-9A-HJ-NP-Za-km-z]{0,60}", any::<u64>())
        .prop_map(|(amount, address, unlock_height)| TxOutput::new(amount, address, unlock_height))
}

fn arb_input() -> impl Strategy<Value = TxInput> {
    (arb_hash(), any::<u32>(), arb_signature())
        .prop_map(|(tx_id, index, signature)| TxInput::new(tx_id, index, signature))
}

fn arb_transaction() -> impl Strategy<Value = Transaction> {
    (
        prop::collection::vec(arb_input(), 0..4),
        prop::collection::vec(arb_output(), 0..4),
    )
        .prop_map(|(inputs, outputs)| Transaction::new(inputs, outputs))
}

fn arb_target() -> impl Strategy<Value = CompactTarget> {
    (1u32..=0x00ff_ffff, 3u8..=0x20).prop_map(|(c, e)| CompactTarget::new(c, e))
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

proptest! {
    /// Transactions survive encode/decode byte for byte
    #[test]
    fn prop_transaction_codec_round_trip(tx in arb_transaction()) {
        let encoded = tx.encode();
        let decoded = Transaction::decode(&encoded).unwrap();
        prop_assert_eq!(&decoded, &tx);
        prop_assert_eq!(decoded.encode(), encoded);
        prop_assert_eq!(decoded.id(), tx.id());
    }

    /// Blocks decode to the same id, and the merkle root is rechecked
    #[test]
    fn prop_block_codec_round_trip(
        prev in arb_hash(),
        target in arb_target(),
        nonce in 0u64..=0xff_ffff,
        timestamp in 0u64..=u32::MAX as u64,
        txs in prop::collection::vec(arb_transaction(), 0..3),
        reward in any::<u32>(),
    ) {
        let mining_tx = MiningTransaction::new(7, reward as u64, 0, "miner", 2);
        let block = Block::new(prev, target, nonce, timestamp, mining_tx, txs);
        let decoded = Block::decode(&block.encode()).unwrap();
        prop_assert_eq!(decoded.id(), block.id());
        prop_assert!(decoded.has_valid_merkle_root());
    }

    /// Any truncation of a valid encoding is rejected without panicking
    #[test]
    fn prop_truncated_transaction_rejected(tx in arb_transaction(), cut in 1usize..64) {
        let encoded = tx.encode();
        let cut = cut.min(encoded.len());
        prop_assert!(Transaction::decode(&encoded[..encoded.len() - cut]).is_err());
    }

    /// Header ids are deterministic and depend on the nonce
    #[test]
    fn prop_header_id_depends_on_nonce(
        target in arb_target(),
        nonce in 0u64..0xff_ffff,
        timestamp in 0u64..=u32::MAX as u64,
    ) {
        let h1 = BlockHeader::new(Hash::zero(), Hash::zero(), target, nonce, timestamp);
        let h2 = BlockHeader::new(Hash::zero(), Hash::zero(), target, nonce, timestamp);
        let h3 = BlockHeader::new(Hash::zero(), Hash::zero(), target, nonce + 1, timestamp);
        prop_assert_eq!(h1.id(), h2.id());
        prop_assert_ne!(h1.id(), h3.id());
    }

    /// Every leaf has a proof that folds back to the root
    #[test]
    fn prop_merkle_proof_verifies(n in 1usize..40, pick in any::<prop::sample::Index>(), seed in any::<u64>()) {
        let hashes: Vec<Hash> = (0..n as u64)
            .map(|i| hash_bytes(&(seed ^ (i << 32) ^ i).to_le_bytes()))
            .collect();
        let root = compute_merkle_root(&hashes);
        let leaf = hashes[pick.index(n)];

        let proof = build_merkle_proof(&leaf, &hashes, &root).unwrap();
        prop_assert!(proof.matches_claimed_root);
        prop_assert!(proof.verify(&root));
        prop_assert!(!proof.verify(&hash_bytes(b"other root")));
    }

    /// Slow periods never make the target easier; fast periods never harder
    #[test]
    fn prop_retarget_direction(
        current in arb_target(),
        heartbeat in 1u64..100,
        elapsed in 0u64..1_000_000,
    ) {
        let desired = heartbeat * heartbeat;
        let next = calculate_next_target(current, 1_000, 1_000 + elapsed, heartbeat);
        if elapsed > desired {
            prop_assert!(next.to_integer() <= current.to_integer());
        } else if elapsed < desired {
            prop_assert!(next.to_integer() >= current.to_integer());
        } else {
            prop_assert_eq!(next, current);
        }
    }

    /// Paying a block never takes more than what remains
    #[test]
    fn prop_reward_never_exceeds_remaining(
        reward in 0u64..1_000_000,
        remaining in 0u64..10_000_000,
        height in 1u64..100_000,
    ) {
        let ledger = MemoryLedger::new();
        let state = RewardState { mining_reward: reward.min(remaining), total_remaining: remaining };
        let next = apply_block_reward(state, height, 1_000, &ledger).unwrap();
        prop_assert_eq!(next.total_remaining, remaining - state.mining_reward);
        // with nothing locked far ahead, the reward can only shrink
        prop_assert!(next.mining_reward <= state.mining_reward);
    }
}

// ============================================================================
// ADVERSARIAL TESTS
// ============================================================================

/// Test: Time warp attack resistance
///
/// Extreme timestamps must still produce a target inside the valid range.
#[test]
fn test_time_warp_attack_resistance() {
    let current = CompactTarget::new(0x0fffff, 0x20);

    // claims the whole period took no time at all
    let fast = calculate_next_target(current, 1_000, 1_000, 10);
    assert!(fast.to_integer() >= current.to_integer());
    assert!(fast.to_integer() <= CompactTarget::max_target().to_integer());

    // timestamps going backwards count as zero elapsed
    let backwards = calculate_next_target(current, 2_000, 1_000, 10);
    assert_eq!(backwards, fast);

    // a century-long period drives the target down, never below the floor
    let slow = calculate_next_target(CompactTarget::new(0x01, 0x04), 0, 3_153_600_000, 10);
    assert_eq!(slow, CompactTarget::min_target());
}

/// Test: Uppercase hex is not canonical
#[test]
fn test_uppercase_hex_rejected() {
    let output = TxOutput::new(0xabcdef, "addr", 3);
    let encoded = output.encode();
    assert!(TxOutput::decode(&encoded).is_ok());
    assert!(matches!(
        TxOutput::decode(&encoded.to_uppercase()),
        Err(FormatError::InvalidHex { .. })
    ));
}

/// Test: Wrong tag and unknown version
#[test]
fn test_foreign_prefix_rejected() {
    let encoded = TxOutput::new(1, "addr", 0).encode();
    let as_input = format!("02{}", &encoded[2..]);
    assert!(matches!(
        TxOutput::decode(&as_input),
        Err(FormatError::WrongTag { expected: 0x01, found: 0x02 })
    ));
    let future = format!("0102{}", &encoded[4..]);
    assert!(matches!(
        TxOutput::decode(&future),
        Err(FormatError::UnsupportedVersion(0x02))
    ));
}

/// Test: Supply exhaustion
///
/// Once remaining supply reaches zero, the next pool comes only from value
/// locked beyond the halving horizon.
#[test]
fn test_supply_exhaustion() {
    let ledger = MemoryLedger::new();
    ledger.put(&hash_bytes(b"near"), 0, &TxOutput::new(500, "a", 50)).unwrap();
    ledger.put(&hash_bytes(b"far"), 0, &TxOutput::new(4_000, "a", 5_000)).unwrap();

    let exhausted = RewardState { mining_reward: 100, total_remaining: 100 };
    let next = apply_block_reward(exhausted, 10, 1_000, &ledger).unwrap();
    assert_eq!(next.total_remaining, 4_000);
    assert_eq!(next.mining_reward, 4);

    let empty = apply_block_reward(exhausted, 10, 1_000, &MemoryLedger::new()).unwrap();
    assert_eq!(empty, RewardState { mining_reward: 0, total_remaining: 0 });
}
