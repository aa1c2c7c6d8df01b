//! Block reward schedule
//!
//! The subsidy halves every `halving_number` blocks, or early when it would
//! exceed what is left of the supply. Once the remaining supply hits exactly
//! zero, value time-locked far enough in the future becomes a new pool.

use serde::Serialize;

use crate::storage::{Ledger, StorageError};

/// Reward bookkeeping carried by the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RewardState {
    /// Subsidy for the next block
    pub mining_reward: u64,
    /// Supply not yet paid out as subsidy
    pub total_remaining: u64,
}

/// Check if the reward should be halved after the block at `height`
pub fn should_halve(height: u64, halving_number: u64, mining_reward: u64, total_remaining: u64) -> bool {
    let scheduled = halving_number > 0 && height > 0 && height % halving_number == 0;
    scheduled || mining_reward > total_remaining
}

/// Reward state after the block at `height` paid `state.mining_reward`.
///
/// The ledger is only consulted in the zero-remaining case.
pub fn apply_block_reward(
    state: RewardState,
    height: u64,
    halving_number: u64,
    ledger: &dyn Ledger,
) -> Result<RewardState, StorageError> {
    let mut next = RewardState {
        mining_reward: state.mining_reward,
        total_remaining: state.total_remaining.saturating_sub(state.mining_reward),
    };

    if !should_halve(height, halving_number, next.mining_reward, next.total_remaining) {
        return Ok(next);
    }

    if next.total_remaining == 0 {
        let horizon = height.saturating_add(halving_number);
        next.total_remaining = ledger.total_amount_with_unlock_height_at_least(horizon)?;
        next.mining_reward = next.total_remaining / halving_number.max(1);
    } else {
        next.mining_reward /= 2;
    }
    Ok(next)
}

/// Reward state before the block at the tip was added
pub fn revert_block_reward(state: RewardState, block_reward: u64) -> RewardState {
    RewardState {
        mining_reward: block_reward,
        total_remaining: state.total_remaining.saturating_add(block_reward),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash_bytes;
    use crate::storage::MemoryLedger;
    use crate::validation::TxOutput;

    fn state(mining_reward: u64, total_remaining: u64) -> RewardState {
        RewardState {
            mining_reward,
            total_remaining,
        }
    }

    #[test]
    fn test_plain_block_decrements_supply() {
        let ledger = MemoryLedger::new();
        let next = apply_block_reward(state(50, 1_000), 3, 10, &ledger).unwrap();
        assert_eq!(next, state(50, 950));
    }

    #[test]
    fn test_scheduled_halving() {
        let ledger = MemoryLedger::new();
        let next = apply_block_reward(state(50, 1_000), 10, 10, &ledger).unwrap();
        assert_eq!(next, state(25, 950));
    }

    #[test]
    fn test_halving_when_reward_exceeds_supply() {
        let ledger = MemoryLedger::new();
        let next = apply_block_reward(state(50, 80), 3, 10, &ledger).unwrap();
        assert_eq!(next, state(25, 30));
    }

    #[test]
    fn test_exhausted_supply_recomputes_from_locked_value() {
        let ledger = MemoryLedger::new();
        let id = hash_bytes(b"locked");
        ledger.put(&id, 0, &TxOutput::new(400, "a", 20)).unwrap();
        ledger.put(&id, 1, &TxOutput::new(600, "a", 13)).unwrap();
        ledger.put(&id, 2, &TxOutput::new(999, "a", 5)).unwrap();

        // height 3 + halving 10 = 13
        let next = apply_block_reward(state(50, 50), 3, 10, &ledger).unwrap();
        assert_eq!(next, state(100, 1_000));
    }

    #[test]
    fn test_revert_restores_supply() {
        let ledger = MemoryLedger::new();
        let before = state(50, 1_000);
        let after = apply_block_reward(before, 10, 10, &ledger).unwrap();
        assert_eq!(revert_block_reward(after, 50), before);
    }
}
