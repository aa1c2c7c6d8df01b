//! Difficulty adjustment algorithm
//!
//! Every `heartbeat` blocks the elapsed time since the block `heartbeat`
//! heights earlier is compared against `heartbeat²` seconds, and the target
//! moves by the absolute difference.

use crate::consensus::CompactTarget;

/// Check if difficulty should be adjusted after adding the block at `height`
pub fn should_adjust_difficulty(height: u64, heartbeat: u64) -> bool {
    heartbeat > 0 && height > 0 && height % heartbeat == 0
}

/// Height of the block the period is measured against
pub fn period_start_height(height: u64, heartbeat: u64) -> u64 {
    height.saturating_sub(heartbeat)
}

/// Calculate the new target.
///
/// Slower than desired lowers the target by the excess seconds (harder);
/// faster raises it by the shortfall (easier); exactly on time leaves it
/// untouched, without re-encoding.
pub fn calculate_next_target(
    current: CompactTarget,
    first_block_time: u64,
    last_block_time: u64,
    heartbeat: u64,
) -> CompactTarget {
    let elapsed = last_block_time.saturating_sub(first_block_time);
    let desired = heartbeat.saturating_mul(heartbeat);

    if elapsed > desired {
        current.lowered_by(elapsed - desired)
    } else if elapsed < desired {
        current.raised_by(desired - elapsed)
    } else {
        current
    }
}
