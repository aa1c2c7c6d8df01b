//! Block miner implementation
//!
//! Assembles candidate blocks and performs PoW.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::codec::{max_for_width, widths};
use crate::chain::Blockchain;
use crate::consensus::{Block, BlockHeader};
use crate::storage::Ledger;
use crate::validation::MiningTransaction;

/// Largest nonce the header field can carry
pub const MAX_NONCE: u64 = max_for_width(widths::NONCE);

/// Nonces tried between two looks at the stop signal
pub const NONCE_BATCH: u64 = 4_096;

/// Mining result
#[derive(Debug)]
pub enum MiningResult {
    /// Successfully mined a block
    Success(Block),
    /// Mining was interrupted
    Interrupted,
}

/// Current Unix time in seconds
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Assemble an unmined candidate on top of the chain tip.
///
/// Drains the pending pool in arrival order and pays reward plus fees to
/// `address`. `None` only before genesis exists.
pub fn assemble_block<L: Ledger>(chain: &Blockchain<L>, address: &str, timestamp: u64) -> Option<Block> {
    let expected = chain.next_expectations()?;
    let pending = chain.pending_transactions();
    let fees = chain.pending_fees();
    let mining_tx = MiningTransaction::new(
        expected.height,
        expected.mining_reward,
        fees,
        address,
        expected.mining_delay,
    );
    let transactions = pending.iter().map(|p| p.tx.clone()).collect();
    Some(Block::new(
        expected.prev_id,
        expected.target,
        0,
        timestamp,
        mining_tx,
        transactions,
    ))
}

/// Search nonces from the header's current nonce until its id meets the
/// target. When the nonce field is exhausted the timestamp moves forward
/// one second and the search restarts from zero.
///
/// Returns `false` if `stop` was raised first.
pub fn search_nonce(header: &mut BlockHeader, stop: &AtomicBool) -> bool {
    let mut tried = 0u64;
    loop {
        if tried % NONCE_BATCH == 0 && stop.load(Ordering::SeqCst) {
            return false;
        }
        if header.meets_target() {
            return true;
        }
        tried = tried.wrapping_add(1);
        if header.nonce >= MAX_NONCE {
            header.nonce = 0;
            header.timestamp += 1;
        } else {
            header.nonce += 1;
        }
    }
}

/// Block miner
#[derive(Debug, Clone, Default)]
pub struct Miner {
    /// Stop signal
    stop_signal: Arc<AtomicBool>,
}

impl Miner {
    /// Create a new miner
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a stop signal handle
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_signal)
    }

    /// Stop mining
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Reset stop signal
    pub fn reset(&self) {
        self.stop_signal.store(false, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }

    /// Mine a block (find valid nonce)
    pub fn mine_block(&self, mut block: Block) -> MiningResult {
        if search_nonce(&mut block.header, &self.stop_signal) {
            MiningResult::Success(block)
        } else {
            MiningResult::Interrupted
        }
    }
}
