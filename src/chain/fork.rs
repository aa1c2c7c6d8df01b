//! Fork handling
//!
//! One-block lookahead: a block recorded at the tip height becomes the new
//! tip as soon as a valid child of it arrives. Every step of the swap is
//! undone if any part of it fails.

use log::{debug, info, warn};

use crate::consensus::{Block, BlockReceipt, CompactTarget};
use crate::storage::Ledger;

use super::blockchain::{AddResult, Blockchain, ChainError, ChainSnapshot};

/// Outcome of [`Blockchain::handle_fork`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkOutcome {
    /// The fork branch replaced the tip
    Reorganized,
    /// The block was stored in the fork table
    Recorded,
    /// The reorg was attempted and unwound
    Failed,
    /// The block does not carry the work required at its height
    Refused,
}

impl From<ForkOutcome> for AddResult {
    fn from(outcome: ForkOutcome) -> Self {
        match outcome {
            ForkOutcome::Reorganized => AddResult::Accepted,
            ForkOutcome::Recorded => AddResult::Forked,
            ForkOutcome::Failed | ForkOutcome::Refused => AddResult::Rejected,
        }
    }
}

/// `block` declares `target` and its id meets it
fn carries_work(block: &Block, target: CompactTarget) -> bool {
    block.header.target == target && target.is_met_by(&block.id())
}

impl<L: Ledger> Blockchain<L> {
    /// Place `block` through the fork table.
    ///
    /// If the fork table holds a block at the tip height whose id is the
    /// parent of `block`, the tip is swapped for that branch. Otherwise
    /// `block` is recorded under its height, provided it meets the current
    /// target.
    pub fn handle_fork(&mut self, block: Block) -> Result<ForkOutcome, ChainError> {
        let candidate = match self.fork_table.get(&self.height) {
            Some(c) if c.id() == block.header.prev_id && block.height() == self.height + 1 => c.clone(),
            _ => {
                if !carries_work(&block, self.target) {
                    warn!("Refused fork block {}: target {} not met", block.id(), self.target);
                    return Ok(ForkOutcome::Refused);
                }
                self.record_fork(block);
                return Ok(ForkOutcome::Recorded);
            }
        };

        let snapshot = self.snapshot();
        let Some(popped) = self.last_block().cloned() else {
            return Err(ChainError::MissingGenesis);
        };
        if !self.pop_block()? {
            self.record_fork(block);
            return Ok(ForkOutcome::Recorded);
        }

        let new_tip = block.id();
        match self.swap_in(candidate.clone(), block) {
            Ok(true) => {
                self.fork_table.remove(&candidate.height());
                info!(
                    "Reorganized: {} replaced by {} at height {}, new tip {}",
                    popped.id(),
                    candidate.id(),
                    candidate.height(),
                    new_tip
                );
                self.fork_table.insert(popped.height(), popped);
                Ok(ForkOutcome::Reorganized)
            }
            Ok(false) => {
                warn!("Fork through {} failed, restoring tip {}", candidate.id(), popped.id());
                self.restore_tip(popped, snapshot)?;
                Ok(ForkOutcome::Failed)
            }
            Err(e) => {
                if let Err(restore_err) = self.restore_tip(popped, snapshot) {
                    warn!("Could not restore tip after failed reorg: {}", restore_err);
                }
                Err(e)
            }
        }
    }

    /// Keep `block` as a competitor of the active block at its height.
    ///
    /// It must carry the target the active block carries there. A block
    /// already on the active chain is not recorded.
    pub(super) fn offer_fork(&mut self, block: Block) -> Result<AddResult, ChainError> {
        let height = block.height();
        let active = self
            .block_at(height)?
            .ok_or_else(|| ChainError::Inconsistent(format!("no block at height {height}")))?;
        let block_id = block.id();
        if active.id() == block_id {
            debug!("Block {} is already on the active chain at height {}", block_id, height);
            return Ok(AddResult::Rejected);
        }
        if !carries_work(&block, active.header.target) {
            warn!("Rejected fork block {}: target {} not met", block_id, active.header.target);
            return Ok(AddResult::Rejected);
        }
        self.record_fork(block);
        Ok(AddResult::Forked)
    }

    fn record_fork(&mut self, block: Block) {
        debug!("Fork table: recording {} at height {}", block.id(), block.height());
        self.fork_table.insert(block.height(), block);
    }

    /// Add the fork block and its child; on refusal pop what was added
    fn swap_in(&mut self, candidate: Block, block: Block) -> Result<bool, ChainError> {
        if self.add_block_inner(candidate, false, false)? != AddResult::Accepted {
            return Ok(false);
        }
        if self.add_block_inner(block, false, false)? != AddResult::Accepted {
            self.pop_block()?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Put `popped` back as the tip and restore the pre-reorg values
    fn restore_tip(&mut self, popped: Block, snapshot: ChainSnapshot) -> Result<(), ChainError> {
        while self.height >= popped.height() {
            if !self.pop_block()? {
                break;
            }
        }
        let receipt = BlockReceipt::for_trusted(&popped);
        self.accept(popped, receipt, true)?;
        self.restore_snapshot(snapshot);
        Ok(())
    }
}
