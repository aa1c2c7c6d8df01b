//! Mining worker thread
//!
//! The nonce search runs on its own OS thread over a private copy of the
//! candidate block. The result comes back through a single-slot channel;
//! the owner polls with a timeout so it can notice stop requests.

use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::debug;

use crate::consensus::Block;
use crate::mining::{Miner, MiningResult};

/// State of a worker as seen by [`MiningWorker::poll`]
#[derive(Debug)]
pub enum WorkerStatus {
    /// Still searching
    Running,
    /// Finished with this result
    Done(MiningResult),
    /// The thread went away without reporting
    Disconnected,
}

/// Handle to a running mining thread
#[derive(Debug)]
pub struct MiningWorker {
    miner: Miner,
    result: Receiver<MiningResult>,
    handle: Option<JoinHandle<()>>,
}

impl MiningWorker {
    /// Start mining `block` on a new thread
    pub fn spawn(block: Block) -> Self {
        let miner = Miner::new();
        let (tx, rx) = sync_channel(1);
        let thread_miner = miner.clone();
        let handle = thread::spawn(move || {
            let height = block.height();
            let result = thread_miner.mine_block(block);
            debug!("Mining worker for height {} finished", height);
            // the receiver may already be gone
            let _ = tx.send(result);
        });
        Self {
            miner,
            result: rx,
            handle: Some(handle),
        }
    }

    /// Wait up to `timeout` for the result
    pub fn poll(&self, timeout: Duration) -> WorkerStatus {
        match self.result.recv_timeout(timeout) {
            Ok(result) => WorkerStatus::Done(result),
            Err(RecvTimeoutError::Timeout) => WorkerStatus::Running,
            Err(RecvTimeoutError::Disconnected) => WorkerStatus::Disconnected,
        }
    }

    /// Poll every `interval` until the worker finishes.
    ///
    /// `stale` is asked after each empty poll; once it answers true the
    /// search is cancelled and the result is [`MiningResult::Interrupted`].
    pub fn wait(&self, interval: Duration, mut stale: impl FnMut() -> bool) -> MiningResult {
        loop {
            match self.poll(interval) {
                WorkerStatus::Running => {
                    if stale() {
                        debug!("Candidate went stale, cancelling");
                        self.cancel();
                    }
                }
                WorkerStatus::Done(result) => return result,
                WorkerStatus::Disconnected => return MiningResult::Interrupted,
            }
        }
    }

    /// Ask the thread to stop at its next batch boundary
    pub fn cancel(&self) {
        self.miner.stop();
    }

    /// Cancel and wait for the thread to exit
    pub fn shutdown(mut self) {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MiningWorker {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::CompactTarget;
    use crate::crypto::Hash;
    use crate::validation::MiningTransaction;

    fn candidate(target: CompactTarget) -> Block {
        Block::new(
            Hash::zero(),
            target,
            0,
            1_767_225_600,
            MiningTransaction::new(1, 50, 0, "miner", 2),
            vec![],
        )
    }

    #[test]
    fn test_worker_delivers_block() {
        let worker = MiningWorker::spawn(candidate(CompactTarget::new(0x00ffff, 0x20)));
        loop {
            match worker.poll(Duration::from_millis(50)) {
                WorkerStatus::Running => continue,
                WorkerStatus::Done(MiningResult::Success(block)) => {
                    assert!(block.header.meets_target());
                    break;
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_cancel_is_prompt() {
        let worker = MiningWorker::spawn(candidate(CompactTarget::min_target()));
        assert!(matches!(
            worker.poll(Duration::from_millis(10)),
            WorkerStatus::Running
        ));
        worker.cancel();
        match worker.poll(Duration::from_secs(10)) {
            WorkerStatus::Done(MiningResult::Interrupted) => {}
            other => panic!("unexpected {other:?}"),
        }
        worker.shutdown();
    }

    #[test]
    fn test_wait_cancels_stale_candidate() {
        let worker = MiningWorker::spawn(candidate(CompactTarget::min_target()));
        let mut polls = 0;
        let result = worker.wait(Duration::from_millis(10), || {
            polls += 1;
            polls >= 3
        });
        assert!(matches!(result, MiningResult::Interrupted));
        assert!(polls >= 3);
        worker.shutdown();
    }

    #[test]
    fn test_wait_returns_solution() {
        let worker = MiningWorker::spawn(candidate(CompactTarget::new(0x00ffff, 0x20)));
        match worker.wait(Duration::from_millis(10), || false) {
            MiningResult::Success(block) => assert!(block.header.meets_target()),
            MiningResult::Interrupted => panic!("interrupted without a stop request"),
        }
    }
}
