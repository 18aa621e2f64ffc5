use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Barrier;

use crate::config::InequalityHandling;

const NEVER: u64 = u64::MAX;

/// What every worker does in a round, decided after the round's barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Proceed,
    Stop,
    Abort,
}

/// Keeps workers in lockstep and decides, per round, whether they keep going.
///
/// Workers report a drained queue or a failure along with the round it happened in. The
/// verdict for round `r` only looks at reports for rounds up to `r`, so every worker reads
/// the same verdict even if a faster one already moved on and reported something newer.
#[derive(Debug)]
pub struct RoundGate {
    policy: InequalityHandling,
    barrier: Barrier,
    drained_at: Box<[AtomicU64]>,
    abort_at: AtomicU64,
}

impl RoundGate {
    pub fn new(workers: usize, policy: InequalityHandling) -> Self {
        Self {
            policy,
            barrier: Barrier::new(workers),
            drained_at: (0..workers).map(|_| AtomicU64::new(NEVER)).collect(),
            abort_at: AtomicU64::new(NEVER),
        }
    }

    /// Records that `worker_id`'s queue had nothing left for `round`.
    pub fn mark_drained(&self, worker_id: usize, round: u64) {
        self.drained_at[worker_id].fetch_min(round, Ordering::AcqRel);
    }

    /// Makes every round from `round` onwards abort.
    pub fn abort_from(&self, round: u64) {
        self.abort_at.fetch_min(round, Ordering::AcqRel);
    }

    /// Waits for every worker to reach `round` and returns the round's verdict.
    pub async fn enter(&self, round: u64) -> Verdict {
        self.barrier.wait().await;
        self.verdict(round)
    }

    fn verdict(&self, round: u64) -> Verdict {
        if self.abort_at.load(Ordering::Acquire) <= round {
            return Verdict::Abort;
        }

        let drained = self
            .drained_at
            .iter()
            .filter(|at| at.load(Ordering::Acquire) <= round)
            .count();

        let stop = match self.policy {
            InequalityHandling::StopEveryone => drained > 0,
            InequalityHandling::Pass => drained == self.drained_at.len(),
        };

        if stop { Verdict::Stop } else { Verdict::Proceed }
    }
}
