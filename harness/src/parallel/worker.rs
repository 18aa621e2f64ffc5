use std::sync::Arc;

use log::debug;
use tokio::{sync::mpsc, task};

use super::{
    averaging::ParamAverager,
    gate::{RoundGate, Verdict},
};
use crate::{
    BenchErr,
    error::{ModelResult, Stage},
    model::{Batch, Model},
    timer::{IterationListener, IterationTimer, ScoreListener},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Fetching,
    Computing,
    Syncing,
    Stopped,
}

impl State {
    fn as_str(self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Fetching => "fetching",
            State::Computing => "computing",
            State::Syncing => "syncing",
            State::Stopped => "stopped",
        }
    }
}

/// A model copy plus the listeners only its own worker touches.
pub(super) struct Replica {
    pub model: Box<dyn Model>,
    pub timer: IterationTimer,
    pub score: ScoreListener,
}

impl Replica {
    /// Trains on `batch` and notifies the listeners.
    ///
    /// Takes `self` by value so it can be moved into the blocking pool and handed back.
    fn step(mut self, batch: Batch, iteration: u64) -> (Self, ModelResult<f32>) {
        let result = self.model.train_step(&batch);

        if let Ok(score) = result {
            self.timer.iteration_done(&*self.model, iteration, score);
            self.score.iteration_done(&*self.model, iteration, score);
        }

        (self, result)
    }
}

/// Everything a worker needs besides its replica.
pub(super) struct WorkerCtx {
    pub id: usize,
    pub rx: mpsc::Receiver<Batch>,
    pub gate: Arc<RoundGate>,
    pub averager: Arc<ParamAverager>,
    pub averaging_frequency: u64,
}

/// What a worker hands back once it stops.
pub(super) struct WorkerOutcome {
    pub id: usize,
    pub processed: u64,
    pub discarded: u64,
    pub rounds: u64,
    pub replica: Option<Box<dyn Model>>,
    pub error: Option<BenchErr>,
}

/// Runs one worker until the gate stops or aborts it.
///
/// Every round the worker fetches one batch, waits at the gate and, if told to proceed,
/// trains on it. Every `averaging_frequency` rounds it syncs parameters with the rest.
pub(super) async fn run(mut ctx: WorkerCtx, mut replica: Replica) -> WorkerOutcome {
    let id = ctx.id;
    // The first step is measured from the moment the worker starts.
    replica.timer.start();
    let mut replica = Some(replica);
    let mut out = WorkerOutcome {
        id,
        processed: 0,
        discarded: 0,
        rounds: 0,
        replica: None,
        error: None,
    };

    transition(id, State::Idle);
    let mut round = 0;

    let verdict = loop {
        transition(id, State::Fetching);
        let next = ctx.rx.recv().await;
        if next.is_none() {
            ctx.gate.mark_drained(id, round);
        }

        let verdict = ctx.gate.enter(round).await;
        if verdict != Verdict::Proceed {
            out.discarded += next.is_some() as u64;
            break verdict;
        }

        // A drained worker idles through the round.
        if let Some(batch) = next {
            step(&mut out, &mut replica, &ctx.gate, round, batch).await;
        }

        round += 1;
        if round % ctx.averaging_frequency == 0 {
            transition(id, State::Syncing);
            let model = replica.as_mut().map(|r| &mut r.model);
            let contribute = out.error.is_none();

            if let Err(e) = ctx.averager.sync(model, contribute).await {
                fail(&mut out, &ctx.gate, round, BenchErr::at(Stage::Training)(e));
            }
        }
    };

    if verdict == Verdict::Abort {
        // Nothing else gets fed to an aborted run.
        ctx.rx.close();
    }
    while ctx.rx.recv().await.is_some() {
        out.discarded += 1;
    }

    transition(id, State::Stopped);
    debug!(
        worker_id = id,
        processed = out.processed,
        discarded = out.discarded;
        "worker finished"
    );

    out.rounds = round;
    out.replica = replica.map(|r| r.model);
    out
}

/// Trains the replica on one batch in the blocking pool, recording any failure.
async fn step(
    out: &mut WorkerOutcome,
    replica: &mut Option<Replica>,
    gate: &RoundGate,
    round: u64,
    batch: Batch,
) {
    // Only a panicked step loses the replica, and that aborts the next round.
    let Some(current) = replica.take() else {
        return;
    };

    transition(out.id, State::Computing);
    let iteration = out.processed + 1;

    match task::spawn_blocking(move || current.step(batch, iteration)).await {
        Ok((current, Ok(_))) => {
            *replica = Some(current);
            out.processed += 1;
        }
        Ok((current, Err(e))) => {
            *replica = Some(current);
            fail(out, gate, round + 1, BenchErr::at(Stage::Training)(e));
        }
        Err(_) => {
            let worker_id = out.id;
            fail(out, gate, round + 1, BenchErr::WorkerPanicked { worker_id });
        }
    }
}

fn fail(out: &mut WorkerOutcome, gate: &RoundGate, abort_round: u64, err: BenchErr) {
    debug!(worker_id = out.id; "worker failed: {err}");
    gate.abort_from(abort_round);
    out.error.get_or_insert(err);
}

fn transition(id: usize, state: State) {
    debug!(worker_id = id, state = state.as_str(); "worker state changed");
}
