use std::{
    num::{NonZeroU64, NonZeroUsize},
    sync::Arc,
    thread,
};

use log::{info, warn};
use tokio::{runtime, sync::mpsc};

use super::{
    averaging::ParamAverager,
    gate::RoundGate,
    worker::{self, Replica, WorkerCtx, WorkerOutcome},
};
use crate::{
    BenchErr, Result,
    config::{InequalityHandling, RunnerConfig},
    data::BatchSource,
    error::Stage,
    metrics::MetricAccumulator,
    model::{Batch, Model},
    timer::{Clock, IterationTimer, SamplingPolicy, ScoreListener, SystemClock},
};

const SHARD_SIZE: usize = 4096;

/// How a multi-device training pass is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub workers: usize,
    pub averaging_frequency: NonZeroU64,
    /// Per-worker queue depth.
    pub prefetch_buffer: usize,
    pub inequality_handling: InequalityHandling,
    pub sampling: SamplingPolicy,
    pub score_frequency: NonZeroU64,
    /// Maximum amount of batches pulled from each feeding source.
    pub max_batches: Option<u64>,
}

impl CoordinatorSettings {
    /// Builds the settings for `workers` workers out of a runner configuration.
    pub fn from_config(cfg: &RunnerConfig, workers: usize) -> Result<Self> {
        Ok(Self {
            workers,
            averaging_frequency: cfg.averaging()?,
            prefetch_buffer: cfg.prefetch_buffer,
            inequality_handling: cfg.inequality_handling,
            sampling: cfg.sampling()?,
            score_frequency: cfg.scoring()?,
            max_batches: cfg.max_iterations,
        })
    }
}

/// Where workers get their batches from.
pub enum Feed<'a> {
    /// One source dealt round-robin across every worker.
    Shared(&'a mut dyn BatchSource),
    /// One source per worker.
    Partitioned(Vec<&'a mut dyn BatchSource>),
}

/// What a multi-device pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Batches trained on by any worker.
    pub processed: u64,
    /// Batches that reached a worker queue but were never trained on.
    pub discarded: u64,
    pub rounds: u64,
}

/// Replicates a model across workers and trains the replicas in lockstep.
///
/// Each worker owns a replica, a bounded batch queue and its own iteration timer. Every
/// timer writes into the same accumulator. Replicas are averaged every
/// `averaging_frequency` rounds, and once more into the original model at the end.
pub struct Coordinator {
    settings: CoordinatorSettings,
    metrics: Arc<MetricAccumulator>,
    clock: Arc<dyn Clock>,
}

impl Coordinator {
    /// Creates a new `Coordinator`.
    ///
    /// # Arguments
    /// * `settings` - How to carry out the pass.
    /// * `metrics` - The accumulator every worker's timer writes into.
    ///
    /// # Returns
    /// A new `Coordinator` instance.
    pub fn new(settings: CoordinatorSettings, metrics: Arc<MetricAccumulator>) -> Self {
        Self {
            settings,
            metrics,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Runs one training pass over `feed`.
    ///
    /// # Arguments
    /// * `model` - The model to replicate, left holding the averaged parameters.
    /// * `feed` - Where the batches come from.
    ///
    /// # Returns
    /// The pass summary, or a single error describing the failed workers.
    pub fn train(&self, model: &mut dyn Model, feed: Feed<'_>) -> Result<RunSummary> {
        let CoordinatorSettings {
            workers,
            averaging_frequency,
            prefetch_buffer,
            inequality_handling,
            max_batches,
            ..
        } = self.settings;

        if workers == 0 {
            return Err(BenchErr::InvalidConfig("at least one worker is required".into()));
        }
        if let Feed::Partitioned(sources) = &feed {
            if sources.len() != workers {
                return Err(BenchErr::InvalidConfig(format!(
                    "{} partitions were given for {workers} workers",
                    sources.len()
                )));
            }
        }

        let runtime = runtime::Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name("bench-worker")
            .build()?;

        let depth = prefetch_buffer.max(1);
        let (txs, rxs): (Vec<_>, Vec<_>) = (0..workers).map(|_| mpsc::channel(depth)).unzip();

        let gate = Arc::new(RoundGate::new(workers, inequality_handling));
        let shard_size = NonZeroUsize::new(SHARD_SIZE).unwrap_or(NonZeroUsize::MIN);
        let averager = Arc::new(ParamAverager::new(model.param_count(), shard_size, workers));

        let contexts: Vec<_> = rxs
            .into_iter()
            .enumerate()
            .map(|(id, rx)| {
                let ctx = WorkerCtx {
                    id,
                    rx,
                    gate: Arc::clone(&gate),
                    averager: Arc::clone(&averager),
                    averaging_frequency: averaging_frequency.get(),
                };
                (ctx, self.replica(&*model))
            })
            .collect();

        info!(workers = workers, depth = depth; "starting {workers} workers");

        let (fed, outcomes) = thread::scope(|s| {
            let feeders: Vec<_> = match feed {
                Feed::Shared(source) => vec![s.spawn(move || feed_workers(source, txs, max_batches))],
                Feed::Partitioned(sources) => sources
                    .into_iter()
                    .zip(txs)
                    .map(|(source, tx)| s.spawn(move || feed_workers(source, vec![tx], max_batches)))
                    .collect(),
            };

            let outcomes = runtime.block_on(async move {
                let handles: Vec<_> = contexts
                    .into_iter()
                    .map(|(ctx, replica)| tokio::spawn(worker::run(ctx, replica)))
                    .collect();

                let mut outcomes = Vec::with_capacity(handles.len());
                for (worker_id, handle) in handles.into_iter().enumerate() {
                    outcomes.push(handle.await.map_err(|_| BenchErr::WorkerPanicked { worker_id }));
                }
                outcomes
            });

            let fed: Vec<_> = feeders
                .into_iter()
                .map(|feeder| feeder.join().unwrap_or(Err(BenchErr::LoaderPanicked)))
                .collect();

            (fed, outcomes)
        });

        let (summary, replicas) = merge(outcomes)?;

        if let Some(err) = fed.into_iter().find_map(Result::err) {
            return Err(err);
        }

        average_into(model, &replicas)?;
        info!(
            processed = summary.processed,
            discarded = summary.discarded;
            "multi-device training pass finished"
        );

        Ok(summary)
    }

    fn replica(&self, model: &dyn Model) -> Replica {
        Replica {
            model: model.replicate(),
            timer: IterationTimer::with_clock(
                self.settings.sampling,
                Arc::clone(&self.metrics),
                Arc::clone(&self.clock),
            ),
            score: ScoreListener::new(self.settings.score_frequency),
        }
    }
}

/// Deals the batches of `source` round-robin into `txs` until it runs out.
///
/// Dropping the senders on return is what tells workers their queues are drained.
fn feed_workers(
    source: &mut dyn BatchSource,
    txs: Vec<mpsc::Sender<Batch>>,
    limit: Option<u64>,
) -> Result<u64> {
    source.reset()?;
    let mut fed = 0;

    for tx in txs.iter().cycle() {
        if limit.is_some_and(|limit| fed >= limit) || !source.has_next() {
            break;
        }

        let batch = source.next_batch()?;
        // A closed queue means the run was aborted.
        if tx.blocking_send(batch).is_err() {
            break;
        }
        fed += 1;
    }

    Ok(fed)
}

/// Folds every worker's outcome into one summary, or one error if any of them failed.
fn merge(outcomes: Vec<Result<WorkerOutcome>>) -> Result<(RunSummary, Vec<Box<dyn Model>>)> {
    let mut summary = RunSummary::default();
    let mut replicas = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();

    for (worker_id, outcome) in outcomes.into_iter().enumerate() {
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                failures.push((worker_id, e));
                continue;
            }
        };

        summary.processed += outcome.processed;
        summary.discarded += outcome.discarded;
        summary.rounds = summary.rounds.max(outcome.rounds);

        match outcome.error {
            Some(e) => failures.push((outcome.id, e)),
            None => replicas.extend(outcome.replica),
        }
    }

    let count = failures.len();
    let Some((worker_id, first)) = failures.into_iter().next() else {
        return Ok((summary, replicas));
    };

    warn!("{count} worker(s) failed, aborting the multi-device run");
    Err(BenchErr::WorkerFailed {
        worker_id,
        failures: count,
        source: Box::new(first),
    })
}

/// Overwrites `model` with the mean of `replicas`.
fn average_into(model: &mut dyn Model, replicas: &[Box<dyn Model>]) -> Result<()> {
    if replicas.is_empty() {
        return Ok(());
    }

    let mut mean = vec![0f32; model.param_count()];
    for replica in replicas {
        mean.iter_mut()
            .zip(replica.params())
            .for_each(|(m, p)| *m += p);
    }

    let n = replicas.len() as f32;
    mean.iter_mut().for_each(|m| *m /= n);

    model
        .set_params(&mean)
        .map_err(BenchErr::at(Stage::Training))
}
