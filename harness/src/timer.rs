use std::{
    num::NonZeroU64,
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, info};
use ndarray::ArrayViewD;
use parking_lot::Mutex;

use crate::{metrics::MetricAccumulator, model::Model};

/// A source of wall-clock instants.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The monotonic system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

/// An observer of completed training steps.
pub trait IterationListener: Send {
    /// Called once after every training step.
    ///
    /// # Arguments
    /// * `model` - The model that just stepped.
    /// * `iteration` - The 1-based index of the step within the pass.
    /// * `score` - The score the step reported.
    fn iteration_done(&mut self, model: &dyn Model, iteration: u64, score: f32);
}

/// How often the timer samples and how many steps it skips first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPolicy {
    sample_frequency: NonZeroU64,
    warmup_iterations: u64,
}

impl SamplingPolicy {
    /// Creates a new `SamplingPolicy`.
    ///
    /// # Arguments
    /// * `sample_frequency` - Sample every this many steps.
    /// * `warmup_iterations` - Steps to skip before sampling, three times the frequency if `None`.
    ///
    /// # Returns
    /// A new `SamplingPolicy` instance.
    pub fn new(sample_frequency: NonZeroU64, warmup_iterations: Option<u64>) -> Self {
        let default_warmup = sample_frequency.get().saturating_mul(3);

        Self {
            sample_frequency,
            warmup_iterations: warmup_iterations.unwrap_or(default_warmup),
        }
    }

    #[inline]
    pub fn sample_frequency(&self) -> u64 {
        self.sample_frequency.get()
    }

    #[inline]
    pub fn warmup_iterations(&self) -> u64 {
        self.warmup_iterations
    }
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self::new(NonZeroU64::MIN, None)
    }
}

/// One measurement taken at a sampled step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationSample {
    pub elapsed: Duration,
    pub samples_per_sec: f64,
    pub batches_per_sec: f64,
}

/// Measures step durations and throughput, skipping the warm-up window.
///
/// Each worker owns its own timer. Only the accumulator it writes into is shared.
pub struct IterationTimer {
    policy: SamplingPolicy,
    clock: Arc<dyn Clock>,
    accumulator: Arc<MetricAccumulator>,
    steps: u64,
    last: Option<Instant>,
}

impl IterationTimer {
    /// Creates a new `IterationTimer` on the system clock.
    pub fn new(policy: SamplingPolicy, accumulator: Arc<MetricAccumulator>) -> Self {
        Self::with_clock(policy, accumulator, Arc::new(SystemClock))
    }

    pub fn with_clock(
        policy: SamplingPolicy,
        accumulator: Arc<MetricAccumulator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            policy,
            clock,
            accumulator,
            steps: 0,
            last: None,
        }
    }

    /// Sets the reference instant the first step is measured from.
    pub fn start(&mut self) {
        self.last = Some(self.clock.now());
    }

    #[inline]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Handles one completed step.
    ///
    /// # Arguments
    /// * `input` - The input the model consumed in this step.
    ///
    /// # Returns
    /// The sample pushed into the accumulator, if this step was sampled.
    pub fn observe(&mut self, input: Option<ArrayViewD<'_, f32>>) -> Option<IterationSample> {
        let now = self.clock.now();
        self.steps += 1;
        let last = self.last.replace(now);

        let warmup = self.policy.warmup_iterations();
        if self.steps <= warmup || (self.steps - warmup) % self.policy.sample_frequency() != 0 {
            return None;
        }

        let elapsed = now.saturating_duration_since(last?);
        let Some(batch_size) = input.as_ref().and_then(batch_size) else {
            debug!(step = self.steps; "no model input available, skipping sample");
            return None;
        };

        let secs = elapsed.as_secs_f64();
        let samples_per_sec = batch_size as f64 / secs;
        let batches_per_sec = 1.0 / secs;

        if !samples_per_sec.is_finite() || !batches_per_sec.is_finite() {
            debug!(step = self.steps; "discarding sample with a non-finite rate");
            return None;
        }

        let sample = IterationSample {
            elapsed,
            samples_per_sec,
            batches_per_sec,
        };
        let elapsed_ms = secs * 1000.0;

        self.accumulator.record_iteration(elapsed_ms);
        self.accumulator.record_samples_rate(samples_per_sec);
        self.accumulator.record_batches_rate(batches_per_sec);
        debug!(
            step = self.steps,
            elapsed_ms = elapsed_ms,
            samples_per_sec = samples_per_sec;
            "iteration sampled"
        );

        Some(sample)
    }
}

impl IterationListener for IterationTimer {
    fn iteration_done(&mut self, model: &dyn Model, _iteration: u64, _score: f32) {
        self.observe(model.current_input());
    }
}

/// The amount of examples in `input`: its element count over the size of one example.
fn batch_size(input: &ArrayViewD<'_, f32>) -> Option<usize> {
    let shape = input.shape();
    if shape.is_empty() {
        return None;
    }

    let per_example: usize = shape[1..].iter().product();
    (per_example > 0).then(|| input.len() / per_example)
}

/// Logs the score every `frequency` iterations.
pub struct ScoreListener {
    frequency: NonZeroU64,
    last_score: Option<f32>,
}

impl ScoreListener {
    pub fn new(frequency: NonZeroU64) -> Self {
        Self {
            frequency,
            last_score: None,
        }
    }

    /// The score of the last logged iteration.
    pub fn last_score(&self) -> Option<f32> {
        self.last_score
    }
}

impl IterationListener for ScoreListener {
    fn iteration_done(&mut self, _model: &dyn Model, iteration: u64, score: f32) {
        if iteration % self.frequency.get() == 0 {
            self.last_score = Some(score);
            info!(iteration = iteration, score = score; "score at iteration {iteration} is {score}");
        }
    }
}
