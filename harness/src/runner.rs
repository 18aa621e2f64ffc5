use std::{sync::Arc, time::Duration};

use log::{info, warn};

use crate::{
    BenchErr, Result,
    config::RunnerConfig,
    data::BatchSource,
    error::Stage,
    metrics::MetricAccumulator,
    model::Model,
    parallel::{Coordinator, CoordinatorSettings, Feed},
    probe::{Backend, DeviceInventory},
    report::{BenchmarkReport, ModelStats, TrainingStats},
    timer::{Clock, IterationListener, IterationTimer, ScoreListener, SystemClock},
};

const PROGRESS_EVERY: u64 = 100;

/// Benchmarks one model at a time: a training pass, then a timed forward/backward pass.
///
/// The device inventory is probed once, when the runner is built.
pub struct BenchmarkRunner {
    config: RunnerConfig,
    inventory: DeviceInventory,
    workers: usize,
    clock: Arc<dyn Clock>,
}

impl BenchmarkRunner {
    /// Creates a new `BenchmarkRunner`, probing `backend` for the device inventory.
    ///
    /// # Errors
    /// `BenchErr::InvalidConfig` if `config` doesn't validate.
    pub fn new(config: RunnerConfig, backend: &dyn Backend) -> Result<Self> {
        config.validate()?;
        Self::with_inventory(config, DeviceInventory::probe(backend))
    }

    /// Creates a new `BenchmarkRunner` over an already probed inventory.
    pub fn with_inventory(config: RunnerConfig, inventory: DeviceInventory) -> Result<Self> {
        config.validate()?;
        let workers = config
            .device_request()?
            .resolve(inventory.device_count());

        Ok(Self {
            config,
            inventory,
            workers,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replaces the clock every measurement is taken with.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn inventory(&self) -> &DeviceInventory {
        &self.inventory
    }

    /// The amount of workers a training pass uses, after clamping to the inventory.
    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Benchmarks `model` against `source`.
    ///
    /// # Arguments
    /// * `name` - The model's name.
    /// * `model` - The model under test, left trained.
    /// * `source` - The batches, reset before each pass.
    /// * `description` - The dataset description shown in the report.
    ///
    /// # Returns
    /// The completed report. A failure in any pass yields no report.
    pub fn run(
        &self,
        name: &str,
        model: &mut dyn Model,
        source: &mut dyn BatchSource,
        description: &str,
    ) -> Result<BenchmarkReport> {
        let metrics = Arc::new(MetricAccumulator::new());

        info!("===== {name} training pass on {description} =====");
        let started = self.clock.now();
        let steps = if self.workers > 1 {
            let settings = CoordinatorSettings::from_config(&self.config, self.workers)?;
            Coordinator::new(settings, Arc::clone(&metrics))
                .with_clock(Arc::clone(&self.clock))
                .train(&mut *model, Feed::Shared(&mut *source))?
                .processed
        } else {
            self.train(model, source, &metrics)?
        };

        let training = TrainingStats {
            steps,
            time: self.clock.now().saturating_duration_since(started),
        };
        info!(
            steps = training.steps;
            "training pass took {:.2} ms",
            millis(training.time)
        );

        info!("===== {name} timed forward/backward pass =====");
        let timed = self.timed_pass(model, source, &metrics)?;
        info!(iterations = timed; "timed pass finished");

        if metrics.iteration_count() == 0 {
            warn!("no iteration samples were recorded for {name}, rates are unavailable");
        }

        let stats = ModelStats {
            summary: model.summary(),
            params: model.param_count(),
            layers: model.layer_count(),
        };

        Ok(BenchmarkReport::new(
            name,
            description,
            &self.inventory,
            stats,
            &metrics,
            training,
        ))
    }

    /// Trains `model` once over `source` on this thread.
    ///
    /// # Returns
    /// The amount of steps taken.
    fn train(
        &self,
        model: &mut dyn Model,
        source: &mut dyn BatchSource,
        metrics: &Arc<MetricAccumulator>,
    ) -> Result<u64> {
        let mut timer = IterationTimer::with_clock(
            self.config.sampling()?,
            Arc::clone(metrics),
            Arc::clone(&self.clock),
        );
        let mut score = ScoreListener::new(self.config.scoring()?);

        source.reset()?;
        timer.start();

        let mut steps = 0;
        while self.within_cap(steps) && source.has_next() {
            let batch = source.next_batch()?;
            let loss = model
                .train_step(&batch)
                .map_err(BenchErr::at(Stage::Training))?;

            steps += 1;
            let listeners: [&mut dyn IterationListener; 2] = [&mut timer, &mut score];
            for listener in listeners {
                listener.iteration_done(&*model, steps, loss);
            }
        }

        Ok(steps)
    }

    /// Times the forward and backward computations separately over `source`.
    ///
    /// # Returns
    /// The amount of timed iterations.
    fn timed_pass(
        &self,
        model: &mut dyn Model,
        source: &mut dyn BatchSource,
        metrics: &MetricAccumulator,
    ) -> Result<u64> {
        source.reset()?;

        let mut iterations = 0;
        while self.within_cap(iterations) && source.has_next() {
            let batch = source.next_batch()?;
            let start = self.clock.now();
            model
                .forward(batch.features.view())
                .map_err(BenchErr::at(Stage::TimedPass))?;
            let feedforward = self.clock.now().saturating_duration_since(start);

            let start = self.clock.now();
            model
                .backward(batch.features.view(), batch.labels.view())
                .map_err(BenchErr::at(Stage::TimedPass))?;
            let backprop = self.clock.now().saturating_duration_since(start);

            metrics.record_forward_backward(millis(feedforward), millis(backprop));
            iterations += 1;

            if iterations % PROGRESS_EVERY == 0 {
                info!("{iterations} timed iterations done");
            }
        }

        Ok(iterations)
    }

    fn within_cap(&self, steps: u64) -> bool {
        self.config.max_iterations.is_none_or(|max| steps < max)
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
