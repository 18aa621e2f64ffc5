use log::info;

use crate::{
    Result,
    data::{BatchSource, PrefetchSource},
    registry::{DatasetLoader, ModelRegistry, ModelSelection, ModelShape},
    report::BenchmarkReport,
    runner::BenchmarkRunner,
};

/// Benchmarks every selected model against one dataset.
pub struct BenchmarkSuite {
    registry: ModelRegistry,
    runner: BenchmarkRunner,
    seed: u64,
}

impl BenchmarkSuite {
    /// Creates a new `BenchmarkSuite`.
    ///
    /// # Arguments
    /// * `registry` - The factories of every model that can be benchmarked.
    /// * `runner` - The runner each model goes through.
    /// * `seed` - The seed handed to model factories.
    ///
    /// # Returns
    /// A new `BenchmarkSuite` instance.
    pub fn new(registry: ModelRegistry, runner: BenchmarkRunner, seed: u64) -> Self {
        Self {
            registry,
            runner,
            seed,
        }
    }

    pub fn runner(&self) -> &BenchmarkRunner {
        &self.runner
    }

    /// Runs every model `selection` resolves to against the dataset behind `loader`.
    ///
    /// The pairing and the selection are checked before the dataset is loaded. The dataset
    /// is loaded once and reset between models.
    ///
    /// # Returns
    /// One report per model, in registry order, or the first failure.
    pub fn run(
        &self,
        selection: ModelSelection,
        loader: &mut dyn DatasetLoader,
    ) -> Result<Vec<BenchmarkReport>> {
        loader.kind().check_pairing(selection)?;
        let models = self.registry.select(selection)?;

        let shape = loader.shape();
        let description = loader.description();
        info!("benchmarking {} model(s) on {description}", models.len());

        let mut source = self.open(loader)?;
        let model_shape = ModelShape {
            example: shape.example,
            labels: shape.labels,
            seed: self.seed,
        };

        models
            .into_iter()
            .map(|ty| {
                let mut model = self.registry.build(ty, &model_shape)?;
                info!("{ty} summary:\n{}", model.summary());

                self.runner
                    .run(ty.name(), model.as_mut(), source.as_mut(), &description)
            })
            .collect()
    }

    /// Loads the dataset, prefetching in the background when a single worker consumes it.
    fn open(&self, loader: &mut dyn DatasetLoader) -> Result<Box<dyn BatchSource>> {
        let source = loader.load()?;
        let depth = self.runner.config().prefetch_buffer;

        if self.runner.workers() > 1 || depth == 0 {
            return Ok(source);
        }

        Ok(Box::new(PrefetchSource::new(source, depth)?))
    }
}
