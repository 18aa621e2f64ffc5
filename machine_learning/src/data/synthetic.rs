use harness::{Batch, BatchSource, BenchErr, DataShape};
use ndarray::{ArrayD, IxDyn};
use ndarray_rand::RandomExt;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::Uniform;

/// Yields a fixed amount of random batches with one-hot labels.
///
/// Resetting reseeds the generator, so every pass yields the same batches.
#[derive(Debug)]
pub struct SyntheticSource {
    shape: DataShape,
    batches: usize,
    seed: u64,
    rng: StdRng,
    dist: Uniform<f32>,
    yielded: usize,
}

impl SyntheticSource {
    /// Creates a new `SyntheticSource`.
    ///
    /// # Arguments
    /// * `shape` - The shape of every batch.
    /// * `batches` - How many batches a pass yields.
    /// * `seed` - The generator's seed.
    ///
    /// # Returns
    /// A new `SyntheticSource` or an error if `shape` has no labels.
    pub fn new(shape: DataShape, batches: usize, seed: u64) -> harness::Result<Self> {
        if shape.labels == 0 {
            return Err(BenchErr::InvalidConfig(
                "synthetic datasets need at least one label".into(),
            ));
        }

        let dist = Uniform::new(0., 1.).map_err(|e| BenchErr::InvalidConfig(e.to_string()))?;

        Ok(Self {
            shape,
            batches,
            seed,
            rng: StdRng::seed_from_u64(seed),
            dist,
            yielded: 0,
        })
    }
}

impl BatchSource for SyntheticSource {
    fn has_next(&mut self) -> bool {
        self.yielded < self.batches
    }

    fn next_batch(&mut self) -> harness::Result<Batch> {
        if !self.has_next() {
            return Err(BenchErr::SourceExhausted);
        }

        let DataShape {
            batch_size,
            ref example,
            labels,
        } = self.shape;

        let dims: Vec<_> = std::iter::once(batch_size)
            .chain(example.iter().copied())
            .collect();
        let features = ArrayD::random_using(IxDyn(&dims), &self.dist, &mut self.rng);

        let mut targets = ArrayD::zeros(IxDyn(&[batch_size, labels]));
        for row in 0..batch_size {
            let class = self.rng.random_range(0..labels);
            targets[[row, class]] = 1.;
        }

        self.yielded += 1;
        Ok(Batch::new(features, targets))
    }

    fn reset(&mut self) -> harness::Result<()> {
        self.rng = StdRng::seed_from_u64(self.seed);
        self.yielded = 0;
        Ok(())
    }
}
