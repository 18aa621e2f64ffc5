use std::path::PathBuf;

use harness::{BatchSource, DataShape, DatasetKind, DatasetLoader};

use super::{MiniBatchDirSource, SyntheticSource};

/// The batch shape usually seen for `kind`.
pub fn default_shape(kind: DatasetKind, batch_size: usize) -> DataShape {
    let (example, labels) = match kind {
        DatasetKind::Mnist => (vec![1, 28, 28], 10),
        DatasetKind::Cifar10 => (vec![3, 32, 32], 10),
        DatasetKind::TinyImageNet => (vec![3, 64, 64], 200),
        DatasetKind::Custom => (vec![3, 224, 224], 10),
        // One word2vec embedding per example.
        DatasetKind::ImdbSentiment => (vec![300], 2),
    };

    DataShape {
        batch_size,
        example,
        labels,
    }
}

/// Loads randomly generated batches shaped like a real dataset.
#[derive(Debug, Clone)]
pub struct SyntheticLoader {
    kind: DatasetKind,
    shape: DataShape,
    batches: usize,
    seed: u64,
}

impl SyntheticLoader {
    /// Creates a new `SyntheticLoader`.
    ///
    /// # Arguments
    /// * `kind` - The dataset the batches imitate.
    /// * `shape` - The shape of every batch.
    /// * `batches` - How many batches a pass yields.
    /// * `seed` - The generator's seed.
    ///
    /// # Returns
    /// A new `SyntheticLoader` instance.
    pub fn new(kind: DatasetKind, shape: DataShape, batches: usize, seed: u64) -> Self {
        Self {
            kind,
            shape,
            batches,
            seed,
        }
    }
}

impl DatasetLoader for SyntheticLoader {
    fn kind(&self) -> DatasetKind {
        self.kind
    }

    fn shape(&self) -> DataShape {
        self.shape.clone()
    }

    fn load(&mut self) -> harness::Result<Box<dyn BatchSource>> {
        let source = SyntheticSource::new(self.shape.clone(), self.batches, self.seed)?;
        Ok(Box::new(source))
    }
}

/// Loads a directory of pre-serialized mini-batches.
#[derive(Debug, Clone)]
pub struct MiniBatchLoader {
    kind: DatasetKind,
    shape: DataShape,
    dir: PathBuf,
    prefix: String,
}

impl MiniBatchLoader {
    /// Creates a new `MiniBatchLoader`. Nothing is read until `load` is called.
    ///
    /// # Arguments
    /// * `kind` - The dataset stored in `dir`.
    /// * `shape` - The shape of the stored batches.
    /// * `dir` - The directory holding the batches.
    /// * `prefix` - The file name prefix of the batches.
    ///
    /// # Returns
    /// A new `MiniBatchLoader` instance.
    pub fn new(
        kind: DatasetKind,
        shape: DataShape,
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            shape,
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }
}

impl DatasetLoader for MiniBatchLoader {
    fn kind(&self) -> DatasetKind {
        self.kind
    }

    fn shape(&self) -> DataShape {
        self.shape.clone()
    }

    fn load(&mut self) -> harness::Result<Box<dyn BatchSource>> {
        let source = MiniBatchDirSource::open(&self.dir, &self.prefix)?;
        Ok(Box::new(source))
    }
}
