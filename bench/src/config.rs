use std::{
    fs, io,
    path::{Path, PathBuf},
};

use harness::{
    BenchErr, DataShape, DatasetKind, DatasetLoader, ModelSelection, ModelType, RunnerConfig,
};
use log::{info, warn};
use machine_learning::{MiniBatchLoader, SyntheticLoader, data::default_shape};
use serde::Deserialize;

const DEFAULT_BATCHES: usize = 50;
const DEFAULT_BATCH_SIZE: usize = 128;
const DEFAULT_SEED: u64 = 12345;
const DEFAULT_PREFIX: &str = "batch";

/// Everything a `bench` run is configured with.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    pub model: ModelSelection,
    pub dataset: DatasetConfig,
    pub runner: RunnerConfig,
    /// Worker slots the CPU backend reports.
    pub host_devices: usize,
    pub seed: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            model: ModelSelection::Single(ModelType::SimpleMlp),
            dataset: DatasetConfig::default(),
            runner: RunnerConfig::default(),
            host_devices: 1,
            seed: DEFAULT_SEED,
        }
    }
}

impl BenchConfig {
    /// Reads the configuration at `path`.
    ///
    /// Without a path, or when the file doesn't exist, the defaults are used.
    ///
    /// # Errors
    /// `BenchErr::InvalidConfig` if the file isn't a valid configuration, `BenchErr::Io` if it
    /// can't be read.
    pub fn load(path: Option<&Path>) -> harness::Result<Self> {
        let Some(path) = path else {
            info!("no config file given, using defaults");
            return Ok(Self::default());
        };

        match fs::read_to_string(path) {
            Ok(json) => {
                info!("loading config from {}", path.display());
                Self::from_json(&json)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json(json: &str) -> harness::Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| BenchErr::InvalidConfig(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> harness::Result<()> {
        self.runner.validate()?;

        if self.host_devices == 0 {
            return Err(BenchErr::InvalidConfig(
                "host_devices must be positive".into(),
            ));
        }

        self.dataset.validate()
    }
}

/// Where the benchmarked batches come from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DatasetConfig {
    /// Random batches shaped like `kind`.
    Synthetic {
        kind: DatasetKind,
        #[serde(default = "default_batches")]
        batches: usize,
        #[serde(default = "default_batch_size")]
        batch_size: usize,
        #[serde(default)]
        seed: u64,
    },
    /// A directory of `<prefix>-<index>.safetensors` batches.
    Minibatches {
        kind: DatasetKind,
        path: PathBuf,
        #[serde(default = "default_prefix")]
        prefix: String,
        #[serde(default = "default_batch_size")]
        batch_size: usize,
        /// Overrides the example dimensions usually seen for `kind`.
        #[serde(default)]
        example: Option<Vec<usize>>,
        #[serde(default)]
        labels: Option<usize>,
    },
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self::Synthetic {
            kind: DatasetKind::Mnist,
            batches: DEFAULT_BATCHES,
            batch_size: DEFAULT_BATCH_SIZE,
            seed: 0,
        }
    }
}

impl DatasetConfig {
    pub fn kind(&self) -> DatasetKind {
        match self {
            Self::Synthetic { kind, .. } | Self::Minibatches { kind, .. } => *kind,
        }
    }

    /// The batch shape the configured dataset yields.
    pub fn shape(&self) -> DataShape {
        match self {
            Self::Synthetic {
                kind, batch_size, ..
            } => default_shape(*kind, *batch_size),
            Self::Minibatches {
                kind,
                batch_size,
                example,
                labels,
                ..
            } => {
                let mut shape = default_shape(*kind, *batch_size);
                if let Some(example) = example {
                    shape.example = example.clone();
                }
                if let Some(labels) = labels {
                    shape.labels = *labels;
                }
                shape
            }
        }
    }

    /// Builds the loader for the configured dataset. Nothing is read yet.
    pub fn loader(&self) -> harness::Result<Box<dyn DatasetLoader>> {
        self.validate()?;
        let shape = self.shape();

        Ok(match self {
            Self::Synthetic {
                kind,
                batches,
                seed,
                ..
            } => Box::new(SyntheticLoader::new(*kind, shape, *batches, *seed)),
            Self::Minibatches {
                kind, path, prefix, ..
            } => Box::new(MiniBatchLoader::new(*kind, shape, path, prefix.as_str())),
        })
    }

    fn validate(&self) -> harness::Result<()> {
        let shape = self.shape();
        if shape.batch_size == 0 {
            return Err(BenchErr::InvalidConfig("batch_size must be positive".into()));
        }
        if shape.labels == 0 || shape.example.contains(&0) {
            return Err(BenchErr::InvalidConfig(format!(
                "invalid example shape {:?} with {} labels",
                shape.example, shape.labels
            )));
        }

        match self {
            Self::Synthetic { batches: 0, .. } => Err(BenchErr::InvalidConfig(
                "a synthetic dataset needs at least one batch".into(),
            )),
            Self::Minibatches { prefix, .. } if prefix.is_empty() => Err(
                BenchErr::InvalidConfig("the mini-batch prefix can't be empty".into()),
            ),
            _ => Ok(()),
        }
    }
}

fn default_batches() -> usize {
    DEFAULT_BATCHES
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}
