use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

/// The harness module's result type.
pub type Result<T> = std::result::Result<T, BenchErr>;

/// The result type returned by model providers.
pub type ModelResult<T> = std::result::Result<T, ModelErr>;

/// The phase of a benchmark in which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DeviceSetup,
    Training,
    TimedPass,
}

impl Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::DeviceSetup => "device setup",
            Stage::Training => "training pass",
            Stage::TimedPass => "timed forward/backward pass",
        };

        f.write_str(s)
    }
}

/// Failures raised by a model while training, scoring or computing gradients.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    MissingInput,
    Failure(String),
}

impl Display for ModelErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(f, "size mismatch in {what}: got {got}, expected {expected}"),
            ModelErr::MissingInput => f.write_str("the model has no input set"),
            ModelErr::Failure(msg) => f.write_str(msg),
        }
    }
}

impl Error for ModelErr {}

/// Returned by execution backends when hardware facts can't be queried.
///
/// Never surfaced as a run failure, the probe falls back to the host query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryErr(pub String);

impl Display for TelemetryErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "telemetry unavailable: {}", self.0)
    }
}

impl Error for TelemetryErr {}

/// Benchmark failures.
#[derive(Debug)]
pub enum BenchErr {
    /// Invalid configuration, caught before any data loading.
    InvalidConfig(String),
    UnsupportedPairing {
        selection: String,
        dataset: String,
    },
    NoModelsSelected,
    MissingFactory {
        model: String,
    },
    /// A mandatory dataset location doesn't exist.
    DatasetMissing {
        path: PathBuf,
    },
    DatasetCorrupt {
        path: PathBuf,
        msg: String,
    },
    /// `next_batch` was called on a source with nothing left until reset.
    SourceExhausted,
    LoaderPanicked,
    Stage {
        stage: Stage,
        source: ModelErr,
    },
    /// One aggregated failure for a multi-device run.
    WorkerFailed {
        worker_id: usize,
        failures: usize,
        source: Box<BenchErr>,
    },
    WorkerPanicked {
        worker_id: usize,
    },
    Io(io::Error),
}

impl BenchErr {
    /// Tags a model failure with the stage it happened in.
    pub fn at(stage: Stage) -> impl FnOnce(ModelErr) -> Self {
        move |source| Self::Stage { stage, source }
    }

    /// Returns true for errors raised before any data was loaded.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            BenchErr::InvalidConfig(_)
                | BenchErr::UnsupportedPairing { .. }
                | BenchErr::NoModelsSelected
                | BenchErr::MissingFactory { .. }
        )
    }
}

impl Display for BenchErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BenchErr::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            BenchErr::UnsupportedPairing { selection, dataset } => {
                write!(f, "{dataset} benchmarks are not applicable to {selection} models")
            }
            BenchErr::NoModelsSelected => {
                f.write_str("zero models have been selected for benchmarking")
            }
            BenchErr::MissingFactory { model } => {
                write!(f, "no factory is registered for model {model}")
            }
            BenchErr::DatasetMissing { path } => {
                write!(f, "dataset not found at {}", path.display())
            }
            BenchErr::DatasetCorrupt { path, msg } => {
                write!(f, "corrupt dataset file {}: {msg}", path.display())
            }
            BenchErr::SourceExhausted => f.write_str("the batch source has no batches left"),
            BenchErr::LoaderPanicked => f.write_str("the background batch loader panicked"),
            BenchErr::Stage { stage, source } => write!(f, "{stage} failed: {source}"),
            BenchErr::WorkerFailed {
                worker_id,
                failures,
                source,
            } => write!(
                f,
                "worker {worker_id} failed ({failures} worker(s) failed in total): {source}"
            ),
            BenchErr::WorkerPanicked { worker_id } => write!(f, "worker {worker_id} panicked"),
            BenchErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for BenchErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BenchErr::Stage { source, .. } => Some(source),
            BenchErr::WorkerFailed { source, .. } => Some(source.as_ref()),
            BenchErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for BenchErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
