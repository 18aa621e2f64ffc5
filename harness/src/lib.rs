pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod model;
pub mod parallel;
pub mod probe;
pub mod registry;
pub mod report;
pub mod runner;
pub mod suite;
pub mod timer;

pub use config::{DeviceRequest, InequalityHandling, RunnerConfig};
pub use data::{BatchSource, PrefetchSource, VecSource};
pub use error::{BenchErr, ModelErr, ModelResult, Result, Stage, TelemetryErr};
pub use metrics::MetricAccumulator;
pub use model::{Batch, Model};
pub use probe::{Backend, DeviceDescriptor, DeviceInventory, HostInfo};
pub use registry::{
    DataShape, DatasetKind, DatasetLoader, ModelFamily, ModelRegistry, ModelSelection, ModelShape,
    ModelType,
};
pub use report::BenchmarkReport;
pub use runner::BenchmarkRunner;
pub use suite::BenchmarkSuite;
pub use timer::{Clock, IterationListener, IterationTimer, ManualClock, SamplingPolicy, SystemClock};
