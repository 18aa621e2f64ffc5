use std::{
    fmt::{self, Display},
    time::Duration,
};

use crate::{metrics::MetricAccumulator, probe::DeviceInventory};

const NOT_AVAILABLE: &str = "n/a";

/// The outcome of benchmarking one model against one dataset.
///
/// Built by the runner once both passes succeeded, never modified afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkReport {
    pub name: String,
    pub description: String,
    pub os: String,
    pub devices: Vec<String>,
    pub backend: String,
    pub cpu_cores: usize,
    pub blas_vendor: String,
    pub model_summary: String,
    pub total_params: usize,
    pub total_layers: usize,
    pub iterations: u64,
    pub training_time: Duration,
    pub avg_feedforward_ms: Option<f64>,
    pub avg_backprop_ms: Option<f64>,
    pub avg_iteration_ms: Option<f64>,
    pub avg_samples_per_sec: Option<f64>,
    pub avg_batches_per_sec: Option<f64>,
}

/// What the training pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrainingStats {
    pub steps: u64,
    pub time: Duration,
}

/// The model facts that go into a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelStats {
    pub summary: String,
    pub params: usize,
    pub layers: usize,
}

impl BenchmarkReport {
    /// Assembles a report from what a run collected.
    ///
    /// # Arguments
    /// * `name` - The model's name.
    /// * `description` - The dataset the model was run against.
    /// * `inventory` - The probed device facts.
    /// * `model` - The model's statistics.
    /// * `metrics` - The accumulator both passes wrote into.
    /// * `training` - The step count and wall-clock duration of the training pass.
    ///
    /// # Returns
    /// A new `BenchmarkReport` instance.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        inventory: &DeviceInventory,
        model: ModelStats,
        metrics: &MetricAccumulator,
        training: TrainingStats,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            os: inventory.os.clone(),
            devices: inventory.devices.iter().map(|d| d.label()).collect(),
            backend: inventory.backend.clone(),
            cpu_cores: inventory.cpu_cores,
            blas_vendor: inventory.blas_vendor.clone(),
            model_summary: model.summary,
            total_params: model.params,
            total_layers: model.layers,
            iterations: training.steps,
            training_time: training.time,
            avg_feedforward_ms: metrics.avg_feedforward_ms(),
            avg_backprop_ms: metrics.avg_backprop_ms(),
            avg_iteration_ms: metrics.avg_iteration_ms(),
            avg_samples_per_sec: metrics.avg_samples_per_sec(),
            avg_batches_per_sec: metrics.avg_batches_per_sec(),
        }
    }

    /// The label and value of every rendered row, in display order.
    pub fn rows(&self) -> Vec<(&'static str, String)> {
        let training_ms = self.training_time.as_secs_f64() * 1000.0;

        vec![
            ("Name", self.name.clone()),
            ("Description", self.description.clone()),
            ("Operating System", self.os.clone()),
            (
                "Devices",
                self.devices
                    .first()
                    .cloned()
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            ),
            ("CPU Cores", self.cpu_cores.to_string()),
            ("Backend", self.backend.clone()),
            ("BLAS Vendor", self.blas_vendor.clone()),
            ("Total Params", self.total_params.to_string()),
            ("Total Layers", self.total_layers.to_string()),
            ("Iterations", self.iterations.to_string()),
            ("Training Time (ms)", decimal(Some(training_ms))),
            ("Avg Feedforward (ms)", decimal(self.avg_feedforward_ms)),
            ("Avg Backprop (ms)", decimal(self.avg_backprop_ms)),
            ("Avg Iteration (ms)", decimal(self.avg_iteration_ms)),
            ("Avg Samples/sec", decimal(self.avg_samples_per_sec)),
            ("Avg Batches/sec", decimal(self.avg_batches_per_sec)),
        ]
    }

    /// Renders the report as a fixed-width, two column table.
    ///
    /// Labels are right-aligned in 28 columns and values in 45, one row per line.
    pub fn render(&self) -> String {
        self.rows()
            .into_iter()
            .map(|(label, value)| format!("{label:>28} {value:>45}\n"))
            .collect()
    }
}

impl Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn decimal(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v:.2}"),
        _ => NOT_AVAILABLE.to_string(),
    }
}
