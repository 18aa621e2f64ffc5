use std::sync::atomic::{AtomicU64, Ordering};

/// A lock-free `f64` accumulator stored as raw bits.
#[derive(Debug, Default)]
struct AtomicSum(AtomicU64);

impl AtomicSum {
    fn add(&self, value: f64) {
        // The closure always returns `Some`, so the update can't fail.
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some((f64::from_bits(bits) + value).to_bits())
            });
    }

    fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }
}

/// Running sums and counts for one benchmark, shared between every timer writing into it.
///
/// Every write goes through atomics so concurrent workers can record samples through a shared
/// reference. Averages are derived on read. Reading an average before anything was recorded
/// yields `None`, which reports render as `n/a`.
#[derive(Debug, Default)]
pub struct MetricAccumulator {
    iterations: AtomicU64,
    total_iteration_ms: AtomicSum,
    total_samples_per_sec: AtomicSum,
    total_batches_per_sec: AtomicSum,

    timed_iterations: AtomicU64,
    total_feedforward_ms: AtomicSum,
    total_backprop_ms: AtomicSum,
}

impl MetricAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one sampled iteration's duration and bumps the iteration count.
    pub fn record_iteration(&self, elapsed_ms: f64) {
        self.total_iteration_ms.add(elapsed_ms);
        self.iterations.fetch_add(1, Ordering::AcqRel);
    }

    pub fn record_samples_rate(&self, rate: f64) {
        self.total_samples_per_sec.add(rate);
    }

    pub fn record_batches_rate(&self, rate: f64) {
        self.total_batches_per_sec.add(rate);
    }

    /// Raises the iteration count to `n`. The count never goes down.
    pub fn set_iteration_count(&self, n: u64) {
        self.iterations.fetch_max(n, Ordering::AcqRel);
    }

    /// Records the forward and backward latency of one timed iteration.
    pub fn record_forward_backward(&self, feedforward_ms: f64, backprop_ms: f64) {
        self.total_feedforward_ms.add(feedforward_ms);
        self.total_backprop_ms.add(backprop_ms);
        self.timed_iterations.fetch_add(1, Ordering::AcqRel);
    }

    #[inline]
    pub fn iteration_count(&self) -> u64 {
        self.iterations.load(Ordering::Acquire)
    }

    #[inline]
    pub fn timed_iteration_count(&self) -> u64 {
        self.timed_iterations.load(Ordering::Acquire)
    }

    pub fn avg_iteration_ms(&self) -> Option<f64> {
        average(self.total_iteration_ms.get(), self.iteration_count())
    }

    /// The arithmetic mean of the recorded per-sample rates.
    pub fn avg_samples_per_sec(&self) -> Option<f64> {
        average(self.total_samples_per_sec.get(), self.iteration_count())
    }

    pub fn avg_batches_per_sec(&self) -> Option<f64> {
        average(self.total_batches_per_sec.get(), self.iteration_count())
    }

    pub fn avg_feedforward_ms(&self) -> Option<f64> {
        average(self.total_feedforward_ms.get(), self.timed_iteration_count())
    }

    pub fn avg_backprop_ms(&self) -> Option<f64> {
        average(self.total_backprop_ms.get(), self.timed_iteration_count())
    }
}

fn average(total: f64, count: u64) -> Option<f64> {
    (count > 0).then(|| total / count as f64)
}
