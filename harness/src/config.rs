use std::num::NonZeroU64;

use log::warn;
use serde::Deserialize;

use crate::{BenchErr, Result, timer::SamplingPolicy};

/// What the coordinator does once worker queues run dry at different times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InequalityHandling {
    /// Halt every worker once any worker's queue is drained, discarding what's left.
    #[default]
    StopEveryone,
    /// Let drained workers idle through rounds until every queue is drained.
    Pass,
}

/// How many devices a run should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRequest {
    Single,
    All,
    Count(usize),
}

impl DeviceRequest {
    /// Interprets a device-count hint: -1 is every device, 0 or 1 a single one.
    ///
    /// # Errors
    /// `BenchErr::InvalidConfig` for anything below -1.
    pub fn from_hint(hint: i64) -> Result<Self> {
        match hint {
            -1 => Ok(Self::All),
            0 | 1 => Ok(Self::Single),
            n if n > 1 => Ok(Self::Count(n as usize)),
            n => Err(BenchErr::InvalidConfig(format!(
                "device count must be -1, 0 or positive, got {n}"
            ))),
        }
    }

    /// The amount of workers to use given `available` devices.
    ///
    /// Requests beyond what's available are clamped with a warning.
    pub fn resolve(self, available: usize) -> usize {
        let available = available.max(1);

        match self {
            Self::Single => 1,
            Self::All => available,
            Self::Count(n) if n > available => {
                warn!("requested {n} devices but only {available} are available, using {available}");
                available
            }
            Self::Count(n) => n,
        }
    }
}

/// The benchmark runner's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    pub sample_frequency: u64,
    /// Defaults to three times `sample_frequency`.
    pub warmup_iterations: Option<u64>,
    pub max_iterations: Option<u64>,
    pub devices: i64,
    pub averaging_frequency: u64,
    /// Per-worker queue depth, 0 disables prefetching on a single device.
    pub prefetch_buffer: usize,
    pub inequality_handling: InequalityHandling,
    pub score_frequency: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            sample_frequency: 1,
            warmup_iterations: None,
            max_iterations: None,
            devices: 1,
            averaging_frequency: 10,
            prefetch_buffer: 4,
            inequality_handling: InequalityHandling::StopEveryone,
            score_frequency: 10,
        }
    }
}

impl RunnerConfig {
    /// Checks every field, reporting the first invalid one.
    pub fn validate(&self) -> Result<()> {
        non_zero("sample_frequency", self.sample_frequency)?;
        non_zero("averaging_frequency", self.averaging_frequency)?;
        non_zero("score_frequency", self.score_frequency)?;

        if self.max_iterations == Some(0) {
            return Err(BenchErr::InvalidConfig(
                "max_iterations must be positive when set".into(),
            ));
        }

        DeviceRequest::from_hint(self.devices)?;
        Ok(())
    }

    pub fn sampling(&self) -> Result<SamplingPolicy> {
        let frequency = non_zero("sample_frequency", self.sample_frequency)?;
        Ok(SamplingPolicy::new(frequency, self.warmup_iterations))
    }

    pub fn device_request(&self) -> Result<DeviceRequest> {
        DeviceRequest::from_hint(self.devices)
    }

    pub fn averaging(&self) -> Result<NonZeroU64> {
        non_zero("averaging_frequency", self.averaging_frequency)
    }

    pub fn scoring(&self) -> Result<NonZeroU64> {
        non_zero("score_frequency", self.score_frequency)
    }
}

fn non_zero(field: &str, value: u64) -> Result<NonZeroU64> {
    NonZeroU64::new(value).ok_or_else(|| BenchErr::InvalidConfig(format!("{field} must be positive")))
}
