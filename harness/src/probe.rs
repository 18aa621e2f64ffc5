use log::warn;
use sysinfo::{CpuExt, System, SystemExt};

use crate::error::TelemetryErr;

const UNKNOWN: &str = "unknown";

/// One device a model can run on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub index: usize,
    pub name: String,
    pub compute_capability: Option<String>,
    pub memory_bytes: Option<u64>,
}

impl DeviceDescriptor {
    /// Creates a new `DeviceDescriptor` with no extra metadata.
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            compute_capability: None,
            memory_bytes: None,
        }
    }

    /// The name followed by whatever metadata the backend reported.
    pub fn label(&self) -> String {
        let mut label = self.name.clone();
        if let Some(cc) = &self.compute_capability {
            label.push(' ');
            label.push_str(cc);
        }
        if let Some(mem) = self.memory_bytes {
            label.push(' ');
            label.push_str(&mem.to_string());
        }
        label
    }
}

/// Hardware facts an execution backend can be asked for.
pub trait Backend: Send + Sync {
    fn backend_name(&self) -> Result<String, TelemetryErr>;

    fn cpu_core_count(&self) -> Result<usize, TelemetryErr>;

    fn blas_vendor(&self) -> Result<String, TelemetryErr>;

    fn device_list(&self) -> Result<Vec<DeviceDescriptor>, TelemetryErr>;
}

/// What the operating system says about the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub processor: String,
    pub cores: usize,
    pub os: String,
}

impl HostInfo {
    /// Queries the host through `sysinfo`.
    pub fn query() -> Self {
        // Only CPU facts are read, the process table is never needed.
        let mut sys = System::new();
        sys.refresh_cpu();

        let processor = sys
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string());

        let cores = sys
            .physical_core_count()
            .unwrap_or_else(|| sys.cpus().len())
            .max(1);

        let os = sys
            .long_os_version()
            .or_else(|| sys.name())
            .unwrap_or_else(|| UNKNOWN.to_string());

        Self {
            processor,
            cores,
            os,
        }
    }
}

/// The device and backend facts included in every report.
///
/// Collected once when a runner starts and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInventory {
    pub backend: String,
    pub cpu_cores: usize,
    pub blas_vendor: String,
    pub os: String,
    pub devices: Vec<DeviceDescriptor>,
}

impl DeviceInventory {
    /// Asks `backend` first and falls back to the host for whatever it can't answer.
    pub fn probe(backend: &dyn Backend) -> Self {
        Self::probe_with_host(backend, &HostInfo::query())
    }

    /// Builds the inventory from `backend`, filling every failed query from `host`.
    ///
    /// Telemetry failures are logged and never returned.
    pub fn probe_with_host(backend: &dyn Backend, host: &HostInfo) -> Self {
        let backend_name = backend.backend_name().unwrap_or_else(|e| {
            warn!("{e}, reporting the backend as {UNKNOWN}");
            UNKNOWN.to_string()
        });

        let cpu_cores = backend.cpu_core_count().unwrap_or_else(|e| {
            warn!("{e}, reporting {} host cores", host.cores);
            host.cores
        });

        let blas_vendor = backend.blas_vendor().unwrap_or_else(|e| {
            warn!("{e}, reporting the BLAS vendor as {UNKNOWN}");
            UNKNOWN.to_string()
        });

        let devices = match backend.device_list() {
            Ok(devices) if !devices.is_empty() => devices,
            Ok(_) => {
                warn!("the backend reported no devices, falling back to the host processor");
                vec![DeviceDescriptor::new(0, host.processor.clone())]
            }
            Err(e) => {
                warn!("{e}, falling back to the host processor");
                vec![DeviceDescriptor::new(0, host.processor.clone())]
            }
        };

        Self {
            backend: backend_name,
            cpu_cores,
            blas_vendor,
            os: host.os.clone(),
            devices,
        }
    }

    #[inline]
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}
