use std::thread;

use harness::{Backend, DeviceDescriptor, TelemetryErr};

/// The ndarray CPU backend.
///
/// It exposes `devices` host worker slots, all of them backed by the same processor.
#[derive(Debug, Clone, Copy)]
pub struct CpuBackend {
    devices: usize,
}

impl CpuBackend {
    /// Creates a new `CpuBackend` with at least one device.
    pub fn new(devices: usize) -> Self {
        Self {
            devices: devices.max(1),
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Backend for CpuBackend {
    fn backend_name(&self) -> Result<String, TelemetryErr> {
        Ok("CPU".to_string())
    }

    fn cpu_core_count(&self) -> Result<usize, TelemetryErr> {
        thread::available_parallelism()
            .map(|n| n.get())
            .map_err(|e| TelemetryErr(e.to_string()))
    }

    fn blas_vendor(&self) -> Result<String, TelemetryErr> {
        // ndarray's default matrix multiplication backend.
        Ok("matrixmultiply".to_string())
    }

    fn device_list(&self) -> Result<Vec<DeviceDescriptor>, TelemetryErr> {
        Ok((0..self.devices)
            .map(|i| DeviceDescriptor::new(i, format!("host:{i}")))
            .collect())
    }
}
