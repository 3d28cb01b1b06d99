//! Environment preflight and CUDA device probe
//!
//! Availability is decided by libtorch (`tch::Cuda`) so the probe agrees
//! with what the training stage will actually see. Device identity,
//! compute capability, and memory figures come from NVML, which exposes
//! the properties tch does not and is loaded at runtime, so a host
//! without the driver fails the probe instead of the build.

use nvml_wrapper::Nvml;

use crate::error::SmokeError;
use crate::report::gb;

/// Link-environment report, collected once before probing
///
/// A Rust binary links libtorch at build time, so the runtime check for a
/// usable dependency is reduced to reporting how the library was built and
/// which environment variables steer it.
#[derive(Debug, Clone)]
pub struct EnvReport {
    /// Whether libtorch was built with CUDA support
    pub torch_has_cuda: bool,
    /// Whether cuDNN is usable
    pub cudnn_available: bool,
    /// LIBTORCH, if set
    pub libtorch: Option<String>,
    /// LD_LIBRARY_PATH, if set
    pub ld_library_path: Option<String>,
    /// CUDA_VISIBLE_DEVICES, if set
    pub cuda_visible_devices: Option<String>,
}

impl EnvReport {
    /// Collect the preflight report. Pure read, no side effects.
    pub fn collect() -> Self {
        Self {
            torch_has_cuda: tch::utils::has_cuda(),
            cudnn_available: tch::Cuda::cudnn_is_available(),
            libtorch: std::env::var("LIBTORCH").ok(),
            ld_library_path: std::env::var("LD_LIBRARY_PATH").ok(),
            cuda_visible_devices: std::env::var("CUDA_VISIBLE_DEVICES").ok(),
        }
    }

    /// Emit the preflight section of the diagnostic output
    pub fn log(&self) {
        tracing::info!("gpu-smoke version: {}", crate::VERSION);
        tracing::info!("libtorch built with CUDA: {}", self.torch_has_cuda);
        tracing::info!("cuDNN available: {}", self.cudnn_available);
        tracing::info!("LIBTORCH: {}", self.libtorch.as_deref().unwrap_or("<not set>"));
        tracing::info!(
            "LD_LIBRARY_PATH: {}",
            self.ld_library_path.as_deref().unwrap_or("<not set>")
        );
        tracing::info!(
            "CUDA_VISIBLE_DEVICES: {}",
            self.cuda_visible_devices.as_deref().unwrap_or("<not set>")
        );
    }
}

/// Identity and static capacity of the selected accelerator
///
/// Immutable for the process lifetime; queried once, never mutated.
#[derive(Debug, Clone)]
pub struct DeviceReport {
    /// Number of visible CUDA devices
    pub device_count: i64,
    /// Index of the device the run uses
    pub selected_index: i64,
    /// Device name as reported by the driver
    pub name: String,
    /// Total device memory in bytes
    pub total_memory: u64,
    /// Compute capability (major, minor)
    pub capability: (i32, i32),
}

impl DeviceReport {
    /// Emit the device-properties section of the diagnostic output
    pub fn log(&self) {
        tracing::info!("CUDA available: true");
        tracing::info!("GPU count: {}", self.device_count);
        tracing::info!("Selected GPU: {}", self.selected_index);
        tracing::info!("GPU name: {}", self.name);
        tracing::info!("Total memory: {:.2} GB", gb(self.total_memory));
        tracing::info!(
            "Compute capability: {}.{}",
            self.capability.0,
            self.capability.1
        );
    }
}

/// Device memory figures at one point in time
#[derive(Debug, Clone, Copy)]
pub struct MemorySnapshot {
    /// Bytes currently in use on the device
    pub used: u64,
    /// Total device memory in bytes
    pub total: u64,
}

/// Probe for a usable accelerator
///
/// Succeeds only if libtorch sees CUDA and NVML answers identity queries
/// for device 0. On success the invariants hold: `device_count >= 1` and
/// `0 <= selected_index < device_count`. No training work happens here.
pub fn probe() -> Result<DeviceReport, SmokeError> {
    if !tch::Cuda::is_available() {
        let reason = if tch::utils::has_cuda() {
            "libtorch has CUDA support but found no usable device".to_string()
        } else {
            "libtorch was built without CUDA support".to_string()
        };
        return Err(SmokeError::AcceleratorUnavailable { reason });
    }

    let device_count = tch::Cuda::device_count();
    if device_count < 1 {
        return Err(SmokeError::AcceleratorUnavailable {
            reason: "CUDA reports zero devices".to_string(),
        });
    }

    let nvml = Nvml::init().map_err(|e| SmokeError::AcceleratorUnavailable {
        reason: format!("NVML initialization failed: {e}"),
    })?;
    let device = nvml.device_by_index(0).map_err(|e| SmokeError::AcceleratorUnavailable {
        reason: format!("driver rejected device 0: {e}"),
    })?;
    let name = device.name().map_err(|e| SmokeError::AcceleratorUnavailable {
        reason: format!("driver could not report device name: {e}"),
    })?;
    let memory = device.memory_info().map_err(|e| SmokeError::AcceleratorUnavailable {
        reason: format!("driver could not report device memory: {e}"),
    })?;
    let capability =
        device.cuda_compute_capability().map_err(|e| SmokeError::AcceleratorUnavailable {
            reason: format!("driver could not report compute capability: {e}"),
        })?;

    Ok(DeviceReport {
        device_count,
        selected_index: 0,
        name,
        total_memory: memory.total,
        capability: (capability.major as i32, capability.minor as i32),
    })
}

/// Take a memory snapshot of the selected device
///
/// Failures here are reported to the caller, which treats them as
/// warnings: memory accounting is diagnostic output, not a gate.
pub fn memory_snapshot() -> Result<MemorySnapshot, String> {
    let nvml = Nvml::init().map_err(|e| e.to_string())?;
    let device = nvml.device_by_index(0).map_err(|e| e.to_string())?;
    let memory = device.memory_info().map_err(|e| e.to_string())?;
    Ok(MemorySnapshot { used: memory.used, total: memory.total })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_report_collects() {
        let report = EnvReport::collect();
        // Build capabilities are consistent: cuDNN implies a CUDA build.
        if report.cudnn_available {
            assert!(report.torch_has_cuda);
        }
    }

    #[test]
    fn test_probe_matches_availability() {
        match probe() {
            Ok(report) => {
                assert!(tch::Cuda::is_available());
                assert!(report.device_count >= 1);
                assert!(report.selected_index >= 0);
                assert!(report.selected_index < report.device_count);
                assert!(!report.name.is_empty());
                assert!(report.total_memory > 0);
            }
            Err(err) => {
                assert!(matches!(err, SmokeError::AcceleratorUnavailable { .. }));
            }
        }
    }

    #[test]
    fn test_snapshot_consistency_when_available() {
        if let Ok(snap) = memory_snapshot() {
            assert!(snap.used <= snap.total);
            assert!(snap.total > 0);
        }
    }
}
