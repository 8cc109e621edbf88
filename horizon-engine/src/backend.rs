//! Compute backend selection
//!
//! Resolves a [`BackendSelection`] into a live [`ComputeBackend`] once, at
//! run start. A GPU request that cannot be honoured falls back to the CPU
//! backend; the fallback is logged and returned in the [`BackendReport`]
//! so the caller can surface it.

use horizon_gpu::{ComputeBackend, CpuBackend};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::BackendSelection;

/// What was asked for, what is running, and why they differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendReport {
    pub requested: BackendSelection,
    pub active: String,
    /// Reason the requested backend could not be used
    pub fallback: Option<String>,
}

impl BackendReport {
    pub fn fell_back(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Build the backend for `selection`, falling back to CPU if needed.
pub fn select_backend(selection: BackendSelection) -> (Box<dyn ComputeBackend>, BackendReport) {
    let (backend, fallback): (Box<dyn ComputeBackend>, Option<String>) = match selection {
        BackendSelection::Cpu => (Box::new(CpuBackend), None),
        BackendSelection::Gpu { device_id } => match init_gpu(device_id) {
            Ok(gpu) => (gpu, None),
            Err(reason) => {
                warn!("GPU init failed ({reason}), falling back to CPU");
                (Box::new(CpuBackend), Some(reason))
            }
        },
    };

    let report = BackendReport {
        requested: selection,
        active: backend.name().to_string(),
        fallback,
    };
    info!(backend = %report.active, ?selection, "compute backend selected");
    (backend, report)
}

#[cfg(feature = "cuda")]
fn init_gpu(device_id: usize) -> Result<Box<dyn ComputeBackend>, String> {
    horizon_gpu::GpuBackend::new(device_id)
        .map(|gpu| Box::new(gpu) as Box<dyn ComputeBackend>)
        .map_err(|e| format!("{e:#}"))
}

#[cfg(not(feature = "cuda"))]
fn init_gpu(device_id: usize) -> Result<Box<dyn ComputeBackend>, String> {
    Err(format!(
        "device {device_id} requested but this build has no CUDA support (enable the `cuda` feature)"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_selection_never_falls_back() {
        let (backend, report) = select_backend(BackendSelection::Cpu);
        assert_eq!(backend.name(), "CPU");
        assert_eq!(report.active, "CPU");
        assert!(!report.fell_back());
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_gpu_without_cuda_reports_fallback() {
        let (backend, report) = select_backend(BackendSelection::Gpu { device_id: 0 });
        assert_eq!(backend.name(), "CPU");
        assert_eq!(report.requested, BackendSelection::Gpu { device_id: 0 });
        let reason = report.fallback.expect("fallback must be reported");
        assert!(reason.contains("cuda"), "unexpected reason: {reason}");
    }

    #[test]
    fn test_gpu_request_yields_a_named_backend() {
        // With or without a device, the caller always gets a usable backend
        // and a report that agrees with it.
        let (backend, report) = select_backend(BackendSelection::Gpu { device_id: 0 });
        assert_eq!(backend.name(), report.active);
        assert_eq!(report.fell_back(), report.active == "CPU");
    }
}
