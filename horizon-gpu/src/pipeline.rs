// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Compute pipeline with GPU/CPU backend abstraction
//!
//! The ComputeBackend trait lets horizon-engine drive the per-frame field
//! stages (curvature, relaxation, force extraction) without knowing where
//! they execute. Inputs and outputs are host lattices; a GPU backend
//! uploads every input of a call to the same device, so arrays from
//! different backends never meet inside one stage.

use anyhow::{Context, Result};
use horizon_field::{
    Curvature, CurvatureParams, ForceField, RelaxationParams, RelaxationReport,
};
use horizon_math::Lattice3;

/// Abstraction over GPU and CPU compute backends.
pub trait ComputeBackend: Send {
    /// R00 and Rii of the entropy field on the interior lattice.
    fn curvature(
        &mut self,
        entropy: &Lattice3,
        dx: f32,
        params: &CurvatureParams,
    ) -> Result<Curvature>;

    /// One guarded relaxation step of the metric, in place.
    ///
    /// On error the metric is left unchanged.
    fn relax_metric(
        &mut self,
        metric: &mut Lattice3,
        entropy: &Lattice3,
        params: &RelaxationParams,
    ) -> Result<RelaxationReport>;

    /// Central-difference force field of the metric.
    fn force_field(&mut self, metric: &Lattice3, dx: f32) -> Result<ForceField>;

    /// Name of this backend (for logging).
    fn name(&self) -> &str;
}

/// CPU backend, delegating to the horizon-field reference implementations.
pub struct CpuBackend;

impl ComputeBackend for CpuBackend {
    fn curvature(
        &mut self,
        entropy: &Lattice3,
        dx: f32,
        params: &CurvatureParams,
    ) -> Result<Curvature> {
        horizon_field::ricci_tensor(entropy, dx, params).context("CPU curvature")
    }

    fn relax_metric(
        &mut self,
        metric: &mut Lattice3,
        entropy: &Lattice3,
        params: &RelaxationParams,
    ) -> Result<RelaxationReport> {
        horizon_field::relax_metric(metric, entropy, params).context("CPU metric relaxation")
    }

    fn force_field(&mut self, metric: &Lattice3, dx: f32) -> Result<ForceField> {
        horizon_field::force_field(metric, dx).context("CPU force extraction")
    }

    fn name(&self) -> &str {
        "CPU"
    }
}

/// GPU backend, running every stage as CUDA kernels.
#[cfg(feature = "cuda")]
pub struct GpuBackend {
    pub kernels: crate::kernels::HorizonKernels,
}

#[cfg(feature = "cuda")]
impl GpuBackend {
    /// Initialize the device and compile the kernels.
    ///
    /// A missing CUDA driver library makes cudarc panic on first use; that
    /// panic is caught and returned as an error so callers can fall back.
    pub fn new(device_id: usize) -> Result<Self> {
        let init = std::panic::catch_unwind(|| crate::kernels::HorizonKernels::new(device_id));
        match init {
            Ok(kernels) => Ok(Self { kernels: kernels? }),
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<String>()
                    .map(String::as_str)
                    .or_else(|| panic.downcast_ref::<&str>().copied())
                    .unwrap_or("unknown panic");
                anyhow::bail!("CUDA initialization panicked: {reason}")
            }
        }
    }
}

#[cfg(feature = "cuda")]
impl ComputeBackend for GpuBackend {
    fn curvature(
        &mut self,
        entropy: &Lattice3,
        dx: f32,
        params: &CurvatureParams,
    ) -> Result<Curvature> {
        self.kernels.curvature(entropy, dx, params)
    }

    fn relax_metric(
        &mut self,
        metric: &mut Lattice3,
        entropy: &Lattice3,
        params: &RelaxationParams,
    ) -> Result<RelaxationReport> {
        self.kernels.relax_metric(metric, entropy, params)
    }

    fn force_field(&mut self, metric: &Lattice3, dx: f32) -> Result<ForceField> {
        self.kernels.force_field(metric, dx)
    }

    fn name(&self) -> &str {
        "CUDA"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use horizon_field::entropy::synthetic_impulse;
    use horizon_field::FieldError;
    use horizon_math::Shape3;

    #[test]
    fn test_cpu_backend_matches_field_stages() -> Result<()> {
        let entropy = synthetic_impulse(8)?;
        let params = RelaxationParams {
            dt: 0.1,
            curvature: CurvatureParams {
                kappa: -0.138475,
                gamma: 0.0,
            },
            ..Default::default()
        };
        let mut backend = CpuBackend;
        assert_eq!(backend.name(), "CPU");

        let curv = backend.curvature(&entropy, 1.0, &params.curvature)?;
        assert_eq!(curv, horizon_field::ricci_tensor(&entropy, 1.0, &params.curvature)?);

        let mut via_backend = Lattice3::zeros(Shape3::cubic(6));
        let mut direct = via_backend.clone();
        let report = backend.relax_metric(&mut via_backend, &entropy, &params)?;
        horizon_field::relax_metric(&mut direct, &entropy, &params)?;
        assert_eq!(via_backend, direct);
        assert!(!report.guard_engaged);

        let force = backend.force_field(&via_backend, 1.0)?;
        assert_eq!(force, horizon_field::force_field(&direct, 1.0)?);
        Ok(())
    }

    #[test]
    fn test_cpu_backend_errors_stay_downcastable() {
        let mut backend = CpuBackend;
        let entropy = Lattice3::zeros(Shape3::new(4, 4, 5));
        let err = backend
            .curvature(&entropy, 1.0, &CurvatureParams::default())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FieldError>(),
            Some(FieldError::InvalidShape { .. })
        ));
    }
}
