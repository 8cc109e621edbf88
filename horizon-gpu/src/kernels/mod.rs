//! CUDA kernel manager for Horizon
//!
//! Compiles and loads the PTX modules once, and wraps each pipeline stage
//! in a method that uploads its host inputs, runs the kernels on the one
//! device stream, and downloads the results. Every array of a call lives
//! on the same device; nothing stays resident between calls.

pub mod curvature;
pub mod force;
pub mod reduction;
pub mod relax;

use anyhow::{Context, Result};
use cudarc::driver::{CudaModule, CudaStream, LaunchConfig};
use cudarc::nvrtc::{compile_ptx_with_opts, CompileOptions};
use horizon_field::checks::{ensure_cubic, ensure_finite, ensure_non_empty_cube, ensure_positive};
use horizon_field::relaxation::{commit_metric, stability_guard, validate_inputs};
use horizon_field::{Curvature, CurvatureParams, ForceField, RelaxationParams, RelaxationReport};
use horizon_math::{Lattice3, Shape3};
use std::sync::Arc;
use tracing::debug;

use crate::buffers::GpuLattice;
use crate::device::{cuda_include_dirs, HorizonDevice};

pub(crate) const BLOCK_SIZE: u32 = 256;

/// One thread per element, `BLOCK_SIZE` threads per block.
pub(crate) fn linear_config(len: usize) -> Result<LaunchConfig> {
    let len = u32::try_from(len).with_context(|| format!("{len} elements exceed one launch"))?;
    Ok(LaunchConfig {
        grid_dim: (len.div_ceil(BLOCK_SIZE).max(1), 1, 1),
        block_dim: (BLOCK_SIZE, 1, 1),
        shared_mem_bytes: 0,
    })
}

/// All compiled CUDA kernels for Horizon.
pub struct HorizonKernels {
    device: HorizonDevice,
    curvature_module: Arc<CudaModule>,
    relax_module: Arc<CudaModule>,
    force_module: Arc<CudaModule>,
    reduction_module: Arc<CudaModule>,
}

impl HorizonKernels {
    /// Compile all PTX kernels and load them.
    pub fn new(device_id: usize) -> Result<Self> {
        let device = HorizonDevice::new(device_id)?;
        let ctx = device.ctx().clone();

        let opts = CompileOptions {
            include_paths: cuda_include_dirs(),
            ..Default::default()
        };

        let load = |name: &str, src: &str| -> Result<Arc<CudaModule>> {
            let ptx = compile_ptx_with_opts(src, opts.clone())
                .map_err(|e| anyhow::anyhow!("Failed to compile {name} kernel: {:?}", e))?;
            ctx.load_module(ptx)
                .with_context(|| format!("Failed to load {name} module"))
        };

        let curvature_module = load("curvature", curvature::CURVATURE_KERNEL_SRC)?;
        let relax_module = load("relax", relax::RELAX_KERNEL_SRC)?;
        let force_module = load("force", force::FORCE_KERNEL_SRC)?;
        let reduction_module = load("reduction", reduction::REDUCTION_KERNEL_SRC)?;

        Ok(Self {
            device,
            curvature_module,
            relax_module,
            force_module,
            reduction_module,
        })
    }

    pub fn stream(&self) -> &Arc<CudaStream> {
        self.device.stream()
    }

    pub fn device_id(&self) -> usize {
        self.device.device_id()
    }

    /// R00 and Rii of the entropy field.
    pub fn curvature(
        &self,
        entropy: &Lattice3,
        dx: f32,
        params: &CurvatureParams,
    ) -> Result<Curvature> {
        let size = ensure_cubic(entropy, "entropy field")?;
        ensure_finite(entropy, "entropy field")?;
        ensure_positive(dx, "dx")?;
        let interior = Shape3::cubic(size - 2);

        let stream = self.stream().clone();
        let s = GpuLattice::from_host(&stream, entropy)?;
        let mut r00 = GpuLattice::zeros(&stream, interior)?;
        let mut rii = GpuLattice::zeros(&stream, interior)?;

        curvature::launch_ricci_tensor(
            &stream,
            &self.curvature_module,
            &s,
            &mut r00,
            &mut rii,
            dx,
            params,
        )?;

        let out = Curvature {
            r00: r00.to_host(&stream)?,
            rii: rii.to_host(&stream)?,
        };
        self.device.sync()?;
        Ok(out)
    }

    /// One guarded relaxation step. `metric` is replaced only if the
    /// candidate passes the finiteness and divergence checks.
    pub fn relax_metric(
        &self,
        metric: &mut Lattice3,
        entropy: &Lattice3,
        params: &RelaxationParams,
    ) -> Result<RelaxationReport> {
        let interior = validate_inputs(metric, entropy, params)?;

        let stream = self.stream().clone();
        let s = GpuLattice::from_host(&stream, entropy)?;
        let g = GpuLattice::from_host(&stream, metric)?;
        let mut r00 = GpuLattice::zeros(&stream, interior)?;
        let mut rii = GpuLattice::zeros(&stream, interior)?;
        curvature::launch_ricci_tensor(
            &stream,
            &self.curvature_module,
            &s,
            &mut r00,
            &mut rii,
            params.dx,
            &params.curvature,
        )?;

        let mut rate = GpuLattice::zeros(&stream, interior)?;
        relax::launch_metric_rate(&stream, &self.relax_module, &g, &r00, &mut rate, params.damping)?;

        let max_rate = reduction::launch_max_abs(&stream, &self.reduction_module, &rate.buf)?;
        let guard = stability_guard(max_rate, params.dt, params.dx, params.safety);
        if guard.engaged {
            debug!(
                requested_dt = params.dt,
                effective_dt = guard.effective_dt,
                max_delta = guard.max_delta,
                limit = guard.limit,
                "stability guard engaged"
            );
        }

        let mut next = GpuLattice::zeros(&stream, interior)?;
        relax::launch_metric_step(
            &stream,
            &self.relax_module,
            &g,
            &rate,
            &mut next,
            guard.effective_dt,
        )?;
        let candidate = next.to_host(&stream)?;
        self.device.sync()?;

        let metric_norm = commit_metric(metric, candidate, params.divergence_threshold)?;
        Ok(RelaxationReport {
            requested_dt: params.dt,
            effective_dt: guard.effective_dt,
            max_delta: guard.max_delta,
            limit: guard.limit,
            guard_engaged: guard.engaged,
            metric_max_abs: metric.max_abs(),
            metric_norm,
        })
    }

    /// Central-difference force field of the metric.
    pub fn force_field(&self, metric: &Lattice3, dx: f32) -> Result<ForceField> {
        let size = ensure_non_empty_cube(metric, "metric")?;
        ensure_finite(metric, "metric")?;
        ensure_positive(dx, "dx")?;
        let shape = Shape3::cubic(size);
        if size < 3 {
            return Ok(ForceField::zeros(shape));
        }

        let stream = self.stream().clone();
        let g = GpuLattice::from_host(&stream, metric)?;
        let mut fx = GpuLattice::zeros(&stream, shape)?;
        let mut fy = GpuLattice::zeros(&stream, shape)?;
        let mut fz = GpuLattice::zeros(&stream, shape)?;
        force::launch_metric_gradient(
            &stream,
            &self.force_module,
            &g,
            &mut fx,
            &mut fy,
            &mut fz,
            dx,
        )?;

        let out = ForceField {
            fx: fx.to_host(&stream)?,
            fy: fy.to_host(&stream)?,
            fz: fz.to_host(&stream)?,
        };
        self.device.sync()?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_config_covers_every_cell() {
        let cfg = linear_config(6 * 6 * 6).unwrap();
        assert_eq!(cfg.grid_dim, (1, 1, 1));
        assert_eq!(linear_config(257).unwrap().grid_dim.0, 2);
        assert_eq!(linear_config(0).unwrap().grid_dim.0, 1);
    }

    #[test]
    fn test_linear_config_rejects_oversized_launch() {
        let too_many = u32::MAX as usize + 1;
        assert!(linear_config(too_many).is_err());
    }
}
