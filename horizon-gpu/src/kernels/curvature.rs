//! Curvature operator CUDA kernel
//!
//! One thread per interior cell. Same stencils and the same per-axis
//! summation order as the CPU operator, so results agree to rounding.

use anyhow::{Context, Result};
use cudarc::driver::{CudaModule, CudaStream, PushKernelArg};
use horizon_field::CurvatureParams;
use std::sync::Arc;

use super::linear_config;
use crate::buffers::GpuLattice;

/// CUDA C source for the R00/Rii stencil kernel.
pub const CURVATURE_KERNEL_SRC: &str = r#"
// S is the full n_full^3 entropy lattice; r00/rii are (n_full-2)^3.
extern "C" __global__ void ricci_tensor(
    const float* __restrict__ S,
    float* __restrict__ r00,
    float* __restrict__ rii,
    int n_full,
    float inv_dx2,
    float kappa,
    float gamma)
{
    int n = n_full - 2;
    int idx = blockIdx.x * blockDim.x + threadIdx.x;
    if (idx >= n * n * n) return;

    int k = idx % n;
    int j = (idx / n) % n;
    int i = idx / (n * n);

    int sx = n_full * n_full;
    int sy = n_full;
    int c = ((i + 1) * n_full + (j + 1)) * n_full + (k + 1);
    float centre = S[c];

    float dxx = (S[c + sx] - 2.0f * centre + S[c - sx]) * inv_dx2;
    float dyy = (S[c + sy] - 2.0f * centre + S[c - sy]) * inv_dx2;
    float dzz = (S[c + 1]  - 2.0f * centre + S[c - 1])  * inv_dx2;
    float nb = S[c + sx] + S[c - sx] + S[c + sy] + S[c - sy] + S[c + 1] + S[c - 1];
    float lap = (nb - 6.0f * centre) * inv_dx2;

    float diag = dxx + dyy + dzz;
    r00[idx] = kappa * (diag + gamma * lap);
    rii[idx] = kappa * (gamma - 1.0f) * diag;
}
"#;

/// Launch the curvature kernel. `r00`/`rii` must have the interior shape of `entropy`.
pub fn launch_ricci_tensor(
    stream: &Arc<CudaStream>,
    module: &Arc<CudaModule>,
    entropy: &GpuLattice,
    r00: &mut GpuLattice,
    rii: &mut GpuLattice,
    dx: f32,
    params: &CurvatureParams,
) -> Result<()> {
    let n_full = entropy.side()?;
    let inv_dx2 = 1.0f32 / (dx * dx);
    let cfg = linear_config(r00.cells())?;

    let func = module
        .load_function("ricci_tensor")
        .context("Failed to load ricci_tensor")?;
    let mut builder = stream.launch_builder(&func);
    builder.arg(&entropy.buf.slice);
    builder.arg(&mut r00.buf.slice);
    builder.arg(&mut rii.buf.slice);
    builder.arg(&n_full);
    builder.arg(&inv_dx2);
    builder.arg(&params.kappa);
    builder.arg(&params.gamma);
    unsafe { builder.launch(cfg) }.context("ricci_tensor launch failed")?;

    Ok(())
}
