//! Force extraction CUDA kernel
//!
//! Central differences on interior-of-interior cells; every other cell is
//! written as 0 so the output buffers need no separate clear.

use anyhow::{Context, Result};
use cudarc::driver::{CudaModule, CudaStream, PushKernelArg};
use std::sync::Arc;

use super::linear_config;
use crate::buffers::GpuLattice;

pub const FORCE_KERNEL_SRC: &str = r#"
extern "C" __global__ void metric_gradient(
    const float* __restrict__ g,
    float* __restrict__ fx,
    float* __restrict__ fy,
    float* __restrict__ fz,
    int n,
    float inv_2dx)
{
    int idx = blockIdx.x * blockDim.x + threadIdx.x;
    if (idx >= n * n * n) return;

    int k = idx % n;
    int j = (idx / n) % n;
    int i = idx / (n * n);

    if (i < 1 || j < 1 || k < 1 || i > n - 2 || j > n - 2 || k > n - 2) {
        fx[idx] = 0.0f;
        fy[idx] = 0.0f;
        fz[idx] = 0.0f;
        return;
    }

    int sx = n * n;
    int sy = n;
    fx[idx] = (g[idx + sx] - g[idx - sx]) * inv_2dx;
    fy[idx] = (g[idx + sy] - g[idx - sy]) * inv_2dx;
    fz[idx] = (g[idx + 1]  - g[idx - 1])  * inv_2dx;
}
"#;

pub fn launch_metric_gradient(
    stream: &Arc<CudaStream>,
    module: &Arc<CudaModule>,
    metric: &GpuLattice,
    fx: &mut GpuLattice,
    fy: &mut GpuLattice,
    fz: &mut GpuLattice,
    dx: f32,
) -> Result<()> {
    let n = metric.side()?;
    let inv_2dx = 1.0f32 / (2.0 * dx);
    let cfg = linear_config(metric.cells())?;

    let func = module
        .load_function("metric_gradient")
        .context("Failed to load metric_gradient")?;
    let mut builder = stream.launch_builder(&func);
    builder.arg(&metric.buf.slice);
    builder.arg(&mut fx.buf.slice);
    builder.arg(&mut fy.buf.slice);
    builder.arg(&mut fz.buf.slice);
    builder.arg(&n);
    builder.arg(&inv_2dx);
    unsafe { builder.launch(cfg) }.context("metric_gradient launch failed")?;

    Ok(())
}
