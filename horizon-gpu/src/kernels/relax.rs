//! Metric relaxation CUDA kernels
//!
//! Split in two so the host can run the stability guard between them:
//!   rate = R00 - damping * g
//!   next = g + dt_eff * rate
//! `next` is a separate buffer; the caller's metric is only replaced after
//! the candidate passes the finiteness and divergence checks on the host.

use anyhow::{Context, Result};
use cudarc::driver::{CudaModule, CudaStream, PushKernelArg};
use std::sync::Arc;

use super::linear_config;
use crate::buffers::GpuLattice;

/// CUDA C source for the metric rate and update kernels.
pub const RELAX_KERNEL_SRC: &str = r#"
extern "C" __global__ void metric_rate(
    const float* __restrict__ metric,
    const float* __restrict__ r00,
    float* __restrict__ rate,
    int len,
    float damping)
{
    int i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i >= len) return;
    rate[i] = r00[i] - damping * metric[i];
}

extern "C" __global__ void metric_step(
    const float* __restrict__ metric,
    const float* __restrict__ rate,
    float* __restrict__ next,
    int len,
    float dt)
{
    int i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i >= len) return;
    next[i] = metric[i] + dt * rate[i];
}
"#;

pub fn launch_metric_rate(
    stream: &Arc<CudaStream>,
    module: &Arc<CudaModule>,
    metric: &GpuLattice,
    r00: &GpuLattice,
    rate: &mut GpuLattice,
    damping: f32,
) -> Result<()> {
    let len = i32::try_from(metric.cells())?;
    let cfg = linear_config(metric.cells())?;

    let func = module
        .load_function("metric_rate")
        .context("Failed to load metric_rate")?;
    let mut builder = stream.launch_builder(&func);
    builder.arg(&metric.buf.slice);
    builder.arg(&r00.buf.slice);
    builder.arg(&mut rate.buf.slice);
    builder.arg(&len);
    builder.arg(&damping);
    unsafe { builder.launch(cfg) }.context("metric_rate launch failed")?;

    Ok(())
}

pub fn launch_metric_step(
    stream: &Arc<CudaStream>,
    module: &Arc<CudaModule>,
    metric: &GpuLattice,
    rate: &GpuLattice,
    next: &mut GpuLattice,
    dt: f32,
) -> Result<()> {
    let len = i32::try_from(metric.cells())?;
    let cfg = linear_config(metric.cells())?;

    let func = module
        .load_function("metric_step")
        .context("Failed to load metric_step")?;
    let mut builder = stream.launch_builder(&func);
    builder.arg(&metric.buf.slice);
    builder.arg(&rate.buf.slice);
    builder.arg(&mut next.buf.slice);
    builder.arg(&len);
    builder.arg(&dt);
    unsafe { builder.launch(cfg) }.context("metric_step launch failed")?;

    Ok(())
}
