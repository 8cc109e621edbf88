//! Max-abs reduction CUDA kernel
//!
//! Each block reduces its slice in shared memory and writes one partial
//! maximum; the host takes the max over the (few) block results. The
//! stability guard needs only this one scalar per step.

use anyhow::{Context, Result};
use cudarc::driver::{CudaModule, CudaStream, LaunchConfig, PushKernelArg};
use std::sync::Arc;

use super::BLOCK_SIZE;
use crate::buffers::GpuBuffer;
use crate::device::sync_stream;

/// Upper bound on partial maxima downloaded per reduction.
const MAX_BLOCKS: u32 = 1024;

pub const REDUCTION_KERNEL_SRC: &str = r#"
extern "C" __global__ void max_abs_reduce(
    const float* __restrict__ x,
    float* __restrict__ block_max,
    int n)
{
    extern __shared__ float partial[];

    float m = 0.0f;
    for (int i = blockIdx.x * blockDim.x + threadIdx.x; i < n; i += gridDim.x * blockDim.x) {
        m = fmaxf(m, fabsf(x[i]));
    }
    partial[threadIdx.x] = m;
    __syncthreads();

    for (unsigned int half = blockDim.x / 2; half > 0; half >>= 1) {
        if (threadIdx.x < half) {
            partial[threadIdx.x] = fmaxf(partial[threadIdx.x], partial[threadIdx.x + half]);
        }
        __syncthreads();
    }

    if (threadIdx.x == 0) {
        block_max[blockIdx.x] = partial[0];
    }
}
"#;

/// Largest |x| over the buffer. 0 for an empty buffer.
pub fn launch_max_abs(
    stream: &Arc<CudaStream>,
    module: &Arc<CudaModule>,
    x: &GpuBuffer<f32>,
) -> Result<f32> {
    if x.len == 0 {
        return Ok(0.0);
    }
    let n = i32::try_from(x.len)?;
    let blocks = u32::try_from(x.len)?.div_ceil(BLOCK_SIZE).clamp(1, MAX_BLOCKS);
    let mut block_max = GpuBuffer::<f32>::zeros(stream, blocks as usize)?;

    let cfg = LaunchConfig {
        grid_dim: (blocks, 1, 1),
        block_dim: (BLOCK_SIZE, 1, 1),
        shared_mem_bytes: BLOCK_SIZE * std::mem::size_of::<f32>() as u32,
    };

    let func = module
        .load_function("max_abs_reduce")
        .context("Failed to load max_abs_reduce")?;
    let mut builder = stream.launch_builder(&func);
    builder.arg(&x.slice);
    builder.arg(&mut block_max.slice);
    builder.arg(&n);
    unsafe { builder.launch(cfg) }.context("max_abs_reduce launch failed")?;

    let partials = block_max.to_host(stream)?;
    sync_stream(stream)?;
    Ok(partials.into_iter().fold(0.0f32, f32::max))
}
