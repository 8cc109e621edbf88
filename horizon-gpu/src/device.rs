// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! CUDA device handle for one Horizon run
//!
//! A run talks to exactly one device through one stream; every upload,
//! launch and download of a frame is queued on it in order.

use anyhow::{bail, Context, Result};
use cudarc::driver::{CudaContext, CudaStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub struct HorizonDevice {
    ctx: Arc<CudaContext>,
    stream: Arc<CudaStream>,
    device_id: usize,
}

impl HorizonDevice {
    /// Open `device_id`, failing early if the ordinal does not exist.
    pub fn new(device_id: usize) -> Result<Self> {
        let count = CudaContext::device_count().context("Failed to query CUDA device count")?;
        if device_id >= count.max(0) as usize {
            bail!("CUDA device {device_id} requested but only {count} visible");
        }
        let ctx = CudaContext::new(device_id)
            .with_context(|| format!("Failed to open CUDA device {device_id}"))?;
        let name = ctx.name().unwrap_or_else(|_| format!("device {device_id}"));
        info!(device_id, %name, "CUDA device opened");
        let stream = ctx.default_stream();
        Ok(Self {
            ctx,
            stream,
            device_id,
        })
    }

    pub fn ctx(&self) -> &Arc<CudaContext> {
        &self.ctx
    }

    pub fn stream(&self) -> &Arc<CudaStream> {
        &self.stream
    }

    pub fn device_id(&self) -> usize {
        self.device_id
    }

    /// Block until everything queued on the run's stream has finished.
    pub fn sync(&self) -> Result<()> {
        sync_stream(&self.stream)
    }
}

pub(crate) fn sync_stream(stream: &Arc<CudaStream>) -> Result<()> {
    stream
        .synchronize()
        .context("CUDA stream synchronize failed")
}

/// Include directories handed to NVRTC.
///
/// `CUDA_PATH` and `CUDA_HOME` are tried before the usual install prefixes;
/// only directories that actually hold `cuda_runtime.h` are returned.
pub fn cuda_include_dirs() -> Vec<String> {
    let env_roots = ["CUDA_PATH", "CUDA_HOME"]
        .into_iter()
        .filter_map(|var| std::env::var_os(var))
        .map(|root| PathBuf::from(root).join("include"));
    let fixed = [
        "/usr/local/cuda/targets/x86_64-linux/include",
        "/usr/local/cuda/include",
    ]
    .into_iter()
    .map(PathBuf::from);

    let mut dirs: Vec<String> = Vec::new();
    for dir in env_roots.chain(fixed) {
        if has_runtime_header(&dir) {
            let dir = dir.to_string_lossy().into_owned();
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
    }
    dirs
}

fn has_runtime_header(dir: &Path) -> bool {
    dir.join("cuda_runtime.h").is_file()
}
