// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

pub mod pipeline;

#[cfg(feature = "cuda")]
pub mod device;
#[cfg(feature = "cuda")]
pub mod buffers;
#[cfg(feature = "cuda")]
pub mod kernels;

pub use pipeline::{ComputeBackend, CpuBackend};
#[cfg(feature = "cuda")]
pub use pipeline::GpuBackend;
