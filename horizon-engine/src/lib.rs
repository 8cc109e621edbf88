// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

pub mod config;
pub mod backend;
pub mod weights;
pub mod trajectory;
pub mod simulation;

pub use backend::{select_backend, BackendReport};
pub use config::{BackendSelection, RelaxationConfig, SimulationConfig};
pub use simulation::{FrameStats, RunSummary, Simulation};
pub use trajectory::{read_archive, write_archive, ArchiveReceipt, TrajectoryArchive, TrajectoryRecorder};
pub use weights::load_weights;
