// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

pub mod error;
pub mod checks;
pub mod entropy;
pub mod curvature;
pub mod relaxation;
pub mod force;
pub mod particles;

pub use curvature::{ricci_tensor, Curvature, CurvatureParams};
pub use entropy::{EntropyField, EntropySource, WeightMatrix};
pub use error::{FieldError, FieldResult};
pub use force::{force_field, ForceField};
pub use particles::{integrate, kinetic_energy, random_particles, IntegratorMethod, IntegratorParams, Particle};
pub use relaxation::{
    max_stable_dt, relax_metric, relax_with_r00, stability_guard, GuardOutcome, RelaxationParams,
    RelaxationReport,
};
