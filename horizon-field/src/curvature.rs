//! Curvature Operator
//!
//! Second-derivative stencils of the entropy field S on the interior of the
//! lattice. For interior cell `c` (full-lattice cell `c + 1` on every axis):
//!
//!   ∂²S/∂x² ≈ (S[x+1] - 2S[x] + S[x-1]) / dx²     (likewise y, z)
//!   ∇²S     ≈ (Σ six neighbours - 6·S) / dx²
//!
//!   R00 = κ · (∂²S/∂x² + ∂²S/∂y² + ∂²S/∂z² + γ·∇²S)
//!   Rii = κ · (γ - 1) · (∂²S/∂x² + ∂²S/∂y² + ∂²S/∂z²)
//!
//! The diagonal sum and the Laplacian agree analytically, so with γ = -1 the
//! time-time component R00 vanishes up to rounding. Only R00 drives the
//! metric; Rii is reported for diagnostics.

use horizon_math::{Lattice3, Shape3};
use serde::{Deserialize, Serialize};

use crate::checks::{ensure_cubic, ensure_finite, ensure_positive};
use crate::error::FieldResult;

/// Coupling constants of the curvature operator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvatureParams {
    /// Overall coupling κ
    pub kappa: f32,
    /// Laplacian mixing coefficient γ
    pub gamma: f32,
}

impl Default for CurvatureParams {
    fn default() -> Self {
        Self {
            kappa: -0.138475,
            gamma: -1.0,
        }
    }
}

/// Time-time and averaged space-space curvature on the interior lattice.
#[derive(Debug, Clone, PartialEq)]
pub struct Curvature {
    pub r00: Lattice3,
    pub rii: Lattice3,
}

impl Curvature {
    pub fn shape(&self) -> Shape3 {
        self.r00.shape()
    }
}

/// Evaluate R00 and Rii of the entropy field.
///
/// `entropy` must be cubic with side `L >= 3`; the result has side `L - 2`.
/// Fails before computing anything if the field holds NaN/Inf or `dx` is
/// not a positive finite number.
pub fn ricci_tensor(entropy: &Lattice3, dx: f32, params: &CurvatureParams) -> FieldResult<Curvature> {
    let size = ensure_cubic(entropy, "entropy field")?;
    ensure_finite(entropy, "entropy field")?;
    ensure_positive(dx, "dx")?;

    let full = entropy.shape();
    let [sx, sy, sz] = full.strides();
    let s = entropy.data();
    let inv_dx2 = 1.0 / (dx * dx);
    let n = size - 2;
    let interior = Shape3::cubic(n);

    let mut r00 = Lattice3::zeros(interior);
    let mut rii = Lattice3::zeros(interior);

    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                let c = full.index(i + 1, j + 1, k + 1);
                let centre = s[c];

                let dxx = (s[c + sx] - 2.0 * centre + s[c - sx]) * inv_dx2;
                let dyy = (s[c + sy] - 2.0 * centre + s[c - sy]) * inv_dx2;
                let dzz = (s[c + sz] - 2.0 * centre + s[c - sz]) * inv_dx2;
                let neighbours =
                    s[c + sx] + s[c - sx] + s[c + sy] + s[c - sy] + s[c + sz] + s[c - sz];
                let lap = (neighbours - 6.0 * centre) * inv_dx2;

                let diag = dxx + dyy + dzz;
                let out = interior.index(i, j, k);
                r00.data_mut()[out] = params.kappa * (diag + params.gamma * lap);
                rii.data_mut()[out] = params.kappa * (params.gamma - 1.0) * diag;
            }
        }
    }

    Ok(Curvature { r00, rii })
}
