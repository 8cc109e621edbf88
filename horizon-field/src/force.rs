//! Force Field Extractor
//!
//! Central-difference gradient of the metric on the interior lattice:
//!
//!   F_axis[c] = (g[c + e_axis] - g[c - e_axis]) / (2·dx)
//!
//! evaluated on every interior-of-interior cell (each axis index in
//! `1..=n-2` for an `n³` metric). Cells on the outer face of the metric
//! lattice have no centred stencil and hold 0.

use horizon_math::{Lattice3, Shape3};

use crate::checks::{ensure_finite, ensure_non_empty_cube, ensure_positive};
use crate::error::{mismatch, FieldError, FieldResult};

/// Three co-shaped force components on the interior lattice.
#[derive(Debug, Clone, PartialEq)]
pub struct ForceField {
    pub fx: Lattice3,
    pub fy: Lattice3,
    pub fz: Lattice3,
}

impl ForceField {
    pub fn zeros(shape: Shape3) -> Self {
        Self {
            fx: Lattice3::zeros(shape),
            fy: Lattice3::zeros(shape),
            fz: Lattice3::zeros(shape),
        }
    }

    pub fn shape(&self) -> Shape3 {
        self.fx.shape()
    }

    /// Check the three components share one cubic shape. Returns its side.
    pub fn validate(&self) -> FieldResult<usize> {
        let shape = self.fx.shape();
        for (what, lat) in [("fy", &self.fy), ("fz", &self.fz)] {
            if lat.shape() != shape {
                return Err(FieldError::shape(
                    "force field",
                    format!("{what}: {}", mismatch(shape, lat.shape())),
                ));
            }
        }
        if !shape.is_cubic() || shape.is_empty() {
            return Err(FieldError::shape("force field", format!("{shape} is not a non-empty cube")));
        }
        Ok(shape.nx)
    }

    /// Force vector at interior cell `(i, j, k)`.
    #[inline]
    pub fn at(&self, cell: [usize; 3]) -> [f32; 3] {
        let idx = self.shape().index(cell[0], cell[1], cell[2]);
        [self.fx.data()[idx], self.fy.data()[idx], self.fz.data()[idx]]
    }

    /// Largest force magnitude over all cells.
    pub fn max_magnitude(&self) -> f32 {
        self.fx
            .data()
            .iter()
            .zip(self.fy.data())
            .zip(self.fz.data())
            .map(|((x, y), z)| (x * x + y * y + z * z).sqrt())
            .fold(0.0, f32::max)
    }
}

/// Gradient of the metric; boundary cells of the metric lattice hold 0.
pub fn force_field(metric: &Lattice3, dx: f32) -> FieldResult<ForceField> {
    let n = ensure_non_empty_cube(metric, "metric")?;
    ensure_finite(metric, "metric")?;
    ensure_positive(dx, "dx")?;

    let shape = metric.shape();
    let mut force = ForceField::zeros(shape);
    if n < 3 {
        return Ok(force);
    }

    let [sx, sy, sz] = shape.strides();
    let g = metric.data();
    let inv_2dx = 1.0 / (2.0 * dx);

    for i in 1..n - 1 {
        for j in 1..n - 1 {
            for k in 1..n - 1 {
                let c = shape.index(i, j, k);
                force.fx.data_mut()[c] = (g[c + sx] - g[c - sx]) * inv_2dx;
                force.fy.data_mut()[c] = (g[c + sy] - g[c - sy]) * inv_2dx;
                force.fz.data_mut()[c] = (g[c + sz] - g[c - sz]) * inv_2dx;
            }
        }
    }

    Ok(force)
}
