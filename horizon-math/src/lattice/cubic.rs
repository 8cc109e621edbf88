//! Cubic lattice (Z³) cell mapping
//!
//! The simplest lattice: integer coordinates in three dimensions.
//!
//! Properties:
//! - Six nearest neighbours (±e_x, ±e_y, ±e_z)
//! - Orthogonal axes, so second partials separate per axis
//! - Fast quantization (just rounding)
//!
//! World coordinates are centred on the origin. Along each axis the
//! interior lattice of `n` cells maps a position `x` to
//! `round(x / dx) + n / 2`, clamped into `[0, n - 1]`. The full lattice
//! index is the interior index plus one (the halo cell).

use serde::{Deserialize, Serialize};

/// Maps continuous world positions onto interior lattice cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellMap {
    /// Lattice spacing
    pub dx: f32,
    /// Number of interior cells per axis (`L - 2`)
    pub interior: usize,
}

impl CellMap {
    /// Cell map for a full lattice of side `full_size` (interior is `full_size - 2`).
    pub fn for_full_lattice(full_size: usize, dx: f32) -> Self {
        Self {
            dx,
            interior: full_size.saturating_sub(2),
        }
    }

    /// Index offset of the world origin within the interior lattice.
    pub fn half_extent(&self) -> i64 {
        (self.interior / 2) as i64
    }

    /// Unclamped interior index of a coordinate (may fall outside the lattice).
    pub fn raw_index(&self, x: f32) -> i64 {
        ((x / self.dx).round() as i64).saturating_add(self.half_extent())
    }

    /// Interior index of a coordinate, clamped into `[0, interior - 1]`.
    ///
    /// Positions outside the domain are clamped, never rejected. A NaN
    /// coordinate rounds to the origin cell (saturating cast).
    pub fn interior_index(&self, x: f32) -> usize {
        let max = self.interior.saturating_sub(1) as i64;
        self.raw_index(x).clamp(0, max) as usize
    }

    /// Interior cell of a 3-D position.
    pub fn interior_cell(&self, position: [f32; 3]) -> [usize; 3] {
        [
            self.interior_index(position[0]),
            self.interior_index(position[1]),
            self.interior_index(position[2]),
        ]
    }

    /// Unclamped full-lattice index of a coordinate (interior index + 1).
    pub fn full_index(&self, x: f32) -> i64 {
        self.raw_index(x).saturating_add(1)
    }
}
