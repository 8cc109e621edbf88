//! Dense 3-D lattice storage for the Horizon solver
//!
//! A `Lattice3` is a row-major block of `f32` samples on a regular grid.
//! Cell `(i, j, k)` lives at flat index `(i * ny + j) * nz + k`, so the
//! z axis is contiguous and the x axis has the largest stride. The CUDA
//! kernels in horizon-gpu use the same layout, which lets a lattice be
//! uploaded and downloaded as a flat buffer.
//!
//! Two lattice shapes appear in a run:
//! - the full entropy lattice, `L × L × L`
//! - the interior metric/curvature lattice, `(L-2)³`, which drops a one-cell
//!   halo on every face so centered stencils never leave the grid

pub mod cubic;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Extent of a 3-D lattice along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape3 {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl Shape3 {
    pub const fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self { nx, ny, nz }
    }

    /// An `n × n × n` shape.
    pub const fn cubic(n: usize) -> Self {
        Self { nx: n, ny: n, nz: n }
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_cubic(&self) -> bool {
        self.nx == self.ny && self.ny == self.nz
    }

    /// Shape with a one-cell halo removed from every face.
    ///
    /// Returns `None` when any axis is shorter than 3 (no interior cell exists).
    pub fn interior(&self) -> Option<Shape3> {
        if self.nx < 3 || self.ny < 3 || self.nz < 3 {
            return None;
        }
        Some(Shape3::new(self.nx - 2, self.ny - 2, self.nz - 2))
    }

    /// Flat offsets between neighbours along x, y and z.
    pub fn strides(&self) -> [usize; 3] {
        [self.ny * self.nz, self.nz, 1]
    }

    /// Flat index of cell `(i, j, k)`.
    #[inline]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        debug_assert!(i < self.nx && j < self.ny && k < self.nz);
        (i * self.ny + j) * self.nz + k
    }

    /// Inverse of [`Shape3::index`].
    #[inline]
    pub fn coords(&self, idx: usize) -> (usize, usize, usize) {
        let k = idx % self.nz;
        let j = (idx / self.nz) % self.ny;
        let i = idx / (self.ny * self.nz);
        (i, j, k)
    }
}

impl fmt::Display for Shape3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.nx, self.ny, self.nz)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LatticeError {
    #[error("data length {len} does not match shape {shape} ({expected} cells)")]
    LengthMismatch {
        shape: Shape3,
        expected: usize,
        len: usize,
    },
    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: Shape3, actual: Shape3 },
}

/// A dense scalar field on a 3-D lattice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lattice3 {
    shape: Shape3,
    data: Vec<f32>,
}

impl Lattice3 {
    pub fn zeros(shape: Shape3) -> Self {
        Self::filled(shape, 0.0)
    }

    pub fn filled(shape: Shape3, value: f32) -> Self {
        Self {
            shape,
            data: vec![value; shape.len()],
        }
    }

    /// Wrap an existing row-major buffer.
    pub fn from_vec(shape: Shape3, data: Vec<f32>) -> Result<Self, LatticeError> {
        if data.len() != shape.len() {
            return Err(LatticeError::LengthMismatch {
                shape,
                expected: shape.len(),
                len: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// Fill a lattice with uniform samples from `[lo, hi)` using a seeded RNG.
    pub fn random_uniform(shape: Shape3, lo: f32, hi: f32, seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let span = hi - lo;
        let data = (0..shape.len())
            .map(|_| lo + span * rng.gen::<f32>())
            .collect();
        Self { shape, data }
    }

    pub fn shape(&self) -> Shape3 {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize, k: usize) -> f32 {
        self.data[self.shape.index(i, j, k)]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, k: usize, value: f32) {
        let idx = self.shape.index(i, j, k);
        self.data[idx] = value;
    }

    /// Accumulate `value` into cell `(i, j, k)`.
    #[inline]
    pub fn add(&mut self, i: usize, j: usize, k: usize, value: f32) {
        let idx = self.shape.index(i, j, k);
        self.data[idx] += value;
    }

    pub fn ensure_same_shape(&self, other: &Lattice3) -> Result<(), LatticeError> {
        if self.shape != other.shape {
            return Err(LatticeError::ShapeMismatch {
                expected: self.shape,
                actual: other.shape,
            });
        }
        Ok(())
    }

    /// Elementwise combination of two co-shaped lattices.
    pub fn zip_map(
        &self,
        other: &Lattice3,
        f: impl Fn(f32, f32) -> f32,
    ) -> Result<Lattice3, LatticeError> {
        self.ensure_same_shape(other)?;
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| f(a, b))
            .collect();
        Ok(Lattice3 {
            shape: self.shape,
            data,
        })
    }

    /// `self += alpha * x`
    pub fn axpy(&mut self, alpha: f32, x: &Lattice3) -> Result<(), LatticeError> {
        self.ensure_same_shape(x)?;
        for (y, &xv) in self.data.iter_mut().zip(x.data.iter()) {
            *y += alpha * xv;
        }
        Ok(())
    }

    // ─── Reductions ───

    /// Sum of all cells (accumulated in f64).
    pub fn sum(&self) -> f64 {
        self.data.iter().map(|&v| v as f64).sum()
    }

    pub fn max(&self) -> f32 {
        self.data.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn min(&self) -> f32 {
        self.data.iter().copied().fold(f32::INFINITY, f32::min)
    }

    /// Largest absolute value; 0 for an empty lattice.
    pub fn max_abs(&self) -> f32 {
        self.data.iter().fold(0.0f32, |m, v| m.max(v.abs()))
    }

    /// Euclidean (L2) norm over all cells.
    pub fn norm(&self) -> f32 {
        self.data
            .iter()
            .map(|&v| (v as f64) * (v as f64))
            .sum::<f64>()
            .sqrt() as f32
    }

    /// True when the spread `max - min` is within `tol · max(1, |max|)`.
    ///
    /// A NaN cell makes the lattice non-flat.
    pub fn is_flat(&self, tol: f32) -> bool {
        if self.data.is_empty() {
            return true;
        }
        if self.data.iter().any(|v| v.is_nan()) {
            return false;
        }
        let (lo, hi) = (self.min(), self.max());
        hi - lo <= tol * hi.abs().max(1.0)
    }

    /// Flat index and value of the first NaN/Inf cell, if any.
    pub fn first_non_finite(&self) -> Option<(usize, f32)> {
        self.data
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite())
            .map(|(i, &v)| (i, v))
    }
}
