//! Entropy Field Builder
//!
//! Produces the scalar source field S on the full `L × L × L` lattice that
//! drives the curvature operator. Two routes exist:
//!
//! - **Weights**: a square node-weight matrix is reduced to one score per
//!   node (normalized entropy deficit of the row), and each node's score is
//!   splashed onto the lattice as a truncated Gaussian around its position.
//! - **Synthetic**: a single unit impulse at the lattice centre.
//!
//! A splash that leaves the lattice flat (spread within
//! [`ENTROPY_TOLERANCE`]) would feed the
//! curvature operator a field with no curvature at all, so it is replaced
//! by the synthetic impulse and reported as [`EntropySource::SyntheticFallback`].

use horizon_math::{CellMap, Lattice3, Shape3};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::checks::{ensure_cubic, ensure_finite, ensure_positive};
use crate::error::{FieldError, FieldResult};

/// Lower clip applied to every weight before taking its logarithm.
pub const WEIGHT_FLOOR: f32 = 1e-12;

/// Scores and lattice spreads at or below this count as zero.
pub const ENTROPY_TOLERANCE: f32 = 1e-6;

/// Square, non-negative node interaction weights (row-major).
#[derive(Debug, Clone, PartialEq)]
pub struct WeightMatrix {
    n: usize,
    data: Vec<f32>,
}

impl WeightMatrix {
    /// Build from a flat row-major buffer of `n * n` weights.
    pub fn new(n: usize, data: Vec<f32>) -> FieldResult<Self> {
        if data.len() != n * n {
            return Err(FieldError::InvalidWeights(format!(
                "expected {n}x{n} = {} weights, got {}",
                n * n,
                data.len()
            )));
        }
        if let Some((idx, w)) = data
            .iter()
            .enumerate()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(FieldError::InvalidWeights(format!(
                "weight ({}, {}) = {w} is negative or non-finite",
                idx / n.max(1),
                idx % n.max(1)
            )));
        }
        Ok(Self { n, data })
    }

    /// Build from nested rows; every row must have as many entries as there are rows.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> FieldResult<Self> {
        let n = rows.len();
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != n) {
            return Err(FieldError::InvalidWeights(format!(
                "matrix is not square: row {i} has {} entries, expected {n}",
                row.len()
            )));
        }
        Self::new(n, rows.into_iter().flatten().collect())
    }

    /// Every weight equal to `1 / n`.
    pub fn uniform(n: usize) -> Self {
        let w = if n > 0 { 1.0 / n as f32 } else { 0.0 };
        Self {
            n,
            data: vec![w; n * n],
        }
    }

    /// Number of nodes (rows).
    pub fn dim(&self) -> usize {
        self.n
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.n..(i + 1) * self.n]
    }
}

/// Per-node normalized entropy deficit.
///
/// Each row is clipped into `[WEIGHT_FLOOR, 1]`, normalized to sum to one,
/// and scored as `(ln N - S) / ln N` with `S = -Σ_j w_ij ln w_ij`, clamped
/// into `[0, 1]`. Scores within [`ENTROPY_TOLERANCE`] of zero are snapped
/// to exactly zero, so a uniform row scores 0 despite rounding in `S`; a
/// row concentrated on one node scores close to one. With a single node every
/// row is trivially uniform and the result is zero.
pub fn node_entropy(weights: &WeightMatrix) -> Vec<f32> {
    let n = weights.dim();
    if n <= 1 {
        return vec![0.0; n];
    }
    let ln_n = (n as f64).ln();

    (0..n)
        .map(|i| {
            let clipped: Vec<f64> = weights
                .row(i)
                .iter()
                .map(|&w| w.clamp(WEIGHT_FLOOR, 1.0) as f64)
                .collect();
            let total: f64 = clipped.iter().sum();
            let entropy: f64 = clipped
                .iter()
                .map(|&w| {
                    let p = w / total;
                    -p * p.ln()
                })
                .sum();
            let score = ((ln_n - entropy) / ln_n).clamp(0.0, 1.0) as f32;
            if score <= ENTROPY_TOLERANCE {
                0.0
            } else {
                score
            }
        })
        .collect()
}

/// Where an entropy lattice came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntropySource {
    /// Gaussian splash of per-node values
    Splash,
    /// Synthetic single impulse, requested directly
    Synthetic,
    /// Synthetic single impulse substituted for a flat splash
    SyntheticFallback,
}

/// The run's source field, immutable once built.
#[derive(Debug, Clone)]
pub struct EntropyField {
    pub lattice: Lattice3,
    pub source: EntropySource,
}

impl EntropyField {
    /// Synthetic mode: unit impulse at the lattice centre.
    pub fn synthetic(size: usize) -> FieldResult<Self> {
        Ok(Self {
            lattice: synthetic_impulse(size)?,
            source: EntropySource::Synthetic,
        })
    }

    /// Splash per-node values at `positions`, falling back to the synthetic
    /// impulse when the result is flat.
    pub fn from_node_values(
        values: &[f32],
        positions: &[[f32; 3]],
        size: usize,
        dx: f32,
        sigma: f32,
    ) -> FieldResult<Self> {
        let lattice = splash_to_lattice(values, positions, size, dx, sigma)?;
        ensure_finite(&lattice, "entropy field")?;

        if lattice.is_flat(ENTROPY_TOLERANCE) {
            warn!(
                size,
                nodes = values.len(),
                spread = lattice.max() - lattice.min(),
                "entropy splash is flat, substituting synthetic impulse"
            );
            return Ok(Self {
                lattice: synthetic_impulse(size)?,
                source: EntropySource::SyntheticFallback,
            });
        }

        Ok(Self {
            lattice,
            source: EntropySource::Splash,
        })
    }

    /// Full weights route: node entropy, then splash.
    pub fn from_weights(
        weights: &WeightMatrix,
        positions: &[[f32; 3]],
        size: usize,
        dx: f32,
        sigma: f32,
    ) -> FieldResult<Self> {
        if weights.dim() != positions.len() {
            return Err(FieldError::shape(
                "node positions",
                format!(
                    "weight matrix has {} nodes but {} positions were given",
                    weights.dim(),
                    positions.len()
                ),
            ));
        }
        let values = node_entropy(weights);
        Self::from_node_values(&values, positions, size, dx, sigma)
    }

    /// Side length `L` of the lattice.
    pub fn size(&self) -> usize {
        self.lattice.shape().nx
    }

    /// Check the field is cubic, finite and non-negative.
    pub fn validate(&self) -> FieldResult<usize> {
        let size = ensure_cubic(&self.lattice, "entropy field")?;
        ensure_finite(&self.lattice, "entropy field")?;
        if let Some((idx, &v)) = self
            .lattice
            .data()
            .iter()
            .enumerate()
            .find(|(_, v)| **v < 0.0)
        {
            return Err(FieldError::param(
                "entropy field",
                format!("cell {idx} is negative ({v})"),
            ));
        }
        Ok(size)
    }
}

/// `size³` lattice of zeros with a single 1.0 at `(size/2, size/2, size/2)`.
pub fn synthetic_impulse(size: usize) -> FieldResult<Lattice3> {
    if size == 0 {
        return Err(FieldError::shape("entropy field", "lattice size must be positive"));
    }
    let mut lattice = Lattice3::zeros(Shape3::cubic(size));
    let c = size / 2;
    lattice.set(c, c, c, 1.0);
    Ok(lattice)
}

/// Scatter per-node values onto a `size³` lattice as truncated Gaussians.
///
/// Each node adds `value · exp(-r² / 2σ²)` to every cell within
/// `ceil(3σ)` cells (Euclidean, in cell units) of the cell nearest its
/// position. Cells past the lattice edge are dropped. Overlapping
/// splashes accumulate.
pub fn splash_to_lattice(
    values: &[f32],
    positions: &[[f32; 3]],
    size: usize,
    dx: f32,
    sigma: f32,
) -> FieldResult<Lattice3> {
    if values.len() != positions.len() {
        return Err(FieldError::shape(
            "node positions",
            format!("{} values but {} positions", values.len(), positions.len()),
        ));
    }
    if size == 0 {
        return Err(FieldError::shape("entropy field", "lattice size must be positive"));
    }
    ensure_positive(dx, "dx")?;
    ensure_positive(sigma, "sigma")?;
    if let Some((i, v)) = values
        .iter()
        .enumerate()
        .find(|(_, v)| !v.is_finite() || **v < 0.0)
    {
        return Err(FieldError::param(
            "node values",
            format!("value {i} = {v} is negative or non-finite"),
        ));
    }
    if let Some(i) = positions
        .iter()
        .position(|p| p.iter().any(|c| !c.is_finite()))
    {
        return Err(FieldError::param(
            "node positions",
            format!("position {i} is non-finite"),
        ));
    }

    let map = CellMap::for_full_lattice(size, dx);
    let n = i64::try_from(size)
        .map_err(|_| FieldError::shape("entropy field", format!("lattice size {size} is too large")))?;

    let radius = ((3.0 * sigma).ceil() as i64).max(0);
    let radius_sq = radius.saturating_mul(radius);
    let inv_two_sigma_sq = 1.0 / (2.0 * sigma as f64 * sigma as f64);
    // Cells of one axis within `radius` of `c`, clipped to the lattice.
    let span = |c: i64| c.saturating_sub(radius).max(0)..=c.saturating_add(radius).min(n - 1);

    let mut lattice = Lattice3::zeros(Shape3::cubic(size));

    for (&value, pos) in values.iter().zip(positions) {
        if value == 0.0 {
            continue;
        }
        let centre = [map.full_index(pos[0]), map.full_index(pos[1]), map.full_index(pos[2])];

        for i in span(centre[0]) {
            let a = i.saturating_sub(centre[0]);
            for j in span(centre[1]) {
                let b = j.saturating_sub(centre[1]);
                for k in span(centre[2]) {
                    let c = k.saturating_sub(centre[2]);
                    let d2 = a.saturating_mul(a)
                        .saturating_add(b.saturating_mul(b))
                        .saturating_add(c.saturating_mul(c));
                    if d2 > radius_sq {
                        continue;
                    }
                    let weight = (-(d2 as f64) * inv_two_sigma_sq).exp() as f32;
                    lattice.add(i as usize, j as usize, k as usize, value * weight);
                }
            }
        }
    }

    Ok(lattice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_uniform_weights_give_zero_entropy() {
        for n in [2usize, 4, 7, 64] {
            let s = node_entropy(&WeightMatrix::uniform(n));
            assert_eq!(s.len(), n);
            for v in s {
                assert_abs_diff_eq!(v, 0.0, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_identical_rows_any_scale_give_zero_entropy() {
        // Rows of 0.25 do not sum to one; row normalization still makes them uniform.
        let w = WeightMatrix::new(5, vec![0.25; 25]).unwrap();
        for v in node_entropy(&w) {
            assert_abs_diff_eq!(v, 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_concentrated_row_scores_near_one() {
        let mut data = vec![0.0f32; 16];
        data[0] = 1.0;
        for i in 1..4 {
            for j in 0..4 {
                data[i * 4 + j] = 0.25;
            }
        }
        let s = node_entropy(&WeightMatrix::new(4, data).unwrap());
        assert!(s[0] > 0.99, "one-hot row should be near 1, got {}", s[0]);
        assert_abs_diff_eq!(s[1], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_single_node_is_zero() {
        let w = WeightMatrix::new(1, vec![0.7]).unwrap();
        assert_eq!(node_entropy(&w), vec![0.0]);
    }

    #[test]
    fn test_weight_matrix_validation() {
        assert!(WeightMatrix::new(2, vec![0.5; 3]).is_err());
        assert!(WeightMatrix::new(2, vec![0.5, -0.1, 0.5, 0.5]).is_err());
        assert!(WeightMatrix::new(2, vec![0.5, f32::NAN, 0.5, 0.5]).is_err());
        assert!(WeightMatrix::from_rows(vec![vec![1.0, 0.0], vec![1.0]]).is_err());
        let w = WeightMatrix::from_rows(vec![vec![1.0, 0.0], vec![0.5, 0.5]]).unwrap();
        assert_eq!(w.row(1), &[0.5, 0.5]);
    }

    #[test]
    fn test_synthetic_impulse_at_centre() {
        let lat = synthetic_impulse(8).unwrap();
        assert_eq!(lat.get(4, 4, 4), 1.0);
        assert_abs_diff_eq!(lat.sum(), 1.0);
        assert!(synthetic_impulse(0).is_err());
    }

    #[test]
    fn test_splash_peak_and_kernel_shape() {
        let lat = splash_to_lattice(&[2.0], &[[0.0, 0.0, 0.0]], 16, 1.0, 1.0).unwrap();
        // Origin maps to full index 8 on a 16-lattice.
        assert_abs_diff_eq!(lat.get(8, 8, 8), 2.0);
        assert_abs_diff_eq!(lat.get(9, 8, 8), 2.0 * (-0.5f32).exp(), epsilon = 1e-6);
        // radius = ceil(3σ) = 3: distance 3 along an axis is kept, 4 is not.
        assert!(lat.get(11, 8, 8) > 0.0);
        assert_eq!(lat.get(12, 8, 8), 0.0);
        // Corner of the cube at distance sqrt(27) > 3 is outside the sphere.
        assert_eq!(lat.get(11, 11, 11), 0.0);
    }

    #[test]
    fn test_splashes_accumulate() {
        let single = splash_to_lattice(&[1.0], &[[0.0; 3]], 12, 1.0, 0.8).unwrap();
        let double = splash_to_lattice(&[1.0, 1.0], &[[0.0; 3], [0.0; 3]], 12, 1.0, 0.8).unwrap();
        for (a, b) in single.data().iter().zip(double.data()) {
            assert_abs_diff_eq!(2.0 * a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_splash_clips_at_edges() {
        // Node far outside the domain: the kernel never touches the lattice.
        let far = splash_to_lattice(&[1.0], &[[100.0, 0.0, 0.0]], 8, 1.0, 1.0).unwrap();
        assert_eq!(far.sum(), 0.0);
        // Node on the boundary: only in-bounds cells receive mass.
        let edge = splash_to_lattice(&[1.0], &[[-4.0, 0.0, 0.0]], 8, 1.0, 1.0).unwrap();
        assert_abs_diff_eq!(edge.get(0, 4, 4), 1.0);
        assert!(edge.sum() > 1.0);
    }

    #[test]
    fn test_splash_rejects_bad_input() {
        assert!(splash_to_lattice(&[1.0], &[], 8, 1.0, 1.0).is_err());
        assert!(splash_to_lattice(&[-1.0], &[[0.0; 3]], 8, 1.0, 1.0).is_err());
        assert!(splash_to_lattice(&[1.0], &[[f32::NAN, 0.0, 0.0]], 8, 1.0, 1.0).is_err());
        assert!(splash_to_lattice(&[1.0], &[[0.0; 3]], 8, 1.0, 0.0).is_err());
    }

    #[test]
    fn test_flat_splash_falls_back_to_impulse() {
        // Uniform weights → zero entropy everywhere → flat lattice.
        let positions = vec![[0.0, 0.0, 0.0], [1.0, -1.0, 2.0], [-2.0, 1.0, 0.0]];
        let field = EntropyField::from_weights(&WeightMatrix::uniform(3), &positions, 8, 1.0, 1.0)
            .unwrap();
        assert_eq!(field.source, EntropySource::SyntheticFallback);
        assert_eq!(field.lattice, synthetic_impulse(8).unwrap());
    }

    #[test]
    fn test_every_uniform_matrix_falls_back() {
        for n in 2..64 {
            let values = node_entropy(&WeightMatrix::uniform(n));
            assert!(values.iter().all(|&v| v == 0.0), "n={n}: {values:?}");

            let positions: Vec<[f32; 3]> = (0..n)
                .map(|i| [(i % 5) as f32 - 2.0, (i % 3) as f32 - 1.0, 0.0])
                .collect();
            let field = EntropyField::from_weights(&WeightMatrix::uniform(n), &positions, 8, 1.0, 1.0)
                .unwrap_or_else(|e| panic!("n={n}: {e}"));
            assert_eq!(field.source, EntropySource::SyntheticFallback, "n={n}");
        }
    }

    #[test]
    fn test_scaled_uniform_rows_fall_back() {
        let w = WeightMatrix::new(6, vec![0.5; 36]).unwrap();
        assert_eq!(node_entropy(&w), vec![0.0; 6]);
        let positions = vec![[0.0; 3]; 6];
        let field = EntropyField::from_weights(&w, &positions, 8, 1.0, 1.0).unwrap();
        assert_eq!(field.source, EntropySource::SyntheticFallback);
    }

    #[test]
    fn test_scores_stay_in_unit_interval() {
        let w = WeightMatrix::from_rows(vec![
            vec![1.0, 0.0, 0.0],
            vec![0.2, 0.3, 0.5],
            vec![1.0, 1.0, 1.0],
        ])
        .unwrap();
        for v in node_entropy(&w) {
            assert!((0.0..=1.0).contains(&v), "{v}");
        }
    }

    #[test]
    fn test_huge_sigma_covers_lattice_without_blowing_up() {
        let lattice = splash_to_lattice(&[1.0], &[[0.0; 3]], 8, 1.0, 1.0e10).unwrap();
        assert_eq!(lattice.shape(), Shape3::cubic(8));
        // The kernel is essentially flat at this width: every cell receives ~1.
        assert!(lattice.data().iter().all(|&v| (v - 1.0).abs() < 1e-4));

        let wide = splash_to_lattice(&[1.0], &[[0.0; 3]], 8, 1.0, 200.0).unwrap();
        assert!(wide.min() > 0.99);

        // A centre far off the lattice still reaches it when σ is wide enough.
        let remote = splash_to_lattice(&[1.0], &[[1.0e6, 0.0, 0.0]], 8, 1.0, 1.0e10).unwrap();
        assert!(remote.min() > 0.99);
    }

    #[test]
    fn test_non_flat_splash_is_kept() {
        let field =
            EntropyField::from_node_values(&[0.5], &[[1.0, 0.0, 0.0]], 10, 1.0, 1.0).unwrap();
        assert_eq!(field.source, EntropySource::Splash);
        assert_eq!(field.validate().unwrap(), 10);
    }

    #[test]
    fn test_weights_must_match_positions() {
        let err = EntropyField::from_weights(&WeightMatrix::uniform(3), &[[0.0; 3]], 8, 1.0, 1.0)
            .unwrap_err();
        assert!(matches!(err, FieldError::InvalidShape { .. }));
    }
}
