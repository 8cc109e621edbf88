//! Metric Relaxation Step
//!
//! One explicit Euler step of the damped metric flow on the interior lattice:
//!
//!   ∂g/∂t = R00(S) - λ·g
//!
//! where λ is the damping coefficient. Before the update the stability guard
//! compares the largest proposed per-cell change `max|rate| · dt` against
//! `safety · dx²` and shrinks the effective dt when the bound would be
//! exceeded. The candidate metric is checked for NaN/Inf and then for
//! divergence before it replaces the caller's lattice; on failure the
//! caller's metric is left untouched.
//!
//! The guard bounds a single step only. Repeated steps under a persistent
//! source can still grow the metric; the damping term slows that growth but
//! does not cap it.

use horizon_math::{Lattice3, Shape3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::checks::{
    ensure_cubic, ensure_finite, ensure_non_negative, ensure_positive, ensure_shape, ensure_stable,
};
use crate::curvature::{ricci_tensor, CurvatureParams};
use crate::error::{FieldError, FieldResult};

/// Default L2-norm bound past which the metric counts as diverged.
pub const DIVERGENCE_THRESHOLD: f32 = 1.0e6;

/// Parameters of one relaxation step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelaxationParams {
    /// Requested timestep
    pub dt: f32,
    /// Lattice spacing
    pub dx: f32,
    /// Damping coefficient λ
    pub damping: f32,
    /// Guard bound as a fraction of dx²
    pub safety: f32,
    /// Metric L2 norm treated as divergence
    pub divergence_threshold: f32,
    pub curvature: CurvatureParams,
}

impl Default for RelaxationParams {
    fn default() -> Self {
        Self {
            dt: 0.05,
            dx: 1.0,
            damping: 0.1,
            safety: 0.4,
            divergence_threshold: DIVERGENCE_THRESHOLD,
            curvature: CurvatureParams::default(),
        }
    }
}

impl RelaxationParams {
    /// Largest permitted per-cell change in one step, `safety · dx²`.
    pub fn limit(&self) -> f32 {
        self.safety * self.dx * self.dx
    }

    pub fn validate(&self) -> FieldResult<()> {
        ensure_positive(self.dt, "dt")?;
        ensure_positive(self.dx, "dx")?;
        ensure_positive(self.safety, "safety")?;
        ensure_non_negative(self.damping, "damping")?;
        ensure_positive(self.divergence_threshold, "divergence_threshold")?;
        if !self.curvature.kappa.is_finite() || !self.curvature.gamma.is_finite() {
            return Err(FieldError::param(
                "curvature",
                format!(
                    "kappa and gamma must be finite, got kappa={} gamma={}",
                    self.curvature.kappa, self.curvature.gamma
                ),
            ));
        }
        Ok(())
    }
}

/// Result of the stability guard for one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuardOutcome {
    pub effective_dt: f32,
    /// `max|rate| · dt` with the requested dt
    pub max_delta: f32,
    pub limit: f32,
    pub engaged: bool,
}

/// Shrink `dt` so that `max_rate · dt_eff <= safety · dx²`.
///
/// `max_rate` is `max|R00 - damping · g|`, the full per-cell rate the step
/// applies; for a zero metric it equals `max|R00|`. A zero rate never
/// engages the guard.
pub fn stability_guard(max_rate: f32, dt: f32, dx: f32, safety: f32) -> GuardOutcome {
    let limit = safety * dx * dx;
    let max_delta = max_rate * dt;
    if max_delta > limit && max_delta != 0.0 {
        GuardOutcome {
            effective_dt: dt * limit / max_delta,
            max_delta,
            limit,
            engaged: true,
        }
    } else {
        GuardOutcome {
            effective_dt: dt,
            max_delta,
            limit,
            engaged: false,
        }
    }
}

/// Largest dt for which the guard stays inactive under `rate`.
///
/// Returns `f32::INFINITY` when the rate is zero everywhere.
pub fn max_stable_dt(rate: &Lattice3, dx: f32, safety: f32) -> f32 {
    let max_rate = rate.max_abs();
    if max_rate == 0.0 {
        return f32::INFINITY;
    }
    safety * dx * dx / max_rate
}

/// What one relaxation step did.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelaxationReport {
    pub requested_dt: f32,
    pub effective_dt: f32,
    pub max_delta: f32,
    pub limit: f32,
    pub guard_engaged: bool,
    /// Largest |g| after the update
    pub metric_max_abs: f32,
    /// L2 norm of g after the update
    pub metric_norm: f32,
}

/// Validate shapes, finiteness and parameters for one step.
///
/// Returns the interior shape shared by the metric and the curvature.
pub fn validate_inputs(
    metric: &Lattice3,
    entropy: &Lattice3,
    params: &RelaxationParams,
) -> FieldResult<Shape3> {
    params.validate()?;
    let size = ensure_cubic(entropy, "entropy field")?;
    let interior = Shape3::cubic(size - 2);
    ensure_shape(metric, interior, "metric")?;
    ensure_finite(metric, "metric")?;
    ensure_finite(entropy, "entropy field")?;
    Ok(interior)
}

/// Proposed rate of change `R00 - damping · metric`.
pub fn metric_rate(metric: &Lattice3, r00: &Lattice3, damping: f32) -> FieldResult<Lattice3> {
    Ok(r00.zip_map(metric, |r, g| r - damping * g)?)
}

/// Replace `metric` with `candidate` if it is finite and under the threshold.
///
/// Returns the candidate's L2 norm. On error `metric` is left unchanged.
pub fn commit_metric(
    metric: &mut Lattice3,
    candidate: Lattice3,
    divergence_threshold: f32,
) -> FieldResult<f32> {
    ensure_shape(&candidate, metric.shape(), "metric")?;
    ensure_finite(&candidate, "metric")?;
    let norm = ensure_stable(&candidate, divergence_threshold, "metric")?;
    *metric = candidate;
    Ok(norm)
}

/// One guarded relaxation step, computing R00 from the entropy field.
pub fn relax_metric(
    metric: &mut Lattice3,
    entropy: &Lattice3,
    params: &RelaxationParams,
) -> FieldResult<RelaxationReport> {
    validate_inputs(metric, entropy, params)?;
    let curvature = ricci_tensor(entropy, params.dx, &params.curvature)?;
    relax_with_r00(metric, &curvature.r00, params)
}

/// One guarded relaxation step against a precomputed R00.
pub fn relax_with_r00(
    metric: &mut Lattice3,
    r00: &Lattice3,
    params: &RelaxationParams,
) -> FieldResult<RelaxationReport> {
    params.validate()?;
    ensure_shape(r00, metric.shape(), "R00")?;
    ensure_finite(metric, "metric")?;
    ensure_finite(r00, "R00")?;

    let rate = metric_rate(metric, r00, params.damping)?;
    let guard = stability_guard(rate.max_abs(), params.dt, params.dx, params.safety);
    if guard.engaged {
        debug!(
            requested_dt = params.dt,
            effective_dt = guard.effective_dt,
            max_delta = guard.max_delta,
            limit = guard.limit,
            "stability guard engaged"
        );
    }

    let mut candidate = metric.clone();
    candidate.axpy(guard.effective_dt, &rate)?;
    let metric_norm = commit_metric(metric, candidate, params.divergence_threshold)?;

    Ok(RelaxationReport {
        requested_dt: params.dt,
        effective_dt: guard.effective_dt,
        max_delta: guard.max_delta,
        limit: guard.limit,
        guard_engaged: guard.engaged,
        metric_max_abs: metric.max_abs(),
        metric_norm,
    })
}
