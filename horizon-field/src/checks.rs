//! Invariant checks shared by the pipeline stages.
//!
//! Every stage validates its inputs up front and fails on the first
//! violation, before any partial result is produced.

use horizon_math::{Lattice3, Shape3};

use crate::error::{mismatch, FieldError, FieldResult};

/// Fail if any cell is NaN or Inf.
pub fn ensure_finite(lattice: &Lattice3, what: &'static str) -> FieldResult<()> {
    match lattice.first_non_finite() {
        Some((index, value)) => Err(FieldError::NonFinite { what, index, value }),
        None => Ok(()),
    }
}

/// Fail if the L2 norm exceeds `threshold`.
///
/// Call after [`ensure_finite`]: a non-finite lattice has a non-finite
/// norm and should be reported as garbage, not as divergence.
pub fn ensure_stable(lattice: &Lattice3, threshold: f32, what: &'static str) -> FieldResult<f32> {
    let norm = lattice.norm();
    if norm > threshold {
        return Err(FieldError::Diverged {
            what,
            norm,
            threshold,
        });
    }
    Ok(norm)
}

/// Fail unless the lattice is `L × L × L` with `L >= 3`. Returns `L`.
pub fn ensure_cubic(lattice: &Lattice3, what: &'static str) -> FieldResult<usize> {
    let shape = lattice.shape();
    if !shape.is_cubic() {
        return Err(FieldError::shape(what, format!("{shape} is not cubic")));
    }
    if shape.nx < 3 {
        return Err(FieldError::shape(
            what,
            format!("side {} leaves no interior cells (need at least 3)", shape.nx),
        ));
    }
    Ok(shape.nx)
}

/// Fail unless the lattice is a non-empty cube of any side. Returns the side.
pub fn ensure_non_empty_cube(lattice: &Lattice3, what: &'static str) -> FieldResult<usize> {
    let shape = lattice.shape();
    if !shape.is_cubic() || shape.is_empty() {
        return Err(FieldError::shape(what, format!("{shape} is not a non-empty cube")));
    }
    Ok(shape.nx)
}

pub fn ensure_shape(lattice: &Lattice3, expected: Shape3, what: &'static str) -> FieldResult<()> {
    if lattice.shape() != expected {
        return Err(FieldError::shape(what, mismatch(expected, lattice.shape())));
    }
    Ok(())
}

/// Fail unless `value` is finite and strictly positive.
pub fn ensure_positive(value: f32, name: &'static str) -> FieldResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(FieldError::param(name, format!("must be finite and > 0, got {value}")));
    }
    Ok(())
}

/// Fail unless `value` is finite and non-negative.
pub fn ensure_non_negative(value: f32, name: &'static str) -> FieldResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(FieldError::param(name, format!("must be finite and >= 0, got {value}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finite_and_stable_are_distinct() {
        let mut lat = Lattice3::filled(Shape3::cubic(3), 10.0);
        assert!(ensure_finite(&lat, "metric").is_ok());
        let err = ensure_stable(&lat, 1.0, "metric").unwrap_err();
        assert!(matches!(err, FieldError::Diverged { .. }));

        lat.set(0, 0, 1, f32::INFINITY);
        let err = ensure_finite(&lat, "metric").unwrap_err();
        assert!(matches!(err, FieldError::NonFinite { index: 1, .. }));
    }

    #[test]
    fn test_cubic_guard() {
        assert_eq!(ensure_cubic(&Lattice3::zeros(Shape3::cubic(5)), "S").unwrap(), 5);
        assert!(ensure_cubic(&Lattice3::zeros(Shape3::new(5, 5, 4)), "S").is_err());
        assert!(ensure_cubic(&Lattice3::zeros(Shape3::cubic(2)), "S").is_err());
    }

    #[test]
    fn test_parameter_guards() {
        assert!(ensure_positive(0.1, "dt").is_ok());
        assert!(ensure_positive(0.0, "dt").is_err());
        assert!(ensure_positive(f32::NAN, "dt").is_err());
        assert!(ensure_non_negative(0.0, "damping").is_ok());
        assert!(ensure_non_negative(-1.0, "damping").is_err());
    }
}
