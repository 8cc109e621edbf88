//! Error taxonomy for the field pipeline stages.

use horizon_math::{LatticeError, Shape3};
use thiserror::Error;

pub type FieldResult<T> = Result<T, FieldError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    /// A lattice has the wrong shape for the stage it was passed to.
    #[error("invalid shape for {what}: {detail}")]
    InvalidShape { what: &'static str, detail: String },

    /// NaN or Inf found in a field.
    #[error("{what} contains non-finite value {value} at cell {index}")]
    NonFinite {
        what: &'static str,
        index: usize,
        value: f32,
    },

    /// Field norm exceeded the divergence threshold.
    #[error("{what} diverged: norm {norm} exceeds threshold {threshold}")]
    Diverged {
        what: &'static str,
        norm: f32,
        threshold: f32,
    },

    #[error("invalid parameter {name}: {detail}")]
    InvalidParameter { name: &'static str, detail: String },

    #[error("invalid weight matrix: {0}")]
    InvalidWeights(String),
}

impl FieldError {
    pub(crate) fn shape(what: &'static str, detail: impl Into<String>) -> Self {
        FieldError::InvalidShape {
            what,
            detail: detail.into(),
        }
    }

    pub(crate) fn param(name: &'static str, detail: impl Into<String>) -> Self {
        FieldError::InvalidParameter {
            name,
            detail: detail.into(),
        }
    }
}

impl From<LatticeError> for FieldError {
    fn from(err: LatticeError) -> Self {
        let detail = err.to_string();
        match err {
            LatticeError::ShapeMismatch { .. } => FieldError::shape("lattice", detail),
            LatticeError::LengthMismatch { .. } => FieldError::shape("lattice buffer", detail),
        }
    }
}

/// Describe an expected vs. actual shape pair.
pub(crate) fn mismatch(expected: Shape3, actual: Shape3) -> String {
    format!("expected {expected}, got {actual}")
}
