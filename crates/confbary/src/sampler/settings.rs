//! Solver settings and the error type for construction-time failures.

use std::fmt;

/// Tunables for the conformal-barycenter Newton iteration.
///
/// Defaults: converge to √ε, give up once the residual cannot be pushed
/// below a small multiple of machine epsilon, and damp with an Armijo
/// backtracking line search.
#[derive(Clone, Copy, Debug)]
pub struct SamplerSettings {
    /// Convergence target for the Kantorovich error estimator.
    pub tolerance: f64,
    /// Residuals below this are treated as "will not improve in f64".
    pub give_up_tolerance: f64,
    /// Scale of the `regularization * squared_residual` shift added to the
    /// Hessian before factorization.
    pub regularization: f64,
    /// Hard cap on Newton iterations per sample.
    pub max_iter: usize,
    /// Armijo sufficient-decrease factor σ.
    pub armijo_slope_factor: f64,
    /// Armijo backtracking shrink factor γ.
    pub armijo_shrink_factor: f64,
    /// Backtracking budget per line search.
    pub max_backtrackings: usize,
    /// Toggle for the damped line search; pure Newton steps otherwise.
    pub use_linesearch: bool,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            tolerance: f64::EPSILON.sqrt(),
            give_up_tolerance: 100.0 * f64::EPSILON,
            regularization: 1.0,
            max_iter: 1000,
            armijo_slope_factor: 0.01,
            armijo_shrink_factor: 0.5,
            max_backtrackings: 20,
            use_linesearch: true,
        }
    }
}

/// Construction-time and buffer-validation failures.
///
/// Convergence failures are *not* errors: a sample that exhausts
/// `max_iter` or hits the give-up tolerance is still returned, flagged via
/// [`Sampler::succeeded`](super::Sampler::succeeded) and the residual.
#[derive(Debug)]
pub enum SamplerError {
    InvalidParameter { reason: String },
    BufferSizeMismatch { expected: usize, got: usize },
}

impl SamplerError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            reason: reason.into(),
        }
    }

    pub(crate) fn check_len(expected: usize, got: usize) -> Result<(), Self> {
        if expected == got {
            Ok(())
        } else {
            Err(Self::BufferSizeMismatch { expected, got })
        }
    }
}

impl fmt::Display for SamplerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter { reason } => write!(f, "invalid sampler parameter: {reason}"),
            Self::BufferSizeMismatch { expected, got } => {
                write!(f, "buffer size mismatch: expected {expected} elements, got {got}")
            }
        }
    }
}

impl std::error::Error for SamplerError {}
