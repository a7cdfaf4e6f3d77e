//! SREKF: Square-Root Extended Kalman Filter
//!
//! Approximate Bayesian filtering for nonlinear, noisy state-space models.
//! The filter propagates upper Cholesky factors `U` (with `UᵗU = Σ`) of the
//! predicted and corrected covariances instead of dense covariance matrices,
//! and accumulates the marginal log-likelihood of the observations.
//!
//! # Layout
//!
//! - [`types`]: schedule, observation masks, model state and the
//!   square-root linear-algebra primitives
//! - [`models`]: the [`models::Simulator`] contract plus reference models
//! - [`filters`]: the square-root [`filters::ekf::ExtendedKalmanFilter`] and
//!   a dense reference Kalman filter
//! - [`ode`]: fixed-step RK4 integrator used by ODE-driven models
//! - [`buffer`]: output stores driven by the filter

pub mod buffer;
pub mod filters;
pub mod models;
pub mod ode;
pub mod types;

pub mod prelude {
    pub use crate::buffer::{FilterOutput, KalmanFilterBuffer};
    pub use crate::filters::ekf::{EkfWorkspace, ExtendedKalmanFilter};
    pub use crate::models::*;
    pub use crate::types::mask::*;
    pub use crate::types::schedule::*;
    pub use crate::types::state::*;
}

/// Error types for the library
#[derive(Debug, Clone, PartialEq)]
pub enum FilterError {
    /// A covariance or innovation covariance is not numerically positive definite
    CholeskyFailure,
    /// Integration step size fell below the roundoff-relative minimum
    StepSizeUnderflow {
        /// Time at which the step was attempted
        t: f64,
        /// Offending step size
        h: f64,
    },
    /// A persisted store is missing a dimension or variable, or has one of the wrong shape
    Format(String),
    /// Retrospective sampling was requested without an output store attached
    NoOutput,
}

impl std::error::Error for FilterError {}

impl ::core::fmt::Display for FilterError {
    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        match self {
            FilterError::CholeskyFailure => write!(f, "Matrix is not positive definite"),
            FilterError::StepSizeUnderflow { t, h } => {
                write!(f, "Step size {} too small at time {}", h, t)
            }
            FilterError::Format(msg) => write!(f, "Invalid store: {}", msg),
            FilterError::NoOutput => write!(f, "No output store attached"),
        }
    }
}

pub type Result<T> = ::core::result::Result<T, FilterError>;
