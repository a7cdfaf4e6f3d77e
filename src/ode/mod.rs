//! ODE integration for continuous-time models
//!
//! Fixed-step classic fourth-order Runge-Kutta over a sub-interval of the
//! schedule. Stage buffers are owned by each call, so a single integrator
//! may be shared by independent runs.

mod rk4;

pub use rk4::Rk4;

use nalgebra::DVector;

/// Right-hand side of an autonomous or time-dependent ODE `dy/dt = f(t, y)`.
pub trait OdeSystem {
    /// Length of the state vector.
    fn dim(&self) -> usize;

    /// Writes `f(t, y)` into `dy`.
    fn derivative(&self, t: f64, y: &DVector<f64>, dy: &mut DVector<f64>);
}

/// Integrator settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegratorConfig {
    /// Initial (and nominal) step size
    pub h0: f64,
    /// Unit roundoff used by the minimum step-size check
    pub uround: f64,
}

impl IntegratorConfig {
    /// Creates a configuration with step `h0` and the machine unit roundoff.
    ///
    /// # Panics
    /// Panics if `h0 <= 0`.
    pub fn new(h0: f64) -> Self {
        assert!(h0 > 0.0, "Integrator step size must be positive");
        Self {
            h0,
            uround: f64::EPSILON,
        }
    }
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self::new(1e-2)
    }
}
