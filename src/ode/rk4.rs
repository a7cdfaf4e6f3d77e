//! Classic RK4 stepping
//!
//! Steps of `h0` from `t1` until the next step would overshoot `t2`, then one
//! clamped step lands exactly on `t2`.

use nalgebra::DVector;

use super::{IntegratorConfig, OdeSystem};
use crate::{FilterError, Result};

/// Classic fourth-order Runge-Kutta integrator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rk4 {
    config: IntegratorConfig,
}

impl Rk4 {
    /// Creates an integrator with the given settings.
    pub fn new(config: IntegratorConfig) -> Self {
        Self { config }
    }

    /// Integrator settings.
    pub fn config(&self) -> &IntegratorConfig {
        &self.config
    }

    /// Integrates `y` in place from `t1` to `t2`.
    ///
    /// Steps of `h0` are taken; a step that would land within 1% of `t2`
    /// (or overshoot it) is stretched or shortened to land exactly on `t2`.
    ///
    /// # Errors
    /// [`FilterError::StepSizeUnderflow`] if the step is negligible relative
    /// to the current time at unit roundoff.
    ///
    /// # Panics
    /// Panics if `t1 >= t2` or `y` does not match the system dimension.
    pub fn integrate<S: OdeSystem + ?Sized>(
        &self,
        system: &S,
        t1: f64,
        t2: f64,
        y: &mut DVector<f64>,
    ) -> Result<()> {
        assert!(t1 < t2, "Integration interval [{}, {}] is empty", t1, t2);
        let n = system.dim();
        assert_eq!(y.len(), n, "State length does not match the ODE system");

        let mut k1 = DVector::zeros(n);
        let mut k2 = DVector::zeros(n);
        let mut k3 = DVector::zeros(n);
        let mut k4 = DVector::zeros(n);
        let mut tmp = DVector::zeros(n);

        let mut t = t1;
        let mut h = self.config.h0;
        while t < t2 {
            if 0.1 * h.abs() <= t.abs() * self.config.uround {
                return Err(FilterError::StepSizeUnderflow { t, h });
            }
            let last = t + 1.01 * h - t2 > 0.0;
            if last {
                h = t2 - t;
                if h <= 0.0 {
                    break;
                }
            }

            system.derivative(t, y, &mut k1);

            tmp.copy_from(y);
            tmp.axpy(0.5 * h, &k1, 1.0);
            system.derivative(t + 0.5 * h, &tmp, &mut k2);

            tmp.copy_from(y);
            tmp.axpy(0.5 * h, &k2, 1.0);
            system.derivative(t + 0.5 * h, &tmp, &mut k3);

            tmp.copy_from(y);
            tmp.axpy(h, &k3, 1.0);
            system.derivative(t + h, &tmp, &mut k4);

            y.axpy(h / 6.0, &k1, 1.0);
            y.axpy(h / 3.0, &k2, 1.0);
            y.axpy(h / 3.0, &k3, 1.0);
            y.axpy(h / 6.0, &k4, 1.0);

            t = if last { t2 } else { t + h };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Oscillator;

    impl OdeSystem for Oscillator {
        fn dim(&self) -> usize {
            2
        }

        fn derivative(&self, _t: f64, y: &DVector<f64>, dy: &mut DVector<f64>) {
            dy[0] = y[1];
            dy[1] = -y[0];
        }
    }

    struct Decay;

    impl OdeSystem for Decay {
        fn dim(&self) -> usize {
            1
        }

        fn derivative(&self, _t: f64, y: &DVector<f64>, dy: &mut DVector<f64>) {
            dy[0] = -y[0];
        }
    }

    #[test]
    fn test_harmonic_oscillator() {
        let rk4 = Rk4::new(IntegratorConfig::new(1e-3));
        let mut y = DVector::from_vec(vec![1.0, 0.0]);
        rk4.integrate(&Oscillator, 0.0, std::f64::consts::TAU, &mut y).unwrap();
        assert!((y[0] - 1.0).abs() < 1e-8);
        assert!(y[1].abs() < 1e-8);
    }

    #[test]
    fn test_final_step_clamped() {
        // 0.25 is not a multiple of 0.1; the last step is shortened
        let rk4 = Rk4::new(IntegratorConfig::new(0.1));
        let mut y = DVector::from_vec(vec![1.0]);
        rk4.integrate(&Decay, 0.0, 0.25, &mut y).unwrap();
        assert!((y[0] - (-0.25_f64).exp()).abs() < 1e-6);
    }

    #[test]
    fn test_single_short_interval() {
        let rk4 = Rk4::default();
        let mut y = DVector::from_vec(vec![1.0]);
        rk4.integrate(&Decay, 1.0, 1.001, &mut y).unwrap();
        assert!((y[0] - (-0.001_f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_step_underflow() {
        let rk4 = Rk4::new(IntegratorConfig::new(1e-12));
        let mut y = DVector::from_vec(vec![1.0]);
        let result = rk4.integrate(&Decay, 1e6, 1e6 + 1.0, &mut y);
        assert!(matches!(result, Err(FilterError::StepSizeUnderflow { .. })));
    }

    #[test]
    #[should_panic(expected = "is empty")]
    fn test_empty_interval_panics() {
        let rk4 = Rk4::default();
        let mut y = DVector::from_vec(vec![1.0]);
        let _ = rk4.integrate(&Decay, 1.0, 1.0, &mut y);
    }
}
