//! Lorenz-63 model
//!
//! The chaotic three-variable system
//!
//! ```text
//! dx/dt = σ (y − x)
//! dy/dt = x (ρ − z) − y
//! dz/dt = x y − β z
//! ```
//!
//! integrated with RK4 between schedule points, with additive Gaussian
//! process noise at each point and direct Gaussian observation of any
//! subset of the coordinates. The transition Jacobian comes from
//! integrating the tangent-linear propagator alongside the state.

use nalgebra::{DMatrix, DVector, Matrix3};
use rand::{Rng, RngCore};
use rand_distr::StandardNormal;

use super::{ObservationSet, ObservationSource, Simulator};
use crate::ode::{IntegratorConfig, OdeSystem, Rk4};
use crate::types::mask::{layout_vars, Mask};
use crate::types::schedule::ScheduleElement;
use crate::types::state::{Dimensions, InitSource, State};
use crate::Result;

const ND: usize = 3;

/// Lorenz-63 parameters and noise levels.
#[derive(Debug, Clone, PartialEq)]
pub struct Lorenz63Config {
    /// Prandtl number σ
    pub sigma: f64,
    /// Rayleigh number ρ
    pub rho: f64,
    /// Geometric factor β
    pub beta: f64,
    /// Process-noise standard deviation per unit time
    pub process_std: f64,
    /// Observation-noise standard deviation
    pub obs_std: f64,
    /// Prior mean of the initial state
    pub x0: [f64; 3],
    /// Prior standard deviation of each initial coordinate
    pub p0_std: f64,
    /// Integrator settings
    pub integrator: IntegratorConfig,
}

impl Default for Lorenz63Config {
    fn default() -> Self {
        Self {
            sigma: 10.0,
            rho: 28.0,
            beta: 8.0 / 3.0,
            process_std: 0.5,
            obs_std: 1.0,
            x0: [1.0, 1.0, 1.0],
            p0_std: 1.0,
            integrator: IntegratorConfig::new(1e-2),
        }
    }
}

impl Lorenz63Config {
    /// Parameter vector `[σ, ρ, β]`.
    pub fn parameters(&self) -> DVector<f64> {
        DVector::from_vec(vec![self.sigma, self.rho, self.beta])
    }
}

// ============================================================================
// Flow
// ============================================================================

/// Lorenz-63 vector field, optionally augmented with its tangent-linear
/// propagator Φ (stored column-major after the state) with `dΦ/dt = J Φ`.
#[derive(Debug, Clone, Copy)]
struct Flow {
    sigma: f64,
    rho: f64,
    beta: f64,
    tangent: bool,
}

impl Flow {
    #[rustfmt::skip]
    fn jacobian(&self, x: f64, y: f64, z: f64) -> Matrix3<f64> {
        Matrix3::new(
            -self.sigma, self.sigma, 0.0,
            self.rho - z, -1.0, -x,
            y, x, -self.beta,
        )
    }
}

impl OdeSystem for Flow {
    fn dim(&self) -> usize {
        if self.tangent {
            ND + ND * ND
        } else {
            ND
        }
    }

    fn derivative(&self, _t: f64, s: &DVector<f64>, ds: &mut DVector<f64>) {
        let (x, y, z) = (s[0], s[1], s[2]);
        ds[0] = self.sigma * (y - x);
        ds[1] = x * (self.rho - z) - y;
        ds[2] = x * y - self.beta * z;
        if self.tangent {
            let phi = Matrix3::from_column_slice(&s.as_slice()[ND..]);
            let dphi = self.jacobian(x, y, z) * phi;
            ds.rows_mut(ND, ND * ND).copy_from_slice(dphi.as_slice());
        }
    }
}

// ============================================================================
// Simulator
// ============================================================================

/// Lorenz-63 simulator.
///
/// Parameters `[σ, ρ, β]` may be fixed per run through
/// [`Simulator::init_with_parameters`]; the noise levels and prior come from
/// the [`Lorenz63Config`].
#[derive(Debug, Clone)]
pub struct Lorenz63 {
    config: Lorenz63Config,
    integrator: Rk4,
    observations: ObservationSet,
}

impl Lorenz63 {
    /// Creates a simulator.
    ///
    /// # Panics
    /// Panics if the noise levels are not positive or the observation set
    /// does not have exactly three components.
    pub fn new(config: Lorenz63Config, observations: ObservationSet) -> Self {
        assert!(config.process_std > 0.0, "Process noise must be positive");
        assert!(config.obs_std > 0.0, "Observation noise must be positive");
        assert!(config.p0_std > 0.0, "Prior standard deviation must be positive");
        assert_eq!(observations.no(), ND, "Lorenz-63 observes three coordinates");
        Self {
            integrator: Rk4::new(config.integrator),
            config,
            observations,
        }
    }

    /// Current configuration.
    pub fn config(&self) -> &Lorenz63Config {
        &self.config
    }

    fn flow(&self, tangent: bool) -> Flow {
        Flow {
            sigma: self.config.sigma,
            rho: self.config.rho,
            beta: self.config.beta,
            tangent,
        }
    }

    /// Simulates a noisy trajectory and its observations.
    ///
    /// The truth starts at `config.x0` at time `start`. At each of `times`
    /// it is integrated forward, perturbed by process noise, and observed
    /// on the global coordinate indices `observed` with observation noise.
    ///
    /// Returns the observation set and the true state at each time.
    ///
    /// # Panics
    /// Panics if `times` are not strictly increasing after `start`.
    pub fn synthesize<R: Rng + ?Sized>(
        config: &Lorenz63Config,
        rng: &mut R,
        start: f64,
        times: &[f64],
        observed: &[usize],
    ) -> Result<(ObservationSet, Vec<DVector<f64>>)> {
        let vars = layout_vars(&[("x", ND)]);
        let mask = if observed.len() == ND {
            Mask::dense(&vars)
        } else {
            Mask::from_global_indices(&vars, observed)
        };
        let map = mask.index_map(&vars);
        let mut set = ObservationSet::new(vars);

        let flow = Flow {
            sigma: config.sigma,
            rho: config.rho,
            beta: config.beta,
            tangent: false,
        };
        let integrator = Rk4::new(config.integrator);
        let mut x = DVector::from_row_slice(&config.x0);
        let mut t = start;
        let mut truth = Vec::with_capacity(times.len());
        for &next in times {
            if next > t {
                integrator.integrate(&flow, t, next, &mut x)?;
                let scale = config.process_std * (next - t).sqrt();
                for i in 0..ND {
                    x[i] += scale * rng.sample::<f64, _>(StandardNormal);
                }
                t = next;
            }
            let values: Vec<f64> = map
                .iter()
                .map(|&i| x[i] + config.obs_std * rng.sample::<f64, _>(StandardNormal))
                .collect();
            set.push(next, mask.clone(), &values);
            truth.push(x.clone());
        }
        Ok((set, truth))
    }
}

impl Simulator for Lorenz63 {
    fn dims(&self) -> Dimensions {
        Dimensions::new(ND, ND, ND)
    }

    fn num_parameters(&self) -> usize {
        3
    }

    fn init(
        &mut self,
        _rng: &mut dyn RngCore,
        now: &ScheduleElement,
        state: &mut State,
        init: Option<&InitSource>,
    ) -> Result<()> {
        if let Some(theta) = init.and_then(|s| s.parameters.as_ref()) {
            assert_eq!(theta.len(), 3, "Lorenz-63 takes three parameters");
            self.config.sigma = theta[0];
            self.config.rho = theta[1];
            self.config.beta = theta[2];
        }
        state.parameters = self.config.parameters();

        state.time = now.time();
        state.dynamic.fill(0.0);
        match init.and_then(|s| s.mean.as_ref()) {
            Some(mean) => state.dynamic.rows_mut(ND, ND).copy_from(mean),
            None => state
                .dynamic
                .rows_mut(ND, ND)
                .copy_from_slice(&self.config.x0),
        }

        state
            .lin
            .q
            .view_mut((ND, ND), (ND, ND))
            .fill_diagonal(self.config.p0_std);
        Ok(())
    }

    fn advance(&mut self, next: &ScheduleElement, state: &mut State) -> Result<()> {
        let t1 = state.time;
        let t2 = next.time();

        let mut s = DVector::zeros(ND + ND * ND);
        s.rows_mut(0, ND).copy_from(&state.dynamic.rows(ND, ND));
        s.rows_mut(ND, ND * ND)
            .copy_from_slice(Matrix3::<f64>::identity().as_slice());
        self.integrator.integrate(&self.flow(true), t1, t2, &mut s)?;

        let phi = DMatrix::from_column_slice(ND, ND, &s.as_slice()[ND..]);
        state.dynamic.rows_mut(0, ND).fill(0.0);
        state.dynamic.rows_mut(ND, ND).copy_from(&s.rows(0, ND));
        state.time = t2;

        state.lin.f.view_mut((0, ND), (ND, ND)).fill_with_identity();
        state.lin.f.view_mut((ND, ND), (ND, ND)).copy_from(&phi.transpose());
        state
            .lin
            .q
            .view_mut((0, 0), (ND, ND))
            .fill_diagonal(self.config.process_std * (t2 - t1).sqrt());
        Ok(())
    }

    fn observe(&mut self, state: &mut State) {
        state.observed.copy_from(&state.dynamic.rows(ND, ND));
        state.lin.g.view_mut((ND, 0), (ND, ND)).fill_with_identity();
        state.lin.r.fill_diagonal(self.config.obs_std);
    }

    fn observations(&self) -> &dyn ObservationSource {
        &self.observations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_tangent_matches_finite_difference() {
        let config = Lorenz63Config::default();
        let obs = ObservationSet::new(layout_vars(&[("x", 3)]));
        let mut model = Lorenz63::new(config.clone(), obs);

        let x0 = [1.0, 2.0, 20.0];
        let mut state = State::new(model.dims(), 3);
        state.dynamic.rows_mut(ND, ND).copy_from_slice(&x0);
        let next = ScheduleElement::new(0.05, 1, false, 0, true, 1);
        model.advance(&next, &mut state).unwrap();
        let base = state.dynamic.rows(ND, ND).clone_owned();

        let eps = 1e-6;
        let flow = model.flow(false);
        let rk4 = Rk4::new(config.integrator);
        for i in 0..ND {
            let mut x = DVector::from_row_slice(&x0);
            x[i] += eps;
            rk4.integrate(&flow, 0.0, 0.05, &mut x).unwrap();
            for j in 0..ND {
                let fd = (x[j] - base[j]) / eps;
                // F[i, j] = d x'_j / d x_i
                let f = state.lin.f[(ND + i, ND + j)];
                assert!((fd - f).abs() < 1e-3, "F[{}, {}]: {} vs {}", i, j, f, fd);
            }
        }
    }

    #[test]
    fn test_init_with_parameters() {
        let obs = ObservationSet::new(layout_vars(&[("x", 3)]));
        let mut model = Lorenz63::new(Lorenz63Config::default(), obs);
        let mut rng = StdRng::seed_from_u64(3);
        let mut state = State::new(model.dims(), 3);
        let now = ScheduleElement::new(0.0, 0, false, 0, true, 0);
        let theta = DVector::from_vec(vec![9.0, 27.0, 2.5]);
        model.init_with_parameters(&mut rng, &theta, &now, &mut state).unwrap();
        assert_eq!(state.parameters, theta);
        assert_eq!(model.config().rho, 27.0);
        assert_eq!(state.lin.q[(3, 3)], 1.0);
        assert_eq!(state.lin.q[(0, 0)], 0.0);
    }

    #[test]
    fn test_synthesize_sparse() {
        let config = Lorenz63Config::default();
        let mut rng = StdRng::seed_from_u64(7);
        let times = [0.1, 0.2, 0.3];
        let (obs, truth) = Lorenz63::synthesize(&config, &mut rng, 0.0, &times, &[0, 2]).unwrap();
        assert_eq!(obs.len(), 3);
        assert_eq!(truth.len(), 3);
        assert_eq!(obs.mask(0).size(), 2);
        assert!(obs.values(1)[1].is_nan());
        assert!(obs.values(1)[0].is_finite());
    }
}
