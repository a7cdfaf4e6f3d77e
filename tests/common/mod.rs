//! Common test helpers for filter integration tests

#![allow(dead_code)]

use nalgebra::{DMatrix, DVector};
use rand::RngCore;

use srekf::buffer::{FilterOutput, KalmanFilterBuffer};
use srekf::filters::ekf::ExtendedKalmanFilter;
use srekf::models::{LinearGaussianModel, ObservationSet, ObservationSource, Simulator};
use srekf::types::mask::{layout_vars, Mask};
use srekf::types::schedule::ScheduleElement;
use srekf::types::state::{Dimensions, InitSource, State};
use srekf::Result;

pub const Q: f64 = 0.1;
pub const R: f64 = 0.5;

/// Scalar observations at times 0, 1, 2, ...
pub fn scalar_observations(ys: &[f64]) -> ObservationSet {
    let mut obs = ObservationSet::new(layout_vars(&[("y", 1)]));
    for (i, &y) in ys.iter().enumerate() {
        obs.push_dense(i as f64, DVector::from_element(1, y));
    }
    obs
}

/// Random walk with q = 0.1, r = 0.5 and prior N(0, 1), writing to memory.
pub fn scalar_filter(obs: ObservationSet) -> ExtendedKalmanFilter {
    let model = LinearGaussianModel::random_walk(Q, R, 0.0, 1.0, obs).unwrap();
    ExtendedKalmanFilter::with_output(Box::new(model), Box::new(KalmanFilterBuffer::new(2)))
}

/// One step of the closed-form scalar Kalman filter.
#[derive(Debug, Clone, Copy)]
pub struct ScalarStep {
    pub predicted_mean: f64,
    pub predicted_var: f64,
    pub corrected_mean: f64,
    pub corrected_var: f64,
}

/// Closed-form scalar random-walk filter with an observation at every step.
pub fn closed_form_scalar(ys: &[f64], q: f64, r: f64, m0: f64, p0: f64) -> (Vec<ScalarStep>, f64) {
    let mut steps = Vec::with_capacity(ys.len());
    let (mut m, mut p) = (m0, p0);
    let mut ll = 0.0;
    for (i, &y) in ys.iter().enumerate() {
        if i > 0 {
            p += q;
        }
        let s = p + r;
        ll += -0.5 * ((y - m).powi(2) / s + s.ln() + std::f64::consts::TAU.ln());
        let k = p / s;
        let step = ScalarStep {
            predicted_mean: m,
            predicted_var: p,
            corrected_mean: m + k * (y - m),
            corrected_var: (1.0 - k) * p,
        };
        m = step.corrected_mean;
        p = step.corrected_var;
        steps.push(step);
    }
    (steps, ll)
}

/// Covariance `UᵗU` of a stored factor.
pub fn covariance(u: &DMatrix<f64>) -> DMatrix<f64> {
    u.tr_mul(u)
}

/// Dynamic block of a covariance with `nr` noise variables first.
pub fn dynamic_block(sigma: &DMatrix<f64>, nr: usize) -> DMatrix<f64> {
    let nd = sigma.nrows() - nr;
    sigma.view((nr, nr), (nd, nd)).clone_owned()
}

pub fn assert_upper_factor(u: &DMatrix<f64>, what: &str) {
    for i in 0..u.nrows() {
        assert!(u[(i, i)] >= 0.0, "{}: negative diagonal at {}", what, i);
        for j in 0..i {
            assert_eq!(u[(i, j)], 0.0, "{}: nonzero below diagonal at ({}, {})", what, i, j);
        }
    }
}

pub fn assert_close(a: f64, b: f64, tol: f64, what: &str) {
    assert!((a - b).abs() <= tol, "{}: {} vs {} (tol {})", what, a, b, tol);
}

pub fn assert_matrix_close(a: &DMatrix<f64>, b: &DMatrix<f64>, tol: f64, what: &str) {
    assert_eq!(a.shape(), b.shape(), "{}: shape mismatch", what);
    let diff = (a - b).amax();
    assert!(diff <= tol, "{}: max difference {} (tol {})\n{}\n{}", what, diff, tol, a, b);
}

/// Reads every record of an output store's corrected means.
pub fn corrected_means(out: &dyn FilterOutput) -> Vec<DVector<f64>> {
    (0..out.size()).map(|k| out.read_corrected_mean(k)).collect()
}

/// Two-dimensional constant-velocity model observed through both components.
pub fn constant_velocity(obs: ObservationSet) -> LinearGaussianModel {
    let a = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 1.0]);
    let q = DMatrix::from_row_slice(2, 2, &[0.05, 0.02, 0.02, 0.1]);
    let h = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.5, 1.0]);
    let r = DMatrix::from_row_slice(2, 2, &[0.3, 0.0, 0.0, 0.2]);
    let m0 = DVector::from_vec(vec![0.0, 1.0]);
    let p0 = DMatrix::from_row_slice(2, 2, &[2.0, 0.3, 0.3, 1.0]);
    LinearGaussianModel::new(a, q, h, r, m0, p0, obs).unwrap()
}

/// Observations for [`constant_velocity`], dense and sparse mixed.
pub fn constant_velocity_observations() -> ObservationSet {
    let vars = layout_vars(&[("y", 2)]);
    let mut obs = ObservationSet::new(vars.clone());
    obs.push_dense(0.0, DVector::from_vec(vec![0.2, 0.9]));
    obs.push_dense(1.0, DVector::from_vec(vec![1.1, 1.6]));
    obs.push(2.0, Mask::from_global_indices(&vars, &[0]), &[2.3]);
    obs.push(3.0, Mask::from_global_indices(&vars, &[1]), &[3.9]);
    obs.push_dense(4.0, DVector::from_vec(vec![4.2, 5.1]));
    obs
}

// ============================================================================
// Degenerate model
// ============================================================================

/// A scalar model whose transitions carry no noise and no memory, so the
/// predicted covariance is singular.
pub struct DegenerateModel {
    obs: ObservationSet,
}

impl DegenerateModel {
    pub fn new() -> Self {
        Self {
            obs: ObservationSet::new(layout_vars(&[("y", 1)])),
        }
    }
}

impl Simulator for DegenerateModel {
    fn dims(&self) -> Dimensions {
        Dimensions::new(1, 1, 1)
    }

    fn init(
        &mut self,
        _rng: &mut dyn RngCore,
        now: &ScheduleElement,
        state: &mut State,
        _init: Option<&InitSource>,
    ) -> Result<()> {
        state.time = now.time();
        state.lin.q[(1, 1)] = 1.0;
        Ok(())
    }

    fn advance(&mut self, next: &ScheduleElement, state: &mut State) -> Result<()> {
        state.time = next.time();
        state.lin.f[(1, 1)] = 0.0;
        Ok(())
    }

    fn observe(&mut self, state: &mut State) {
        state.observed[0] = state.dynamic[1];
        state.lin.g[(1, 0)] = 1.0;
        state.lin.r[(0, 0)] = 1.0;
    }

    fn observations(&self) -> &dyn ObservationSource {
        &self.obs
    }
}
