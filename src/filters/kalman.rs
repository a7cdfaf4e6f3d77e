//! Dense covariance-form Kalman filter and RTS smoother
//!
//! Reference implementation for linear-Gaussian models: the covariance is
//! propagated directly, updates use the Joseph form, and masked updates
//! select the observed components by index map. The square-root filter is
//! validated against it.

use nalgebra::{DMatrix, DVector};

use crate::models::{LinearGaussianModel, ObservationSource};
use crate::types::schedule::Schedule;
use crate::types::transforms::{gather, gather_matrix, gather_rows};

// ============================================================================
// Kalman Filter State
// ============================================================================

/// Mean and covariance of a Gaussian state estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct KalmanState {
    /// State estimate mean
    pub mean: DVector<f64>,
    /// State estimate covariance
    pub covariance: DMatrix<f64>,
}

impl KalmanState {
    #[inline]
    pub fn new(mean: DVector<f64>, covariance: DMatrix<f64>) -> Self {
        assert_eq!(
            covariance.shape(),
            (mean.len(), mean.len()),
            "Covariance must be square and match the mean"
        );
        Self { mean, covariance }
    }
}

/// Log-density of a zero-mean Gaussian with covariance `s` at `z`.
///
/// Returns `None` if `s` is not positive definite.
pub fn gaussian_log_density(z: &DVector<f64>, s: &DMatrix<f64>) -> Option<f64> {
    let chol = s.clone().cholesky()?;
    let w = z.len() as f64;
    let mahalanobis = z.dot(&chol.solve(z));
    let log_det = 2.0 * chol.l().diagonal().iter().map(|d| d.ln()).sum::<f64>();
    Some(-0.5 * (mahalanobis + log_det + w * std::f64::consts::TAU.ln()))
}

// ============================================================================
// Kalman Filter
// ============================================================================

/// A discrete-time Kalman filter for `x' = A x + w`, `y = H x + v`.
#[derive(Debug, Clone, PartialEq)]
pub struct KalmanFilter {
    /// Transition matrix
    pub a: DMatrix<f64>,
    /// Process-noise covariance
    pub q: DMatrix<f64>,
    /// Observation matrix
    pub h: DMatrix<f64>,
    /// Observation-noise covariance
    pub r: DMatrix<f64>,
}

/// Moments of a full filter pass, one entry per schedule point.
#[derive(Debug, Clone)]
pub struct KalmanRun {
    pub predicted: Vec<KalmanState>,
    pub filtered: Vec<KalmanState>,
    /// Log-likelihood increment at each point
    pub ll: Vec<f64>,
}

impl KalmanRun {
    /// Total log-likelihood.
    pub fn total_ll(&self) -> f64 {
        self.ll.iter().sum()
    }
}

impl KalmanFilter {
    /// Creates a filter.
    ///
    /// # Panics
    /// Panics if the shapes are inconsistent.
    pub fn new(a: DMatrix<f64>, q: DMatrix<f64>, h: DMatrix<f64>, r: DMatrix<f64>) -> Self {
        let n = a.nrows();
        assert!(a.is_square(), "Transition matrix must be square");
        assert_eq!(q.shape(), (n, n), "Process noise shape mismatch");
        assert_eq!(h.ncols(), n, "Observation matrix column mismatch");
        assert_eq!(r.shape(), (h.nrows(), h.nrows()), "Observation noise shape mismatch");
        Self { a, q, h, r }
    }

    /// Creates a filter with the matrices of a linear-Gaussian model.
    pub fn from_model(model: &LinearGaussianModel) -> Self {
        Self::new(model.a().clone(), model.q(), model.h().clone(), model.r())
    }

    /// Performs the prediction step.
    ///
    /// - x_pred = A * x
    /// - P_pred = A * P * A^T + Q
    pub fn predict(&self, state: &KalmanState) -> KalmanState {
        let mean = &self.a * &state.mean;
        let covariance = &self.a * &state.covariance * self.a.transpose() + &self.q;
        KalmanState::new(mean, symmetrize(covariance))
    }

    /// Updates against a full observation.
    ///
    /// Returns the updated state and the log-density of `y`, or `None` if
    /// the innovation covariance is singular.
    pub fn update(&self, state: &KalmanState, y: &DVector<f64>) -> Option<(KalmanState, f64)> {
        let map: Vec<usize> = (0..self.h.nrows()).collect();
        self.update_masked(state, y, &map)
    }

    /// Updates against the components of `y` listed in `map`.
    ///
    /// `y` is the full observation vector. An empty map leaves the state
    /// unchanged with zero log-density.
    pub fn update_masked(
        &self,
        state: &KalmanState,
        y: &DVector<f64>,
        map: &[usize],
    ) -> Option<(KalmanState, f64)> {
        if map.is_empty() {
            return Some((state.clone(), 0.0));
        }
        let h = gather_rows(&self.h, map);
        let r = gather_matrix(&self.r, map, map);
        let y = gather(y, map);

        let innovation = &y - &h * &state.mean;
        let s = symmetrize(&h * &state.covariance * h.transpose() + &r);
        let ll = gaussian_log_density(&innovation, &s)?;

        let s_inv = s.try_inverse()?;
        let gain = &state.covariance * h.transpose() * s_inv;
        let mean = &state.mean + &gain * innovation;
        let covariance = joseph_update(&state.covariance, &gain, &h, &r);
        Some((KalmanState::new(mean, covariance), ll))
    }

    /// Runs the filter over a schedule, one transition per point.
    ///
    /// Returns `None` if an innovation covariance is singular.
    pub fn run(
        &self,
        prior: KalmanState,
        schedule: &Schedule,
        observations: &dyn ObservationSource,
    ) -> Option<KalmanRun> {
        let mut run = KalmanRun {
            predicted: Vec::with_capacity(schedule.len()),
            filtered: Vec::with_capacity(schedule.len()),
            ll: Vec::with_capacity(schedule.len()),
        };
        let mut current = prior;
        for (i, now) in schedule.iter().enumerate() {
            let predicted = if i == 0 { current } else { self.predict(&current) };
            let (filtered, ll) = if now.has_obs() {
                let k = now.index_obs();
                let map = observations.mask(k).index_map(observations.vars());
                self.update_masked(&predicted, observations.values(k), &map)?
            } else {
                (predicted.clone(), 0.0)
            };
            run.predicted.push(predicted);
            run.filtered.push(filtered.clone());
            run.ll.push(ll);
            current = filtered;
        }
        Some(run)
    }
}

/// Joseph-form covariance update, stable under a suboptimal gain.
///
/// P_updated = (I - K*H) * P * (I - K*H)^T + K * R * K^T
pub fn joseph_update(
    covariance: &DMatrix<f64>,
    gain: &DMatrix<f64>,
    h: &DMatrix<f64>,
    r: &DMatrix<f64>,
) -> DMatrix<f64> {
    let n = covariance.nrows();
    let i_kh = DMatrix::identity(n, n) - gain * h;
    symmetrize(&i_kh * covariance * i_kh.transpose() + gain * r * gain.transpose())
}

fn symmetrize(m: DMatrix<f64>) -> DMatrix<f64> {
    (&m + m.transpose()) * 0.5
}

// ============================================================================
// RTS Smoother
// ============================================================================

/// Rauch-Tung-Striebel smoother over a completed [`KalmanRun`].
///
/// Returns `None` if a predicted covariance is singular.
pub fn rts_smooth(a: &DMatrix<f64>, run: &KalmanRun) -> Option<Vec<KalmanState>> {
    let n = run.filtered.len();
    if n == 0 {
        return Some(Vec::new());
    }
    let mut smoothed = run.filtered.clone();
    for k in (0..n - 1).rev() {
        let p_pred_inv = run.predicted[k + 1].covariance.clone().try_inverse()?;
        let g = &run.filtered[k].covariance * a.transpose() * p_pred_inv;

        let mean = &run.filtered[k].mean
            + &g * (&smoothed[k + 1].mean - &run.predicted[k + 1].mean);
        let covariance = &run.filtered[k].covariance
            + &g * (&smoothed[k + 1].covariance - &run.predicted[k + 1].covariance) * g.transpose();
        smoothed[k] = KalmanState::new(mean, symmetrize(covariance));
    }
    Some(smoothed)
}
