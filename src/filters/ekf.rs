//! Square-root Extended Kalman Filter
//!
//! The filter walks a [`Schedule`], linearising a [`Simulator`] at each point
//! and propagating the mean together with the upper Cholesky factor `U`
//! (`UᵗU = Σ`) of the covariance instead of the covariance itself. At each
//! point that carries an observation it accumulates the Gaussian
//! log-density of the innovation, so a full pass returns the marginal
//! log-likelihood of the observations.
//!
//! # State layout
//!
//! The filtered vector has the NR noise-augmented variables first and the ND
//! dynamic variables after them. The noise block carries the process noise
//! entering at the current point, which is what lets a single factor hold
//! both the state and the noise driving it.
//!
//! # Moments
//!
//! Per run the filter owns an [`EkfWorkspace`]:
//!
//! - `mu1`, `u1`: predicted mean and factor
//! - `mu2`, `u2`: corrected mean and factor
//! - `cross`: covariance between the previous output point and the current
//!   point, stored with each output record for backward sampling
//!
//! # Failure policy
//!
//! In the forward pass a covariance that is not numerically positive
//! definite aborts the run with [`FilterError::CholeskyFailure`].
//! [`ExtendedKalmanFilter::sample_trajectory`] instead logs a warning and
//! stops early, leaving the remaining columns undrawn.
//!
//! # Example
//!
//! ```
//! use nalgebra::DVector;
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use srekf::prelude::*;
//!
//! let mut obs = ObservationSet::new(layout_vars(&[("y", 1)]));
//! obs.push_dense(0.0, DVector::from_vec(vec![1.0]));
//! obs.push_dense(1.0, DVector::from_vec(vec![1.2]));
//! let schedule = Schedule::builder(0.0).observations(obs.times()).build();
//!
//! let model = LinearGaussianModel::random_walk(0.1, 0.5, 0.0, 1.0, obs).unwrap();
//! let mut filter = ExtendedKalmanFilter::new(Box::new(model));
//! filter.set_output(Box::new(KalmanFilterBuffer::new(2)));
//!
//! let mut rng = StdRng::seed_from_u64(0);
//! let mut state = filter.create_state();
//! let ll = filter.filter(&mut rng, &schedule, &mut state, None).unwrap();
//! assert!(ll < 0.0);
//! ```

use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use rand::{Rng, RngCore};
use rand_distr::StandardNormal;

use crate::buffer::FilterOutput;
use crate::models::Simulator;
use crate::types::schedule::{Schedule, ScheduleElement};
use crate::types::state::{Dimensions, InitSource, State};
use crate::types::transforms::{
    chol, condition, condition_singular, forward_solve, gather, gather_columns, half_log_det,
    retriangularize, syrk, trmm, trmm_transpose,
};
use crate::{FilterError, Result};

// ============================================================================
// Workspace
// ============================================================================

/// Moments propagated through one filter run.
///
/// Created fresh by [`ExtendedKalmanFilter::filter`] and owned exclusively
/// by that call; independent runs never share one.
#[derive(Debug, Clone, PartialEq)]
pub struct EkfWorkspace {
    /// Predicted mean
    pub mu1: DVector<f64>,
    /// Upper factor of the predicted covariance
    pub u1: DMatrix<f64>,
    /// Corrected mean
    pub mu2: DVector<f64>,
    /// Upper factor of the corrected covariance
    pub u2: DMatrix<f64>,
    /// Cross-covariance between the last output point and the current point
    pub cross: DMatrix<f64>,
    chained: bool,
}

impl EkfWorkspace {
    /// Allocates zeroed moments for state vectors of length `m`.
    pub fn new(m: usize) -> Self {
        Self {
            mu1: DVector::zeros(m),
            u1: DMatrix::zeros(m, m),
            mu2: DVector::zeros(m),
            u2: DMatrix::zeros(m, m),
            cross: DMatrix::zeros(m, m),
            chained: false,
        }
    }
}

// ============================================================================
// Extended Kalman Filter
// ============================================================================

/// Square-root Extended Kalman Filter over a runtime-dispatched simulator.
pub struct ExtendedKalmanFilter {
    sim: Box<dyn Simulator>,
    out: Option<Box<dyn FilterOutput>>,
}

impl ExtendedKalmanFilter {
    /// Creates a filter over the given simulator with no output store.
    pub fn new(sim: Box<dyn Simulator>) -> Self {
        Self { sim, out: None }
    }

    /// Creates a filter that writes its moments to `out`.
    pub fn with_output(sim: Box<dyn Simulator>, out: Box<dyn FilterOutput>) -> Self {
        Self { sim, out: Some(out) }
    }

    /// Model dimensions.
    #[inline]
    pub fn dims(&self) -> Dimensions {
        self.sim.dims()
    }

    pub fn simulator(&self) -> &dyn Simulator {
        self.sim.as_ref()
    }

    /// Attaches an output store, replacing any previous one.
    pub fn set_output(&mut self, out: Box<dyn FilterOutput>) {
        self.out = Some(out);
    }

    /// The attached output store, if any.
    pub fn output_store(&self) -> Option<&dyn FilterOutput> {
        self.out.as_deref()
    }

    /// Detaches and returns the output store.
    pub fn take_output(&mut self) -> Option<Box<dyn FilterOutput>> {
        self.out.take()
    }

    /// Creates a zeroed state sized for the simulator.
    pub fn create_state(&self) -> State {
        State::new(self.sim.dims(), self.sim.num_parameters())
    }

    // ------------------------------------------------------------------------
    // Full pass
    // ------------------------------------------------------------------------

    /// Runs the filter over `schedule` and returns the log-likelihood.
    ///
    /// # Errors
    /// [`FilterError::CholeskyFailure`] if a predicted or innovation
    /// covariance loses positive definiteness; any error the simulator
    /// raises is propagated as well.
    ///
    /// # Panics
    /// Panics if `state` was not created for this simulator's dimensions.
    pub fn filter(
        &mut self,
        rng: &mut dyn RngCore,
        schedule: &Schedule,
        state: &mut State,
        init: Option<&InitSource>,
    ) -> Result<f64> {
        let mut ws = self.workspace(state);
        self.init(rng, schedule.first(), state, &mut ws, init)?;
        self.run(schedule, state, &mut ws)
    }

    /// Runs the filter with fixed static parameters.
    pub fn filter_with_parameters(
        &mut self,
        rng: &mut dyn RngCore,
        schedule: &Schedule,
        theta: &DVector<f64>,
        state: &mut State,
    ) -> Result<f64> {
        let mut ws = self.workspace(state);
        self.init_with_parameters(rng, schedule.first(), theta, state, &mut ws)?;
        self.run(schedule, state, &mut ws)
    }

    fn workspace(&self, state: &State) -> EkfWorkspace {
        assert_eq!(
            state.dims(),
            self.sim.dims(),
            "State dimensions do not match the simulator"
        );
        EkfWorkspace::new(state.dims().m())
    }

    fn run(
        &mut self,
        schedule: &Schedule,
        state: &mut State,
        ws: &mut EkfWorkspace,
    ) -> Result<f64> {
        let first = schedule.first();
        self.output0(state);
        let mut ll = self.correct(first, state, ws)?;
        self.output(first, state, ws);

        let mut iter = 0;
        while iter + 1 < schedule.len() {
            ll += self.step(&mut iter, schedule, state, ws)?;
        }
        self.term();
        self.output_t(ll);
        info!(
            "filter finished at t = {}: log-likelihood {:.6}",
            schedule.last().time(),
            ll
        );
        Ok(ll)
    }

    // ------------------------------------------------------------------------
    // Initialisation
    // ------------------------------------------------------------------------

    /// Initialises the model and the predicted moments at `now`.
    ///
    /// The predicted factor is assembled from the simulator's noise factor
    /// Q, with the noise-to-dynamic coupling `Q_RR·F_RD` substituted for
    /// its `[R, D]` block. Any attached output store is cleared.
    pub fn init(
        &mut self,
        rng: &mut dyn RngCore,
        now: &ScheduleElement,
        state: &mut State,
        ws: &mut EkfWorkspace,
        init: Option<&InitSource>,
    ) -> Result<()> {
        state.lin.reset();
        self.sim.init(rng, now, state, init)?;
        self.init_moments(state, ws);
        Ok(())
    }

    /// Initialises with fixed static parameters.
    pub fn init_with_parameters(
        &mut self,
        rng: &mut dyn RngCore,
        now: &ScheduleElement,
        theta: &DVector<f64>,
        state: &mut State,
        ws: &mut EkfWorkspace,
    ) -> Result<()> {
        state.lin.reset();
        self.sim.init_with_parameters(rng, theta, now, state)?;
        self.init_moments(state, ws);
        Ok(())
    }

    fn init_moments(&mut self, state: &mut State, ws: &mut EkfWorkspace) {
        let Dimensions { nr, nd, .. } = state.dims();

        ws.mu1.copy_from(&state.dynamic);
        let mut u = state.lin.q.clone();
        let coupling = noise_coupling(&state.lin.q, &state.lin.f, nr, nd);
        u.view_mut((0, nr), (nr, nd)).copy_from(&coupling);
        ws.u1 = retriangularize(&u);
        ws.cross.fill(0.0);
        ws.chained = false;

        if let Some(out) = self.out.as_deref_mut() {
            out.clear();
        }
        state.lin.reset_transition();
        debug!("init at t = {}", state.time);
    }

    // ------------------------------------------------------------------------
    // Predict
    // ------------------------------------------------------------------------

    /// Advances the model to `next` and predicts its moments.
    ///
    /// With `F̃` the transition Jacobian restricted to its `[D, D]` block and
    /// `L = [[Q_RR, Q_RR·F_RD], [0, 0]]` the factor of the noise entering at
    /// `next`, the predicted covariance is
    /// `Σ = (U2·F̃)ᵗ(U2·F̃) + LᵗL`. The cross-covariance becomes `U2ᵗU2·F̃`,
    /// or is carried forward as `C·F̃` when the previous point produced no
    /// output.
    ///
    /// # Errors
    /// [`FilterError::CholeskyFailure`] if `Σ` is not positive definite.
    pub fn predict(
        &mut self,
        next: &ScheduleElement,
        state: &mut State,
        ws: &mut EkfWorkspace,
    ) -> Result<()> {
        let Dimensions { nr, nd, .. } = state.dims();
        let m = nr + nd;

        self.sim.advance(next, state)?;
        ws.mu1.copy_from(&state.dynamic);

        let mut f = DMatrix::zeros(m, m);
        f.view_mut((nr, nr), (nd, nd))
            .copy_from(&state.lin.f.view((nr, nr), (nd, nd)));

        // from the last corrected (or chained) point
        let mut cf = f.clone();
        trmm(&ws.u2, &mut cf);

        // noise entering at this point
        let mut local = DMatrix::zeros(m, m);
        local
            .view_mut((0, 0), (nr, nr))
            .copy_from(&state.lin.q.view((0, 0), (nr, nr)));
        local
            .view_mut((0, nr), (nr, nd))
            .copy_from(&noise_coupling(&state.lin.q, &state.lin.f, nr, nd));

        let mut sigma = DMatrix::zeros(m, m);
        syrk(&cf, 0.0, &mut sigma);
        syrk(&local, 1.0, &mut sigma);

        if ws.chained {
            ws.cross = &ws.cross * &f;
        } else {
            trmm_transpose(&ws.u2, &mut cf);
            ws.cross = cf;
        }

        ws.u1 = chol(&sigma)?;
        state.lin.reset_transition();
        debug!("predict at t = {}", next.time());
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Correct
    // ------------------------------------------------------------------------

    /// Corrects the predicted moments against the observation at `now`.
    ///
    /// Returns the log-density of the observation under the predicted
    /// moments, or zero if `now` carries no observation or its mask
    /// selects nothing. At the first schedule point only the dynamic block
    /// is conditioned, as the noise block has no prior there.
    ///
    /// # Errors
    /// [`FilterError::CholeskyFailure`] if the innovation covariance is not
    /// positive definite or the update loses definiteness.
    pub fn correct(
        &mut self,
        now: &ScheduleElement,
        state: &mut State,
        ws: &mut EkfWorkspace,
    ) -> Result<f64> {
        ws.mu2.copy_from(&ws.mu1);
        ws.u2.copy_from(&ws.u1);
        ws.chained = false;

        if !now.has_obs() {
            return Ok(0.0);
        }

        let (map, y) = {
            let obs = self.sim.observations();
            let map = obs.mask(now.index_obs()).index_map(obs.vars());
            let y = gather(obs.values(now.index_obs()), &map);
            (map, y)
        };
        let w = map.len();
        if w == 0 {
            state.lin.reset_observation();
            debug!("correct at t = {}: empty mask", now.time());
            return Ok(0.0);
        }

        self.sim.observe(state);
        let mut c = gather_columns(&state.lin.g, &map);
        let r3 = gather_columns(&state.lin.r, &map);
        let mu3 = gather(&state.observed, &map);

        trmm(&ws.u1, &mut c);
        let mut sigma3 = DMatrix::zeros(w, w);
        syrk(&c, 0.0, &mut sigma3);
        syrk(&r3, 1.0, &mut sigma3);
        trmm_transpose(&ws.u1, &mut c);
        let u3 = chol(&sigma3)?;

        let z = forward_solve(&u3, &(&y - &mu3))?;
        let ll = -0.5 * z.norm_squared()
            - 0.5 * w as f64 * std::f64::consts::TAU.ln()
            - half_log_det(&u3);

        if now.index_time() > 0 {
            condition(&mut ws.mu2, &mut ws.u2, &mu3, &u3, &c, &y)?;
        } else {
            let Dimensions { nr, nd, .. } = state.dims();
            condition_dynamic(ws, nr, nd, &mu3, &u3, &c, &y)?;
        }
        state.dynamic.copy_from(&ws.mu2);
        state.lin.reset_observation();

        debug!("correct at t = {}: {} observed, ll = {:.6}", now.time(), w, ll);
        Ok(ll)
    }

    // ------------------------------------------------------------------------
    // Step
    // ------------------------------------------------------------------------

    /// Advances from `*iter` to the next output point (or the end of the
    /// schedule), predicting at every point passed, then corrects and
    /// outputs there. Returns the log-likelihood increment.
    ///
    /// # Panics
    /// Panics if `*iter` is already the last point.
    pub fn step(
        &mut self,
        iter: &mut usize,
        schedule: &Schedule,
        state: &mut State,
        ws: &mut EkfWorkspace,
    ) -> Result<f64> {
        assert!(*iter + 1 < schedule.len(), "Step past the end of the schedule");
        loop {
            *iter += 1;
            let now = schedule.get(*iter);
            self.predict(now, state, ws)?;
            if now.has_output() || *iter + 1 == schedule.len() {
                break;
            }
            ws.mu2.copy_from(&ws.mu1);
            ws.u2.copy_from(&ws.u1);
            ws.chained = true;
        }
        let now = schedule.get(*iter);
        let ll = self.correct(now, state, ws)?;
        self.output(now, state, ws);
        Ok(ll)
    }

    /// Releases simulator resources.
    pub fn term(&mut self) {
        self.sim.term();
    }

    // ------------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------------

    /// Writes the static parameters.
    pub fn output0(&mut self, state: &State) {
        if let Some(out) = self.out.as_deref_mut() {
            out.write_parameters(&state.parameters);
        }
    }

    /// Writes the moments at `now` if it requires output.
    pub fn output(&mut self, now: &ScheduleElement, state: &State, ws: &EkfWorkspace) {
        if let Some(out) = self.out.as_deref_mut() {
            if now.has_output() {
                let k = now.index_output();
                out.write_time(k, now.time());
                out.write_state(k, state);
                out.write_predicted_mean(k, &ws.mu1);
                out.write_predicted_std(k, &ws.u1);
                out.write_corrected_mean(k, &ws.mu2);
                out.write_corrected_std(k, &ws.u2);
                out.write_cross(k, &ws.cross);
            }
        }
    }

    /// Writes the final log-likelihood.
    pub fn output_t(&mut self, ll: f64) {
        if let Some(out) = self.out.as_deref_mut() {
            out.write_ll(ll);
        }
    }

    // ------------------------------------------------------------------------
    // Backward sampling
    // ------------------------------------------------------------------------

    /// Draws one smoothed trajectory from the stored moments into the
    /// columns of `x`, last record first.
    ///
    /// Returns the number of columns drawn. A covariance that is not
    /// positive definite ends the walk early with a warning; the columns
    /// before it are left untouched.
    ///
    /// # Errors
    /// [`FilterError::NoOutput`] if no output store is attached.
    ///
    /// # Panics
    /// Panics if `x` is not M × (number of output records).
    pub fn sample_trajectory(&self, rng: &mut dyn RngCore, x: &mut DMatrix<f64>) -> Result<usize> {
        let out = self.out.as_deref().ok_or(FilterError::NoOutput)?;
        let n = out.size();
        let m = self.sim.dims().m();
        assert_eq!(x.shape(), (m, n), "Trajectory matrix must be {}x{}", m, n);

        let mut k = n;
        match sample_backward(out, rng, x, &mut k) {
            Ok(()) => {}
            Err(FilterError::CholeskyFailure) => {
                warn!(
                    "Cholesky factorisation failed sampling trajectory; \
                     {} of {} records left undrawn",
                    k, n
                );
            }
            Err(e) => return Err(e),
        }
        Ok(n - k)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// `Q_RR·F_RD`: how the noise entering at a point loads onto the dynamic block.
fn noise_coupling(q: &DMatrix<f64>, f: &DMatrix<f64>, nr: usize, nd: usize) -> DMatrix<f64> {
    q.view((0, 0), (nr, nr)).upper_triangle() * f.view((0, nr), (nr, nd))
}

/// Conditions only the dynamic block of the corrected moments.
///
/// The dynamic marginal factor is re-triangularised out of `U2[:, D]` and
/// conditioned on its own; the noise rows of `U2` are cleared.
fn condition_dynamic(
    ws: &mut EkfWorkspace,
    nr: usize,
    nd: usize,
    mu3: &DVector<f64>,
    u3: &DMatrix<f64>,
    c: &DMatrix<f64>,
    y: &DVector<f64>,
) -> Result<()> {
    let mut ud = retriangularize(&ws.u2.columns(nr, nd).clone_owned());
    let mut mud = ws.mu2.rows(nr, nd).clone_owned();
    let cd = c.rows(nr, nd).clone_owned();
    condition(&mut mud, &mut ud, mu3, u3, &cd, y)?;

    ws.u2.fill(0.0);
    ws.u2.view_mut((nr, nr), (nd, nd)).copy_from(&ud);
    ws.mu2.rows_mut(nr, nd).copy_from(&mud);
    Ok(())
}

fn sample_backward(
    out: &dyn FilterOutput,
    rng: &mut dyn RngCore,
    x: &mut DMatrix<f64>,
    k: &mut usize,
) -> Result<()> {
    let n = out.size();
    let m = x.nrows();
    while *k > 0 {
        let mut mu1 = out.read_corrected_mean(*k - 1);
        let mut u1 = out.read_corrected_std(*k - 1);
        if *k < n {
            let mu2 = out.read_predicted_mean(*k);
            let u2 = out.read_predicted_std(*k);
            let c = out.read_cross(*k);
            let value = x.column(*k).clone_owned();
            // x_k carries the noise that entered at k, which pins part of x_{k-1}
            condition_singular(&mut mu1, &mut u1, &mu2, &u2, &c, &value)?;
        }

        let z = DVector::from_fn(m, |_, _| rng.sample::<f64, _>(StandardNormal));
        let draw = u1.upper_triangle().tr_mul(&z) + mu1;
        x.set_column(*k - 1, &draw);
        *k -= 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::KalmanFilterBuffer;
    use crate::models::{LinearGaussianModel, ObservationSet};
    use crate::types::mask::layout_vars;
    use crate::types::transforms::is_upper_factor;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn random_walk(obs: ObservationSet) -> ExtendedKalmanFilter {
        let model = LinearGaussianModel::random_walk(0.1, 0.5, 0.0, 1.0, obs).unwrap();
        ExtendedKalmanFilter::with_output(Box::new(model), Box::new(KalmanFilterBuffer::new(2)))
    }

    fn no_obs() -> ObservationSet {
        ObservationSet::new(layout_vars(&[("y", 1)]))
    }

    #[test]
    fn test_init_factor() {
        let mut filter = random_walk(no_obs());
        let mut rng = StdRng::seed_from_u64(0);
        let mut state = filter.create_state();
        let mut ws = EkfWorkspace::new(2);
        let now = ScheduleElement::new(0.0, 0, false, 0, true, 0);
        filter.init(&mut rng, &now, &mut state, &mut ws, None).unwrap();

        assert!(is_upper_factor(&ws.u1));
        let sigma = ws.u1.tr_mul(&ws.u1);
        assert!((sigma[(0, 0)] - 0.1).abs() < 1e-12);
        assert!((sigma[(1, 1)] - 1.0).abs() < 1e-12);
        assert!(sigma[(0, 1)].abs() < 1e-12);
        assert!(state.lin.is_transition_reset());
    }

    #[test]
    fn test_predict_random_walk() {
        let mut filter = random_walk(no_obs());
        let mut rng = StdRng::seed_from_u64(0);
        let mut state = filter.create_state();
        let mut ws = EkfWorkspace::new(2);
        let first = ScheduleElement::new(0.0, 0, false, 0, true, 0);
        let next = ScheduleElement::new(1.0, 1, false, 0, true, 1);
        filter.init(&mut rng, &first, &mut state, &mut ws, None).unwrap();
        filter.correct(&first, &mut state, &mut ws).unwrap();
        filter.predict(&next, &mut state, &mut ws).unwrap();

        let sigma = ws.u1.tr_mul(&ws.u1);
        // [r, x]: var r = q, cov(r, x) = q, var x = p0 + q
        assert!((sigma[(0, 0)] - 0.1).abs() < 1e-12);
        assert!((sigma[(0, 1)] - 0.1).abs() < 1e-12);
        assert!((sigma[(1, 1)] - 1.1).abs() < 1e-12);
        assert!((ws.cross[(1, 1)] - 1.0).abs() < 1e-12);
        assert!(ws.cross[(0, 1)].abs() < 1e-12);
        assert!(state.lin.is_transition_reset());
    }

    #[test]
    fn test_chained_cross_covariance() {
        let schedule = Schedule::from_elements(vec![
            ScheduleElement::new(0.0, 0, false, 0, true, 0),
            ScheduleElement::new(1.0, 1, false, 0, false, 0),
            ScheduleElement::new(2.0, 2, false, 0, true, 1),
        ]);
        let mut filter = random_walk(no_obs());
        let mut rng = StdRng::seed_from_u64(0);
        let mut state = filter.create_state();
        let ll = filter.filter(&mut rng, &schedule, &mut state, None).unwrap();
        assert_eq!(ll, 0.0);

        let out = filter.output_store().unwrap();
        assert_eq!(out.size(), 2);
        let u = out.read_predicted_std(1);
        let sigma = u.tr_mul(&u);
        assert!((sigma[(1, 1)] - 1.2).abs() < 1e-12);
        // cov(x(0), x(2)) passes through the skipped point unchanged
        let c = out.read_cross(1);
        assert!((c[(1, 1)] - 1.0).abs() < 1e-12);
        assert_eq!(out.read_ll(), Some(0.0));
    }

    #[test]
    fn test_empty_mask_contributes_nothing() {
        let vars = layout_vars(&[("y", 1)]);
        let mut obs = ObservationSet::new(vars.clone());
        obs.push(0.0, crate::types::mask::Mask::from_global_indices(&vars, &[]), &[]);
        let schedule = Schedule::builder(0.0).observations(obs.times()).end(1.0).build();

        let mut filter = random_walk(obs);
        let mut rng = StdRng::seed_from_u64(0);
        let mut state = filter.create_state();
        let ll = filter.filter(&mut rng, &schedule, &mut state, None).unwrap();
        assert_eq!(ll, 0.0);
    }

    #[test]
    fn test_sample_without_output() {
        let model = LinearGaussianModel::random_walk(0.1, 0.5, 0.0, 1.0, no_obs()).unwrap();
        let filter = ExtendedKalmanFilter::new(Box::new(model));
        let mut rng = StdRng::seed_from_u64(0);
        let mut x = DMatrix::zeros(2, 0);
        assert_eq!(
            filter.sample_trajectory(&mut rng, &mut x),
            Err(FilterError::NoOutput)
        );
    }

    #[test]
    fn test_sample_stops_on_failure() {
        let mut filter = random_walk(no_obs());
        let schedule = Schedule::builder(0.0).output_every(1.0).end(3.0).build();
        let mut rng = StdRng::seed_from_u64(0);
        let mut state = filter.create_state();
        filter.filter(&mut rng, &schedule, &mut state, None).unwrap();

        // corrupt the predicted factor of record 2 so conditioning on it fails
        let mut store = filter.take_output().unwrap();
        store.write_predicted_std(2, &DMatrix::zeros(2, 2));
        filter.set_output(store);

        let mut x = DMatrix::from_element(2, 4, f64::NAN);
        let drawn = filter.sample_trajectory(&mut rng, &mut x).unwrap();
        assert_eq!(drawn, 2);
        assert!(x.column(3).iter().all(|v| v.is_finite()));
        assert!(x.column(2).iter().all(|v| v.is_finite()));
        assert!(x.column(1).iter().all(|v| v.is_nan()));
    }
}
