//! Linear-Gaussian model
//!
//! `x' = A x + w`, `w ~ N(0, Q)` and `y = H x + v`, `v ~ N(0, R)`, with one
//! transition per schedule step. The noise `w` is carried by the
//! noise-augmented block of the state, so NR = ND.

use nalgebra::{DMatrix, DVector};
use rand::RngCore;

use super::{ObservationSet, ObservationSource, Simulator};
use crate::types::schedule::ScheduleElement;
use crate::types::state::{Dimensions, InitSource, State};
use crate::types::transforms::chol;
use crate::Result;

/// Linear-Gaussian state-space model.
#[derive(Debug, Clone)]
pub struct LinearGaussianModel {
    a: DMatrix<f64>,
    h: DMatrix<f64>,
    /// Upper factors of the process, observation and prior covariances
    q_factor: DMatrix<f64>,
    r_factor: DMatrix<f64>,
    p0_factor: DMatrix<f64>,
    m0: DVector<f64>,
    observations: ObservationSet,
}

impl LinearGaussianModel {
    /// Creates a model.
    ///
    /// # Arguments
    /// - `a`: transition matrix (n×n)
    /// - `q`: process-noise covariance (n×n)
    /// - `h`: observation matrix (no×n)
    /// - `r`: observation-noise covariance (no×no)
    /// - `m0`, `p0`: prior mean and covariance of the initial state
    /// - `observations`: observation source, with NO components
    ///
    /// # Errors
    /// [`crate::FilterError::CholeskyFailure`] if a covariance is not
    /// positive definite.
    ///
    /// # Panics
    /// Panics if the shapes are inconsistent.
    pub fn new(
        a: DMatrix<f64>,
        q: DMatrix<f64>,
        h: DMatrix<f64>,
        r: DMatrix<f64>,
        m0: DVector<f64>,
        p0: DMatrix<f64>,
        observations: ObservationSet,
    ) -> Result<Self> {
        let n = a.nrows();
        assert!(a.is_square(), "Transition matrix must be square");
        assert_eq!(q.shape(), (n, n), "Process noise must be {}x{}", n, n);
        assert_eq!(h.ncols(), n, "Observation matrix must have {} columns", n);
        assert_eq!(
            h.nrows(),
            observations.no(),
            "Observation matrix rows must match the observation vector"
        );
        assert_eq!(r.shape(), (h.nrows(), h.nrows()), "Observation noise shape mismatch");
        assert_eq!(m0.len(), n, "Prior mean length mismatch");
        assert_eq!(p0.shape(), (n, n), "Prior covariance shape mismatch");

        Ok(Self {
            q_factor: chol(&q)?,
            r_factor: chol(&r)?,
            p0_factor: chol(&p0)?,
            a,
            h,
            m0,
            observations,
        })
    }

    /// Scalar random walk `x' = x + w` observed directly, `y = x + v`.
    pub fn random_walk(
        q: f64,
        r: f64,
        m0: f64,
        p0: f64,
        observations: ObservationSet,
    ) -> Result<Self> {
        Self::new(
            DMatrix::identity(1, 1),
            DMatrix::from_element(1, 1, q),
            DMatrix::identity(1, 1),
            DMatrix::from_element(1, 1, r),
            DVector::from_element(1, m0),
            DMatrix::from_element(1, 1, p0),
            observations,
        )
    }

    /// Transition matrix.
    pub fn a(&self) -> &DMatrix<f64> {
        &self.a
    }

    /// Observation matrix.
    pub fn h(&self) -> &DMatrix<f64> {
        &self.h
    }

    /// Process-noise covariance.
    pub fn q(&self) -> DMatrix<f64> {
        self.q_factor.tr_mul(&self.q_factor)
    }

    /// Observation-noise covariance.
    pub fn r(&self) -> DMatrix<f64> {
        self.r_factor.tr_mul(&self.r_factor)
    }

    /// Prior mean.
    pub fn m0(&self) -> &DVector<f64> {
        &self.m0
    }

    /// Prior covariance.
    pub fn p0(&self) -> DMatrix<f64> {
        self.p0_factor.tr_mul(&self.p0_factor)
    }

    /// The observation set backing this model.
    pub fn observation_set(&self) -> &ObservationSet {
        &self.observations
    }

    fn n(&self) -> usize {
        self.a.nrows()
    }
}

impl Simulator for LinearGaussianModel {
    fn dims(&self) -> Dimensions {
        Dimensions::new(self.n(), self.n(), self.h.nrows())
    }

    fn init(
        &mut self,
        _rng: &mut dyn RngCore,
        now: &ScheduleElement,
        state: &mut State,
        init: Option<&InitSource>,
    ) -> Result<()> {
        let n = self.n();
        let mean = init
            .and_then(|s| s.mean.as_ref())
            .unwrap_or(&self.m0);
        assert_eq!(mean.len(), n, "Initial mean length mismatch");

        state.time = now.time();
        state.dynamic.fill(0.0);
        state.dynamic.rows_mut(n, n).copy_from(mean);
        state.lin.q.view_mut((0, 0), (n, n)).copy_from(&self.q_factor);
        state.lin.q.view_mut((n, n), (n, n)).copy_from(&self.p0_factor);
        Ok(())
    }

    fn advance(&mut self, next: &ScheduleElement, state: &mut State) -> Result<()> {
        let n = self.n();
        let x = state.dynamic.rows(n, n).clone_owned();
        state.dynamic.rows_mut(0, n).fill(0.0);
        state.dynamic.rows_mut(n, n).copy_from(&(&self.a * x));
        state.time = next.time();

        state.lin.f.view_mut((0, n), (n, n)).fill_with_identity();
        state.lin.f.view_mut((n, n), (n, n)).copy_from(&self.a.transpose());
        state.lin.q.view_mut((0, 0), (n, n)).copy_from(&self.q_factor);
        Ok(())
    }

    fn observe(&mut self, state: &mut State) {
        let n = self.n();
        let x = state.dynamic.rows(n, n);
        state.observed.copy_from(&(&self.h * x));
        state.lin.g.view_mut((n, 0), (n, self.h.nrows())).copy_from(&self.h.transpose());
        state.lin.r.copy_from(&self.r_factor);
    }

    fn observations(&self) -> &dyn ObservationSource {
        &self.observations
    }
}
