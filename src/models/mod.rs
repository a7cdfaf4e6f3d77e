//! Simulation models driven by the filter
//!
//! This module defines the [`Simulator`] contract the filter consumes, the
//! [`ObservationSource`] contract it reads observations through, and two
//! reference models: a linear-Gaussian model with closed-form behaviour and
//! the Lorenz-63 system integrated with RK4.

mod linear;
mod lorenz;
mod observation;

pub use linear::*;
pub use lorenz::*;
pub use observation::*;

use nalgebra::DVector;
use rand::RngCore;

use crate::types::mask::{Mask, ObsVar};
use crate::types::schedule::ScheduleElement;
use crate::types::state::{Dimensions, InitSource, State};
use crate::Result;

/// Source of observations, indexed by observation step.
pub trait ObservationSource {
    /// Observed variables in declaration order.
    fn vars(&self) -> &[ObsVar];

    /// Number of observation steps held.
    fn len(&self) -> usize;

    /// Returns true if no observation steps are held.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Active components at observation step `index_obs`.
    fn mask(&self, index_obs: usize) -> &Mask;

    /// Full NO-length observation vector at step `index_obs`.
    ///
    /// Only the components selected by [`ObservationSource::mask`] are
    /// meaningful.
    fn values(&self, index_obs: usize) -> &DVector<f64>;
}

/// A simulation model the filter can linearise.
///
/// Implementations advance the model state and fill the linearisation
/// blocks of [`State::lin`] on the way:
///
/// - `init` writes the initial dynamic state, the initial transition
///   Jacobian F and the noise factor Q whose `[D, D]` block carries the
///   prior square-root covariance
/// - `advance` writes F and Q for the transition just taken
/// - `observe` writes the predicted observation mean, G and R
///
/// The blocks are reset by the filter before each call, so implementations
/// only write the entries they need.
pub trait Simulator {
    /// Model dimensions.
    fn dims(&self) -> Dimensions;

    /// Number of static parameters.
    fn num_parameters(&self) -> usize {
        0
    }

    /// Initialises the state at the first schedule point.
    fn init(
        &mut self,
        rng: &mut dyn RngCore,
        now: &ScheduleElement,
        state: &mut State,
        init: Option<&InitSource>,
    ) -> Result<()>;

    /// Initialises the state with fixed static parameters.
    fn init_with_parameters(
        &mut self,
        rng: &mut dyn RngCore,
        theta: &DVector<f64>,
        now: &ScheduleElement,
        state: &mut State,
    ) -> Result<()> {
        let source = InitSource::default().with_parameters(theta.clone());
        self.init(rng, now, state, Some(&source))
    }

    /// Advances the state to the time of `next`.
    fn advance(&mut self, next: &ScheduleElement, state: &mut State) -> Result<()>;

    /// Writes the predicted observation mean and the observation blocks.
    fn observe(&mut self, state: &mut State);

    /// Observation source backing the schedule's observation points.
    fn observations(&self) -> &dyn ObservationSource;

    /// Releases resources at the end of a run.
    fn term(&mut self) {}
}
