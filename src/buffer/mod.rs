//! Output stores driven by the filter
//!
//! [`FilterOutput`] is the contract the filter writes its per-step moments
//! through and the backward sampler reads them back from.
//! [`KalmanFilterBuffer`] keeps them in memory. [`OptimiserBuffer`] is a
//! record-oriented store over a [`Dataset`] for per-run scalar results.

mod dataset;
mod kalman_filter;
mod optimiser;

pub use dataset::*;
pub use kalman_filter::*;
pub use optimiser::*;

use nalgebra::{DMatrix, DVector};

use crate::types::state::State;

/// Store for the moments produced by a filter run.
///
/// Writes are indexed by the schedule point's output index. Reads panic if
/// `k >= size()`.
pub trait FilterOutput {
    /// Discards everything written so far.
    fn clear(&mut self);

    /// Number of output records written.
    fn size(&self) -> usize;

    /// Writes the time of record `k`.
    fn write_time(&mut self, k: usize, t: f64);

    /// Writes the model state of record `k`.
    fn write_state(&mut self, k: usize, state: &State);

    /// Writes the static parameters of the run.
    fn write_parameters(&mut self, theta: &DVector<f64>);

    /// Writes the predicted mean of record `k`.
    fn write_predicted_mean(&mut self, k: usize, mu: &DVector<f64>);

    /// Writes the upper Cholesky factor of the predicted covariance of record `k`.
    fn write_predicted_std(&mut self, k: usize, u: &DMatrix<f64>);

    /// Writes the corrected mean of record `k`.
    fn write_corrected_mean(&mut self, k: usize, mu: &DVector<f64>);

    /// Writes the upper Cholesky factor of the corrected covariance of record `k`.
    fn write_corrected_std(&mut self, k: usize, u: &DMatrix<f64>);

    /// Writes the cross-covariance between records `k - 1` and `k`.
    fn write_cross(&mut self, k: usize, c: &DMatrix<f64>);

    /// Writes the marginal log-likelihood of the run.
    fn write_ll(&mut self, ll: f64);

    fn read_time(&self, k: usize) -> f64;

    fn read_predicted_mean(&self, k: usize) -> DVector<f64>;

    fn read_predicted_std(&self, k: usize) -> DMatrix<f64>;

    fn read_corrected_mean(&self, k: usize) -> DVector<f64>;

    fn read_corrected_std(&self, k: usize) -> DMatrix<f64>;

    fn read_cross(&self, k: usize) -> DMatrix<f64>;

    /// Marginal log-likelihood, if written.
    fn read_ll(&self) -> Option<f64>;
}
