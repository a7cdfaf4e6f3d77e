use nalgebra::{DMatrix, DVector};

use super::FilterOutput;
use crate::types::state::State;

/// One output record.
#[derive(Debug, Clone, PartialEq)]
pub struct KalmanRecord {
    pub time: f64,
    /// Full state vector at the output point
    pub state: DVector<f64>,
    pub predicted_mean: DVector<f64>,
    pub predicted_std: DMatrix<f64>,
    pub corrected_mean: DVector<f64>,
    pub corrected_std: DMatrix<f64>,
    pub cross: DMatrix<f64>,
}

impl KalmanRecord {
    fn zeros(m: usize) -> Self {
        Self {
            time: 0.0,
            state: DVector::zeros(m),
            predicted_mean: DVector::zeros(m),
            predicted_std: DMatrix::zeros(m, m),
            corrected_mean: DVector::zeros(m),
            corrected_std: DMatrix::zeros(m, m),
            cross: DMatrix::zeros(m, m),
        }
    }

    /// Predicted covariance `UᵗU`.
    pub fn predicted_covariance(&self) -> DMatrix<f64> {
        self.predicted_std.tr_mul(&self.predicted_std)
    }

    /// Corrected covariance `UᵗU`.
    pub fn corrected_covariance(&self) -> DMatrix<f64> {
        self.corrected_std.tr_mul(&self.corrected_std)
    }
}

/// In-memory [`FilterOutput`] with an appendable record dimension.
#[derive(Debug, Clone, Default)]
pub struct KalmanFilterBuffer {
    m: usize,
    records: Vec<KalmanRecord>,
    parameters: Option<DVector<f64>>,
    ll: Option<f64>,
}

impl KalmanFilterBuffer {
    /// Creates an empty buffer for state vectors of length `m`.
    pub fn new(m: usize) -> Self {
        Self {
            m,
            ..Default::default()
        }
    }

    /// Record `k`.
    ///
    /// # Panics
    /// Panics if `k` is out of range.
    pub fn record(&self, k: usize) -> &KalmanRecord {
        assert!(k < self.records.len(), "Output record {} out of range", k);
        &self.records[k]
    }

    /// All records in output order.
    pub fn records(&self) -> &[KalmanRecord] {
        &self.records
    }

    /// Static parameters, if written.
    pub fn parameters(&self) -> Option<&DVector<f64>> {
        self.parameters.as_ref()
    }

    /// Returns record `k` for writing, appending it if `k` is one past the end.
    fn slot(&mut self, k: usize) -> &mut KalmanRecord {
        assert!(
            k <= self.records.len(),
            "Output record {} written before record {}",
            k,
            self.records.len()
        );
        if k == self.records.len() {
            self.records.push(KalmanRecord::zeros(self.m));
        }
        &mut self.records[k]
    }
}

impl FilterOutput for KalmanFilterBuffer {
    fn clear(&mut self) {
        self.records.clear();
        self.parameters = None;
        self.ll = None;
    }

    fn size(&self) -> usize {
        self.records.len()
    }

    fn write_time(&mut self, k: usize, t: f64) {
        self.slot(k).time = t;
    }

    fn write_state(&mut self, k: usize, state: &State) {
        self.slot(k).state.copy_from(&state.dynamic);
    }

    fn write_parameters(&mut self, theta: &DVector<f64>) {
        self.parameters = Some(theta.clone());
    }

    fn write_predicted_mean(&mut self, k: usize, mu: &DVector<f64>) {
        self.slot(k).predicted_mean.copy_from(mu);
    }

    fn write_predicted_std(&mut self, k: usize, u: &DMatrix<f64>) {
        self.slot(k).predicted_std.copy_from(u);
    }

    fn write_corrected_mean(&mut self, k: usize, mu: &DVector<f64>) {
        self.slot(k).corrected_mean.copy_from(mu);
    }

    fn write_corrected_std(&mut self, k: usize, u: &DMatrix<f64>) {
        self.slot(k).corrected_std.copy_from(u);
    }

    fn write_cross(&mut self, k: usize, c: &DMatrix<f64>) {
        self.slot(k).cross.copy_from(c);
    }

    fn write_ll(&mut self, ll: f64) {
        self.ll = Some(ll);
    }

    fn read_time(&self, k: usize) -> f64 {
        self.record(k).time
    }

    fn read_predicted_mean(&self, k: usize) -> DVector<f64> {
        self.record(k).predicted_mean.clone()
    }

    fn read_predicted_std(&self, k: usize) -> DMatrix<f64> {
        self.record(k).predicted_std.clone()
    }

    fn read_corrected_mean(&self, k: usize) -> DVector<f64> {
        self.record(k).corrected_mean.clone()
    }

    fn read_corrected_std(&self, k: usize) -> DMatrix<f64> {
        self.record(k).corrected_std.clone()
    }

    fn read_cross(&self, k: usize) -> DMatrix<f64> {
        self.record(k).cross.clone()
    }

    fn read_ll(&self) -> Option<f64> {
        self.ll
    }
}
