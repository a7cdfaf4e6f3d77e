//! In-memory observation source
//!
//! Holds one record per observation step: the time, the active-component
//! [`Mask`] and the full NO-length value vector.

use nalgebra::DVector;

use super::ObservationSource;
use crate::types::mask::{total_size, Mask, ObsVar};

/// Observations held in memory, in time order.
#[derive(Debug, Clone)]
pub struct ObservationSet {
    vars: Vec<ObsVar>,
    times: Vec<f64>,
    masks: Vec<Mask>,
    values: Vec<DVector<f64>>,
}

impl ObservationSet {
    /// Creates an empty set over the given observed variables.
    pub fn new(vars: Vec<ObsVar>) -> Self {
        Self {
            vars,
            times: Vec::new(),
            masks: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Length of the full observation vector.
    pub fn no(&self) -> usize {
        total_size(&self.vars)
    }

    /// Observation times in order.
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Appends a fully observed record.
    ///
    /// # Panics
    /// Panics if `values` is not NO long or `time` precedes the last record.
    pub fn push_dense(&mut self, time: f64, values: DVector<f64>) {
        assert_eq!(values.len(), self.no(), "Dense observation must cover every component");
        let mask = Mask::dense(&self.vars);
        self.push_record(time, mask, values);
    }

    /// Appends a partially observed record.
    ///
    /// `values` holds the active components only, in index-map order; they
    /// are scattered into a full vector whose inactive components are NaN.
    ///
    /// # Panics
    /// Panics if `values` does not match the mask size, the mask does not
    /// match the variables, or `time` precedes the last record.
    pub fn push(&mut self, time: f64, mask: Mask, values: &[f64]) {
        assert_eq!(
            values.len(),
            mask.size(),
            "Observation values must match the mask size"
        );
        let map = mask.index_map(&self.vars);
        let mut full = DVector::from_element(self.no(), f64::NAN);
        for (&i, &v) in map.iter().zip(values) {
            full[i] = v;
        }
        self.push_record(time, mask, full);
    }

    fn push_record(&mut self, time: f64, mask: Mask, values: DVector<f64>) {
        assert!(time.is_finite(), "Observation time must be finite");
        if let Some(&last) = self.times.last() {
            assert!(time > last, "Observation times must be strictly increasing");
        }
        self.times.push(time);
        self.masks.push(mask);
        self.values.push(values);
    }
}

impl ObservationSource for ObservationSet {
    fn vars(&self) -> &[ObsVar] {
        &self.vars
    }

    fn len(&self) -> usize {
        self.times.len()
    }

    fn mask(&self, index_obs: usize) -> &Mask {
        &self.masks[index_obs]
    }

    fn values(&self, index_obs: usize) -> &DVector<f64> {
        &self.values[index_obs]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::mask::layout_vars;

    #[test]
    fn test_dense_and_sparse_records() {
        let mut obs = ObservationSet::new(layout_vars(&[("y", 3)]));
        assert!(obs.is_empty());
        obs.push_dense(1.0, DVector::from_vec(vec![1.0, 2.0, 3.0]));

        let mask = Mask::from_global_indices(obs.vars(), &[0, 2]);
        obs.push(2.0, mask, &[4.0, 6.0]);

        assert_eq!(obs.len(), 2);
        assert_eq!(obs.times(), &[1.0, 2.0]);
        assert_eq!(obs.mask(0).size(), 3);
        assert_eq!(obs.mask(1).size(), 2);

        let v = obs.values(1);
        assert_eq!(v[0], 4.0);
        assert!(v[1].is_nan());
        assert_eq!(v[2], 6.0);
    }

    #[test]
    #[should_panic(expected = "strictly increasing")]
    fn test_out_of_order_panics() {
        let mut obs = ObservationSet::new(layout_vars(&[("y", 1)]));
        obs.push_dense(1.0, DVector::from_vec(vec![0.0]));
        obs.push_dense(0.5, DVector::from_vec(vec![0.0]));
    }
}
