use log::warn;
use nalgebra::DVector;

use super::Dataset;
use crate::{FilterError, Result};

/// Name of the record dimension.
pub const RECORD_DIM: &str = "ns";
/// Objective value per record.
pub const VALUE_VAR: &str = "optimiser.value";
/// Simplex (or step) size per record.
pub const SIZE_VAR: &str = "optimiser.size";

/// Per-run scalar results of a parameter search.
///
/// Each record holds the objective value, a size scalar and the parameter
/// values it was evaluated at, over the unlimited `ns` dimension.
#[derive(Debug, Clone)]
pub struct OptimiserBuffer {
    data: Dataset,
    ns: usize,
    value: usize,
    size: usize,
    /// Variable per parameter, `None` if the dataset does not carry it
    params: Vec<Option<usize>>,
}

impl OptimiserBuffer {
    /// Lays out a fresh dataset for the named parameters.
    pub fn create(param_names: &[&str]) -> Self {
        let mut data = Dataset::new();
        let ns = data.add_dim(RECORD_DIM, None);
        let value = data.add_var(VALUE_VAR, &[ns]);
        let size = data.add_var(SIZE_VAR, &[ns]);
        let params = param_names
            .iter()
            .map(|name| Some(data.add_var(name, &[ns])))
            .collect();
        Self {
            data,
            ns,
            value,
            size,
            params,
        }
    }

    /// Opens an existing dataset, validating its layout.
    ///
    /// Parameter variables are optional; those absent are not recorded.
    ///
    /// # Errors
    /// [`FilterError::Format`] if the record dimension or the value and
    /// size variables are missing or bound to the wrong dimensions.
    pub fn open(data: Dataset, param_names: &[&str]) -> Result<Self> {
        let ns = data
            .dim_id(RECORD_DIM)
            .ok_or_else(|| FilterError::Format(format!("missing {} dimension", RECORD_DIM)))?;
        if !data.dim(ns).is_unlimited() {
            warn!("{} dimension should be unlimited", RECORD_DIM);
        }
        let value = Self::map_record_var(&data, ns, VALUE_VAR)?;
        let size = Self::map_record_var(&data, ns, SIZE_VAR)?;
        let params = param_names
            .iter()
            .map(|name| match data.var_id(name) {
                Some(id) => Self::map_record_var(&data, ns, name).map(|_| Some(id)),
                None => Ok(None),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            data,
            ns,
            value,
            size,
            params,
        })
    }

    fn map_record_var(data: &Dataset, ns: usize, name: &str) -> Result<usize> {
        let id = data
            .var_id(name)
            .ok_or_else(|| FilterError::Format(format!("missing variable {}", name)))?;
        let var = data.var(id);
        if var.rank() != 1 {
            return Err(FilterError::Format(format!(
                "variable {} has {} dimensions, should have 1",
                name,
                var.rank()
            )));
        }
        if var.dim(0) != ns {
            return Err(FilterError::Format(format!(
                "dimension 0 of variable {} should be {}",
                name, RECORD_DIM
            )));
        }
        Ok(id)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.data.dim(self.ns).size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn read_value(&self, k: usize) -> f64 {
        self.data.get(self.value, k)
    }

    pub fn write_value(&mut self, k: usize, x: f64) {
        self.data.put(self.value, k, x);
    }

    pub fn read_size(&self, k: usize) -> f64 {
        self.data.get(self.size, k)
    }

    pub fn write_size(&mut self, k: usize, x: f64) {
        self.data.put(self.size, k, x);
    }

    /// Writes the parameters of record `k`, skipping unmapped ones.
    ///
    /// # Panics
    /// Panics if `theta` does not have one entry per parameter.
    pub fn write_parameters(&mut self, k: usize, theta: &DVector<f64>) {
        assert_eq!(theta.len(), self.params.len(), "Parameter count mismatch");
        for (param, &x) in self.params.iter().zip(theta.iter()) {
            if let Some(id) = *param {
                self.data.put(id, k, x);
            }
        }
    }

    /// Reads the parameters of record `k`; unmapped ones read as NaN.
    pub fn read_parameters(&self, k: usize) -> DVector<f64> {
        DVector::from_iterator(
            self.params.len(),
            self.params
                .iter()
                .map(|param| param.map_or(f64::NAN, |id| self.data.get(id, k))),
        )
    }

    /// Record with the largest value, if any.
    pub fn best(&self) -> Option<usize> {
        (0..self.len())
            .filter(|&k| !self.read_value(k).is_nan())
            .max_by(|&a, &b| self.read_value(a).total_cmp(&self.read_value(b)))
    }

    pub fn dataset(&self) -> &Dataset {
        &self.data
    }

    pub fn into_dataset(self) -> Dataset {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_write_reopen() {
        let mut buf = OptimiserBuffer::create(&["rho", "beta"]);
        buf.write_value(0, -10.0);
        buf.write_size(0, 0.5);
        buf.write_parameters(0, &DVector::from_vec(vec![28.0, 2.5]));
        buf.write_value(1, -7.0);
        buf.write_parameters(1, &DVector::from_vec(vec![27.0, 2.6]));
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.best(), Some(1));

        let reopened =
            OptimiserBuffer::open(buf.into_dataset(), &["rho", "beta", "sigma"]).unwrap();
        assert_eq!(reopened.read_value(0), -10.0);
        assert_eq!(reopened.read_size(0), 0.5);
        let theta = reopened.read_parameters(1);
        assert_eq!(theta[0], 27.0);
        assert!(theta[2].is_nan());
    }

    #[test]
    fn test_open_missing_dimension() {
        let ds = Dataset::new();
        let err = OptimiserBuffer::open(ds, &[]).unwrap_err();
        assert!(matches!(err, FilterError::Format(msg) if msg.contains("ns")));
    }

    #[test]
    fn test_open_wrong_binding() {
        let mut ds = Dataset::new();
        let ns = ds.add_dim(RECORD_DIM, None);
        let other = ds.add_dim("np", Some(3));
        ds.add_var(VALUE_VAR, &[ns]);
        ds.add_var(SIZE_VAR, &[other]);
        let err = OptimiserBuffer::open(ds, &[]).unwrap_err();
        assert_eq!(
            err,
            FilterError::Format("dimension 0 of variable optimiser.size should be ns".into())
        );
    }

    #[test]
    fn test_open_wrong_rank() {
        let mut ds = Dataset::new();
        let ns = ds.add_dim(RECORD_DIM, None);
        let np = ds.add_dim("np", Some(2));
        ds.add_var(VALUE_VAR, &[ns, np]);
        ds.add_var(SIZE_VAR, &[ns]);
        let err = OptimiserBuffer::open(ds, &[]).unwrap_err();
        assert!(matches!(err, FilterError::Format(msg) if msg.contains("has 2 dimensions")));
    }

    #[test]
    fn test_fixed_record_dimension_still_opens() {
        let mut ds = Dataset::new();
        let ns = ds.add_dim(RECORD_DIM, Some(1));
        ds.add_var(VALUE_VAR, &[ns]);
        ds.add_var(SIZE_VAR, &[ns]);
        let mut buf = OptimiserBuffer::open(ds, &[]).unwrap();
        buf.write_value(0, 1.0);
        assert_eq!(buf.read_value(0), 1.0);
    }
}
