//! Self-describing in-memory dataset
//!
//! Named dimensions and named variables bound to them, with at most one
//! unlimited (record) dimension that grows as records are written. Stores
//! built on top validate the layout when they open a dataset.

/// A named dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    size: usize,
    unlimited: bool,
}

impl Dimension {
    /// Current extent.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether this is the record dimension.
    #[inline]
    pub fn is_unlimited(&self) -> bool {
        self.unlimited
    }
}

/// A named variable bound to one or more dimensions.
///
/// Values are stored row-major with the first dimension outermost.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    dims: Vec<usize>,
    data: Vec<f64>,
}

impl Variable {
    /// Number of dimensions.
    #[inline]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Dimension id bound at position `i`.
    #[inline]
    pub fn dim(&self, i: usize) -> usize {
        self.dims[i]
    }
}

/// Collection of dimensions and variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    dims: Vec<Dimension>,
    vars: Vec<Variable>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a dimension; `None` makes it the unlimited record dimension.
    ///
    /// # Panics
    /// Panics if the name is taken or a second unlimited dimension is added.
    pub fn add_dim(&mut self, name: &str, size: Option<usize>) -> usize {
        assert!(self.dim_id(name).is_none(), "Dimension {} already exists", name);
        assert!(
            size.is_some() || self.dims.iter().all(|d| !d.unlimited),
            "Only one unlimited dimension is supported"
        );
        self.dims.push(Dimension {
            name: name.to_string(),
            size: size.unwrap_or(0),
            unlimited: size.is_none(),
        });
        self.dims.len() - 1
    }

    /// Adds a variable over the given dimension ids.
    ///
    /// # Panics
    /// Panics if the name is taken, a dimension id is invalid, or the
    /// unlimited dimension is bound at any position but the first.
    pub fn add_var(&mut self, name: &str, dims: &[usize]) -> usize {
        assert!(self.var_id(name).is_none(), "Variable {} already exists", name);
        for (i, &d) in dims.iter().enumerate() {
            assert!(d < self.dims.len(), "Unknown dimension id {}", d);
            assert!(
                i == 0 || !self.dims[d].unlimited,
                "Unlimited dimension must be outermost"
            );
        }
        let len = dims.iter().map(|&d| self.dims[d].size).product();
        self.vars.push(Variable {
            name: name.to_string(),
            dims: dims.to_vec(),
            data: vec![f64::NAN; len],
        });
        self.vars.len() - 1
    }

    pub fn dim_id(&self, name: &str) -> Option<usize> {
        self.dims.iter().position(|d| d.name == name)
    }

    pub fn var_id(&self, name: &str) -> Option<usize> {
        self.vars.iter().position(|v| v.name == name)
    }

    pub fn dim(&self, id: usize) -> &Dimension {
        &self.dims[id]
    }

    pub fn var(&self, id: usize) -> &Variable {
        &self.vars[id]
    }

    /// Reads element `k` of a rank-1 variable.
    ///
    /// # Panics
    /// Panics if the variable is not rank 1 or `k` is out of bounds.
    pub fn get(&self, var: usize, k: usize) -> f64 {
        let v = &self.vars[var];
        assert_eq!(v.rank(), 1, "Variable {} is not one-dimensional", v.name);
        let extent = self.dims[v.dims[0]].size;
        assert!(k < extent, "Indexing out of bounds reading {}", v.name);
        v.data[k]
    }

    /// Writes element `k` of a rank-1 variable.
    ///
    /// Writing one past the end of the unlimited dimension appends a record
    /// to every variable over it.
    ///
    /// # Panics
    /// Panics if the variable is not rank 1 or `k` is out of bounds.
    pub fn put(&mut self, var: usize, k: usize, x: f64) {
        let (name, dim) = {
            let v = &self.vars[var];
            assert_eq!(v.rank(), 1, "Variable {} is not one-dimensional", v.name);
            (v.name.clone(), v.dims[0])
        };
        let extent = self.dims[dim].size;
        if self.dims[dim].unlimited && k == extent {
            self.grow(dim);
        } else {
            assert!(k < extent, "Indexing out of bounds writing {}", name);
        }
        self.vars[var].data[k] = x;
    }

    fn grow(&mut self, dim: usize) {
        self.dims[dim].size += 1;
        for v in self.vars.iter_mut().filter(|v| v.dims.first() == Some(&dim)) {
            let stride: usize = v.dims[1..].iter().map(|&d| self.dims[d].size).product();
            v.data.extend(std::iter::repeat(f64::NAN).take(stride));
        }
    }
}
