//! Observation masks
//!
//! At each observation step only some of the NO observable components may
//! actually be observed. A [`Mask`] records, for every observed variable in
//! declaration order, which of its components are active: either a dense run
//! from the start of the variable or an explicit sparse list of offsets.
//! [`Mask::index_map`] flattens this into global indices that drive all
//! gathering between full NO-dimensional and step-local W-dimensional buffers.

// ============================================================================
// Observed Variables
// ============================================================================

/// An observed variable: a named, contiguous block of the observation vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObsVar {
    /// Variable name
    pub name: String,
    /// Offset of the first component within the observation vector
    pub start: usize,
    /// Number of components
    pub size: usize,
}

impl ObsVar {
    /// Creates an observed variable.
    pub fn new(name: impl Into<String>, start: usize, size: usize) -> Self {
        Self {
            name: name.into(),
            start,
            size,
        }
    }
}

/// Lays out variables of the given sizes back to back from offset zero.
pub fn layout_vars(specs: &[(&str, usize)]) -> Vec<ObsVar> {
    let mut start = 0;
    specs
        .iter()
        .map(|&(name, size)| {
            let var = ObsVar::new(name, start, size);
            start += size;
            var
        })
        .collect()
}

/// Total observation-vector length spanned by `vars`.
pub fn total_size(vars: &[ObsVar]) -> usize {
    vars.iter().map(|v| v.start + v.size).max().unwrap_or(0)
}

// ============================================================================
// Mask
// ============================================================================

/// Active components of a single observed variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarMask {
    /// The first `size` components are active
    Dense { size: usize },
    /// The listed components (offsets local to the variable) are active
    Sparse { indices: Vec<usize> },
}

impl VarMask {
    /// Number of active components.
    #[inline]
    pub fn size(&self) -> usize {
        match self {
            VarMask::Dense { size } => *size,
            VarMask::Sparse { indices } => indices.len(),
        }
    }

    /// Whether the active components are given as an explicit list.
    #[inline]
    pub fn is_sparse(&self) -> bool {
        matches!(self, VarMask::Sparse { .. })
    }
}

/// Active observation components for one observation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    vars: Vec<VarMask>,
}

impl Mask {
    /// Creates a mask from one entry per observed variable.
    pub fn new(vars: Vec<VarMask>) -> Self {
        Self { vars }
    }

    /// A mask with every component of every variable active.
    pub fn dense(vars: &[ObsVar]) -> Self {
        Self {
            vars: vars.iter().map(|v| VarMask::Dense { size: v.size }).collect(),
        }
    }

    /// A mask selecting explicit global indices of the observation vector.
    ///
    /// Indices are attributed to the variable whose block contains them.
    ///
    /// # Panics
    /// Panics if an index lies outside every variable.
    pub fn from_global_indices(vars: &[ObsVar], indices: &[usize]) -> Self {
        let mut local: Vec<Vec<usize>> = vec![Vec::new(); vars.len()];
        for &i in indices {
            let id = vars
                .iter()
                .position(|v| i >= v.start && i < v.start + v.size)
                .unwrap_or_else(|| panic!("Observation index {} is not in any variable", i));
            local[id].push(i - vars[id].start);
        }
        Self {
            vars: local
                .into_iter()
                .map(|indices| VarMask::Sparse { indices })
                .collect(),
        }
    }

    /// Total number of active components, W.
    pub fn size(&self) -> usize {
        self.vars.iter().map(VarMask::size).sum()
    }

    /// Number of active components of variable `id`.
    #[inline]
    pub fn var_size(&self, id: usize) -> usize {
        self.vars[id].size()
    }

    /// Whether variable `id` is masked sparsely.
    #[inline]
    pub fn is_sparse(&self, id: usize) -> bool {
        self.vars[id].is_sparse()
    }

    /// Mask entry for variable `id`.
    #[inline]
    pub fn var(&self, id: usize) -> &VarMask {
        &self.vars[id]
    }

    /// Checks the mask against the variable table it will be applied to.
    pub fn is_compatible(&self, vars: &[ObsVar]) -> bool {
        self.vars.len() == vars.len()
            && self.vars.iter().zip(vars).all(|(m, v)| match m {
                VarMask::Dense { size } => *size <= v.size,
                VarMask::Sparse { indices } => indices.iter().all(|&i| i < v.size),
            })
    }

    /// Global observation-vector indices of the active components.
    ///
    /// Dense entries contribute a contiguous run seeded at the variable's
    /// start; sparse entries contribute their offsets shifted by that start.
    /// Variables are concatenated in declaration order.
    ///
    /// # Panics
    /// Panics if the mask does not match `vars`.
    pub fn index_map(&self, vars: &[ObsVar]) -> Vec<usize> {
        assert!(
            self.is_compatible(vars),
            "Mask does not match the observed variables"
        );
        let mut map = Vec::with_capacity(self.size());
        for (mask, var) in self.vars.iter().zip(vars) {
            match mask {
                VarMask::Dense { size } => map.extend(var.start..var.start + size),
                VarMask::Sparse { indices } => map.extend(indices.iter().map(|&i| var.start + i)),
            }
        }
        map
    }
}
