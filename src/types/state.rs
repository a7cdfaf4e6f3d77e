//! Model state and linearisation blocks
//!
//! The state vector is laid out with the NR noise-augmented (exogenous)
//! variables first and the ND dynamic variables after them, M = NR + ND in
//! total. Linearisation blocks are held in a separate [`Linearization`]
//! structure that the simulator fills and the filter consumes.

use nalgebra::{DMatrix, DVector};

/// Model dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    /// Number of noise-augmented variables
    pub nr: usize,
    /// Number of dynamic variables
    pub nd: usize,
    /// Number of observable variables
    pub no: usize,
}

impl Dimensions {
    /// Creates a dimension record.
    pub fn new(nr: usize, nd: usize, no: usize) -> Self {
        Self { nr, nd, no }
    }

    /// Length of the filtered state vector, NR + ND.
    #[inline]
    pub fn m(&self) -> usize {
        self.nr + self.nd
    }
}

// ============================================================================
// Linearization
// ============================================================================

/// Linearisation blocks attached to a [`State`].
///
/// All Jacobians are stored transposed relative to the usual convention, so
/// that `F[i, j] = ∂x'_j / ∂x_i` and `G[i, j] = ∂y_j / ∂x_i`. The noise
/// blocks are square-root contributions: the covariance they represent is
/// `QᵗQ` and `RᵗR` respectively.
///
/// # Invariant
///
/// The simulator resets `f` to identity and `q`, `g`, `r` to zero before it
/// fills them, and the filter resets them again immediately after use, so a
/// stale linearisation is never consumed twice.
#[derive(Debug, Clone, PartialEq)]
pub struct Linearization {
    /// Transition Jacobian, M×M
    pub f: DMatrix<f64>,
    /// Process-noise contribution, M×M
    pub q: DMatrix<f64>,
    /// Observation Jacobian, M×NO
    pub g: DMatrix<f64>,
    /// Observation-noise contribution, NO×NO
    pub r: DMatrix<f64>,
}

impl Linearization {
    /// Creates reset blocks for the given dimensions.
    pub fn new(dims: Dimensions) -> Self {
        let m = dims.m();
        Self {
            f: DMatrix::identity(m, m),
            q: DMatrix::zeros(m, m),
            g: DMatrix::zeros(m, dims.no),
            r: DMatrix::zeros(dims.no, dims.no),
        }
    }

    /// Resets F to identity and Q to zero.
    pub fn reset_transition(&mut self) {
        self.f.fill_with_identity();
        self.q.fill(0.0);
    }

    /// Resets G and R to zero.
    pub fn reset_observation(&mut self) {
        self.g.fill(0.0);
        self.r.fill(0.0);
    }

    /// Resets all four blocks.
    pub fn reset(&mut self) {
        self.reset_transition();
        self.reset_observation();
    }

    /// Whether the transition blocks are in their reset state.
    pub fn is_transition_reset(&self) -> bool {
        let m = self.f.nrows();
        self.f == DMatrix::identity(m, m) && self.q.iter().all(|&x| x == 0.0)
    }

    /// Whether the observation blocks are in their reset state.
    pub fn is_observation_reset(&self) -> bool {
        self.g.iter().all(|&x| x == 0.0) && self.r.iter().all(|&x| x == 0.0)
    }
}

// ============================================================================
// State
// ============================================================================

/// Model state at one time point.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    /// Current time
    pub time: f64,
    /// Noise-augmented then dynamic variables, length M
    pub dynamic: DVector<f64>,
    /// Static parameters
    pub parameters: DVector<f64>,
    /// Predicted observation mean written by the simulator, length NO
    pub observed: DVector<f64>,
    /// Linearisation blocks
    pub lin: Linearization,
    dims: Dimensions,
}

impl State {
    /// Creates a zeroed state.
    pub fn new(dims: Dimensions, num_parameters: usize) -> Self {
        Self {
            time: 0.0,
            dynamic: DVector::zeros(dims.m()),
            parameters: DVector::zeros(num_parameters),
            observed: DVector::zeros(dims.no),
            lin: Linearization::new(dims),
            dims,
        }
    }

    /// Dimensions this state was created for.
    #[inline]
    pub fn dims(&self) -> Dimensions {
        self.dims
    }

    /// Noise-augmented block of the state vector.
    pub fn noise(&self) -> DVector<f64> {
        self.dynamic.rows(0, self.dims.nr).clone_owned()
    }

    /// Dynamic block of the state vector.
    pub fn dynamic_block(&self) -> DVector<f64> {
        self.dynamic.rows(self.dims.nr, self.dims.nd).clone_owned()
    }
}

// ============================================================================
// Initialisation Source
// ============================================================================

/// Values that override a simulator's default initialisation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitSource {
    /// Initial mean of the dynamic block (length ND)
    pub mean: Option<DVector<f64>>,
    /// Static parameters
    pub parameters: Option<DVector<f64>>,
}

impl InitSource {
    /// Overrides the initial dynamic mean.
    pub fn with_mean(mut self, mean: DVector<f64>) -> Self {
        self.mean = Some(mean);
        self
    }

    /// Overrides the static parameters.
    pub fn with_parameters(mut self, parameters: DVector<f64>) -> Self {
        self.parameters = Some(parameters);
        self
    }
}
