//! Discrete tensor algebra and exact junction-tree inference.
//!
//! Factors over named discrete variables are backed by [`tensor::Tensor`]
//! weights; [`inference::JunctionTree`] computes exact sum- and
//! max-marginals of a [`graph::FactorGraph`] by two-pass message passing
//! over a clique tree. Everything is immutable: operations return new
//! values, which makes batches of inference calls trivially parallel
//! (see [`parallel`]).

pub mod graph;
pub mod inference;
pub mod parallel;
pub mod tensor;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Dimension numbers must be strictly increasing, got {0:?}.")]
    UnsortedDimensions(Vec<u32>),
    #[error("Dimension {0} has zero size.")]
    EmptyDimension(u32),
    #[error("Got {dims} dimension numbers but {sizes} sizes.")]
    DimensionCount { dims: usize, sizes: usize },
    #[error("Dimension {dim} has size {left} in one operand and {right} in the other.")]
    ShapeMismatch { dim: u32, left: usize, right: usize },
    #[error("Dimension {0} is not part of this tensor.")]
    UnknownDimension(u32),
    #[error("Key {key} is out of range for dimension {dim} (size {size}).")]
    KeyOutOfBounds { dim: u32, key: usize, size: usize },
    #[error("Key has {got} elements, but the tensor has {expected} dimensions.")]
    KeyLength { got: usize, expected: usize },
    #[error("Relabeling assigns dimension number {0} more than once.")]
    DuplicateDimension(u32),
    #[error("Got {got} values, but the shape has {expected} keys.")]
    ValueCount { got: usize, expected: u64 },
    #[error("No variable numbered {0}.")]
    NoVarNum(u32),
    #[error("No variable named {0}.")]
    NoVar(String),
    #[error("Variable {0} already declared, or declared with a different domain.")]
    VariableConflict(u32),
    #[error("Unknown value {value:?} for variable {var}.")]
    UnknownValue { var: String, value: String },
    #[error("Assignment does not cover variable {0}, which is in the factor scope.")]
    ScopeMismatch(u32),
    #[error("Conflicting values for variable {0} when merging assignments.")]
    AssignmentConflict(u32),
    #[error("Factor mentions variable {0}, which is not declared in the graph.")]
    UndeclaredVariable(u32),
    #[error(
        "Clique over variables {vars:?} would hold {size} entries, above the limit of {limit}. \
         Exact inference is intractable for this model."
    )]
    IntractableModel {
        vars: Vec<u32>,
        size: u128,
        limit: u64,
    },
    #[error("No clique contains all of the variables {0:?}.")]
    NoCoveringClique(Vec<u32>),
    #[error("Cannot sample from a factor with zero total weight.")]
    ZeroWeight,
    #[error("There is no assignment with nonzero weight at rank {0}.")]
    NoSuchAssignment(usize),
    #[error("Could not build the thread pool: {0}.")]
    ThreadPool(String),
}

/// Tunable limits and execution knobs, passed explicitly to the call sites
/// that need them. There is no process-wide configuration state.
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum number of entries a single clique potential may hold.
    pub(crate) max_clique_size: u64,
    /// Thread count for `parallel::map_reduce`. `None` uses the global pool.
    pub(crate) num_threads: Option<usize>,
}

impl Config {
    pub fn with_default_limits() -> Self {
        Self {
            // 2^24 doubles per clique, 128 MiB of weights.
            max_clique_size: 1 << 24,
            num_threads: None,
        }
    }
    pub fn max_clique_size(mut self, limit: u64) -> Self {
        self.max_clique_size = limit;
        self
    }
    pub fn num_threads(mut self, n: usize) -> Self {
        self.num_threads = Some(n);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::with_default_limits()
    }
}
