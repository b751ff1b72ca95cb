//! Exact inference over factor graphs.

mod junction_tree;
mod marginals;

pub use junction_tree::JunctionTree;
pub use marginals::{MarginalSet, MaxMarginalSet};
