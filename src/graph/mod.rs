//! Discrete variables, assignments, table factors, and factor graphs.

mod factor;
mod factor_graph;
mod variable;

pub use factor::{TableFactor, TableFactorBuilder};
pub use factor_graph::{FactorGraph, FactorGraphBuilder};
pub use variable::{Assignment, DiscreteVariable, VariableNumMap};
