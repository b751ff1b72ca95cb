//! Weight tensors over numbered dimensions.
//!
//! Every axis carries a dimension number, and all operations align
//! operands by number rather than by position. This is what lets factors
//! over different variable sets multiply without any explicit reshaping.

mod builder;
mod dense;
mod logspace;
mod shape;
mod sparse;
#[allow(clippy::module_inception)]
mod tensor;

pub use builder::TensorBuilder;
pub use logspace::LogTensor;
pub use shape::{KeyNum, Shape};
pub use tensor::{MarginalOp, Tensor};
