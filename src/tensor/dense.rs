//! Kernels over contiguous dense storage.

use ndarray::{ArrayD, IxDyn};

use super::shape::Shape;

/// Wraps a flat row-major value vector in an ndarray with the shape's axes.
/// The vector length must equal `shape.num_keys()`.
pub(crate) fn from_flat(shape: &Shape, values: Vec<f64>) -> ArrayD<f64> {
    debug_assert_eq!(values.len() as u64, shape.num_keys());
    // Length is checked above, so this cannot fail.
    ArrayD::from_shape_vec(IxDyn(shape.sizes()), values).unwrap()
}

pub(crate) fn filled(shape: &Shape, value: f64) -> ArrayD<f64> {
    ArrayD::from_elem(IxDyn(shape.sizes()), value)
}

/// Flat row-major view of a standard-layout array.
pub(crate) fn as_flat(array: &ArrayD<f64>) -> &[f64] {
    // All arrays in this crate are constructed in standard layout.
    array.as_slice().unwrap()
}
