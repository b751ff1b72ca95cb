use itertools::Either;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

use super::dense;
use super::shape::{KeyMapper, KeyNum, Shape};
use super::sparse;

/// Reduction applied when dimensions are marginalized out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginalOp {
    Sum,
    Max,
}

/// Pointwise combiner for binary tensor operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CombineOp {
    Mul,
    Add,
    Max,
}

impl CombineOp {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            CombineOp::Mul => a * b,
            CombineOp::Add => a + b,
            CombineOp::Max => a.max(b),
        }
    }
}

/// Sparse tensors switch to dense storage above this fill ratio.
const DENSE_FILL_THRESHOLD: f64 = 0.25;
/// Below this many keys, dense storage always wins.
const SMALL_DENSE_KEYS: KeyNum = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Repr {
    Dense(ArrayD<f64>),
    Sparse {
        key_nums: Vec<KeyNum>,
        values: Vec<f64>,
    },
}

/// A multi-dimensional array of weights addressed by numbered dimensions.
///
/// Dimension numbers give broadcasting semantics directly: two tensors
/// combine over the union of their dimension numbers, with each operand
/// replicated along the dimensions it lacks. Storage switches between a
/// dense row-major array and sorted sparse parallel arrays depending on
/// fill ratio; the choice never changes the observable values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tensor {
    shape: Shape,
    repr: Repr,
}

impl Tensor {
    /// Dense tensor from a flat row-major value vector.
    pub fn from_values(shape: Shape, values: Vec<f64>) -> Result<Self> {
        if values.len() as KeyNum != shape.num_keys() {
            return Err(Error::ValueCount {
                got: values.len(),
                expected: shape.num_keys(),
            });
        }
        Ok(Self {
            repr: Repr::Dense(dense::from_flat(&shape, values)),
            shape,
        })
    }

    /// Sparse tensor from entries sorted by strictly increasing key number.
    pub(crate) fn from_sorted_entries(
        shape: Shape,
        key_nums: Vec<KeyNum>,
        values: Vec<f64>,
    ) -> Self {
        debug_assert!(key_nums.windows(2).all(|w| w[0] < w[1]));
        Self::pack(shape, key_nums, values)
    }

    pub fn zeros(shape: Shape) -> Self {
        Self {
            repr: Repr::Sparse {
                key_nums: Vec::new(),
                values: Vec::new(),
            },
            shape,
        }
    }

    pub fn constant(shape: Shape, value: f64) -> Self {
        Self {
            repr: Repr::Dense(dense::filled(&shape, value)),
            shape,
        }
    }

    /// Zero-dimensional tensor holding a single weight.
    pub fn scalar(value: f64) -> Self {
        Self::constant(Shape::scalar(), value)
    }

    /// Picks a storage representation for nonzero entries sorted by key.
    fn pack(shape: Shape, key_nums: Vec<KeyNum>, values: Vec<f64>) -> Self {
        let total = shape.num_keys();
        let dense_wins = total <= SMALL_DENSE_KEYS
            || key_nums.len() as f64 > DENSE_FILL_THRESHOLD * total as f64;
        if dense_wins {
            let mut flat = vec![0.0; total as usize];
            for (k, v) in key_nums.iter().zip(values.iter()) {
                flat[*k as usize] = *v;
            }
            Self {
                repr: Repr::Dense(dense::from_flat(&shape, flat)),
                shape,
            }
        } else {
            Self {
                repr: Repr::Sparse { key_nums, values },
                shape,
            }
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self.repr, Repr::Sparse { .. })
    }

    /// Count of explicitly stored nonzero entries.
    pub fn num_nonzero(&self) -> usize {
        self.entries().count()
    }

    /// Weight at a full dim key, with bounds checking.
    pub fn get(&self, key: &[usize]) -> Result<f64> {
        Ok(self.value_at(self.shape.key_num(key)?))
    }

    /// Weight at a key number. Absent sparse keys read as 0.0.
    pub fn value_at(&self, key_num: KeyNum) -> f64 {
        match &self.repr {
            Repr::Dense(a) => dense::as_flat(a)[key_num as usize],
            Repr::Sparse { key_nums, values } => sparse::get(key_nums, values, key_num),
        }
    }

    /// Nonzero entries in increasing key number order.
    pub fn entries(&self) -> impl Iterator<Item = (KeyNum, f64)> + '_ {
        match &self.repr {
            Repr::Dense(a) => Either::Left(
                dense::as_flat(a)
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| **v != 0.0)
                    .map(|(i, v)| (i as KeyNum, *v)),
            ),
            Repr::Sparse { key_nums, values } => Either::Right(
                key_nums.iter().copied().zip(values.iter().copied()),
            ),
        }
    }

    /// Pointwise product over the union of both dimension sets.
    pub fn product(&self, other: &Tensor) -> Result<Tensor> {
        self.combine(other, CombineOp::Mul)
    }

    /// Pointwise sum over the union of both dimension sets.
    pub fn add(&self, other: &Tensor) -> Result<Tensor> {
        self.combine(other, CombineOp::Add)
    }

    /// Pointwise maximum over the union of both dimension sets.
    pub fn maximum(&self, other: &Tensor) -> Result<Tensor> {
        self.combine(other, CombineOp::Max)
    }

    /// Product requiring disjoint dimension sets.
    pub fn outer_product(&self, other: &Tensor) -> Result<Tensor> {
        for dim in self.shape.dims() {
            if other.shape.contains(*dim) {
                return Err(Error::DuplicateDimension(*dim));
            }
        }
        self.product(other)
    }

    /// Product followed by sum-marginalization of all shared dimensions.
    pub fn inner_product(&self, other: &Tensor) -> Result<Tensor> {
        let shared = self.shape.shared_dims(&other.shape);
        Ok(self.product(other)?.marginalize(&shared, MarginalOp::Sum))
    }

    pub(crate) fn combine(&self, other: &Tensor, op: CombineOp) -> Result<Tensor> {
        let result_shape = self.shape.union(&other.shape)?;
        if self.shape == other.shape {
            return Ok(self.combine_same_shape(other, op));
        }
        if op == CombineOp::Mul {
            // Multiplication by a smaller operand never grows the support,
            // so iterate the covering side and keep its sparsity.
            if result_shape == self.shape {
                return Ok(self.broadcast_mul(other));
            }
            if result_shape == other.shape {
                return Ok(other.broadcast_mul(self));
            }
        }
        Ok(Tensor::combine_general(self, other, result_shape, op))
    }

    fn combine_same_shape(&self, other: &Tensor, op: CombineOp) -> Tensor {
        match (&self.repr, &other.repr) {
            (Repr::Dense(a), Repr::Dense(b)) => {
                let values = dense::as_flat(a)
                    .iter()
                    .zip(dense::as_flat(b).iter())
                    .map(|(x, y)| op.apply(*x, *y))
                    .collect();
                Tensor {
                    repr: Repr::Dense(dense::from_flat(&self.shape, values)),
                    shape: self.shape.clone(),
                }
            }
            (
                Repr::Sparse {
                    key_nums: ka,
                    values: va,
                },
                Repr::Sparse {
                    key_nums: kb,
                    values: vb,
                },
            ) => {
                let (keys, values) = match op {
                    CombineOp::Mul => sparse::merge_product(ka, va, kb, vb),
                    _ => sparse::merge_combine(ka, va, kb, vb, |a, b| op.apply(a, b)),
                };
                Tensor::pack(self.shape.clone(), keys, values)
            }
            _ => {
                if op == CombineOp::Mul {
                    // Only the sparse side's support survives.
                    let (sparse_side, dense_side) = if self.is_sparse() {
                        (self, other)
                    } else {
                        (other, self)
                    };
                    let mut keys = Vec::new();
                    let mut values = Vec::new();
                    for (k, v) in sparse_side.entries() {
                        let prod = v * dense_side.value_at(k);
                        if prod != 0.0 {
                            keys.push(k);
                            values.push(prod);
                        }
                    }
                    Tensor::pack(self.shape.clone(), keys, values)
                } else {
                    let n = self.shape.num_keys();
                    let values = (0..n)
                        .map(|k| op.apply(self.value_at(k), other.value_at(k)))
                        .collect();
                    Tensor {
                        repr: Repr::Dense(dense::from_flat(&self.shape, values)),
                        shape: self.shape.clone(),
                    }
                }
            }
        }
    }

    /// Multiplies by an operand whose dimensions are a subset of ours.
    fn broadcast_mul(&self, small: &Tensor) -> Tensor {
        // The subset relation was established by the caller.
        let mapper = KeyMapper::new(&self.shape, &small.shape).unwrap();
        match &self.repr {
            Repr::Dense(a) => {
                let values = dense::as_flat(a)
                    .iter()
                    .enumerate()
                    .map(|(k, v)| v * small.value_at(mapper.map(k as KeyNum)))
                    .collect();
                Tensor {
                    repr: Repr::Dense(dense::from_flat(&self.shape, values)),
                    shape: self.shape.clone(),
                }
            }
            Repr::Sparse { key_nums, values } => {
                // Fast path: when the small operand's dimensions are
                // exactly our leading dimensions, its key is a plain
                // division and both key streams merge in one pass.
                let k = small.shape.rank();
                if k > 0 && small.shape.dims() == &self.shape.dims()[..k] {
                    if let Repr::Sparse {
                        key_nums: small_keys,
                        values: small_values,
                    } = &small.repr
                    {
                        let multiplier = self.shape.offsets()[k - 1];
                        let (out_keys, out_values) = sparse::prefix_product(
                            key_nums,
                            values,
                            small_keys,
                            small_values,
                            multiplier,
                        );
                        return Tensor::pack(self.shape.clone(), out_keys, out_values);
                    }
                }
                let mut out_keys = Vec::with_capacity(key_nums.len());
                let mut out_values = Vec::with_capacity(values.len());
                for (k, v) in key_nums.iter().zip(values.iter()) {
                    let prod = v * small.value_at(mapper.map(*k));
                    if prod != 0.0 {
                        out_keys.push(*k);
                        out_values.push(prod);
                    }
                }
                Tensor::pack(self.shape.clone(), out_keys, out_values)
            }
        }
    }

    /// Fallback for operands with incomparable dimension sets: materialize
    /// the union shape densely and read both sides through key mappers.
    fn combine_general(a: &Tensor, b: &Tensor, result_shape: Shape, op: CombineOp) -> Tensor {
        let map_a = KeyMapper::new(&result_shape, &a.shape).unwrap();
        let map_b = KeyMapper::new(&result_shape, &b.shape).unwrap();
        let values = (0..result_shape.num_keys())
            .map(|k| op.apply(a.value_at(map_a.map(k)), b.value_at(map_b.map(k))))
            .collect();
        Tensor {
            repr: Repr::Dense(dense::from_flat(&result_shape, values)),
            shape: result_shape,
        }
    }

    /// Reduces away the listed dimensions. Numbers not present in this
    /// tensor are ignored, so callers can pass a superset of the scope.
    pub fn marginalize(&self, dims: &[u32], op: MarginalOp) -> Tensor {
        let result_shape = self.shape.remove(dims);
        if result_shape.rank() == self.shape.rank() {
            return self.clone();
        }
        let mapper = KeyMapper::new(&self.shape, &result_shape).unwrap();
        let total = result_shape.num_keys() as usize;
        match op {
            MarginalOp::Sum => {
                let mut acc = vec![0.0; total];
                for (k, v) in self.entries() {
                    acc[mapper.map(k) as usize] += v;
                }
                Tensor {
                    repr: Repr::Dense(dense::from_flat(&result_shape, acc)),
                    shape: result_shape,
                }
            }
            MarginalOp::Max => {
                // Keys absent from the support are implicit zeros and must
                // beat any negative stored value.
                let block = self.shape.num_keys() / result_shape.num_keys();
                let mut acc = vec![f64::NEG_INFINITY; total];
                let mut seen = vec![0 as KeyNum; total];
                for (k, v) in self.entries() {
                    let t = mapper.map(k) as usize;
                    if v > acc[t] {
                        acc[t] = v;
                    }
                    seen[t] += 1;
                }
                for (a, n) in acc.iter_mut().zip(seen.iter()) {
                    if *n < block && *a < 0.0 {
                        *a = 0.0;
                    }
                }
                Tensor {
                    repr: Repr::Dense(dense::from_flat(&result_shape, acc)),
                    shape: result_shape,
                }
            }
        }
    }

    /// Zeroes every entry whose key disagrees with `key` along `dims`.
    /// The shape is unchanged.
    pub fn condition(&self, dims: &[u32], key: &[usize]) -> Result<Tensor> {
        if dims.len() != key.len() {
            return Err(Error::KeyLength {
                got: key.len(),
                expected: dims.len(),
            });
        }
        let mut positions = Vec::with_capacity(dims.len());
        for (d, k) in dims.iter().zip(key.iter()) {
            let pos = self
                .shape
                .position(*d)
                .ok_or(Error::UnknownDimension(*d))?;
            if *k >= self.shape.sizes()[pos] {
                return Err(Error::KeyOutOfBounds {
                    dim: *d,
                    key: *k,
                    size: self.shape.sizes()[pos],
                });
            }
            positions.push((pos, *k));
        }
        let mut keys = Vec::new();
        let mut values = Vec::new();
        for (k, v) in self.entries() {
            if positions.iter().all(|(pos, want)| self.shape.digit(k, *pos) == *want) {
                keys.push(k);
                values.push(v);
            }
        }
        Ok(Tensor::pack(self.shape.clone(), keys, values))
    }

    /// Conditions on `dims = key` and drops those dimensions.
    pub fn slice(&self, dims: &[u32], key: &[usize]) -> Result<Tensor> {
        Ok(self.condition(dims, key)?.marginalize(dims, MarginalOp::Sum))
    }

    /// Renames dimension `dims()[i]` to `new_dims[i]`, re-sorting the axes
    /// so the result is in canonical increasing order.
    pub fn relabel(&self, new_dims: &[u32]) -> Result<Tensor> {
        if new_dims.len() != self.shape.rank() {
            return Err(Error::DimensionCount {
                dims: new_dims.len(),
                sizes: self.shape.rank(),
            });
        }
        // order[j] = old axis position of the j-th smallest new dim number.
        let mut order: Vec<usize> = (0..new_dims.len()).collect();
        order.sort_by_key(|i| new_dims[*i]);
        for w in order.windows(2) {
            if new_dims[w[0]] == new_dims[w[1]] {
                return Err(Error::DuplicateDimension(new_dims[w[0]]));
            }
        }
        let sorted_dims: Vec<u32> = order.iter().map(|i| new_dims[*i]).collect();
        let sorted_sizes: Vec<usize> = order.iter().map(|i| self.shape.sizes()[*i]).collect();
        let new_shape = Shape::new(sorted_dims, sorted_sizes)?;

        if order.iter().enumerate().all(|(j, i)| j == *i) {
            // Axis order is unchanged, only the numbering moves.
            return Ok(Tensor {
                shape: new_shape,
                repr: self.repr.clone(),
            });
        }
        match &self.repr {
            Repr::Dense(a) => {
                let permuted = a.clone().permuted_axes(order);
                let values = permuted.as_standard_layout().iter().copied().collect();
                Ok(Tensor {
                    repr: Repr::Dense(dense::from_flat(&new_shape, values)),
                    shape: new_shape,
                })
            }
            Repr::Sparse { key_nums, values } => {
                let offsets = new_shape.offsets().to_vec();
                let mut entries: Vec<(KeyNum, f64)> = key_nums
                    .iter()
                    .zip(values.iter())
                    .map(|(k, v)| {
                        let num = order
                            .iter()
                            .enumerate()
                            .map(|(j, i)| self.shape.digit(*k, *i) as KeyNum * offsets[j])
                            .sum();
                        (num, *v)
                    })
                    .collect();
                entries.sort_by_key(|(k, _)| *k);
                let (keys, vals) = entries.into_iter().unzip();
                Ok(Tensor::pack(new_shape, keys, vals))
            }
        }
    }

    /// Sum of all weights.
    pub fn sum(&self) -> f64 {
        self.entries().map(|(_, v)| v).sum()
    }

    /// Largest weight, counting implicit zeros.
    pub fn max_value(&self) -> f64 {
        let explicit = self
            .entries()
            .map(|(_, v)| v)
            .fold(f64::NEG_INFINITY, f64::max);
        if (self.num_nonzero() as KeyNum) < self.shape.num_keys() {
            explicit.max(0.0)
        } else {
            explicit
        }
    }

    /// Key number of the largest weight, preferring the smallest key on
    /// ties. Implicit zeros compete like stored entries.
    pub fn max_key_num(&self) -> KeyNum {
        let mut best = f64::NEG_INFINITY;
        let mut best_key = 0;
        let mut next_expected = 0;
        // Entries arrive in increasing key order; strict comparison keeps
        // the smallest key on ties.
        for (k, v) in self.entries() {
            if k > next_expected && 0.0 > best {
                // A gap of implicit zeros precedes this entry.
                best = 0.0;
                best_key = next_expected;
            }
            if v > best {
                best = v;
                best_key = k;
            }
            next_expected = k + 1;
        }
        if next_expected < self.shape.num_keys() && 0.0 > best {
            best_key = next_expected;
        }
        best_key
    }

    /// The `n` largest entries, ordered by decreasing weight with key
    /// number as tiebreak. Only nonzero entries are considered.
    pub fn largest_entries(&self, n: usize) -> Vec<(KeyNum, f64)> {
        let mut entries: Vec<(KeyNum, f64)> = self.entries().collect();
        entries.sort_by(|(ka, va), (kb, vb)| {
            vb.partial_cmp(va)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(ka.cmp(kb))
        });
        entries.truncate(n);
        entries
    }

    /// Multiplies every weight by `factor`.
    pub fn scale(&self, factor: f64) -> Tensor {
        match &self.repr {
            Repr::Dense(a) => Tensor {
                repr: Repr::Dense(a.mapv(|v| v * factor)),
                shape: self.shape.clone(),
            },
            Repr::Sparse { key_nums, values } => Tensor::pack(
                self.shape.clone(),
                key_nums.clone(),
                values.iter().map(|v| v * factor).collect(),
            ),
        }
    }

    /// Applies `f` to every stored weight. Implicit sparse zeros are left
    /// untouched, so `f` should map 0.0 to 0.0 if sparsity matters.
    pub fn map_values(&self, f: impl Fn(f64) -> f64) -> Tensor {
        match &self.repr {
            Repr::Dense(a) => Tensor {
                repr: Repr::Dense(a.mapv(&f)),
                shape: self.shape.clone(),
            },
            Repr::Sparse { key_nums, values } => {
                let mut keys = Vec::with_capacity(key_nums.len());
                let mut vals = Vec::with_capacity(values.len());
                for (k, v) in key_nums.iter().zip(values.iter()) {
                    let mapped = f(*v);
                    if mapped != 0.0 {
                        keys.push(*k);
                        vals.push(mapped);
                    }
                }
                Tensor::pack(self.shape.clone(), keys, vals)
            }
        }
    }

    /// Forces dense storage without changing any value.
    pub fn to_dense(&self) -> Tensor {
        match &self.repr {
            Repr::Dense(_) => self.clone(),
            Repr::Sparse { key_nums, values } => {
                let mut flat = vec![0.0; self.shape.num_keys() as usize];
                for (k, v) in key_nums.iter().zip(values.iter()) {
                    flat[*k as usize] = *v;
                }
                Tensor {
                    repr: Repr::Dense(dense::from_flat(&self.shape, flat)),
                    shape: self.shape.clone(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(dims: &[u32], sizes: &[usize]) -> Shape {
        Shape::new(dims.to_vec(), sizes.to_vec()).unwrap()
    }

    #[test]
    fn broadcast_product_replicates_missing_dims() {
        let a = Tensor::from_values(shape(&[0], &[2]), vec![2.0, 3.0]).unwrap();
        let b = Tensor::from_values(shape(&[1], &[2]), vec![5.0, 7.0]).unwrap();
        let p = a.product(&b).unwrap();
        assert_eq!(p.shape().dims(), &[0, 1]);
        assert_eq!(p.get(&[0, 0]).unwrap(), 10.0);
        assert_eq!(p.get(&[1, 1]).unwrap(), 21.0);
    }

    #[test]
    fn max_marginal_sees_implicit_zeros() {
        // Sparse tensor with negative stored values; the absent keys are
        // zeros and dominate the max.
        let s = shape(&[0, 1], &[2, 200]);
        let t = Tensor::from_sorted_entries(s, vec![0, 201], vec![-5.0, -7.0]);
        assert!(t.is_sparse());
        let m = t.marginalize(&[1], MarginalOp::Max);
        assert_eq!(m.get(&[0]).unwrap(), 0.0);
        assert_eq!(m.get(&[1]).unwrap(), 0.0);
    }

    #[test]
    fn condition_keeps_shape() {
        let t = Tensor::from_values(shape(&[0, 1], &[2, 2]), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let c = t.condition(&[1], &[0]).unwrap();
        assert_eq!(c.shape(), t.shape());
        assert_eq!(c.get(&[0, 0]).unwrap(), 1.0);
        assert_eq!(c.get(&[0, 1]).unwrap(), 0.0);
        assert_eq!(c.get(&[1, 0]).unwrap(), 3.0);
    }

    #[test]
    fn relabel_permutes_axes() {
        let t = Tensor::from_values(shape(&[0, 1], &[2, 3]), (0..6).map(f64::from).collect())
            .unwrap();
        // Dim 0 becomes 5, dim 1 becomes 2, so the axis order flips.
        let r = t.relabel(&[5, 2]).unwrap();
        assert_eq!(r.shape().dims(), &[2, 5]);
        assert_eq!(r.shape().sizes(), &[3, 2]);
        for i in 0..2 {
            for j in 0..3 {
                assert_eq!(r.get(&[j, i]).unwrap(), t.get(&[i, j]).unwrap());
            }
        }
    }

    #[test]
    fn inner_product_contracts_shared_dims() {
        let a = Tensor::from_values(shape(&[0], &[3]), vec![1.0, 2.0, 3.0]).unwrap();
        let b = Tensor::from_values(shape(&[0], &[3]), vec![4.0, 5.0, 6.0]).unwrap();
        let d = a.inner_product(&b).unwrap();
        assert_eq!(d.shape().rank(), 0);
        assert_eq!(d.value_at(0), 32.0);
    }
}
