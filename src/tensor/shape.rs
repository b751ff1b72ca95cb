use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Flattened mixed-radix index of a dim key, row-major (last dimension
/// varies fastest).
pub type KeyNum = u64;

/// Ordered set of (dimension number, size) pairs. Dimension numbers are
/// strictly increasing in canonical form; the constructor rejects anything
/// else, which rules out the misaligned-parallel-array bugs of loose
/// `(dims, sizes)` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<u32>,
    sizes: Vec<usize>,
    // offsets[i] = product of sizes[i+1..]; multiplier of dimension i in
    // the key number encoding.
    offsets: Vec<KeyNum>,
}

impl Shape {
    pub fn new(dims: Vec<u32>, sizes: Vec<usize>) -> Result<Self> {
        if dims.len() != sizes.len() {
            return Err(Error::DimensionCount {
                dims: dims.len(),
                sizes: sizes.len(),
            });
        }
        if dims.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::UnsortedDimensions(dims));
        }
        for (d, s) in dims.iter().zip(sizes.iter()) {
            if *s == 0 {
                return Err(Error::EmptyDimension(*d));
            }
        }
        let offsets = compute_offsets(&sizes);
        Ok(Self {
            dims,
            sizes,
            offsets,
        })
    }

    /// The zero-dimensional shape with a single key (0).
    pub fn scalar() -> Self {
        Self {
            dims: Vec::new(),
            sizes: Vec::new(),
            offsets: Vec::new(),
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[u32] {
        &self.dims
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub(crate) fn offsets(&self) -> &[KeyNum] {
        &self.offsets
    }

    /// Total number of addressable keys (the product of all sizes).
    pub fn num_keys(&self) -> KeyNum {
        match self.offsets.first() {
            Some(o) => o * self.sizes[0] as KeyNum,
            None => 1,
        }
    }

    pub fn contains(&self, dim: u32) -> bool {
        self.position(dim).is_some()
    }

    pub fn position(&self, dim: u32) -> Option<usize> {
        self.dims.binary_search(&dim).ok()
    }

    pub fn size_of(&self, dim: u32) -> Result<usize> {
        self.position(dim)
            .map(|i| self.sizes[i])
            .ok_or(Error::UnknownDimension(dim))
    }

    /// Encodes a full dim key as a key number, checking bounds.
    pub fn key_num(&self, key: &[usize]) -> Result<KeyNum> {
        if key.len() != self.rank() {
            return Err(Error::KeyLength {
                got: key.len(),
                expected: self.rank(),
            });
        }
        let mut num = 0;
        for (i, k) in key.iter().enumerate() {
            if *k >= self.sizes[i] {
                return Err(Error::KeyOutOfBounds {
                    dim: self.dims[i],
                    key: *k,
                    size: self.sizes[i],
                });
            }
            num += *k as KeyNum * self.offsets[i];
        }
        Ok(num)
    }

    /// Decodes a key number into a dim key. Inverse of [`Shape::key_num`]
    /// for all valid keys.
    pub fn dim_key(&self, key_num: KeyNum) -> Vec<usize> {
        let mut key = vec![0; self.rank()];
        self.dim_key_into(key_num, &mut key);
        key
    }

    pub(crate) fn dim_key_into(&self, key_num: KeyNum, out: &mut [usize]) {
        let mut rem = key_num;
        for i in 0..self.rank() {
            out[i] = (rem / self.offsets[i]) as usize;
            rem %= self.offsets[i];
        }
    }

    /// The digit of `key_num` along the dimension at position `pos`.
    pub(crate) fn digit(&self, key_num: KeyNum, pos: usize) -> usize {
        ((key_num / self.offsets[pos]) % self.sizes[pos] as KeyNum) as usize
    }

    /// Merges two shapes, keeping every dimension of either. Shared
    /// dimensions must agree on size.
    pub fn union(&self, other: &Shape) -> Result<Shape> {
        let mut dims = Vec::with_capacity(self.rank() + other.rank());
        let mut sizes = Vec::with_capacity(self.rank() + other.rank());
        let (mut i, mut j) = (0, 0);
        while i < self.rank() || j < other.rank() {
            if j >= other.rank() || (i < self.rank() && self.dims[i] < other.dims[j]) {
                dims.push(self.dims[i]);
                sizes.push(self.sizes[i]);
                i += 1;
            } else if i >= self.rank() || other.dims[j] < self.dims[i] {
                dims.push(other.dims[j]);
                sizes.push(other.sizes[j]);
                j += 1;
            } else {
                if self.sizes[i] != other.sizes[j] {
                    return Err(Error::ShapeMismatch {
                        dim: self.dims[i],
                        left: self.sizes[i],
                        right: other.sizes[j],
                    });
                }
                dims.push(self.dims[i]);
                sizes.push(self.sizes[i]);
                i += 1;
                j += 1;
            }
        }
        Shape::new(dims, sizes)
    }

    /// Drops the listed dimensions; numbers not present are ignored.
    pub fn remove(&self, dims: &[u32]) -> Shape {
        let (kept_dims, kept_sizes): (Vec<u32>, Vec<usize>) = self
            .dims
            .iter()
            .zip(self.sizes.iter())
            .filter(|(d, _)| !dims.contains(d))
            .map(|(d, s)| (*d, *s))
            .unzip();
        let offsets = compute_offsets(&kept_sizes);
        Shape {
            dims: kept_dims,
            sizes: kept_sizes,
            offsets,
        }
    }

    /// Dimension numbers shared with `other`.
    pub fn shared_dims(&self, other: &Shape) -> Vec<u32> {
        self.dims
            .iter()
            .filter(|d| other.contains(**d))
            .copied()
            .collect()
    }

    /// True if every dimension of `other` is a dimension of `self`.
    pub fn covers(&self, other: &Shape) -> bool {
        other.dims.iter().all(|d| self.contains(*d))
    }
}

fn compute_offsets(sizes: &[usize]) -> Vec<KeyNum> {
    let mut offsets = vec![1; sizes.len()];
    for i in (0..sizes.len().saturating_sub(1)).rev() {
        offsets[i] = offsets[i + 1] * sizes[i + 1] as KeyNum;
    }
    offsets
}

/// Maps key numbers of a superset shape onto a subset of its dimensions by
/// a series of divide/modulo/multiply terms, one per retained dimension.
#[derive(Debug, Clone)]
pub(crate) struct KeyMapper {
    terms: Vec<(KeyNum, KeyNum, KeyNum)>,
}

impl KeyMapper {
    /// `None` when some dimension of `to` is missing from `from`.
    pub(crate) fn new(from: &Shape, to: &Shape) -> Option<Self> {
        let mut terms = Vec::with_capacity(to.rank());
        for (j, dim) in to.dims.iter().enumerate() {
            let i = from.position(*dim)?;
            terms.push((
                from.offsets[i],
                from.sizes[i] as KeyNum,
                to.offsets[j],
            ));
        }
        Some(Self { terms })
    }

    pub(crate) fn map(&self, key_num: KeyNum) -> KeyNum {
        self.terms
            .iter()
            .map(|(div, modulo, mult)| ((key_num / div) % modulo) * mult)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_num_round_trip() {
        let shape = Shape::new(vec![0, 2, 5], vec![3, 4, 2]).unwrap();
        for key_num in 0..shape.num_keys() {
            let key = shape.dim_key(key_num);
            assert_eq!(shape.key_num(&key).unwrap(), key_num);
        }
    }

    #[test]
    fn row_major_ordering() {
        let shape = Shape::new(vec![1, 3], vec![2, 3]).unwrap();
        // Last dimension varies fastest.
        assert_eq!(shape.key_num(&[0, 0]).unwrap(), 0);
        assert_eq!(shape.key_num(&[0, 2]).unwrap(), 2);
        assert_eq!(shape.key_num(&[1, 0]).unwrap(), 3);
    }

    #[test]
    fn rejects_unsorted_dims() {
        assert!(matches!(
            Shape::new(vec![2, 1], vec![2, 2]),
            Err(Error::UnsortedDimensions(_))
        ));
    }

    #[test]
    fn union_checks_shared_sizes() {
        let a = Shape::new(vec![0, 1], vec![2, 3]).unwrap();
        let b = Shape::new(vec![1, 2], vec![4, 5]).unwrap();
        assert!(matches!(a.union(&b), Err(Error::ShapeMismatch { dim: 1, .. })));
        let c = Shape::new(vec![1, 2], vec![3, 5]).unwrap();
        let u = a.union(&c).unwrap();
        assert_eq!(u.dims(), &[0, 1, 2]);
        assert_eq!(u.sizes(), &[2, 3, 5]);
    }

    #[test]
    fn mapper_projects_keys() {
        let from = Shape::new(vec![0, 1, 2], vec![2, 3, 4]).unwrap();
        let to = Shape::new(vec![0, 2], vec![2, 4]).unwrap();
        let mapper = KeyMapper::new(&from, &to).unwrap();
        for key_num in 0..from.num_keys() {
            let key = from.dim_key(key_num);
            assert_eq!(mapper.map(key_num), to.key_num(&[key[0], key[2]]).unwrap());
        }
    }
}
