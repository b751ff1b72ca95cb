use std::collections::HashMap;

use super::shape::{KeyNum, Shape};
use super::tensor::Tensor;
use crate::Result;

/// Incremental, unordered construction of a [`Tensor`]. Entries may be set
/// in any order and overwritten; `build` picks the storage representation.
#[derive(Debug, Clone)]
pub struct TensorBuilder {
    shape: Shape,
    entries: HashMap<KeyNum, f64>,
}

impl TensorBuilder {
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            entries: HashMap::new(),
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Sets the weight at `key`, replacing any previous value.
    pub fn put(&mut self, key: &[usize], value: f64) -> Result<()> {
        let num = self.shape.key_num(key)?;
        if value == 0.0 {
            self.entries.remove(&num);
        } else {
            self.entries.insert(num, value);
        }
        Ok(())
    }

    /// Adds `value` to the weight at `key`.
    pub fn increment(&mut self, key: &[usize], value: f64) -> Result<()> {
        let num = self.shape.key_num(key)?;
        let slot = self.entries.entry(num).or_insert(0.0);
        *slot += value;
        if *slot == 0.0 {
            self.entries.remove(&num);
        }
        Ok(())
    }

    pub fn get(&self, key: &[usize]) -> Result<f64> {
        let num = self.shape.key_num(key)?;
        Ok(self.entries.get(&num).copied().unwrap_or(0.0))
    }

    pub fn build(self) -> Tensor {
        let mut entries: Vec<(KeyNum, f64)> = self.entries.into_iter().collect();
        entries.sort_by_key(|(k, _)| *k);
        let (keys, values) = entries.into_iter().unzip();
        Tensor::from_sorted_entries(self.shape, keys, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_accumulates() {
        let shape = Shape::new(vec![0], vec![3]).unwrap();
        let mut b = TensorBuilder::new(shape);
        b.increment(&[1], 2.0).unwrap();
        b.increment(&[1], 3.0).unwrap();
        b.put(&[2], 7.0).unwrap();
        let t = b.build();
        assert_eq!(t.get(&[0]).unwrap(), 0.0);
        assert_eq!(t.get(&[1]).unwrap(), 5.0);
        assert_eq!(t.get(&[2]).unwrap(), 7.0);
    }

    #[test]
    fn put_checks_bounds() {
        let shape = Shape::new(vec![0], vec![3]).unwrap();
        let mut b = TensorBuilder::new(shape);
        assert!(b.put(&[3], 1.0).is_err());
        assert!(b.put(&[0, 0], 1.0).is_err());
    }
}
