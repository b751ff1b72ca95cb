//! Log-space mirror of the linear tensor operations, for chains of
//! products too long to stay inside f64 range.

use super::shape::{KeyMapper, Shape};
use super::tensor::{MarginalOp, Tensor};
use crate::Result;

/// A tensor of log weights. Linear zeros map to `-inf`; the backing
/// storage is always dense since `-inf` is not a natural sparse fill.
#[derive(Debug, Clone)]
pub struct LogTensor {
    log_weights: Tensor,
}

impl LogTensor {
    /// Takes the elementwise natural log of a linear-space tensor.
    pub fn from_linear(tensor: &Tensor) -> Self {
        Self {
            log_weights: tensor.to_dense().map_values(f64::ln),
        }
    }

    /// Exponentiates back to linear space.
    pub fn to_linear(&self) -> Tensor {
        self.log_weights.map_values(f64::exp)
    }

    pub fn shape(&self) -> &Shape {
        self.log_weights.shape()
    }

    pub fn value_at_key(&self, key: &[usize]) -> Result<f64> {
        self.log_weights.get(key)
    }

    /// Linear-space product: adds log weights over the dimension union.
    pub fn product(&self, other: &LogTensor) -> Result<LogTensor> {
        Ok(Self {
            log_weights: self.log_weights.add(&other.log_weights)?,
        })
    }

    /// Linear-space marginalization. `Sum` runs a numerically stable
    /// log-sum-exp per output cell; `Max` is a plain maximum.
    pub fn marginalize(&self, dims: &[u32], op: MarginalOp) -> LogTensor {
        let result_shape = self.shape().remove(dims);
        if result_shape.rank() == self.shape().rank() {
            return self.clone();
        }
        match op {
            MarginalOp::Max => Self {
                log_weights: self.log_weights.marginalize(dims, MarginalOp::Max),
            },
            MarginalOp::Sum => {
                let mapper = KeyMapper::new(self.shape(), &result_shape).unwrap();
                let total = result_shape.num_keys() as usize;
                // Two passes: per-cell max first, then sum of shifted exps.
                let mut maxes = vec![f64::NEG_INFINITY; total];
                for k in 0..self.shape().num_keys() {
                    let t = mapper.map(k) as usize;
                    let v = self.log_weights.value_at(k);
                    if v > maxes[t] {
                        maxes[t] = v;
                    }
                }
                let mut sums = vec![0.0; total];
                for k in 0..self.shape().num_keys() {
                    let t = mapper.map(k) as usize;
                    if maxes[t].is_finite() {
                        sums[t] += (self.log_weights.value_at(k) - maxes[t]).exp();
                    }
                }
                let values = maxes
                    .iter()
                    .zip(sums.iter())
                    .map(|(m, s)| if m.is_finite() { m + s.ln() } else { *m })
                    .collect();
                Self {
                    log_weights: Tensor::from_values(result_shape, values).unwrap(),
                }
            }
        }
    }
}
