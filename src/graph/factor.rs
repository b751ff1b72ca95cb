use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::tensor::{MarginalOp, Tensor, TensorBuilder};
use crate::{Error, Result};

use super::variable::{Assignment, VariableNumMap};

/// A factor storing one weight per joint assignment of its scope, backed
/// by a [`Tensor`] whose dimension numbers are the variable numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableFactor {
    vars: VariableNumMap,
    weights: Tensor,
}

impl TableFactor {
    /// Wraps a weight tensor. The tensor's dimensions must be exactly the
    /// scope's variable numbers with the domain sizes as axis sizes.
    pub fn new(vars: VariableNumMap, weights: Tensor) -> Result<Self> {
        let expected = vars.shape()?;
        if weights.shape() != &expected {
            for (dim, size) in expected.dims().iter().zip(expected.sizes().iter()) {
                match weights.shape().position(*dim) {
                    None => return Err(Error::UnknownDimension(*dim)),
                    Some(pos) if weights.shape().sizes()[pos] != *size => {
                        return Err(Error::ShapeMismatch {
                            dim: *dim,
                            left: *size,
                            right: weights.shape().sizes()[pos],
                        });
                    }
                    Some(_) => {}
                }
            }
            // Same dims and sizes would compare equal, so the tensor has
            // an extra dimension outside the scope.
            return Err(Error::UndeclaredVariable(
                *weights
                    .shape()
                    .dims()
                    .iter()
                    .find(|d| !vars.contains(**d))
                    .unwrap_or(&0),
            ));
        }
        Ok(Self { vars, weights })
    }

    /// A factor over `vars` that assigns weight 1.0 everywhere.
    pub fn unity(vars: VariableNumMap) -> Result<Self> {
        let shape = vars.shape()?;
        Ok(Self {
            vars,
            weights: Tensor::constant(shape, 1.0),
        })
    }

    pub fn vars(&self) -> &VariableNumMap {
        &self.vars
    }

    pub fn weights(&self) -> &Tensor {
        &self.weights
    }

    /// Weight of an assignment covering the whole scope. Variables outside
    /// the scope are ignored.
    pub fn unnormalized_probability(&self, assignment: &Assignment) -> Result<f64> {
        let key = self.vars.assignment_dim_key(assignment)?;
        self.weights.get(&key)
    }

    /// Weight looked up by value names given in variable number order.
    pub fn unnormalized_probability_of(&self, values: &[&str]) -> Result<f64> {
        self.unnormalized_probability(&self.vars.outcome_assignment(values)?)
    }

    /// Pointwise product; the scope becomes the union of both scopes.
    pub fn product(&self, other: &TableFactor) -> Result<TableFactor> {
        Ok(TableFactor {
            vars: self.vars.union(&other.vars)?,
            weights: self.weights.product(&other.weights)?,
        })
    }

    /// Sums out the listed variables. Numbers outside the scope are
    /// ignored.
    pub fn marginalize(&self, var_nums: &[u32]) -> TableFactor {
        TableFactor {
            vars: self.vars.remove_all(var_nums),
            weights: self.weights.marginalize(var_nums, MarginalOp::Sum),
        }
    }

    /// Maxes out the listed variables.
    pub fn max_marginalize(&self, var_nums: &[u32]) -> TableFactor {
        TableFactor {
            vars: self.vars.remove_all(var_nums),
            weights: self.weights.marginalize(var_nums, MarginalOp::Max),
        }
    }

    /// Zeroes every weight inconsistent with `assignment`. The scope is
    /// unchanged; variables outside the scope are ignored.
    pub fn conditional(&self, assignment: &Assignment) -> Result<TableFactor> {
        let in_scope: Vec<(u32, usize)> = assignment
            .iter()
            .filter(|(n, _)| self.vars.contains(*n))
            .collect();
        if in_scope.is_empty() {
            return Ok(self.clone());
        }
        let (dims, key): (Vec<u32>, Vec<usize>) = in_scope.into_iter().unzip();
        Ok(TableFactor {
            vars: self.vars.clone(),
            weights: self.weights.condition(&dims, &key)?,
        })
    }

    /// Sum of all weights.
    pub fn total_weight(&self) -> f64 {
        self.weights.sum()
    }

    /// Scales weights to sum to 1.0. A zero-weight factor stays all-zero.
    pub fn normalize(&self) -> TableFactor {
        let total = self.total_weight();
        if total == 0.0 {
            return self.clone();
        }
        TableFactor {
            vars: self.vars.clone(),
            weights: self.weights.scale(1.0 / total),
        }
    }

    /// Draws an assignment with probability proportional to its weight.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Result<Assignment> {
        let total = self.total_weight();
        if total <= 0.0 {
            return Err(Error::ZeroWeight);
        }
        let target = rng.gen_range(0.0..total);
        let mut cumulative = 0.0;
        let mut last_key = 0;
        for (k, v) in self.weights.entries() {
            cumulative += v;
            last_key = k;
            if cumulative > target {
                return Ok(self
                    .vars
                    .assignment_from_dim_key(&self.weights.shape().dim_key(k)));
            }
        }
        // Rounding can leave the walk short of the total; fall back to the
        // last nonzero entry.
        Ok(self
            .vars
            .assignment_from_dim_key(&self.weights.shape().dim_key(last_key)))
    }

    /// Expected value of `f` under the normalized weights.
    pub fn expectation(&self, f: impl Fn(&Assignment) -> f64) -> Result<f64> {
        let total = self.total_weight();
        if total <= 0.0 {
            return Err(Error::ZeroWeight);
        }
        let mut acc = 0.0;
        for (k, v) in self.weights.entries() {
            let assignment = self
                .vars
                .assignment_from_dim_key(&self.weights.shape().dim_key(k));
            acc += v * f(&assignment);
        }
        Ok(acc / total)
    }

    /// The `n` heaviest assignments in decreasing weight order.
    pub fn best_assignments(&self, n: usize) -> Vec<(Assignment, f64)> {
        self.weights
            .largest_entries(n)
            .into_iter()
            .map(|(k, v)| {
                (
                    self.vars
                        .assignment_from_dim_key(&self.weights.shape().dim_key(k)),
                    v,
                )
            })
            .collect()
    }
}

/// Builds a [`TableFactor`] one assignment at a time.
#[derive(Debug, Clone)]
pub struct TableFactorBuilder {
    vars: VariableNumMap,
    weights: TensorBuilder,
}

impl TableFactorBuilder {
    pub fn new(vars: VariableNumMap) -> Result<Self> {
        let shape = vars.shape()?;
        Ok(Self {
            vars,
            weights: TensorBuilder::new(shape),
        })
    }

    pub fn vars(&self) -> &VariableNumMap {
        &self.vars
    }

    pub fn set_weight(&mut self, assignment: &Assignment, weight: f64) -> Result<()> {
        let key = self.vars.assignment_dim_key(assignment)?;
        self.weights.put(&key, weight)
    }

    /// Sets a weight by value names listed in variable number order.
    pub fn set_weight_list(&mut self, values: &[&str], weight: f64) -> Result<()> {
        let assignment = self.vars.outcome_assignment(values)?;
        self.set_weight(&assignment, weight)
    }

    pub fn increment_weight(&mut self, assignment: &Assignment, weight: f64) -> Result<()> {
        let key = self.vars.assignment_dim_key(assignment)?;
        self.weights.increment(&key, weight)
    }

    pub fn build(self) -> TableFactor {
        TableFactor {
            vars: self.vars,
            weights: self.weights.build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::variable::DiscreteVariable;

    fn binary(name: &str) -> DiscreteVariable {
        DiscreteVariable::new(name, ["F", "T"])
    }

    fn xor_ish_factor() -> TableFactor {
        let vars = VariableNumMap::from_pairs([(0, binary("a")), (1, binary("b"))]);
        let mut b = TableFactorBuilder::new(vars).unwrap();
        b.set_weight_list(&["F", "T"], 2.0).unwrap();
        b.set_weight_list(&["T", "F"], 3.0).unwrap();
        b.build()
    }

    #[test]
    fn product_unions_scopes() {
        let f = xor_ish_factor();
        let vars = VariableNumMap::from_pairs([(1, binary("b")), (2, binary("c"))]);
        let mut b = TableFactorBuilder::new(vars).unwrap();
        b.set_weight_list(&["T", "T"], 5.0).unwrap();
        let g = b.build();
        let p = f.product(&g).unwrap();
        assert_eq!(p.vars().var_nums(), vec![0, 1, 2]);
        assert_eq!(p.unnormalized_probability_of(&["F", "T", "T"]).unwrap(), 10.0);
        assert_eq!(p.unnormalized_probability_of(&["T", "F", "T"]).unwrap(), 0.0);
    }

    #[test]
    fn conditional_zeroes_inconsistent() {
        let f = xor_ish_factor();
        let c = f
            .conditional(&Assignment::from_pairs([(0, 1), (7, 0)]))
            .unwrap();
        assert_eq!(c.vars().var_nums(), vec![0, 1]);
        assert_eq!(c.unnormalized_probability_of(&["T", "F"]).unwrap(), 3.0);
        assert_eq!(c.unnormalized_probability_of(&["F", "T"]).unwrap(), 0.0);
    }

    #[test]
    fn marginalize_sums_rows() {
        let f = xor_ish_factor();
        let m = f.marginalize(&[1]);
        assert_eq!(m.vars().var_nums(), vec![0]);
        assert_eq!(m.unnormalized_probability_of(&["F"]).unwrap(), 2.0);
        assert_eq!(m.unnormalized_probability_of(&["T"]).unwrap(), 3.0);
    }

    #[test]
    fn expectation_weights_by_probability() {
        let f = xor_ish_factor();
        // P(a = T) is 3/5 under weights {FT: 2, TF: 3}.
        let e = f
            .expectation(|a| if a.get(0) == Some(1) { 1.0 } else { 0.0 })
            .unwrap();
        assert!((e - 0.6).abs() < 1e-9);

        let zero = TableFactor::new(
            f.vars().clone(),
            crate::tensor::Tensor::zeros(f.vars().shape().unwrap()),
        )
        .unwrap();
        assert!(matches!(zero.expectation(|_| 1.0), Err(Error::ZeroWeight)));
    }

    #[test]
    fn probability_requires_full_scope() {
        let f = xor_ish_factor();
        let partial = Assignment::from_pairs([(0, 1)]);
        assert!(matches!(
            f.unnormalized_probability(&partial),
            Err(Error::ScopeMismatch(1))
        ));
    }

    #[test]
    fn sample_respects_support() {
        let f = xor_ish_factor();
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let a = f.sample(&mut rng).unwrap();
            assert!(f.unnormalized_probability(&a).unwrap() > 0.0);
        }
        let zero = TableFactor::new(
            f.vars().clone(),
            crate::tensor::Tensor::zeros(f.vars().shape().unwrap()),
        )
        .unwrap();
        assert!(matches!(zero.sample(&mut rng), Err(Error::ZeroWeight)));
    }
}
