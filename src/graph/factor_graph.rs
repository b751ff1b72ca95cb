use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

use super::factor::TableFactor;
use super::variable::{Assignment, DiscreteVariable, VariableNumMap};

/// An immutable collection of variables and the factors over them,
/// defining an unnormalized distribution as the product of all factor
/// weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorGraph {
    vars: VariableNumMap,
    names: IndexMap<String, u32>,
    factors: Vec<TableFactor>,
    conditioned: Assignment,
}

impl FactorGraph {
    pub fn vars(&self) -> &VariableNumMap {
        &self.vars
    }

    pub fn factors(&self) -> &[TableFactor] {
        &self.factors
    }

    pub fn num_factors(&self) -> usize {
        self.factors.len()
    }

    /// Evidence accumulated through [`FactorGraph::conditional`] calls.
    pub fn conditioned_values(&self) -> &Assignment {
        &self.conditioned
    }

    pub fn var_num(&self, name: &str) -> Result<u32> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| Error::NoVar(name.to_string()))
    }

    /// Variable numbers for a list of names, in the order given.
    pub fn var_nums(&self, names: &[&str]) -> Result<Vec<u32>> {
        names.iter().map(|n| self.var_num(n)).collect()
    }

    /// Builds an assignment from parallel name and value lists.
    pub fn outcome_assignment(&self, names: &[&str], values: &[&str]) -> Result<Assignment> {
        if names.len() != values.len() {
            return Err(Error::KeyLength {
                got: values.len(),
                expected: names.len(),
            });
        }
        let mut assignment = Assignment::empty();
        for (name, value) in names.iter().zip(values.iter()) {
            let num = self.var_num(name)?;
            let var = self.vars.get(num)?;
            let index = var.value_index(value).ok_or_else(|| Error::UnknownValue {
                var: var.name().to_string(),
                value: value.to_string(),
            })?;
            assignment = assignment.union(&Assignment::from_pairs([(num, index)]))?;
        }
        Ok(assignment)
    }

    /// Weight of a full assignment: the product over all factors.
    pub fn unnormalized_probability(&self, assignment: &Assignment) -> Result<f64> {
        let mut weight = 1.0;
        for factor in &self.factors {
            weight *= factor.unnormalized_probability(assignment)?;
        }
        Ok(weight)
    }

    /// Conditions every factor on `assignment` (retain-and-zero, scopes
    /// unchanged) and records the evidence. Conditioning twice on the same
    /// values is a no-op.
    pub fn conditional(&self, assignment: &Assignment) -> Result<FactorGraph> {
        let conditioned = self.conditioned.union(assignment)?;
        let factors = self
            .factors
            .iter()
            .map(|f| f.conditional(assignment))
            .collect::<Result<Vec<_>>>()?;
        Ok(FactorGraph {
            vars: self.vars.clone(),
            names: self.names.clone(),
            factors,
            conditioned,
        })
    }
}

/// Accumulates variables and factors, then freezes them into a
/// [`FactorGraph`]. Variable numbers are handed out in declaration order.
#[derive(Debug, Clone, Default)]
pub struct FactorGraphBuilder {
    vars: VariableNumMap,
    names: IndexMap<String, u32>,
    factors: Vec<TableFactor>,
}

impl FactorGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a variable and returns its number.
    pub fn add_variable(&mut self, name: impl Into<String>, var: DiscreteVariable) -> Result<u32> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(Error::VariableConflict(self.names[&name]));
        }
        let num = self.names.len() as u32;
        self.names.insert(name, num);
        self.vars = self
            .vars
            .union(&VariableNumMap::from_pairs([(num, var)]))?;
        Ok(num)
    }

    pub fn var_num(&self, name: &str) -> Result<u32> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| Error::NoVar(name.to_string()))
    }

    /// Scope map for a list of declared variable names.
    pub fn variables_by_name(&self, names: &[&str]) -> Result<VariableNumMap> {
        let mut vars = VariableNumMap::empty();
        for name in names {
            let num = self.var_num(name)?;
            let var = self.vars.get(num)?.clone();
            vars = vars.union(&VariableNumMap::from_pairs([(num, var)]))?;
        }
        Ok(vars)
    }

    /// Adds a factor. Its scope must use declared variables with matching
    /// domains.
    pub fn add_factor(&mut self, factor: TableFactor) -> Result<()> {
        for num in factor.vars().var_nums() {
            if !self.vars.contains(num) {
                return Err(Error::UndeclaredVariable(num));
            }
        }
        // Domain agreement between the factor scope and the declarations.
        self.vars.union(factor.vars())?;
        self.factors.push(factor);
        Ok(())
    }

    pub fn build(self) -> FactorGraph {
        FactorGraph {
            vars: self.vars,
            names: self.names,
            factors: self.factors,
            conditioned: Assignment::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::factor::TableFactorBuilder;

    #[test]
    fn rejects_undeclared_scope() {
        let mut builder = FactorGraphBuilder::new();
        builder
            .add_variable("x", DiscreteVariable::new("x", ["a", "b"]))
            .unwrap();
        let foreign = VariableNumMap::from_pairs([(9, DiscreteVariable::new("y", ["a"]))]);
        let factor = TableFactorBuilder::new(foreign).unwrap().build();
        assert!(matches!(
            builder.add_factor(factor),
            Err(Error::UndeclaredVariable(9))
        ));
    }

    #[test]
    fn numbers_follow_declaration_order() {
        let mut builder = FactorGraphBuilder::new();
        let a = builder
            .add_variable("a", DiscreteVariable::new("a", ["0", "1"]))
            .unwrap();
        let b = builder
            .add_variable("b", DiscreteVariable::new("b", ["0", "1"]))
            .unwrap();
        assert_eq!((a, b), (0, 1));
        let graph = builder.build();
        assert_eq!(graph.var_num("b").unwrap(), 1);
        assert!(graph.var_num("c").is_err());
    }
}
