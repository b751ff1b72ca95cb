use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::tensor::Shape;
use crate::{Error, Result};

/// A variable ranging over a finite, ordered set of named values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscreteVariable {
    name: String,
    values: Vec<String>,
}

impl DiscreteVariable {
    pub fn new(name: impl Into<String>, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Index of `value` in the domain.
    pub fn value_index(&self, value: &str) -> Option<usize> {
        self.values.iter().position(|v| v == value)
    }

    pub fn value(&self, index: usize) -> &str {
        &self.values[index]
    }
}

/// A set of numbered variables, each with its domain. Variable numbers
/// double as tensor dimension numbers, so iteration is always in
/// increasing number order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VariableNumMap {
    vars: BTreeMap<u32, DiscreteVariable>,
}

impl VariableNumMap {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (u32, DiscreteVariable)>) -> Self {
        Self {
            vars: pairs.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn contains(&self, var_num: u32) -> bool {
        self.vars.contains_key(&var_num)
    }

    pub fn get(&self, var_num: u32) -> Result<&DiscreteVariable> {
        self.vars.get(&var_num).ok_or(Error::NoVarNum(var_num))
    }

    pub fn var_nums(&self) -> Vec<u32> {
        self.vars.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &DiscreteVariable)> {
        self.vars.iter().map(|(n, v)| (*n, v))
    }

    /// Merges two maps. A variable present in both must have the same
    /// domain in each.
    pub fn union(&self, other: &VariableNumMap) -> Result<VariableNumMap> {
        let mut vars = self.vars.clone();
        for (num, var) in other.vars.iter() {
            match vars.get(num) {
                Some(existing) if existing != var => {
                    return Err(Error::VariableConflict(*num));
                }
                Some(_) => {}
                None => {
                    vars.insert(*num, var.clone());
                }
            }
        }
        Ok(VariableNumMap { vars })
    }

    pub fn intersection(&self, other: &VariableNumMap) -> VariableNumMap {
        VariableNumMap {
            vars: self
                .vars
                .iter()
                .filter(|(n, _)| other.contains(**n))
                .map(|(n, v)| (*n, v.clone()))
                .collect(),
        }
    }

    pub fn remove_all(&self, var_nums: &[u32]) -> VariableNumMap {
        VariableNumMap {
            vars: self
                .vars
                .iter()
                .filter(|(n, _)| !var_nums.contains(*n))
                .map(|(n, v)| (*n, v.clone()))
                .collect(),
        }
    }

    /// True if every variable of `other` is present here.
    pub fn contains_all(&self, other: &VariableNumMap) -> bool {
        other.vars.keys().all(|n| self.contains(*n))
    }

    /// Tensor shape whose dimensions are the variable numbers and whose
    /// sizes are the domain sizes.
    pub fn shape(&self) -> Result<Shape> {
        let dims = self.var_nums();
        let sizes = self.vars.values().map(|v| v.num_values()).collect();
        Shape::new(dims, sizes)
    }

    /// Dim key of `assignment` over exactly these variables, in number
    /// order. Fails when the assignment does not cover some variable.
    pub fn assignment_dim_key(&self, assignment: &Assignment) -> Result<Vec<usize>> {
        self.vars
            .keys()
            .map(|n| assignment.get(*n).ok_or(Error::ScopeMismatch(*n)))
            .collect()
    }

    /// Inverse of [`VariableNumMap::assignment_dim_key`].
    pub fn assignment_from_dim_key(&self, key: &[usize]) -> Assignment {
        debug_assert_eq!(key.len(), self.len());
        Assignment {
            values: self.vars.keys().copied().zip(key.iter().copied()).collect(),
        }
    }

    /// Builds an assignment from value names listed in variable number
    /// order.
    pub fn outcome_assignment(&self, values: &[&str]) -> Result<Assignment> {
        if values.len() != self.len() {
            return Err(Error::KeyLength {
                got: values.len(),
                expected: self.len(),
            });
        }
        let mut out = BTreeMap::new();
        for ((num, var), value) in self.vars.iter().zip(values.iter()) {
            let index = var.value_index(value).ok_or_else(|| Error::UnknownValue {
                var: var.name().to_string(),
                value: value.to_string(),
            })?;
            out.insert(*num, index);
        }
        Ok(Assignment { values: out })
    }
}

/// A partial setting of variables to value indices.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Assignment {
    values: BTreeMap<u32, usize>,
}

impl Assignment {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (u32, usize)>) -> Self {
        Self {
            values: pairs.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, var_num: u32) -> Option<usize> {
        self.values.get(&var_num).copied()
    }

    pub fn contains(&self, var_num: u32) -> bool {
        self.values.contains_key(&var_num)
    }

    pub fn var_nums(&self) -> Vec<u32> {
        self.values.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, usize)> + '_ {
        self.values.iter().map(|(n, v)| (*n, *v))
    }

    /// Merges two assignments. A variable set in both must agree on its
    /// value, which makes repeated conditioning on the same evidence a
    /// no-op rather than an error.
    pub fn union(&self, other: &Assignment) -> Result<Assignment> {
        let mut values = self.values.clone();
        for (num, v) in other.values.iter() {
            match values.get(num) {
                Some(existing) if existing != v => {
                    return Err(Error::AssignmentConflict(*num));
                }
                Some(_) => {}
                None => {
                    values.insert(*num, *v);
                }
            }
        }
        Ok(Assignment { values })
    }

    /// Restriction to the listed variables; missing ones are skipped.
    pub fn sub_assignment(&self, var_nums: &[u32]) -> Assignment {
        Assignment {
            values: self
                .values
                .iter()
                .filter(|(n, _)| var_nums.contains(*n))
                .map(|(n, v)| (*n, *v))
                .collect(),
        }
    }

    pub fn contains_vars(&self, var_nums: &[u32]) -> bool {
        var_nums.iter().all(|n| self.contains(*n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_vars() -> VariableNumMap {
        VariableNumMap::from_pairs([
            (0, DiscreteVariable::new("a", ["x", "y"])),
            (3, DiscreteVariable::new("b", ["p", "q", "r"])),
        ])
    }

    #[test]
    fn shape_follows_var_numbers() {
        let shape = two_vars().shape().unwrap();
        assert_eq!(shape.dims(), &[0, 3]);
        assert_eq!(shape.sizes(), &[2, 3]);
    }

    #[test]
    fn outcome_assignment_resolves_names() {
        let vars = two_vars();
        let a = vars.outcome_assignment(&["y", "r"]).unwrap();
        assert_eq!(a.get(0), Some(1));
        assert_eq!(a.get(3), Some(2));
        assert!(vars.outcome_assignment(&["z", "r"]).is_err());
    }

    #[test]
    fn union_rejects_conflicts_but_allows_agreement() {
        let a = Assignment::from_pairs([(0, 1)]);
        let b = Assignment::from_pairs([(0, 1), (2, 0)]);
        let c = Assignment::from_pairs([(0, 0)]);
        assert_eq!(a.union(&b).unwrap().len(), 2);
        assert!(matches!(a.union(&c), Err(Error::AssignmentConflict(0))));
    }
}
