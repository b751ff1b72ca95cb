use crate::graph::{Assignment, TableFactor};
use crate::{Error, Result};

/// Sum-marginals produced by [`JunctionTree::compute_marginals`].
///
/// Marginals are unnormalized: the weights of any marginal sum to the
/// partition function. When the partition function is zero every marginal
/// is all-zero and normalized queries return zeros as well.
///
/// [`JunctionTree::compute_marginals`]: super::JunctionTree::compute_marginals
#[derive(Debug, Clone)]
pub struct MarginalSet {
    beliefs: Vec<TableFactor>,
    partition_function: f64,
    conditioned: Assignment,
}

impl MarginalSet {
    pub(crate) fn new(
        beliefs: Vec<TableFactor>,
        partition_function: f64,
        conditioned: Assignment,
    ) -> Self {
        Self {
            beliefs,
            partition_function,
            conditioned,
        }
    }

    pub fn partition_function(&self) -> f64 {
        self.partition_function
    }

    /// Evidence the graph was conditioned on before inference.
    pub fn conditioned_values(&self) -> &Assignment {
        &self.conditioned
    }

    /// Unnormalized marginal over `var_nums`, which must all lie inside
    /// one clique.
    pub fn marginal(&self, var_nums: &[u32]) -> Result<TableFactor> {
        let belief = find_covering(&self.beliefs, var_nums)?;
        let drop: Vec<u32> = belief
            .vars()
            .var_nums()
            .into_iter()
            .filter(|v| !var_nums.contains(v))
            .collect();
        Ok(belief.marginalize(&drop))
    }

    /// Marginal scaled to sum to 1.0. All-zero when the partition
    /// function is zero.
    pub fn normalized_marginal(&self, var_nums: &[u32]) -> Result<TableFactor> {
        Ok(self.marginal(var_nums)?.normalize())
    }
}

/// Max-marginals produced by [`JunctionTree::compute_max_marginals`].
///
/// [`JunctionTree::compute_max_marginals`]: super::JunctionTree::compute_max_marginals
#[derive(Debug, Clone)]
pub struct MaxMarginalSet {
    beliefs: Vec<TableFactor>,
    /// Root-first clique order from the tree that produced the beliefs.
    order: Vec<usize>,
    max_weight: f64,
    conditioned: Assignment,
}

impl MaxMarginalSet {
    pub(crate) fn new(
        beliefs: Vec<TableFactor>,
        order: Vec<usize>,
        max_weight: f64,
        conditioned: Assignment,
    ) -> Self {
        Self {
            beliefs,
            order,
            max_weight,
            conditioned,
        }
    }

    /// Weight of the heaviest complete assignment.
    pub fn max_weight(&self) -> f64 {
        self.max_weight
    }

    pub fn conditioned_values(&self) -> &Assignment {
        &self.conditioned
    }

    /// Max-marginal over `var_nums`, which must all lie inside one clique.
    pub fn max_marginal(&self, var_nums: &[u32]) -> Result<TableFactor> {
        let belief = find_covering(&self.beliefs, var_nums)?;
        let drop: Vec<u32> = belief
            .vars()
            .var_nums()
            .into_iter()
            .filter(|v| !var_nums.contains(v))
            .collect();
        Ok(belief.max_marginalize(&drop))
    }

    /// The globally heaviest assignment.
    pub fn best_assignment(&self) -> Result<Assignment> {
        self.nth_best_assignment(0)
    }

    /// The assignment at rank `n` by weight. Rank 0 is exact; higher
    /// ranks fix the root clique to its (n+1)-th heaviest entry and
    /// extend greedily through the rest of the tree.
    pub fn nth_best_assignment(&self, n: usize) -> Result<Assignment> {
        if self.beliefs.is_empty() {
            return if n == 0 {
                Ok(self.conditioned.clone())
            } else {
                Err(Error::NoSuchAssignment(n))
            };
        }
        let root = &self.beliefs[self.order[0]];
        // largest_entries only reports nonzero weights, so a short list
        // means there is no assignment at this rank.
        let mut candidates = root.best_assignments(n + 1);
        if candidates.len() <= n {
            return Err(Error::NoSuchAssignment(n));
        }
        let (mut assignment, _) = candidates.swap_remove(n);

        for i in self.order.iter().skip(1) {
            let belief = &self.beliefs[*i];
            let fixed: Vec<(u32, usize)> = assignment
                .iter()
                .filter(|(v, _)| belief.vars().contains(*v))
                .collect();
            let (dims, key): (Vec<u32>, Vec<usize>) = fixed.into_iter().unzip();
            let sliced = belief.weights().condition(&dims, &key)?;
            let best_key = sliced.shape().dim_key(sliced.max_key_num());
            let clique_best = belief.vars().assignment_from_dim_key(&best_key);
            let new_vars: Vec<u32> = clique_best
                .var_nums()
                .into_iter()
                .filter(|v| !assignment.contains(*v))
                .collect();
            assignment = assignment.union(&clique_best.sub_assignment(&new_vars))?;
        }
        assignment.union(&self.conditioned)
    }
}

fn find_covering<'a>(beliefs: &'a [TableFactor], var_nums: &[u32]) -> Result<&'a TableFactor> {
    beliefs
        .iter()
        .find(|b| var_nums.iter().all(|v| b.vars().contains(*v)))
        .ok_or_else(|| Error::NoCoveringClique(var_nums.to_vec()))
}
