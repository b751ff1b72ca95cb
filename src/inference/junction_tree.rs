use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;

use crate::graph::{FactorGraph, TableFactor, VariableNumMap};
use crate::tensor::{MarginalOp, Tensor};
use crate::{Config, Error, Result};

use super::marginals::{MarginalSet, MaxMarginalSet};

/// Exact inference by two-pass message passing over a clique tree.
///
/// Both entry points are pure functions of the input graph; the clique
/// tree is rebuilt per call and discarded.
#[derive(Debug, Clone, Default)]
pub struct JunctionTree {
    config: Config,
}

impl JunctionTree {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_config(config: Config) -> Self {
        Self { config }
    }

    /// Sum-marginals of every variable subset covered by a clique, plus
    /// the partition function.
    pub fn compute_marginals(&self, graph: &FactorGraph) -> Result<MarginalSet> {
        match CliqueTree::build(graph, &self.config)? {
            None => Ok(MarginalSet::new(
                Vec::new(),
                1.0,
                graph.conditioned_values().clone(),
            )),
            Some(tree) => {
                let beliefs = tree.pass_messages(MarginalOp::Sum)?;
                let partition = beliefs[tree.order[0]].sum();
                let factors = tree.into_factors(beliefs)?;
                Ok(MarginalSet::new(
                    factors,
                    partition,
                    graph.conditioned_values().clone(),
                ))
            }
        }
    }

    /// Max-marginals, from which the heaviest assignments can be read
    /// back.
    pub fn compute_max_marginals(&self, graph: &FactorGraph) -> Result<MaxMarginalSet> {
        match CliqueTree::build(graph, &self.config)? {
            None => Ok(MaxMarginalSet::new(
                Vec::new(),
                Vec::new(),
                1.0,
                graph.conditioned_values().clone(),
            )),
            Some(tree) => {
                let beliefs = tree.pass_messages(MarginalOp::Max)?;
                let max_weight = beliefs[tree.order[0]].max_value();
                let order = tree.order.clone();
                let factors = tree.into_factors(beliefs)?;
                Ok(MaxMarginalSet::new(
                    factors,
                    order,
                    max_weight,
                    graph.conditioned_values().clone(),
                ))
            }
        }
    }
}

/// A tree over maximal cliques of the triangulated moral graph,
/// satisfying the running intersection property.
struct CliqueTree {
    /// Scope of each clique.
    scopes: Vec<VariableNumMap>,
    /// Product of the factors assigned to each clique; a scalar 1.0 when
    /// the clique received none.
    potentials: Vec<Tensor>,
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    /// Root-first traversal order; every node appears after its parent.
    order: Vec<usize>,
}

impl CliqueTree {
    /// Returns `None` for a graph with no factors.
    fn build(graph: &FactorGraph, config: &Config) -> Result<Option<CliqueTree>> {
        if graph.num_factors() == 0 {
            return Ok(None);
        }
        let cliques = triangulate(graph);
        let scopes = clique_scopes(graph, &cliques, config)?;

        // Maximum-separator-weight spanning tree (Prim, rooted at clique
        // 0). Picking the heaviest separators preserves the running
        // intersection property; zero-weight links join disconnected
        // components with scalar messages.
        let n = cliques.len();
        let mut in_tree = vec![false; n];
        let mut parent: Vec<Option<usize>> = vec![None; n];
        let mut best = vec![0usize; n];
        let mut order = Vec::with_capacity(n);
        in_tree[0] = true;
        order.push(0);
        for j in 1..n {
            best[j] = cliques[0].intersection(&cliques[j]).count();
            parent[j] = Some(0);
        }
        while order.len() < n {
            let mut pick = None;
            for j in 0..n {
                if !in_tree[j] && pick.map_or(true, |p: usize| best[j] > best[p]) {
                    pick = Some(j);
                }
            }
            // At least one clique is still outside the tree.
            let j = pick.unwrap();
            in_tree[j] = true;
            order.push(j);
            for k in 0..n {
                if !in_tree[k] {
                    let w = cliques[j].intersection(&cliques[k]).count();
                    if w > best[k] {
                        best[k] = w;
                        parent[k] = Some(j);
                    }
                }
            }
        }
        let mut children = vec![Vec::new(); n];
        for (j, p) in parent.iter().enumerate() {
            if let Some(p) = p {
                children[*p].push(j);
            }
        }

        // Each factor lands in the first clique covering its scope.
        let mut potentials = vec![Tensor::scalar(1.0); n];
        for factor in graph.factors() {
            let scope = factor.vars().var_nums();
            let home = scopes
                .iter()
                .position(|s| s.contains_all(factor.vars()))
                .ok_or_else(|| Error::NoCoveringClique(scope))?;
            potentials[home] = potentials[home].product(factor.weights())?;
        }

        Ok(Some(CliqueTree {
            scopes,
            potentials,
            parent,
            children,
            order,
        }))
    }

    /// Variables of clique `i` that are not shared with clique `j`, i.e.
    /// the dimensions a message from `i` to `j` must marginalize out.
    fn eliminated_between(&self, i: usize, j: usize) -> Vec<u32> {
        self.scopes[i]
            .var_nums()
            .into_iter()
            .filter(|v| !self.scopes[j].contains(*v))
            .collect()
    }

    /// Collect and distribute passes. Returns one belief tensor per
    /// clique, proportional to the joint restricted to the clique scope.
    fn pass_messages(&self, op: MarginalOp) -> Result<Vec<Tensor>> {
        let n = self.scopes.len();
        // up[i]: message from clique i to its parent.
        let mut up: Vec<Option<Tensor>> = vec![None; n];
        for i in self.order.iter().rev() {
            let Some(parent) = self.parent[*i] else {
                continue;
            };
            let mut product = self.potentials[*i].clone();
            for c in &self.children[*i] {
                // Children come later in the order, so their messages
                // exist by now.
                product = product.product(up[*c].as_ref().unwrap())?;
            }
            up[*i] = Some(product.marginalize(&self.eliminated_between(*i, parent), op));
        }

        // down[i]: message from the parent of clique i.
        let mut down: Vec<Option<Tensor>> = vec![None; n];
        let mut beliefs: Vec<Option<Tensor>> = vec![None; n];
        for i in &self.order {
            let mut base = self.potentials[*i].clone();
            if let Some(msg) = &down[*i] {
                base = base.product(msg)?;
            }
            // prefix[k]: base times the up messages of the first k
            // children, so prefix.last() is the clique belief.
            let kids = &self.children[*i];
            let mut prefix = Vec::with_capacity(kids.len() + 1);
            prefix.push(base);
            for c in kids {
                let next = prefix.last().unwrap().product(up[*c].as_ref().unwrap())?;
                prefix.push(next);
            }
            // Message to child c: everything here except what c sent,
            // projected onto the variables c shares with this clique.
            let mut suffix = Tensor::scalar(1.0);
            for (k, c) in kids.iter().enumerate().rev() {
                let outgoing = prefix[k].product(&suffix)?;
                down[*c] = Some(outgoing.marginalize(&self.eliminated_between(*i, *c), op));
                suffix = suffix.product(up[*c].as_ref().unwrap())?;
            }
            beliefs[*i] = prefix.pop();
        }
        Ok(beliefs.into_iter().map(|b| b.unwrap()).collect())
    }

    /// Wraps belief tensors as factors over the clique scopes.
    fn into_factors(self, beliefs: Vec<Tensor>) -> Result<Vec<TableFactor>> {
        self.scopes
            .into_iter()
            .zip(beliefs)
            .map(|(scope, belief)| {
                // A belief can lack a dimension only if some scope
                // variable appears in no factor, which construction rules
                // out; broadcast against ones to keep the factor invariant
                // checkable.
                if belief.shape().dims() == scope.var_nums().as_slice() {
                    TableFactor::new(scope, belief)
                } else {
                    let ones = Tensor::constant(scope.shape()?, 1.0);
                    TableFactor::new(scope, belief.product(&ones)?)
                }
            })
            .collect()
    }
}

/// Maximal cliques of the min-degree triangulation of the moral graph.
/// Ties in degree break toward the smallest variable number.
fn triangulate(graph: &FactorGraph) -> Vec<BTreeSet<u32>> {
    let mut adjacency: BTreeMap<u32, BTreeSet<u32>> = BTreeMap::new();
    for factor in graph.factors() {
        let scope = factor.vars().var_nums();
        for v in &scope {
            adjacency.entry(*v).or_default();
        }
        for (a, b) in scope.iter().tuple_combinations() {
            adjacency.get_mut(a).unwrap().insert(*b);
            adjacency.get_mut(b).unwrap().insert(*a);
        }
    }

    let mut cliques: Vec<BTreeSet<u32>> = Vec::new();
    while !adjacency.is_empty() {
        // The key tuple breaks degree ties toward the smallest variable
        // number.
        let v = adjacency
            .iter()
            .min_by_key(|(num, neighbors)| (neighbors.len(), **num))
            .map(|(num, _)| *num)
            .unwrap();
        let neighbors = adjacency.remove(&v).unwrap();
        let mut clique = neighbors.clone();
        clique.insert(v);
        for (a, b) in neighbors.iter().tuple_combinations() {
            adjacency.get_mut(a).unwrap().insert(*b);
            adjacency.get_mut(b).unwrap().insert(*a);
        }
        for u in &neighbors {
            adjacency.get_mut(u).unwrap().remove(&v);
        }
        if !cliques.iter().any(|c| clique.is_subset(c)) {
            cliques.push(clique);
        }
    }
    // Elimination can emit a clique before a larger one that swallows it.
    let maximal: Vec<BTreeSet<u32>> = cliques
        .iter()
        .filter(|c| {
            !cliques
                .iter()
                .any(|other| *c != other && c.is_subset(other))
        })
        .cloned()
        .collect();
    maximal
}

/// Resolves clique variable sets to scope maps, enforcing the size limit.
fn clique_scopes(
    graph: &FactorGraph,
    cliques: &[BTreeSet<u32>],
    config: &Config,
) -> Result<Vec<VariableNumMap>> {
    cliques
        .iter()
        .map(|clique| {
            let mut size: u128 = 1;
            let mut scope = VariableNumMap::empty();
            for v in clique {
                let var = graph.vars().get(*v)?;
                size = size.saturating_mul(var.num_values() as u128);
                scope = scope.union(&VariableNumMap::from_pairs([(*v, var.clone())]))?;
            }
            if size > config.max_clique_size as u128 {
                return Err(Error::IntractableModel {
                    vars: clique.iter().copied().collect(),
                    size,
                    limit: config.max_clique_size,
                });
            }
            Ok(scope)
        })
        .collect()
}
