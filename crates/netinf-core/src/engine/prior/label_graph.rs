//! Label graphs (edge counts between blocks) and their priors.
//!
//! A [`LabelGraph`] is the multigraph obtained by contracting every block of a partition into a
//! single vertex: entry `(r, s)` counts the edges between blocks `r` and `s`, and the diagonal
//! counts the edges inside a block. Block degrees follow the multigraph convention, so a
//! diagonal entry contributes twice to its block's degree.

use std::collections::BTreeMap;

use rand::Rng;

use crate::engine::errors::NetInfError;
use crate::engine::generators::{pair_with_loops, pair_without_loops, sample_multiset};
use crate::engine::graph::{ordered, Edge, MultiGraph};
use crate::engine::moves::{BlockIndex, GraphMove, LabelMove};
use crate::engine::numeric::log_multiset;

/// Signed changes of label-graph entries, keyed by ordered block pair.
pub type EdgeDeltas = BTreeMap<Edge, isize>;

fn push_delta(deltas: &mut EdgeDeltas, r: BlockIndex, s: BlockIndex, delta: isize) {
    let entry = deltas.entry(ordered(r, s)).or_insert(0);
    *entry += delta;
    if *entry == 0 {
        deltas.remove(&ordered(r, s));
    }
}

/// Edge counts between the blocks of a partition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LabelGraph {
    graph: MultiGraph,
    block_degrees: Vec<usize>,
}

impl LabelGraph {
    pub fn new(block_count: usize) -> Self {
        Self {
            graph: MultiGraph::new(block_count),
            block_degrees: vec![0; block_count],
        }
    }

    /// Contracts `graph` along `labels`.
    pub fn from_graph(
        graph: &MultiGraph,
        labels: &[BlockIndex],
        block_count: usize,
    ) -> Result<Self, NetInfError> {
        if labels.len() != graph.size() {
            return Err(NetInfError::SizeMismatch {
                expected: graph.size(),
                actual: labels.len(),
            });
        }
        let mut label_graph = Self::new(block_count);
        for (u, v, m) in graph.edges() {
            label_graph.add(labels[u], labels[v], m as isize)?;
        }
        Ok(label_graph)
    }

    pub fn block_count(&self) -> usize {
        self.graph.size()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn get(&self, r: BlockIndex, s: BlockIndex) -> usize {
        self.graph.edge_multiplicity(r, s)
    }

    pub fn block_degree(&self, r: BlockIndex) -> usize {
        self.block_degrees.get(r).copied().unwrap_or(0)
    }

    /// Number of edges inside blocks.
    pub fn diagonal_count(&self) -> usize {
        (0..self.block_count()).map(|r| self.get(r, r)).sum()
    }

    /// The contracted multigraph, one vertex per block.
    pub fn as_graph(&self) -> &MultiGraph {
        &self.graph
    }

    pub fn entries(&self) -> impl Iterator<Item = (BlockIndex, BlockIndex, usize)> + '_ {
        self.graph.edges()
    }

    pub fn neighbours(&self, r: BlockIndex) -> impl Iterator<Item = (BlockIndex, usize)> + '_ {
        self.graph.neighbours(r)
    }

    fn add(&mut self, r: BlockIndex, s: BlockIndex, delta: isize) -> Result<(), NetInfError> {
        let magnitude = delta.unsigned_abs();
        if delta >= 0 {
            self.graph.add_multiedge(r, s, magnitude)?;
            self.block_degrees[r] += magnitude;
            self.block_degrees[s] += magnitude;
        } else {
            self.graph.remove_multiedge(r, s, magnitude)?;
            self.block_degrees[r] -= magnitude;
            self.block_degrees[s] -= magnitude;
        }
        Ok(())
    }

    /// Grows or shrinks the block set; dropped blocks must be edgeless.
    pub fn resize(&mut self, block_count: usize) -> Result<(), NetInfError> {
        self.graph.resize(block_count)?;
        self.block_degrees.resize(block_count, 0);
        Ok(())
    }

    /// Applies entry changes; negative entries are processed first.
    pub fn apply_deltas(&mut self, deltas: &EdgeDeltas) -> Result<(), NetInfError> {
        for (&(r, s), &delta) in deltas.iter().filter(|(_, &d)| d < 0) {
            self.add(r, s, delta)?;
        }
        for (&(r, s), &delta) in deltas.iter().filter(|(_, &d)| d > 0) {
            self.add(r, s, delta)?;
        }
        Ok(())
    }

    /// Entry changes produced by a graph move under `labels`.
    pub fn graph_move_deltas(mv: &GraphMove, labels: &[BlockIndex]) -> EdgeDeltas {
        let mut deltas = EdgeDeltas::new();
        for &(u, v) in &mv.removed {
            push_delta(&mut deltas, labels[u], labels[v], -1);
        }
        for &(u, v) in &mv.added {
            push_delta(&mut deltas, labels[u], labels[v], 1);
        }
        deltas
    }

    /// Entry changes produced by moving `mv.vertex` of `domain` between blocks.
    ///
    /// `labels` must be the labels before the move; only the labels of the vertex's
    /// neighbours are read.
    pub fn label_move_deltas(
        domain: &MultiGraph,
        labels: &[BlockIndex],
        mv: &LabelMove,
    ) -> EdgeDeltas {
        let mut deltas = EdgeDeltas::new();
        if mv.is_trivial() {
            return deltas;
        }
        let (r, s) = (mv.prev_label, mv.next_label);
        for (u, m) in domain.neighbours(mv.vertex) {
            let m = m as isize;
            if u == mv.vertex {
                push_delta(&mut deltas, r, r, -m);
                push_delta(&mut deltas, s, s, m);
            } else {
                let t = labels[u];
                push_delta(&mut deltas, r, t, -m);
                push_delta(&mut deltas, s, t, m);
            }
        }
        deltas
    }

    /// Maps entry changes one level up through `labels`.
    pub fn lift_deltas(deltas: &EdgeDeltas, labels: &[BlockIndex]) -> EdgeDeltas {
        let mut lifted = EdgeDeltas::new();
        for (&(x, y), &delta) in deltas {
            push_delta(&mut lifted, labels[x], labels[y], delta);
        }
        lifted
    }

    /// Change in the total count of edges inside blocks.
    pub fn diagonal_delta(deltas: &EdgeDeltas) -> isize {
        deltas
            .iter()
            .filter(|((r, s), _)| r == s)
            .map(|(_, d)| d)
            .sum()
    }

    /// Applies a label move of `mv.vertex` in `domain`, resizing for created or removed blocks.
    pub fn apply_label_move(
        &mut self,
        domain: &MultiGraph,
        labels: &[BlockIndex],
        mv: &LabelMove,
    ) -> Result<(), NetInfError> {
        if mv.added_labels > 0 {
            self.resize(self.block_count() + 1)?;
        }
        self.apply_deltas(&Self::label_move_deltas(domain, labels, mv))?;
        if mv.added_labels < 0 {
            self.resize(self.block_count().saturating_sub(1))?;
        }
        Ok(())
    }

    /// Draws a label graph with `edge_count` edges spread over the given block pairs.
    fn scatter<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        edge_count: usize,
        pairs: impl Fn(usize) -> (BlockIndex, BlockIndex),
        pair_count: usize,
    ) -> Result<(), NetInfError> {
        for (index, count) in sample_multiset(rng, pair_count, edge_count)?
            .into_iter()
            .enumerate()
            .filter(|(_, c)| *c > 0)
        {
            let (r, s) = pairs(index);
            self.add(r, s, count as isize)?;
        }
        Ok(())
    }

    pub fn check_against(&self, expected: &LabelGraph, component: &str) -> Result<(), NetInfError> {
        if self != expected {
            return Err(NetInfError::consistency(
                component,
                format!(
                    "label graph with {} edges over {} blocks differs from recount with {} edges over {} blocks",
                    self.edge_count(),
                    self.block_count(),
                    expected.edge_count(),
                    expected.block_count()
                ),
            ));
        }
        Ok(())
    }
}

/// Distribution of a label graph given the edge count and the block count.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LabelGraphPriorKind {
    /// Label graph fixed to the given value.
    Delta(LabelGraph),
    /// Uniform over multigraphs on `B` block vertices with `E` edges.
    ErdosRenyi,
    /// Uniform split between inner and outer edges, each spread uniformly.
    PlantedPartition,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LabelGraphPrior {
    kind: LabelGraphPriorKind,
    state: LabelGraph,
}

fn pair_count_with_loops(block_count: usize) -> usize {
    block_count * (block_count + 1) / 2
}

fn pair_count_without_loops(block_count: usize) -> usize {
    block_count * block_count.saturating_sub(1) / 2
}

impl LabelGraphPrior {
    pub fn new(kind: LabelGraphPriorKind) -> Self {
        let state = match &kind {
            LabelGraphPriorKind::Delta(fixed) => fixed.clone(),
            _ => LabelGraph::new(1),
        };
        Self { kind, state }
    }

    pub fn kind(&self) -> &LabelGraphPriorKind {
        &self.kind
    }

    pub fn state(&self) -> &LabelGraph {
        &self.state
    }

    pub fn set_state(&mut self, state: LabelGraph) {
        self.state = state;
    }

    fn log_likelihood_from(&self, edge_count: usize, block_count: usize, diagonal: usize) -> f64 {
        match &self.kind {
            LabelGraphPriorKind::Delta(fixed) => {
                if *fixed == self.state {
                    0.0
                } else {
                    f64::NEG_INFINITY
                }
            }
            LabelGraphPriorKind::ErdosRenyi => {
                -log_multiset(pair_count_with_loops(block_count), edge_count)
            }
            LabelGraphPriorKind::PlantedPartition => {
                if diagonal > edge_count {
                    return f64::NEG_INFINITY;
                }
                -((edge_count + 1) as f64).ln()
                    - log_multiset(block_count, diagonal)
                    - log_multiset(pair_count_without_loops(block_count), edge_count - diagonal)
            }
        }
    }

    pub fn log_likelihood(&self, edge_count: usize, block_count: usize) -> f64 {
        self.log_likelihood_from(edge_count, block_count, self.state.diagonal_count())
    }

    fn ratio(
        &self,
        edge_count: usize,
        block_count: usize,
        deltas: &EdgeDeltas,
        edge_delta: isize,
        block_delta: i32,
    ) -> f64 {
        if let LabelGraphPriorKind::Delta(_) = self.kind {
            return if deltas.is_empty() && block_delta == 0 {
                0.0
            } else {
                f64::NEG_INFINITY
            };
        }
        let diagonal = self.state.diagonal_count() as isize + LabelGraph::diagonal_delta(deltas);
        let (Some(next_edges), Some(next_blocks), Ok(next_diagonal)) = (
            edge_count.checked_add_signed(edge_delta),
            block_count.checked_add_signed(block_delta as isize),
            usize::try_from(diagonal),
        ) else {
            return f64::NEG_INFINITY;
        };
        self.log_likelihood_from(next_edges, next_blocks, next_diagonal)
            - self.log_likelihood(edge_count, block_count)
    }

    pub fn log_likelihood_ratio_from_graph_move(
        &self,
        mv: &GraphMove,
        labels: &[BlockIndex],
        edge_count: usize,
        block_count: usize,
    ) -> f64 {
        let deltas = LabelGraph::graph_move_deltas(mv, labels);
        self.ratio(edge_count, block_count, &deltas, mv.edge_count_delta(), 0)
    }

    pub fn log_likelihood_ratio_from_label_move(
        &self,
        mv: &LabelMove,
        graph: &MultiGraph,
        labels: &[BlockIndex],
        edge_count: usize,
        block_count: usize,
    ) -> f64 {
        let deltas = LabelGraph::label_move_deltas(graph, labels, mv);
        self.ratio(edge_count, block_count, &deltas, 0, mv.added_labels)
    }

    pub fn apply_graph_move(
        &mut self,
        mv: &GraphMove,
        labels: &[BlockIndex],
    ) -> Result<(), NetInfError> {
        self.state
            .apply_deltas(&LabelGraph::graph_move_deltas(mv, labels))
    }

    pub fn apply_label_move(
        &mut self,
        mv: &LabelMove,
        graph: &MultiGraph,
        labels: &[BlockIndex],
    ) -> Result<(), NetInfError> {
        self.state.apply_label_move(graph, labels, mv)
    }

    pub fn recompute_from_graph(
        &mut self,
        graph: &MultiGraph,
        labels: &[BlockIndex],
        block_count: usize,
    ) -> Result<(), NetInfError> {
        self.state = LabelGraph::from_graph(graph, labels, block_count)?;
        Ok(())
    }

    pub fn sample_state<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        edge_count: usize,
        block_count: usize,
    ) -> Result<(), NetInfError> {
        let mut state = LabelGraph::new(block_count);
        match &self.kind {
            LabelGraphPriorKind::Delta(fixed) => state = fixed.clone(),
            LabelGraphPriorKind::ErdosRenyi => {
                state.scatter(
                    rng,
                    edge_count,
                    |i| pair_with_loops(i, block_count),
                    pair_count_with_loops(block_count),
                )?;
            }
            LabelGraphPriorKind::PlantedPartition => {
                let mut inner = rng.gen_range(0..=edge_count);
                if block_count < 2 {
                    inner = edge_count;
                }
                state.scatter(rng, inner, |i| (i, i), block_count)?;
                state.scatter(
                    rng,
                    edge_count - inner,
                    |i| pair_without_loops(i, block_count),
                    pair_count_without_loops(block_count),
                )?;
            }
        }
        self.state = state;
        Ok(())
    }

    /// Compares the cached label graph with a recount from `graph` and `labels`.
    pub fn check_consistency(
        &self,
        graph: &MultiGraph,
        labels: &[BlockIndex],
        block_count: usize,
    ) -> Result<(), NetInfError> {
        let expected = LabelGraph::from_graph(graph, labels, block_count)
            .map_err(|e| NetInfError::consistency("LabelGraphPrior", e.to_string()))?;
        self.state.check_against(&expected, "LabelGraphPrior")
    }
}
