//! Stochastic block model terms shared by the likelihoods and the nested label-graph prior.
//!
//! Two ensembles are supported. The *stub-labeled* one places every edge between blocks `r`
//! and `s` by drawing each endpoint uniformly inside its block. The *uniform* one draws the
//! multigraph uniformly among those with the prescribed block edge counts.

use std::collections::BTreeSet;
use std::f64::consts::LN_2;

use rand::Rng;

use crate::engine::errors::NetInfError;
use crate::engine::generators::{pair_with_loops, sample_multiset};
use crate::engine::graph::{ordered, Edge, MultiGraph, VertexIndex};
use crate::engine::moves::{BlockIndex, GraphMove, LabelMove};
use crate::engine::numeric::{log_factorial, log_multiset};
use crate::engine::prior::block::Partition;
use crate::engine::prior::label_graph::{EdgeDeltas, LabelGraph};

/// `ln m!`, with the extra `m ln 2` of a diagonal entry.
fn entry_term(r: usize, s: usize, m: usize) -> f64 {
    if r == s {
        m as f64 * LN_2 + log_factorial(m)
    } else {
        log_factorial(m)
    }
}

/// `-e ln n`, the cost of spreading `e` stubs over a block of `n` vertices.
fn stub_term(block_degree: usize, block_size: usize) -> f64 {
    match (block_degree, block_size) {
        (0, _) => 0.0,
        (_, 0) => f64::NEG_INFINITY,
        (e, n) => -(e as f64) * (n as f64).ln(),
    }
}

/// Number of vertex pairs available between blocks of sizes `n_r` and `n_s`.
pub fn pair_capacity(n_r: usize, n_s: usize, same_block: bool) -> usize {
    if same_block {
        n_r * (n_r + 1) / 2
    } else {
        n_r * n_s
    }
}

fn uniform_entry(sizes: &[usize], r: BlockIndex, s: BlockIndex, m: usize) -> f64 {
    let capacity = pair_capacity(
        sizes.get(r).copied().unwrap_or(0),
        sizes.get(s).copied().unwrap_or(0),
        r == s,
    );
    -log_multiset(capacity, m)
}

fn apply_delta(m: usize, delta: isize) -> Option<usize> {
    m.checked_add_signed(delta)
}

/// Multiplicity changes of each vertex pair, aggregated over a move.
fn pair_changes(mv: &GraphMove) -> EdgeDeltas {
    let mut changes = EdgeDeltas::new();
    for &(u, v) in &mv.removed {
        *changes.entry(ordered(u, v)).or_insert(0) -= 1;
    }
    for &(u, v) in &mv.added {
        *changes.entry(ordered(u, v)).or_insert(0) += 1;
    }
    changes.retain(|_, d| *d != 0);
    changes
}

/// Block-degree changes implied by label-graph entry changes.
fn block_degree_changes(deltas: &EdgeDeltas) -> EdgeDeltas {
    let mut changes = EdgeDeltas::new();
    for (&(r, s), &d) in deltas {
        *changes.entry((r, r)).or_insert(0) += d;
        *changes.entry((s, s)).or_insert(0) += d;
    }
    changes
}

/// Stub-labeled block model.
pub mod stub_labeled {
    use super::*;

    pub fn log_likelihood(graph: &MultiGraph, partition: &Partition, label_graph: &LabelGraph) -> f64 {
        let blocks: f64 = label_graph
            .entries()
            .map(|(r, s, m)| entry_term(r, s, m))
            .sum();
        let stubs: f64 = (0..label_graph.block_count())
            .map(|r| stub_term(label_graph.block_degree(r), partition.block_size(r)))
            .sum();
        let edges: f64 = graph.edges().map(|(u, v, m)| entry_term(u, v, m)).sum();
        blocks + stubs - edges
    }

    pub fn log_likelihood_ratio_from_graph_move(
        graph: &MultiGraph,
        partition: &Partition,
        label_graph: &LabelGraph,
        mv: &GraphMove,
    ) -> f64 {
        let deltas = LabelGraph::graph_move_deltas(mv, partition.labels());
        let mut ratio = 0.0;
        for (&(r, s), &d) in &deltas {
            let m = label_graph.get(r, s);
            let Some(next) = apply_delta(m, d) else {
                return f64::NEG_INFINITY;
            };
            ratio += entry_term(r, s, next) - entry_term(r, s, m);
        }
        for (&(r, _), &d) in &block_degree_changes(&deltas) {
            let e = label_graph.block_degree(r);
            let Some(next) = apply_delta(e, d) else {
                return f64::NEG_INFINITY;
            };
            ratio += stub_term(next, partition.block_size(r)) - stub_term(e, partition.block_size(r));
        }
        for (&(u, v), &d) in &pair_changes(mv) {
            let m = graph.edge_multiplicity(u, v);
            let Some(next) = apply_delta(m, d) else {
                return f64::NEG_INFINITY;
            };
            ratio -= entry_term(u, v, next) - entry_term(u, v, m);
        }
        ratio
    }

    /// Ratio for moving `mv.vertex` of `domain` between blocks of `partition`.
    pub fn log_likelihood_ratio_from_label_move(
        domain: &MultiGraph,
        partition: &Partition,
        label_graph: &LabelGraph,
        mv: &LabelMove,
    ) -> f64 {
        if mv.is_trivial() {
            return 0.0;
        }
        let deltas = LabelGraph::label_move_deltas(domain, partition.labels(), mv);
        let mut ratio = 0.0;
        for (&(r, s), &d) in &deltas {
            let m = label_graph.get(r, s);
            let Some(next) = apply_delta(m, d) else {
                return f64::NEG_INFINITY;
            };
            ratio += entry_term(r, s, next) - entry_term(r, s, m);
        }
        let k = domain.degree(mv.vertex);
        let (r, s) = (mv.prev_label, mv.next_label);
        let (e_r, e_s) = (label_graph.block_degree(r), label_graph.block_degree(s));
        let (n_r, n_s) = (partition.block_size(r), partition.block_size(s));
        ratio += stub_term(e_r - k, n_r - 1) - stub_term(e_r, n_r);
        ratio += stub_term(e_s + k, n_s + 1) - stub_term(e_s, n_s);
        ratio
    }

    /// Draws a graph by placing each block edge between uniform members of its blocks.
    pub fn sample_graph<R: Rng + ?Sized>(
        rng: &mut R,
        partition: &Partition,
        label_graph: &LabelGraph,
    ) -> Result<MultiGraph, NetInfError> {
        let members = partition.members();
        let mut graph = MultiGraph::new(partition.len());
        for (r, s, m) in label_graph.entries() {
            let (from, to) = block_members(&members, r, s, m)?;
            for _ in 0..m {
                let u = from[rng.gen_range(0..from.len())];
                let v = to[rng.gen_range(0..to.len())];
                graph.add_edge(u, v)?;
            }
        }
        Ok(graph)
    }
}

/// Uniform block model.
pub mod uniform {
    use super::*;

    pub fn log_likelihood(sizes: &[usize], label_graph: &LabelGraph) -> f64 {
        label_graph
            .entries()
            .map(|(r, s, m)| uniform_entry(sizes, r, s, m))
            .sum()
    }

    /// Change of the log-likelihood when entries shift by `deltas` and block sizes become
    /// `next_sizes`; `resized` lists the blocks whose size changes.
    pub fn log_likelihood_ratio(
        sizes: &[usize],
        next_sizes: &[usize],
        resized: &[BlockIndex],
        label_graph: &LabelGraph,
        deltas: &EdgeDeltas,
    ) -> f64 {
        let mut pairs: BTreeSet<Edge> = deltas.keys().copied().collect();
        for &r in resized {
            pairs.extend(label_graph.neighbours(r).map(|(t, _)| ordered(r, t)));
        }
        let mut ratio = 0.0;
        for (r, s) in pairs {
            let m = label_graph.get(r, s);
            let d = deltas.get(&(r, s)).copied().unwrap_or(0);
            let Some(next) = apply_delta(m, d) else {
                return f64::NEG_INFINITY;
            };
            ratio += uniform_entry(next_sizes, r, s, next) - uniform_entry(sizes, r, s, m);
        }
        ratio
    }

    pub fn log_likelihood_ratio_from_graph_move(
        partition: &Partition,
        label_graph: &LabelGraph,
        mv: &GraphMove,
    ) -> f64 {
        let deltas = LabelGraph::graph_move_deltas(mv, partition.labels());
        log_likelihood_ratio(partition.sizes(), partition.sizes(), &[], label_graph, &deltas)
    }

    pub fn log_likelihood_ratio_from_label_move(
        domain: &MultiGraph,
        partition: &Partition,
        label_graph: &LabelGraph,
        mv: &LabelMove,
    ) -> f64 {
        if mv.is_trivial() {
            return 0.0;
        }
        let deltas = LabelGraph::label_move_deltas(domain, partition.labels(), mv);
        let next_sizes = resized_blocks(partition.sizes(), mv);
        log_likelihood_ratio(
            partition.sizes(),
            &next_sizes,
            &[mv.prev_label, mv.next_label],
            label_graph,
            &deltas,
        )
    }

    /// Draws a multigraph uniformly among those matching the label graph.
    pub fn sample_graph<R: Rng + ?Sized>(
        rng: &mut R,
        partition: &Partition,
        label_graph: &LabelGraph,
    ) -> Result<MultiGraph, NetInfError> {
        let members = partition.members();
        let mut graph = MultiGraph::new(partition.len());
        for (r, s, m) in label_graph.entries() {
            let (from, to) = block_members(&members, r, s, m)?;
            let capacity = pair_capacity(from.len(), to.len(), r == s);
            for (index, count) in sample_multiset(rng, capacity, m)?
                .into_iter()
                .enumerate()
                .filter(|(_, c)| *c > 0)
            {
                let (u, v) = if r == s {
                    let (i, j) = pair_with_loops(index, from.len());
                    (from[i], from[j])
                } else {
                    (from[index / to.len()], to[index % to.len()])
                };
                graph.add_multiedge(u, v, count)?;
            }
        }
        Ok(graph)
    }
}

/// Block sizes after `mv`, including a created block.
pub fn resized_blocks(sizes: &[usize], mv: &LabelMove) -> Vec<usize> {
    let mut next = sizes.to_vec();
    if mv.next_label >= next.len() {
        next.resize(mv.next_label + 1, 0);
    }
    next[mv.next_label] += 1;
    next[mv.prev_label] -= 1;
    next
}

fn block_members<'a>(
    members: &'a [Vec<VertexIndex>],
    r: BlockIndex,
    s: BlockIndex,
    m: usize,
) -> Result<(&'a [VertexIndex], &'a [VertexIndex]), NetInfError> {
    let from = members.get(r).map(Vec::as_slice).unwrap_or_default();
    let to = members.get(s).map(Vec::as_slice).unwrap_or_default();
    if from.is_empty() || to.is_empty() {
        return Err(NetInfError::InvalidArgument(format!(
            "{m} edges between blocks {r} and {s}, but one of them is empty"
        )));
    }
    Ok((from, to))
}
