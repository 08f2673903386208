//! Priors on the degree sequence, conditioned on the edge count.

use std::cell::RefCell;

use rand::seq::SliceRandom;
use rand::Rng;
use rustc_hash::FxHashMap;

use crate::engine::errors::NetInfError;
use crate::engine::generators::{sample_multiset, sample_partition};
use crate::engine::graph::{MultiGraph, VertexIndex};
use crate::engine::moves::GraphMove;
use crate::engine::numeric::{log_factorial, log_multiset, log_partition_table};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DegreePriorKind {
    /// Degree sequence fixed to the given values.
    Delta(Vec<usize>),
    /// Uniform over sequences summing to `2E`.
    Uniform,
    /// Uniform over the sorted degree distribution, then uniform over its arrangements.
    UniformHyper,
}

/// `ln q(n, k)` for a fixed `k`, grown on demand.
#[derive(Debug, Clone, Default)]
struct PartitionCache {
    parts: usize,
    table: Vec<f64>,
}

impl PartitionCache {
    fn get(&mut self, n: usize, parts: usize) -> f64 {
        if parts != self.parts || n >= self.table.len() {
            let bound = (n + 1).max(2 * self.table.len());
            self.table = log_partition_table(bound, parts);
            self.parts = parts;
        }
        self.table[n]
    }
}

#[derive(Debug, Clone)]
pub struct DegreePrior {
    kind: DegreePriorKind,
    degrees: Vec<usize>,
    degree_counts: FxHashMap<usize, usize>,
    partitions: RefCell<PartitionCache>,
}

impl PartialEq for DegreePrior {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.degrees == other.degrees
    }
}

fn count_degrees(degrees: &[usize]) -> FxHashMap<usize, usize> {
    let mut counts = FxHashMap::default();
    for &k in degrees {
        *counts.entry(k).or_insert(0) += 1;
    }
    counts
}

impl DegreePrior {
    pub fn new(kind: DegreePriorKind, size: usize) -> Result<Self, NetInfError> {
        let degrees = match &kind {
            DegreePriorKind::Delta(fixed) => {
                if fixed.len() != size {
                    return Err(NetInfError::SizeMismatch {
                        expected: size,
                        actual: fixed.len(),
                    });
                }
                if fixed.iter().sum::<usize>() % 2 != 0 {
                    return Err(NetInfError::InvalidArgument(
                        "degree sequence must have an even sum".into(),
                    ));
                }
                fixed.clone()
            }
            _ => vec![0; size],
        };
        Ok(Self {
            kind,
            degree_counts: count_degrees(&degrees),
            degrees,
            partitions: RefCell::new(PartitionCache::default()),
        })
    }

    pub fn kind(&self) -> &DegreePriorKind {
        &self.kind
    }

    pub fn degrees(&self) -> &[usize] {
        &self.degrees
    }

    pub fn degree(&self, v: VertexIndex) -> usize {
        self.degrees.get(v).copied().unwrap_or(0)
    }

    pub fn size(&self) -> usize {
        self.degrees.len()
    }

    /// Number of vertices with degree `k`.
    pub fn degree_count(&self, k: usize) -> usize {
        self.degree_counts.get(&k).copied().unwrap_or(0)
    }

    pub fn set_degrees(&mut self, degrees: Vec<usize>) -> Result<(), NetInfError> {
        if degrees.len() != self.size() {
            return Err(NetInfError::SizeMismatch {
                expected: self.size(),
                actual: degrees.len(),
            });
        }
        self.degree_counts = count_degrees(&degrees);
        self.degrees = degrees;
        Ok(())
    }

    fn log_partitions(&self, n: usize) -> f64 {
        self.partitions.borrow_mut().get(n, self.size())
    }

    fn log_count_term(&self) -> f64 {
        self.degree_counts.values().map(|&n| log_factorial(n)).sum()
    }

    pub fn log_likelihood(&self, edge_count: usize) -> f64 {
        let n = self.size();
        match &self.kind {
            DegreePriorKind::Delta(fixed) => {
                if *fixed == self.degrees {
                    0.0
                } else {
                    f64::NEG_INFINITY
                }
            }
            DegreePriorKind::Uniform => -log_multiset(n, 2 * edge_count),
            DegreePriorKind::UniformHyper => {
                if n == 0 {
                    return if edge_count == 0 { 0.0 } else { f64::NEG_INFINITY };
                }
                -self.log_partitions(2 * edge_count) + self.log_count_term() - log_factorial(n)
            }
        }
    }

    /// Degree changes of every vertex touched by `mv`, self-loops counting twice.
    fn degree_deltas(mv: &GraphMove) -> FxHashMap<VertexIndex, isize> {
        let mut deltas = FxHashMap::default();
        for &(u, v) in &mv.removed {
            *deltas.entry(u).or_insert(0) -= 1;
            *deltas.entry(v).or_insert(0) -= 1;
        }
        for &(u, v) in &mv.added {
            *deltas.entry(u).or_insert(0) += 1;
            *deltas.entry(v).or_insert(0) += 1;
        }
        deltas.retain(|_, d| *d != 0);
        deltas
    }

    pub fn log_likelihood_ratio_from_graph_move(&self, mv: &GraphMove, edge_count: usize) -> f64 {
        let deltas = Self::degree_deltas(mv);
        let Some(next_edges) = edge_count.checked_add_signed(mv.edge_count_delta()) else {
            return f64::NEG_INFINITY;
        };
        match &self.kind {
            DegreePriorKind::Delta(_) => {
                if deltas.is_empty() {
                    0.0
                } else {
                    f64::NEG_INFINITY
                }
            }
            DegreePriorKind::Uniform => {
                -log_multiset(self.size(), 2 * next_edges)
                    + log_multiset(self.size(), 2 * edge_count)
            }
            DegreePriorKind::UniformHyper => {
                let mut count_changes: FxHashMap<usize, isize> = FxHashMap::default();
                for (&v, &d) in &deltas {
                    let Some(next) = self.degree(v).checked_add_signed(d) else {
                        return f64::NEG_INFINITY;
                    };
                    *count_changes.entry(self.degree(v)).or_insert(0) -= 1;
                    *count_changes.entry(next).or_insert(0) += 1;
                }
                let count_term: f64 = count_changes
                    .into_iter()
                    .map(|(k, c)| {
                        let n = self.degree_count(k);
                        n.checked_add_signed(c)
                            .map_or(f64::NEG_INFINITY, |next| log_factorial(next) - log_factorial(n))
                    })
                    .sum();
                count_term - self.log_partitions(2 * next_edges)
                    + self.log_partitions(2 * edge_count)
            }
        }
    }

    pub fn apply_graph_move(&mut self, mv: &GraphMove) -> Result<(), NetInfError> {
        for (v, d) in Self::degree_deltas(mv) {
            let prev = self.degree(v);
            let next = prev.checked_add_signed(d).ok_or_else(|| {
                NetInfError::Logic(format!("degree of vertex {v} cannot change by {d}"))
            })?;
            self.degrees[v] = next;
            if let Some(n) = self.degree_counts.get_mut(&prev) {
                *n -= 1;
                if *n == 0 {
                    self.degree_counts.remove(&prev);
                }
            }
            *self.degree_counts.entry(next).or_insert(0) += 1;
        }
        Ok(())
    }

    pub fn recompute_from_graph(&mut self, graph: &MultiGraph) -> Result<(), NetInfError> {
        self.set_degrees(graph.degrees())
    }

    pub fn sample_state<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        edge_count: usize,
    ) -> Result<(), NetInfError> {
        let n = self.size();
        let degrees = match &self.kind {
            DegreePriorKind::Delta(fixed) => fixed.clone(),
            DegreePriorKind::Uniform => sample_multiset(rng, n, 2 * edge_count)?,
            DegreePriorKind::UniformHyper => {
                let mut degrees = sample_partition(rng, 2 * edge_count, n)?;
                degrees.resize(n, 0);
                degrees.shuffle(rng);
                degrees
            }
        };
        self.set_degrees(degrees)
    }

    pub fn check_consistency(&self, graph: &MultiGraph) -> Result<(), NetInfError> {
        let actual = graph.degrees();
        if let Some(v) = (0..self.size()).find(|&v| actual.get(v) != Some(&self.degrees[v])) {
            return Err(NetInfError::consistency(
                "DegreePrior",
                format!(
                    "cached degree {} of vertex {v} differs from graph degree {}",
                    self.degrees[v],
                    actual.get(v).copied().unwrap_or(0)
                ),
            ));
        }
        if count_degrees(&self.degrees) != self.degree_counts {
            return Err(NetInfError::consistency(
                "DegreePrior",
                "degree counts are out of sync with degrees",
            ));
        }
        Ok(())
    }
}
