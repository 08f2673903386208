//! # Multigraph state
//!
//! Undirected multigraph with self-loops and a fixed vertex set. This is the latent state every
//! random-graph model samples and every move edits.
//!
//! ## Conventions
//!
//! - Edges are unordered pairs stored as `(min, max)`; see [`ordered`].
//! - A self-loop `(v, v)` with multiplicity `m` adds `2m` to the degree of `v`.
//! - `edge_count` is the total multiplicity, `distinct_edge_count` the number of pairs with a
//!   nonzero multiplicity.

use std::ops::Range;

use rustc_hash::FxHashMap;

use crate::engine::errors::NetInfError;
use crate::engine::moves::GraphMove;

/// Index of a vertex in `0..size`.
pub type VertexIndex = usize;

/// An unordered vertex pair, kept in `(min, max)` order by every constructor in this crate.
pub type Edge = (VertexIndex, VertexIndex);

/// Returns the pair in `(min, max)` order.
#[inline]
pub fn ordered(u: VertexIndex, v: VertexIndex) -> Edge {
    if u <= v {
        (u, v)
    } else {
        (v, u)
    }
}

/// Fixed-size undirected multigraph.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MultiGraph {
    /// `adjacency[u][v]` is the multiplicity of `(u, v)`; both directions are stored.
    adjacency: Vec<FxHashMap<VertexIndex, usize>>,
    edge_count: usize,
    distinct_edge_count: usize,
}

impl MultiGraph {
    /// Creates an empty graph on `size` vertices.
    pub fn new(size: usize) -> Self {
        Self {
            adjacency: vec![FxHashMap::default(); size],
            edge_count: 0,
            distinct_edge_count: 0,
        }
    }

    /// Builds a graph from `(u, v, multiplicity)` triples. Repeated pairs accumulate.
    pub fn from_edges<I>(size: usize, edges: I) -> Result<Self, NetInfError>
    where
        I: IntoIterator<Item = (VertexIndex, VertexIndex, usize)>,
    {
        let mut graph = Self::new(size);
        for (u, v, m) in edges {
            graph.add_multiedge(u, v, m)?;
        }
        Ok(graph)
    }

    pub fn size(&self) -> usize {
        self.adjacency.len()
    }

    pub fn vertices(&self) -> Range<VertexIndex> {
        0..self.size()
    }

    /// Total number of edges, counting multiplicities.
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Number of vertex pairs joined by at least one edge.
    pub fn distinct_edge_count(&self) -> usize {
        self.distinct_edge_count
    }

    fn check_vertex(&self, v: VertexIndex) -> Result<(), NetInfError> {
        if v < self.size() {
            Ok(())
        } else {
            Err(NetInfError::InvalidArgument(format!(
                "vertex {v} is out of range for a graph of size {}",
                self.size()
            )))
        }
    }

    /// Multiplicity of `(u, v)`; zero for out-of-range vertices.
    pub fn edge_multiplicity(&self, u: VertexIndex, v: VertexIndex) -> usize {
        self.adjacency
            .get(u)
            .and_then(|row| row.get(&v))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_edge(&self, u: VertexIndex, v: VertexIndex) -> bool {
        self.edge_multiplicity(u, v) > 0
    }

    /// Sets the multiplicity of `(u, v)`, adding or removing edges as needed.
    pub fn set_edge_multiplicity(
        &mut self,
        u: VertexIndex,
        v: VertexIndex,
        multiplicity: usize,
    ) -> Result<(), NetInfError> {
        let current = self.edge_multiplicity(u, v);
        if multiplicity > current {
            self.add_multiedge(u, v, multiplicity - current)
        } else {
            self.remove_multiedge(u, v, current - multiplicity)
        }
    }

    pub fn add_edge(&mut self, u: VertexIndex, v: VertexIndex) -> Result<(), NetInfError> {
        self.add_multiedge(u, v, 1)
    }

    /// Adds `multiplicity` parallel edges between `u` and `v`.
    pub fn add_multiedge(
        &mut self,
        u: VertexIndex,
        v: VertexIndex,
        multiplicity: usize,
    ) -> Result<(), NetInfError> {
        self.check_vertex(u)?;
        self.check_vertex(v)?;
        if multiplicity == 0 {
            return Ok(());
        }
        let entry = self.adjacency[u].entry(v).or_insert(0);
        if *entry == 0 {
            self.distinct_edge_count += 1;
        }
        *entry += multiplicity;
        if u != v {
            *self.adjacency[v].entry(u).or_insert(0) += multiplicity;
        }
        self.edge_count += multiplicity;
        Ok(())
    }

    pub fn remove_edge(&mut self, u: VertexIndex, v: VertexIndex) -> Result<(), NetInfError> {
        self.remove_multiedge(u, v, 1)
    }

    /// Removes `multiplicity` parallel edges between `u` and `v`.
    ///
    /// Fails with [`NetInfError::EdgeNotFound`] when fewer edges exist.
    pub fn remove_multiedge(
        &mut self,
        u: VertexIndex,
        v: VertexIndex,
        multiplicity: usize,
    ) -> Result<(), NetInfError> {
        self.check_vertex(u)?;
        self.check_vertex(v)?;
        if multiplicity == 0 {
            return Ok(());
        }
        let current = self.edge_multiplicity(u, v);
        if current < multiplicity {
            let (u, v) = ordered(u, v);
            return Err(NetInfError::EdgeNotFound {
                u,
                v,
                multiplicity: current,
            });
        }
        let remaining = current - multiplicity;
        if remaining == 0 {
            self.adjacency[u].remove(&v);
            self.adjacency[v].remove(&u);
            self.distinct_edge_count -= 1;
        } else {
            self.adjacency[u].insert(v, remaining);
            self.adjacency[v].insert(u, remaining);
        }
        self.edge_count -= multiplicity;
        Ok(())
    }

    /// Fails if applying `mv` would touch a missing vertex or remove more edges than exist.
    ///
    /// Removals are checked before any addition, matching the order moves are applied in.
    pub fn check_graph_move(&self, mv: &GraphMove) -> Result<(), NetInfError> {
        let mut removals: FxHashMap<Edge, usize> = FxHashMap::default();
        for &(u, v) in &mv.removed {
            self.check_vertex(u)?;
            self.check_vertex(v)?;
            *removals.entry(ordered(u, v)).or_insert(0) += 1;
        }
        for &(u, v) in &mv.added {
            self.check_vertex(u)?;
            self.check_vertex(v)?;
        }
        let missing = removals
            .into_iter()
            .filter(|&((u, v), count)| self.edge_multiplicity(u, v) < count)
            .min();
        match missing {
            Some(((u, v), _)) => Err(NetInfError::EdgeNotFound {
                u,
                v,
                multiplicity: self.edge_multiplicity(u, v),
            }),
            None => Ok(()),
        }
    }

    /// Grows or shrinks the vertex set. Only isolated trailing vertices can be dropped.
    pub fn resize(&mut self, size: usize) -> Result<(), NetInfError> {
        if let Some(v) = (size..self.size()).find(|&v| !self.adjacency[v].is_empty()) {
            return Err(NetInfError::Logic(format!(
                "cannot drop vertex {v}: it still has neighbours"
            )));
        }
        self.adjacency.resize_with(size, FxHashMap::default);
        Ok(())
    }

    /// Removes every edge, keeping the vertex set.
    pub fn clear_edges(&mut self) {
        for row in &mut self.adjacency {
            row.clear();
        }
        self.edge_count = 0;
        self.distinct_edge_count = 0;
    }

    /// Neighbours of `v` with the multiplicity of the joining edge. A self-loop yields `v` itself.
    pub fn neighbours(&self, v: VertexIndex) -> impl Iterator<Item = (VertexIndex, usize)> + '_ {
        self.adjacency
            .get(v)
            .into_iter()
            .flat_map(|row| row.iter().map(|(&u, &m)| (u, m)))
    }

    /// Degree of `v`; self-loops count twice.
    pub fn degree(&self, v: VertexIndex) -> usize {
        self.neighbours(v)
            .map(|(u, m)| if u == v { 2 * m } else { m })
            .sum()
    }

    pub fn degrees(&self) -> Vec<usize> {
        self.vertices().map(|v| self.degree(v)).collect()
    }

    /// Iterates over `(u, v, multiplicity)` with `u <= v`, each pair once.
    pub fn edges(&self) -> impl Iterator<Item = (VertexIndex, VertexIndex, usize)> + '_ {
        self.adjacency.iter().enumerate().flat_map(|(u, row)| {
            row.iter()
                .filter(move |&(&v, _)| u <= v)
                .map(move |(&v, &m)| (u, v, m))
        })
    }

    /// Same as [`MultiGraph::edges`] but sorted, for callers that need a canonical order.
    pub fn sorted_edges(&self) -> Vec<(VertexIndex, VertexIndex, usize)> {
        let mut edges: Vec<_> = self.edges().collect();
        edges.sort_unstable();
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_graph() -> MultiGraph {
        MultiGraph::from_edges(5, [(0, 1, 2), (0, 3, 1), (0, 4, 1), (2, 3, 1)])
            .expect("valid edges")
    }

    #[test]
    fn counts_track_multiplicities() {
        let graph = toy_graph();
        assert_eq!(graph.edge_count(), 5);
        assert_eq!(graph.distinct_edge_count(), 4);
        assert_eq!(graph.edge_multiplicity(1, 0), 2);
        assert_eq!(graph.degree(0), 4);
        assert_eq!(graph.degrees(), vec![4, 2, 1, 2, 1]);
    }

    #[test]
    fn self_loop_counts_twice_in_degree() {
        let mut graph = MultiGraph::new(2);
        graph.add_multiedge(1, 1, 2).expect("add loop");
        assert_eq!(graph.degree(1), 4);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.distinct_edge_count(), 1);
        graph.remove_edge(1, 1).expect("remove loop");
        assert_eq!(graph.degree(1), 2);
    }

    #[test]
    fn removing_missing_edge_fails() {
        let mut graph = toy_graph();
        let err = graph.remove_edge(1, 2).expect_err("edge does not exist");
        assert_eq!(
            err,
            NetInfError::EdgeNotFound {
                u: 1,
                v: 2,
                multiplicity: 0
            }
        );
        assert!(graph.remove_multiedge(0, 1, 3).is_err());
        assert_eq!(graph.edge_count(), 5);
    }

    #[test]
    fn move_check_counts_repeated_removals() {
        let graph = toy_graph();
        graph
            .check_graph_move(&GraphMove::new([(0, 1), (1, 0)], [(2, 3)]))
            .expect("two parallel edges exist");
        let err = graph
            .check_graph_move(&GraphMove::new([(0, 1), (0, 1), (0, 1)], []))
            .expect_err("only two parallel edges");
        assert_eq!(
            err,
            NetInfError::EdgeNotFound {
                u: 0,
                v: 1,
                multiplicity: 2
            }
        );
        assert!(graph.check_graph_move(&GraphMove::addition(0, 9)).is_err());
    }

    #[test]
    fn set_multiplicity_adds_and_removes() {
        let mut graph = toy_graph();
        graph.set_edge_multiplicity(0, 1, 0).expect("remove all");
        graph.set_edge_multiplicity(1, 2, 3).expect("add three");
        assert_eq!(graph.edge_count(), 6);
        assert_eq!(graph.distinct_edge_count(), 4);
        assert!(!graph.is_edge(0, 1));
    }

    #[test]
    fn sorted_edges_lists_each_pair_once() {
        let graph = toy_graph();
        assert_eq!(
            graph.sorted_edges(),
            vec![(0, 1, 2), (0, 3, 1), (0, 4, 1), (2, 3, 1)]
        );
    }

    #[test]
    fn resize_only_drops_isolated_vertices() {
        let mut graph = MultiGraph::from_edges(3, [(0, 1, 1)]).expect("valid edges");
        graph.resize(4).expect("grow");
        assert_eq!(graph.size(), 4);
        graph.resize(2).expect("drop isolated");
        assert!(graph.resize(1).is_err());
    }

    #[test]
    fn out_of_range_vertex_is_rejected() {
        let mut graph = MultiGraph::new(3);
        assert!(matches!(
            graph.add_edge(0, 3),
            Err(NetInfError::InvalidArgument(_))
        ));
    }
}
