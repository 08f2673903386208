//! Edge sampler weighted by multiplicity.

use rand::Rng;

use crate::engine::errors::NetInfError;
use crate::engine::graph::{ordered, Edge, MultiGraph};
use crate::engine::sampler::samplable_set::SamplableSet;

/// Largest multiplicity an edge sampler accepts.
pub const MAX_EDGE_WEIGHT: f64 = 1e9;

/// Samples existing edges with probability proportional to their multiplicity.
#[derive(Debug, Clone)]
pub struct EdgeSampler {
    set: SamplableSet<Edge>,
}

impl EdgeSampler {
    pub fn new() -> Result<Self, NetInfError> {
        Ok(Self {
            set: SamplableSet::new(1.0, MAX_EDGE_WEIGHT)?,
        })
    }

    /// Rebuilds the sampler from every edge of `graph`.
    pub fn set_up_with_graph(&mut self, graph: &MultiGraph) -> Result<(), NetInfError> {
        self.set.clear();
        for (u, v, m) in graph.edges() {
            self.set.insert((u, v), m as f64)?;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.set.clear();
    }

    /// Current multiplicity recorded for `edge`.
    pub fn weight(&self, edge: Edge) -> f64 {
        let edge = ordered(edge.0, edge.1);
        self.set.weight(&edge).unwrap_or(0.0)
    }

    /// Total multiplicity, i.e. the edge count of the tracked graph.
    pub fn total_weight(&self) -> f64 {
        self.set.total_weight()
    }

    pub fn distinct_count(&self) -> usize {
        self.set.len()
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Edge> {
        self.set.sample(rng).map(|(edge, _)| edge)
    }

    pub fn on_edge_addition(&mut self, edge: Edge) -> Result<(), NetInfError> {
        let edge = ordered(edge.0, edge.1);
        let weight = self.weight(edge) + 1.0;
        self.set.set_weight(edge, weight)
    }

    pub fn on_edge_removal(&mut self, edge: Edge) -> Result<(), NetInfError> {
        let edge = ordered(edge.0, edge.1);
        let weight = self.weight(edge);
        if weight < 1.0 {
            return Err(NetInfError::EdgeNotFound {
                u: edge.0,
                v: edge.1,
                multiplicity: 0,
            });
        }
        if weight <= 1.0 {
            self.set.erase(&edge);
            Ok(())
        } else {
            self.set.set_weight(edge, weight - 1.0)
        }
    }

    /// Verifies that every recorded weight equals the multiplicity in `graph`.
    pub fn check_consistency(&self, graph: &MultiGraph) -> Result<(), NetInfError> {
        for (u, v, m) in graph.edges() {
            let weight = self.weight((u, v));
            if weight != m as f64 {
                return Err(NetInfError::consistency(
                    "EdgeSampler",
                    format!("edge ({u}, {v}) has weight {weight} but multiplicity {m}"),
                ));
            }
        }
        if self.set.len() != graph.distinct_edge_count() {
            return Err(NetInfError::consistency(
                "EdgeSampler",
                format!(
                    "sampler holds {} edges but graph has {}",
                    self.set.len(),
                    graph.distinct_edge_count()
                ),
            ));
        }
        if self.total_weight() != graph.edge_count() as f64 {
            return Err(NetInfError::consistency(
                "EdgeSampler",
                format!(
                    "total weight {} differs from edge count {}",
                    self.total_weight(),
                    graph.edge_count()
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_multiplicities_incrementally() {
        let mut graph =
            MultiGraph::from_edges(4, [(0, 1, 2), (2, 3, 1)]).expect("valid edges");
        let mut sampler = EdgeSampler::new().expect("sampler");
        sampler.set_up_with_graph(&graph).expect("set up");
        sampler.check_consistency(&graph).expect("consistent");

        sampler.on_edge_removal((3, 2)).expect("remove");
        graph.remove_edge(2, 3).expect("remove");
        sampler.on_edge_addition((1, 0)).expect("add");
        graph.add_edge(0, 1).expect("add");
        sampler.check_consistency(&graph).expect("consistent after moves");
        assert_eq!(sampler.weight((0, 1)), 3.0);
        assert_eq!(sampler.distinct_count(), 1);
    }

    #[test]
    fn stale_sampler_is_detected() {
        let mut graph = MultiGraph::from_edges(3, [(0, 1, 1)]).expect("valid edges");
        let mut sampler = EdgeSampler::new().expect("sampler");
        sampler.set_up_with_graph(&graph).expect("set up");
        graph.add_edge(1, 2).expect("add");
        let err = sampler.check_consistency(&graph).expect_err("stale");
        assert!(err.to_string().contains("EdgeSampler"));
    }

    #[test]
    fn removing_absent_edge_fails() {
        let mut sampler = EdgeSampler::new().expect("sampler");
        assert!(sampler.on_edge_removal((0, 1)).is_err());
    }
}
