//! Noisy observations of the latent graph.

use std::collections::BTreeMap;

use rand::distributions::Distribution;
use rand::Rng;
use statrs::distribution::Poisson;

use crate::data::model::Observation;
use crate::engine::errors::NetInfError;
use crate::engine::graph::{ordered, MultiGraph};
use crate::engine::moves::{GraphMove, ParamMove};
use crate::engine::numeric::log_poisson_pmf;

/// Each pair of distinct vertices is observed a Poisson number of times, with mean
/// `no_edge_average` for absent edges and `m * edge_average` for an edge of multiplicity `m`.
///
/// Self-loops are not observed.
#[derive(Debug, Clone, PartialEq)]
pub struct UncertainPoisson {
    no_edge_average: f64,
    edge_average: f64,
    observed: MultiGraph,
}

fn is_positive(x: f64) -> bool {
    x > 0.0 && x.is_finite()
}

impl UncertainPoisson {
    pub fn new(size: usize, no_edge_average: f64, edge_average: f64) -> Result<Self, NetInfError> {
        if !is_positive(no_edge_average) || !is_positive(edge_average) {
            return Err(NetInfError::InvalidArgument(format!(
                "Poisson averages must be positive, got {no_edge_average} and {edge_average}"
            )));
        }
        Ok(Self {
            no_edge_average,
            edge_average,
            observed: MultiGraph::new(size),
        })
    }

    pub fn no_edge_average(&self) -> f64 {
        self.no_edge_average
    }

    pub fn edge_average(&self) -> f64 {
        self.edge_average
    }

    pub fn observed(&self) -> &MultiGraph {
        &self.observed
    }

    pub fn set_observed(&mut self, observed: MultiGraph) -> Result<(), NetInfError> {
        if observed.size() != self.observed.size() {
            return Err(NetInfError::SizeMismatch {
                expected: self.observed.size(),
                actual: observed.size(),
            });
        }
        self.observed = observed;
        Ok(())
    }

    pub fn average(&self, multiplicity: usize) -> f64 {
        if multiplicity == 0 {
            self.no_edge_average
        } else {
            multiplicity as f64 * self.edge_average
        }
    }

    fn pair_log_likelihood(&self, u: usize, v: usize, multiplicity: usize) -> f64 {
        log_poisson_pmf(self.observed.edge_multiplicity(u, v), self.average(multiplicity))
    }
}

impl Observation for UncertainPoisson {
    fn name(&self) -> &'static str {
        "UncertainPoisson"
    }

    fn size(&self) -> usize {
        self.observed.size()
    }

    fn set_graph(&mut self, graph: &MultiGraph) -> Result<(), NetInfError> {
        if graph.size() != self.size() {
            return Err(NetInfError::SizeMismatch {
                expected: self.size(),
                actual: graph.size(),
            });
        }
        Ok(())
    }

    fn log_likelihood(&self, graph: &MultiGraph) -> f64 {
        let n = self.size();
        (0..n)
            .flat_map(|u| (u + 1..n).map(move |v| (u, v)))
            .map(|(u, v)| self.pair_log_likelihood(u, v, graph.edge_multiplicity(u, v)))
            .sum()
    }

    /// Repeated pairs in one move are aggregated before the pair terms are compared.
    fn log_likelihood_ratio_from_graph_move(
        &self,
        graph: &MultiGraph,
        mv: &GraphMove,
    ) -> Result<f64, NetInfError> {
        let mut deltas: BTreeMap<(usize, usize), isize> = BTreeMap::new();
        for &(u, v) in &mv.removed {
            *deltas.entry(ordered(u, v)).or_insert(0) -= 1;
        }
        for &(u, v) in &mv.added {
            *deltas.entry(ordered(u, v)).or_insert(0) += 1;
        }
        let mut ratio = 0.0;
        for ((u, v), delta) in deltas {
            let multiplicity = graph.edge_multiplicity(u, v);
            let next = multiplicity
                .checked_add_signed(delta)
                .ok_or(NetInfError::EdgeNotFound { u, v, multiplicity })?;
            if u != v && delta != 0 {
                ratio += self.pair_log_likelihood(u, v, next)
                    - self.pair_log_likelihood(u, v, multiplicity);
            }
        }
        Ok(ratio)
    }

    fn apply_graph_move(&mut self, _graph: &MultiGraph, _mv: &GraphMove) -> Result<(), NetInfError> {
        Ok(())
    }

    fn sample_state<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        graph: &MultiGraph,
    ) -> Result<(), NetInfError> {
        self.set_graph(graph)?;
        let n = self.size();
        let mut observed = MultiGraph::new(n);
        for u in 0..n {
            for v in u + 1..n {
                let average = self.average(graph.edge_multiplicity(u, v));
                let poisson = Poisson::new(average)
                    .map_err(|e| NetInfError::InvalidArgument(format!("average {average}: {e}")))?;
                let count = poisson.sample(rng) as usize;
                if count > 0 {
                    observed.add_multiedge(u, v, count)?;
                }
            }
        }
        self.observed = observed;
        Ok(())
    }

    fn param_keys(&self) -> &'static [&'static str] {
        &["no_edge_average", "edge_average"]
    }

    fn param(&self, key: &str) -> Option<f64> {
        match key {
            "no_edge_average" => Some(self.no_edge_average),
            "edge_average" => Some(self.edge_average),
            _ => None,
        }
    }

    fn is_valid_param_move(&self, mv: &ParamMove) -> bool {
        self.param(&mv.key)
            .is_some_and(|current| is_positive(current + mv.value))
    }

    fn set_param(&mut self, key: &str, value: f64) -> Result<(), NetInfError> {
        let slot = match key {
            "no_edge_average" => &mut self.no_edge_average,
            "edge_average" => &mut self.edge_average,
            _ => {
                return Err(NetInfError::UnsupportedMove(format!(
                    "UncertainPoisson has no parameter {key}"
                )))
            }
        };
        *slot = value;
        Ok(())
    }

    fn check_consistency(&self, graph: &MultiGraph) -> Result<(), NetInfError> {
        if graph.size() != self.size() {
            return Err(NetInfError::consistency(
                "UncertainPoisson",
                format!("observed {} vertices, graph has {}", self.size(), graph.size()),
            ));
        }
        Ok(())
    }
}
