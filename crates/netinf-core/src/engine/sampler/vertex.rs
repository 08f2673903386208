//! Vertex samplers: uniform, or proportional to a shifted degree.

use rand::Rng;

use crate::engine::errors::NetInfError;
use crate::engine::graph::{Edge, MultiGraph, VertexIndex};
use crate::engine::sampler::samplable_set::SamplableSet;

/// Largest shifted degree a degree sampler accepts.
pub const MAX_VERTEX_WEIGHT: f64 = 1e9;

/// Samples vertices either uniformly or with weight `degree + shift`.
///
/// Besides sampling, both variants report the probability they would assign to a vertex after
/// a hypothetical change of degrees, which is what proposers need to evaluate reverse moves.
#[derive(Debug, Clone)]
pub enum VertexSampler {
    Uniform { size: usize },
    Degree(DegreeVertexSampler),
}

impl VertexSampler {
    pub fn uniform(size: usize) -> Self {
        VertexSampler::Uniform { size }
    }

    pub fn degree(size: usize, shift: f64) -> Result<Self, NetInfError> {
        Ok(VertexSampler::Degree(DegreeVertexSampler::new(size, shift)?))
    }

    pub fn set_up_with_graph(&mut self, graph: &MultiGraph) -> Result<(), NetInfError> {
        match self {
            VertexSampler::Uniform { size } => {
                *size = graph.size();
                Ok(())
            }
            VertexSampler::Degree(sampler) => sampler.set_up_with_graph(graph),
        }
    }

    pub fn clear(&mut self) {
        if let VertexSampler::Degree(sampler) = self {
            sampler.clear();
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<VertexIndex> {
        match self {
            VertexSampler::Uniform { size } => {
                (*size > 0).then(|| rng.gen_range(0..*size))
            }
            VertexSampler::Degree(sampler) => sampler.set.sample(rng).map(|(v, _)| v),
        }
    }

    /// Weight of `v` once its degree has changed by `degree_delta`.
    pub fn weight_with_delta(&self, v: VertexIndex, degree_delta: isize) -> f64 {
        match self {
            VertexSampler::Uniform { .. } => 1.0,
            VertexSampler::Degree(sampler) => sampler.weight(v) + degree_delta as f64,
        }
    }

    /// Total weight once the degree sum has changed by `degree_delta`.
    pub fn total_with_delta(&self, degree_delta: isize) -> f64 {
        match self {
            VertexSampler::Uniform { size } => *size as f64,
            VertexSampler::Degree(sampler) => sampler.set.total_weight() + degree_delta as f64,
        }
    }

    pub fn on_edge_addition(&mut self, edge: Edge) -> Result<(), NetInfError> {
        match self {
            VertexSampler::Uniform { .. } => Ok(()),
            VertexSampler::Degree(sampler) => {
                sampler.shift_degree(edge.0, 1)?;
                sampler.shift_degree(edge.1, 1)
            }
        }
    }

    pub fn on_edge_removal(&mut self, edge: Edge) -> Result<(), NetInfError> {
        match self {
            VertexSampler::Uniform { .. } => Ok(()),
            VertexSampler::Degree(sampler) => {
                sampler.shift_degree(edge.0, -1)?;
                sampler.shift_degree(edge.1, -1)
            }
        }
    }

    pub fn check_consistency(&self, graph: &MultiGraph) -> Result<(), NetInfError> {
        match self {
            VertexSampler::Uniform { size } if *size != graph.size() => {
                Err(NetInfError::consistency(
                    "VertexSampler",
                    format!("uniform sampler covers {size} vertices, graph has {}", graph.size()),
                ))
            }
            VertexSampler::Uniform { .. } => Ok(()),
            VertexSampler::Degree(sampler) => sampler.check_consistency(graph),
        }
    }
}

/// Samples vertices with weight `degree + shift`.
#[derive(Debug, Clone)]
pub struct DegreeVertexSampler {
    set: SamplableSet<VertexIndex>,
    shift: f64,
    size: usize,
}

impl DegreeVertexSampler {
    pub fn new(size: usize, shift: f64) -> Result<Self, NetInfError> {
        if !(shift > 0.0) {
            return Err(NetInfError::InvalidArgument(format!(
                "degree sampler shift must be positive, got {shift}"
            )));
        }
        Ok(Self {
            set: SamplableSet::new(shift, MAX_VERTEX_WEIGHT)?,
            shift,
            size,
        })
    }

    pub fn shift(&self) -> f64 {
        self.shift
    }

    fn set_up_with_graph(&mut self, graph: &MultiGraph) -> Result<(), NetInfError> {
        self.set.clear();
        self.size = graph.size();
        for v in graph.vertices() {
            self.set.insert(v, graph.degree(v) as f64 + self.shift)?;
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.set.clear();
    }

    fn weight(&self, v: VertexIndex) -> f64 {
        self.set.weight(&v).unwrap_or(self.shift)
    }

    fn shift_degree(&mut self, v: VertexIndex, delta: isize) -> Result<(), NetInfError> {
        let weight = self.weight(v) + delta as f64;
        if weight < self.shift {
            return Err(NetInfError::Logic(format!(
                "degree of vertex {v} would become negative"
            )));
        }
        self.set.set_weight(v, weight)
    }

    fn check_consistency(&self, graph: &MultiGraph) -> Result<(), NetInfError> {
        if self.set.len() != graph.size() {
            return Err(NetInfError::consistency(
                "VertexSampler",
                format!("sampler holds {} vertices, graph has {}", self.set.len(), graph.size()),
            ));
        }
        for v in graph.vertices() {
            let expected = graph.degree(v) as f64 + self.shift;
            let actual = self.weight(v);
            if actual != expected {
                return Err(NetInfError::consistency(
                    "VertexSampler",
                    format!("vertex {v} has weight {actual}, expected degree + shift = {expected}"),
                ));
            }
        }
        Ok(())
    }
}
