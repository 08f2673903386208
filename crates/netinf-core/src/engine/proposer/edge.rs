//! # Graph-move proposers
//!
//! A single [`EdgeProposer`] covers every edge move family:
//!
//! - **single_edge**: add a pair drawn from the vertex sampler, or remove an edge drawn
//!   proportionally to its multiplicity
//! - **hinge_flip**: detach one endpoint of a sampled edge and reattach it to a sampled vertex
//! - **double_edge_swap**: exchange endpoints of two sampled edges
//! - **canonical**: equal mixture of the three above
//! - **microcanonical**: equal mixture of hinge flips and swaps, preserving the edge count
//!
//! The proposer owns its edge and vertex samplers and must see every applied move through
//! [`EdgeProposer::apply_graph_move`]. Proposal ratios are computed from the sampler weights
//! before the move and from the weights the move would leave behind, without touching the graph.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use smallvec::SmallVec;

use crate::engine::errors::NetInfError;
use crate::engine::graph::{ordered, Edge, MultiGraph, VertexIndex};
use crate::engine::moves::GraphMove;
use crate::engine::sampler::{EdgeSampler, VertexSampler};

/// Default number of candidates drawn before a proposal gives up.
pub const DEFAULT_MAX_ITERATION: usize = 100;

/// Family of graph moves produced by an [`EdgeProposer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EdgeProposerKind {
    SingleEdge,
    HingeFlip,
    DoubleEdgeSwap,
    Canonical,
    Microcanonical,
}

impl EdgeProposerKind {
    pub fn name(&self) -> &'static str {
        match self {
            EdgeProposerKind::SingleEdge => "single_edge",
            EdgeProposerKind::HingeFlip => "hinge_flip",
            EdgeProposerKind::DoubleEdgeSwap => "double_edge_swap",
            EdgeProposerKind::Canonical => "canonical",
            EdgeProposerKind::Microcanonical => "microcanonical",
        }
    }

    /// True when every proposed move keeps the total edge count.
    pub fn preserves_edge_count(&self) -> bool {
        !matches!(
            self,
            EdgeProposerKind::SingleEdge | EdgeProposerKind::Canonical
        )
    }
}

impl fmt::Display for EdgeProposerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EdgeProposerKind {
    type Err = NetInfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_edge" => Ok(EdgeProposerKind::SingleEdge),
            "hinge_flip" => Ok(EdgeProposerKind::HingeFlip),
            "double_edge_swap" => Ok(EdgeProposerKind::DoubleEdgeSwap),
            "canonical" => Ok(EdgeProposerKind::Canonical),
            "microcanonical" => Ok(EdgeProposerKind::Microcanonical),
            other => Err(NetInfError::UnsupportedMove(format!(
                "unknown edge proposer type '{other}'"
            ))),
        }
    }
}

/// How single-edge and hinge-flip moves pick new endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VertexSampling {
    Uniform,
    /// Proportional to `degree + shift`.
    Degree,
}

/// Configuration for an [`EdgeProposer`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeProposerConfig {
    pub kind: EdgeProposerKind,
    pub vertex_sampling: VertexSampling,
    pub allow_self_loops: bool,
    pub allow_multiedges: bool,
    /// Probability that a single-edge move adds rather than removes an edge.
    pub add_prob: f64,
    /// Added to every degree by the degree vertex sampler.
    pub shift: f64,
    pub max_iteration: usize,
}

impl Default for EdgeProposerConfig {
    fn default() -> Self {
        Self {
            kind: EdgeProposerKind::HingeFlip,
            vertex_sampling: VertexSampling::Uniform,
            allow_self_loops: true,
            allow_multiedges: true,
            add_prob: 0.5,
            shift: 1.0,
            max_iteration: DEFAULT_MAX_ITERATION,
        }
    }
}

impl EdgeProposerConfig {
    pub fn with_kind(kind: EdgeProposerKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn validate(self) -> Result<Self, NetInfError> {
        if !(self.add_prob > 0.0 && self.add_prob < 1.0) {
            return Err(NetInfError::InvalidArgument(format!(
                "add_prob must be in (0, 1), got {}",
                self.add_prob
            )));
        }
        if !(self.shift > 0.0 && self.shift.is_finite()) {
            return Err(NetInfError::InvalidArgument(format!(
                "shift must be positive, got {}",
                self.shift
            )));
        }
        if self.max_iteration == 0 {
            return Err(NetInfError::InvalidArgument(
                "max_iteration must be at least 1".into(),
            ));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Single,
    Hinge,
    Swap,
}

fn shape_of(mv: &GraphMove) -> Option<Shape> {
    match (mv.removed.len(), mv.added.len()) {
        (0, 1) | (1, 0) => Some(Shape::Single),
        (1, 1) => Some(Shape::Hinge),
        (2, 2) => Some(Shape::Swap),
        _ => None,
    }
}

/// Sampler weights, optionally shifted by a hypothetical move.
struct WeightView<'a> {
    edges: &'a EdgeSampler,
    vertices: &'a VertexSampler,
    edge_delta: SmallVec<[(Edge, isize); 4]>,
    degree_delta: SmallVec<[(VertexIndex, isize); 8]>,
    edge_count_delta: isize,
}

fn bump<K: PartialEq>(entries: &mut SmallVec<[(K, isize); 8]>, key: K, delta: isize) {
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some((_, d)) => *d += delta,
        None => entries.push((key, delta)),
    }
}

impl<'a> WeightView<'a> {
    fn current(edges: &'a EdgeSampler, vertices: &'a VertexSampler) -> Self {
        Self {
            edges,
            vertices,
            edge_delta: SmallVec::new(),
            degree_delta: SmallVec::new(),
            edge_count_delta: 0,
        }
    }

    fn after(edges: &'a EdgeSampler, vertices: &'a VertexSampler, mv: &GraphMove) -> Self {
        let mut view = Self::current(edges, vertices);
        let mut degree_delta: SmallVec<[(VertexIndex, isize); 8]> = SmallVec::new();
        let mut edge_delta: SmallVec<[(Edge, isize); 8]> = SmallVec::new();
        let changes = mv
            .removed
            .iter()
            .map(|&e| (e, -1))
            .chain(mv.added.iter().map(|&e| (e, 1)));
        for ((u, v), delta) in changes {
            bump(&mut edge_delta, (u, v), delta);
            bump(&mut degree_delta, u, delta);
            bump(&mut degree_delta, v, delta);
        }
        view.edge_delta = edge_delta.into_iter().collect();
        view.degree_delta = degree_delta;
        view.edge_count_delta = mv.edge_count_delta();
        view
    }

    fn edge_weight(&self, edge: Edge) -> f64 {
        let delta: isize = self
            .edge_delta
            .iter()
            .filter(|(e, _)| *e == edge)
            .map(|(_, d)| d)
            .sum();
        self.edges.weight(edge) + delta as f64
    }

    fn edge_total(&self) -> f64 {
        self.edges.total_weight() + self.edge_count_delta as f64
    }

    fn vertex_prob(&self, v: VertexIndex) -> f64 {
        let delta: isize = self
            .degree_delta
            .iter()
            .filter(|(u, _)| *u == v)
            .map(|(_, d)| d)
            .sum();
        let total = self.vertices.total_with_delta(2 * self.edge_count_delta);
        if total <= 0.0 {
            return 0.0;
        }
        self.vertices.weight_with_delta(v, delta) / total
    }
}

/// Proposes graph moves and evaluates their proposal ratios.
#[derive(Debug, Clone)]
pub struct EdgeProposer {
    config: EdgeProposerConfig,
    edge_sampler: EdgeSampler,
    vertex_sampler: VertexSampler,
}

impl EdgeProposer {
    pub fn new(config: EdgeProposerConfig, size: usize) -> Result<Self, NetInfError> {
        let config = config.validate()?;
        let vertex_sampler = match config.vertex_sampling {
            VertexSampling::Uniform => VertexSampler::uniform(size),
            VertexSampling::Degree => VertexSampler::degree(size, config.shift)?,
        };
        Ok(Self {
            config,
            edge_sampler: EdgeSampler::new()?,
            vertex_sampler,
        })
    }

    pub fn config(&self) -> &EdgeProposerConfig {
        &self.config
    }

    pub fn kind(&self) -> EdgeProposerKind {
        self.config.kind
    }

    /// Rebuilds both samplers from `graph`.
    pub fn set_up_with_graph(&mut self, graph: &MultiGraph) -> Result<(), NetInfError> {
        self.edge_sampler.set_up_with_graph(graph)?;
        self.vertex_sampler.set_up_with_graph(graph)
    }

    pub fn clear(&mut self) {
        self.edge_sampler.clear();
        self.vertex_sampler.clear();
    }

    fn edge_count(&self) -> usize {
        self.edge_sampler.total_weight() as usize
    }

    fn choose_shape<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Shape, NetInfError> {
        let edge_count = self.edge_count();
        match self.config.kind {
            EdgeProposerKind::SingleEdge => Ok(Shape::Single),
            EdgeProposerKind::HingeFlip => Ok(Shape::Hinge),
            EdgeProposerKind::DoubleEdgeSwap => Ok(Shape::Swap),
            EdgeProposerKind::Canonical => {
                let choice = rng.gen_range(0..3);
                Ok(if choice == 2 && edge_count > 2 {
                    Shape::Swap
                } else if choice == 1 && edge_count > 1 {
                    Shape::Hinge
                } else {
                    Shape::Single
                })
            }
            EdgeProposerKind::Microcanonical => {
                let choice = rng.gen_range(0..2);
                if choice == 1 && edge_count > 2 {
                    Ok(Shape::Swap)
                } else if edge_count > 1 {
                    Ok(Shape::Hinge)
                } else {
                    Err(NetInfError::UnsupportedMove(format!(
                        "microcanonical moves need at least two edges, graph has {edge_count}"
                    )))
                }
            }
        }
    }

    /// Probability that `choose_shape` returns `shape` when the graph has `edge_count` edges.
    fn shape_prob(&self, shape: Shape, edge_count: usize) -> f64 {
        match self.config.kind {
            EdgeProposerKind::SingleEdge => f64::from(u8::from(shape == Shape::Single)),
            EdgeProposerKind::HingeFlip => f64::from(u8::from(shape == Shape::Hinge)),
            EdgeProposerKind::DoubleEdgeSwap => f64::from(u8::from(shape == Shape::Swap)),
            EdgeProposerKind::Canonical => {
                let swap = if edge_count > 2 { 1.0 / 3.0 } else { 0.0 };
                let hinge = if edge_count > 1 { 1.0 / 3.0 } else { 0.0 };
                match shape {
                    Shape::Swap => swap,
                    Shape::Hinge => hinge,
                    Shape::Single => 1.0 - swap - hinge,
                }
            }
            EdgeProposerKind::Microcanonical => match shape {
                Shape::Swap if edge_count > 2 => 0.5,
                Shape::Hinge if edge_count > 2 => 0.5,
                Shape::Hinge if edge_count == 2 => 1.0,
                _ => 0.0,
            },
        }
    }

    fn add_prob(&self, edge_count: f64) -> f64 {
        if edge_count <= 0.0 {
            1.0
        } else {
            self.config.add_prob
        }
    }

    /// Draws one candidate without checking the graph policy. `None` if a sampler is empty.
    fn raw_move<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Option<GraphMove>, NetInfError> {
        let candidate = match self.choose_shape(rng)? {
            Shape::Single => {
                let edge_count = self.edge_sampler.total_weight();
                if rng.gen::<f64>() < self.add_prob(edge_count) {
                    let u = self.vertex_sampler.sample(rng);
                    let v = self.vertex_sampler.sample(rng);
                    u.zip(v).map(|(u, v)| GraphMove::addition(u, v))
                } else {
                    self.edge_sampler
                        .sample(rng)
                        .map(|(u, v)| GraphMove::removal(u, v))
                }
            }
            Shape::Hinge => {
                let edge = self.edge_sampler.sample(rng);
                let k = self.vertex_sampler.sample(rng);
                edge.zip(k).map(|((i, j), k)| {
                    let kept = if rng.gen::<f64>() < 0.5 { i } else { j };
                    GraphMove::new([(i, j)], [(kept, k)])
                })
            }
            Shape::Swap => {
                let first = self.edge_sampler.sample(rng);
                let second = self.edge_sampler.sample(rng);
                first.zip(second).map(|((i, j), (k, l))| {
                    if rng.gen::<f64>() < 0.5 {
                        GraphMove::new([(i, j), (k, l)], [(i, k), (j, l)])
                    } else {
                        GraphMove::new([(i, j), (k, l)], [(i, l), (j, k)])
                    }
                })
            }
        };
        Ok(candidate)
    }

    /// Describes why `mv` breaks the graph policy, if it does.
    fn violation(&self, mv: &GraphMove) -> Option<String> {
        let count = |edges: &[Edge], edge: Edge| edges.iter().filter(|&&e| e == edge).count();
        for &edge in &mv.removed {
            let available = self.edge_sampler.weight(edge);
            if count(mv.removed.as_slice(), edge) as f64 > available {
                return Some(format!(
                    "edge ({}, {}) removed more times than it exists",
                    edge.0, edge.1
                ));
            }
        }
        for &(u, v) in &mv.added {
            if u == v && !self.config.allow_self_loops {
                return Some(format!("self-loop ({u}, {v}) is not allowed"));
            }
            if !self.config.allow_multiedges {
                let after = self.edge_sampler.weight((u, v))
                    + count(mv.added.as_slice(), (u, v)) as f64
                    - count(mv.removed.as_slice(), (u, v)) as f64;
                if after > 1.0 {
                    return Some(format!("parallel edge ({u}, {v}) is not allowed"));
                }
            }
        }
        None
    }

    /// Proposes a move respecting the self-loop and parallel-edge policy.
    ///
    /// Invalid candidates are redrawn up to `max_iteration` times; exhausting the budget is
    /// reported with the last violated rule.
    pub fn propose_move<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<GraphMove, NetInfError> {
        let mut last_failure = String::from("no candidate was drawn");
        for _ in 0..self.config.max_iteration {
            match self.raw_move(rng)? {
                Some(mv) => match self.violation(&mv) {
                    None => return Ok(mv),
                    Some(reason) => last_failure = reason,
                },
                None => last_failure = "no edge or vertex available to sample".into(),
            }
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(
            kind = %self.config.kind,
            attempts = self.config.max_iteration,
            reason = %last_failure,
            "edge proposal exhausted its retry budget"
        );
        Err(NetInfError::RetryExhausted {
            operation: "edge proposal",
            attempts: self.config.max_iteration,
            last_failure,
        })
    }

    /// A move whose removed and added edges cancel leaves every probability unchanged.
    pub fn is_trivial_move(&self, mv: &GraphMove) -> bool {
        mv.cancels_out()
    }

    fn log_prob(&self, view: &WeightView<'_>, mv: &GraphMove) -> f64 {
        let Some(shape) = shape_of(mv) else {
            return f64::NEG_INFINITY;
        };
        let edge_count = view.edge_total();
        let shape_prob = self.shape_prob(shape, edge_count.max(0.0) as usize);
        let prob = match shape {
            Shape::Single => self.single_edge_prob(view, mv),
            Shape::Hinge => hinge_flip_prob(view, mv),
            Shape::Swap => double_swap_prob(view, mv),
        };
        (shape_prob * prob).ln()
    }

    fn single_edge_prob(&self, view: &WeightView<'_>, mv: &GraphMove) -> f64 {
        let edge_count = view.edge_total();
        let add_prob = self.add_prob(edge_count);
        if let Some(&(u, v)) = mv.added.first() {
            let orderings = if u == v { 1.0 } else { 2.0 };
            add_prob * orderings * view.vertex_prob(u) * view.vertex_prob(v)
        } else if let Some(&edge) = mv.removed.first() {
            if edge_count <= 0.0 {
                return 0.0;
            }
            (1.0 - add_prob) * view.edge_weight(edge) / edge_count
        } else {
            0.0
        }
    }

    /// `log P(reverse | state after mv) - log P(mv | current state)`.
    ///
    /// Trivial moves have a ratio of zero; moves this proposer cannot generate give `-inf`.
    pub fn log_proposal_ratio(&self, mv: &GraphMove) -> f64 {
        if self.is_trivial_move(mv) {
            return 0.0;
        }
        let current = WeightView::current(&self.edge_sampler, &self.vertex_sampler);
        let forward = self.log_prob(&current, mv);
        if forward == f64::NEG_INFINITY {
            return f64::NEG_INFINITY;
        }
        let after = WeightView::after(&self.edge_sampler, &self.vertex_sampler, mv);
        self.log_prob(&after, &mv.reversed()) - forward
    }

    /// Updates the samplers; removals are processed before additions.
    pub fn apply_graph_move(&mut self, mv: &GraphMove) -> Result<(), NetInfError> {
        for &edge in &mv.removed {
            self.edge_sampler.on_edge_removal(edge)?;
            self.vertex_sampler.on_edge_removal(edge)?;
        }
        for &edge in &mv.added {
            self.edge_sampler.on_edge_addition(edge)?;
            self.vertex_sampler.on_edge_addition(edge)?;
        }
        Ok(())
    }

    pub fn check_consistency(&self, graph: &MultiGraph) -> Result<(), NetInfError> {
        self.edge_sampler.check_consistency(graph)?;
        self.vertex_sampler.check_consistency(graph)
    }
}

fn hinge_flip_prob(view: &WeightView<'_>, mv: &GraphMove) -> f64 {
    let (Some(&removed), Some(&(a, b))) = (mv.removed.first(), mv.added.first()) else {
        return 0.0;
    };
    let edge_count = view.edge_total();
    if edge_count <= 0.0 {
        return 0.0;
    }
    let pivots: f64 = [removed.0, removed.1]
        .into_iter()
        .filter_map(|kept| {
            if kept == a {
                Some(b)
            } else if kept == b {
                Some(a)
            } else {
                None
            }
        })
        .map(|k| 0.5 * view.vertex_prob(k))
        .sum();
    view.edge_weight(removed) / edge_count * pivots
}

fn double_swap_prob(view: &WeightView<'_>, mv: &GraphMove) -> f64 {
    let edge_count = view.edge_total();
    if edge_count <= 0.0 || mv.removed.len() != 2 || mv.added.len() != 2 {
        return 0.0;
    }
    let sorted_pair = |x: Edge, y: Edge| if x <= y { [x, y] } else { [y, x] };
    let target = sorted_pair(mv.added[0], mv.added[1]);
    let (r1, r2) = (mv.removed[0], mv.removed[1]);
    let orderings: SmallVec<[(Edge, Edge); 2]> = if r1 == r2 {
        SmallVec::from_slice(&[(r1, r2)])
    } else {
        SmallVec::from_slice(&[(r1, r2), (r2, r1)])
    };
    orderings
        .into_iter()
        .map(|((i, j), (k, l))| {
            let pick = view.edge_weight((i, j)) / edge_count * view.edge_weight((k, l))
                / edge_count;
            let straight = sorted_pair(ordered(i, k), ordered(j, l)) == target;
            let crossed = sorted_pair(ordered(i, l), ordered(j, k)) == target;
            pick * 0.5 * (f64::from(u8::from(straight)) + f64::from(u8::from(crossed)))
        })
        .sum()
}
