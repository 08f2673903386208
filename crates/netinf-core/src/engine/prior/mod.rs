//! Hierarchical priors arranged in a directed acyclic graph.
//!
//! Every prior lives in a [`PriorDag`] arena and refers to its parents by [`PriorId`]. Parents
//! are always inserted before their children, so ids double as a topological order: sampling
//! and graph-move updates walk the arena front to back, label-move updates walk it back to
//! front so that children still see the parent state from before the move.
//!
//! A prior shared by several children contributes once to any sum over the DAG. Each node
//! records the epoch in which it was last counted; traversals skip nodes already stamped with
//! the current epoch and [`PriorDag::computation_finished`] starts a new one.

pub mod block;
pub mod block_count;
pub mod degree;
pub mod edge_count;
pub mod label_graph;
pub mod nested;

use std::cell::Cell;
use std::collections::BTreeSet;

use rand::Rng;
use smallvec::{smallvec, SmallVec};

use crate::engine::errors::NetInfError;
use crate::engine::graph::MultiGraph;
use crate::engine::moves::{GraphMove, LabelMove};

use block::{BlockPrior, BlockPriorKind, Partition, EMPTY_PARTITION};
use block_count::{BlockCountKind, BlockCountPrior};
use degree::{DegreePrior, DegreePriorKind};
use edge_count::{EdgeCountKind, EdgeCountPrior};
use label_graph::{LabelGraphPrior, LabelGraphPriorKind};
use nested::{NestedBlockPrior, NestedBlockPriorKind, NestedLabelGraphPrior};

/// Index of a prior inside its [`PriorDag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PriorId(usize);

impl PriorId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One term of the hierarchical prior together with the ids of the priors it conditions on.
#[derive(Debug, Clone)]
pub enum Prior {
    EdgeCount(EdgeCountPrior),
    BlockCount(BlockCountPrior),
    Block {
        prior: BlockPrior,
        block_count: PriorId,
    },
    LabelGraph {
        prior: LabelGraphPrior,
        edge_count: PriorId,
        block: PriorId,
    },
    Degree {
        prior: DegreePrior,
        edge_count: PriorId,
    },
    NestedBlock(NestedBlockPrior),
    NestedLabelGraph {
        prior: NestedLabelGraphPrior,
        edge_count: PriorId,
        nested_block: PriorId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PriorKindTag {
    EdgeCount,
    BlockCount,
    Block,
    LabelGraph,
    Degree,
    NestedBlock,
    NestedLabelGraph,
}

impl Prior {
    pub fn name(&self) -> &'static str {
        match self {
            Prior::EdgeCount(_) => "EdgeCountPrior",
            Prior::BlockCount(_) => "BlockCountPrior",
            Prior::Block { .. } => "BlockPrior",
            Prior::LabelGraph { .. } => "LabelGraphPrior",
            Prior::Degree { .. } => "DegreePrior",
            Prior::NestedBlock(_) => "NestedBlockPrior",
            Prior::NestedLabelGraph { .. } => "NestedLabelGraphPrior",
        }
    }

    fn tag(&self) -> PriorKindTag {
        match self {
            Prior::EdgeCount(_) => PriorKindTag::EdgeCount,
            Prior::BlockCount(_) => PriorKindTag::BlockCount,
            Prior::Block { .. } => PriorKindTag::Block,
            Prior::LabelGraph { .. } => PriorKindTag::LabelGraph,
            Prior::Degree { .. } => PriorKindTag::Degree,
            Prior::NestedBlock(_) => PriorKindTag::NestedBlock,
            Prior::NestedLabelGraph { .. } => PriorKindTag::NestedLabelGraph,
        }
    }

    /// Parents with the kind each one must have.
    fn typed_parents(&self) -> SmallVec<[(PriorId, PriorKindTag); 2]> {
        match self {
            Prior::EdgeCount(_) | Prior::BlockCount(_) | Prior::NestedBlock(_) => SmallVec::new(),
            Prior::Block { block_count, .. } => {
                smallvec![(*block_count, PriorKindTag::BlockCount)]
            }
            Prior::LabelGraph {
                edge_count, block, ..
            } => smallvec![
                (*edge_count, PriorKindTag::EdgeCount),
                (*block, PriorKindTag::Block)
            ],
            Prior::Degree { edge_count, .. } => smallvec![(*edge_count, PriorKindTag::EdgeCount)],
            Prior::NestedLabelGraph {
                edge_count,
                nested_block,
                ..
            } => smallvec![
                (*edge_count, PriorKindTag::EdgeCount),
                (*nested_block, PriorKindTag::NestedBlock)
            ],
        }
    }

    pub fn parents(&self) -> SmallVec<[PriorId; 2]> {
        self.typed_parents().into_iter().map(|(id, _)| id).collect()
    }

    fn log_likelihood(&self, parents: Parents<'_>) -> f64 {
        match self {
            Prior::EdgeCount(p) => p.log_likelihood(),
            Prior::BlockCount(p) => p.log_likelihood(),
            Prior::Block { prior, block_count } => {
                prior.log_likelihood(parents.block_count(*block_count))
            }
            Prior::LabelGraph {
                prior,
                edge_count,
                block,
            } => prior.log_likelihood(
                parents.edge_count(*edge_count),
                parents.partition(*block).block_count(),
            ),
            Prior::Degree { prior, edge_count } => {
                prior.log_likelihood(parents.edge_count(*edge_count))
            }
            Prior::NestedBlock(p) => p.log_likelihood(),
            Prior::NestedLabelGraph {
                prior,
                nested_block,
                ..
            } => parents
                .nested(*nested_block)
                .map_or(f64::NEG_INFINITY, |blocks| prior.log_likelihood(blocks)),
        }
    }

    fn log_likelihood_ratio_from_graph_move(&self, parents: Parents<'_>, mv: &GraphMove) -> f64 {
        match self {
            Prior::EdgeCount(p) => p.log_likelihood_ratio(mv.edge_count_delta()),
            Prior::BlockCount(_) | Prior::Block { .. } | Prior::NestedBlock(_) => 0.0,
            Prior::LabelGraph {
                prior,
                edge_count,
                block,
            } => {
                let partition = parents.partition(*block);
                prior.log_likelihood_ratio_from_graph_move(
                    mv,
                    partition.labels(),
                    parents.edge_count(*edge_count),
                    partition.block_count(),
                )
            }
            Prior::Degree { prior, edge_count } => {
                prior.log_likelihood_ratio_from_graph_move(mv, parents.edge_count(*edge_count))
            }
            Prior::NestedLabelGraph {
                prior,
                nested_block,
                ..
            } => parents.nested(*nested_block).map_or(f64::NEG_INFINITY, |blocks| {
                prior.log_likelihood_ratio_from_graph_move(mv, blocks)
            }),
        }
    }

    fn log_likelihood_ratio_from_label_move(
        &self,
        parents: Parents<'_>,
        graph: &MultiGraph,
        mv: &LabelMove,
    ) -> f64 {
        match self {
            Prior::EdgeCount(_) | Prior::Degree { .. } => 0.0,
            Prior::BlockCount(p) => p.log_likelihood_ratio(mv.added_labels),
            Prior::Block { prior, block_count } => {
                prior.log_likelihood_ratio_from_label_move(mv, parents.block_count(*block_count))
            }
            Prior::LabelGraph {
                prior,
                edge_count,
                block,
            } => {
                let partition = parents.partition(*block);
                prior.log_likelihood_ratio_from_label_move(
                    mv,
                    graph,
                    partition.labels(),
                    parents.edge_count(*edge_count),
                    partition.block_count(),
                )
            }
            Prior::NestedBlock(p) => p.log_likelihood_ratio_from_label_move(mv),
            Prior::NestedLabelGraph {
                prior,
                nested_block,
                ..
            } => parents.nested(*nested_block).map_or(f64::NEG_INFINITY, |blocks| {
                prior.log_likelihood_ratio_from_label_move(mv, graph, blocks)
            }),
        }
    }

    fn sample_state<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        parents: Parents<'_>,
    ) -> Result<(), NetInfError> {
        match self {
            Prior::EdgeCount(p) => p.sample_state(rng),
            Prior::BlockCount(p) => p.sample_state(rng),
            Prior::Block { prior, block_count } => {
                prior.sample_state(rng, parents.block_count(*block_count))
            }
            Prior::LabelGraph {
                prior,
                edge_count,
                block,
            } => prior.sample_state(
                rng,
                parents.edge_count(*edge_count),
                parents.partition(*block).block_count(),
            ),
            Prior::Degree { prior, edge_count } => {
                prior.sample_state(rng, parents.edge_count(*edge_count))
            }
            Prior::NestedBlock(p) => p.sample_state(rng),
            Prior::NestedLabelGraph {
                prior,
                edge_count,
                nested_block,
            } => prior.sample_state(
                rng,
                parents.edge_count(*edge_count),
                parents.require_nested(*nested_block)?,
            ),
        }
    }

    fn apply_graph_move(&mut self, parents: Parents<'_>, mv: &GraphMove) -> Result<(), NetInfError> {
        match self {
            Prior::EdgeCount(p) => p.apply_delta(mv.edge_count_delta()),
            Prior::BlockCount(_) | Prior::Block { .. } | Prior::NestedBlock(_) => Ok(()),
            Prior::LabelGraph { prior, block, .. } => {
                prior.apply_graph_move(mv, parents.partition(*block).labels())
            }
            Prior::Degree { prior, .. } => prior.apply_graph_move(mv),
            Prior::NestedLabelGraph {
                prior,
                nested_block,
                ..
            } => prior.apply_graph_move(mv, parents.require_nested(*nested_block)?),
        }
    }

    fn apply_label_move(
        &mut self,
        parents: Parents<'_>,
        graph: &MultiGraph,
        mv: &LabelMove,
    ) -> Result<(), NetInfError> {
        match self {
            Prior::EdgeCount(_) | Prior::Degree { .. } => Ok(()),
            Prior::BlockCount(p) => p.apply_delta(mv.added_labels),
            Prior::Block { prior, .. } => prior.apply_label_move(mv),
            Prior::LabelGraph { prior, block, .. } => {
                prior.apply_label_move(mv, graph, parents.partition(*block).labels())
            }
            Prior::NestedBlock(p) => p.apply_label_move(mv),
            Prior::NestedLabelGraph {
                prior,
                nested_block,
                ..
            } => prior.apply_label_move(mv, graph, parents.require_nested(*nested_block)?),
        }
    }

    fn recompute_from_graph(
        &mut self,
        parents: Parents<'_>,
        graph: &MultiGraph,
    ) -> Result<(), NetInfError> {
        match self {
            Prior::EdgeCount(p) => {
                p.set_state(graph.edge_count());
                Ok(())
            }
            Prior::BlockCount(_) | Prior::Block { .. } | Prior::NestedBlock(_) => Ok(()),
            Prior::LabelGraph { prior, block, .. } => {
                let partition = parents.partition(*block);
                prior.recompute_from_graph(graph, partition.labels(), partition.block_count())
            }
            Prior::Degree { prior, .. } => prior.recompute_from_graph(graph),
            Prior::NestedLabelGraph {
                prior,
                nested_block,
                ..
            } => prior.recompute_from_graph(graph, parents.require_nested(*nested_block)?),
        }
    }

    fn check_consistency(&self, parents: Parents<'_>, graph: &MultiGraph) -> Result<(), NetInfError> {
        match self {
            Prior::EdgeCount(p) => {
                if p.state() != graph.edge_count() {
                    return Err(NetInfError::consistency(
                        self.name(),
                        format!(
                            "edge count {} differs from graph edge count {}",
                            p.state(),
                            graph.edge_count()
                        ),
                    ));
                }
                Ok(())
            }
            Prior::BlockCount(_) => Ok(()),
            Prior::Block { prior, block_count } => {
                if prior.size() != graph.size() {
                    return Err(NetInfError::consistency(
                        self.name(),
                        format!(
                            "partition covers {} vertices, graph has {}",
                            prior.size(),
                            graph.size()
                        ),
                    ));
                }
                prior.check_consistency(parents.block_count(*block_count))
            }
            Prior::LabelGraph { prior, block, .. } => {
                let partition = parents.partition(*block);
                prior.check_consistency(graph, partition.labels(), partition.block_count())
            }
            Prior::Degree { prior, .. } => prior.check_consistency(graph),
            Prior::NestedBlock(p) => {
                if p.size() != graph.size() {
                    return Err(NetInfError::consistency(
                        self.name(),
                        format!("hierarchy covers {} vertices, graph has {}", p.size(), graph.size()),
                    ));
                }
                p.check_consistency()
            }
            Prior::NestedLabelGraph {
                prior,
                nested_block,
                ..
            } => prior.check_consistency(graph, parents.require_nested(*nested_block)?),
        }
    }
}

/// Read-only view of the nodes preceding a prior, which holds all of its parents.
#[derive(Clone, Copy)]
struct Parents<'a> {
    nodes: &'a [PriorNode],
}

impl<'a> Parents<'a> {
    fn get(&self, id: PriorId) -> Option<&'a Prior> {
        self.nodes.get(id.0).map(|node| &node.prior)
    }

    fn edge_count(&self, id: PriorId) -> usize {
        match self.get(id) {
            Some(Prior::EdgeCount(p)) => p.state(),
            _ => 0,
        }
    }

    fn block_count(&self, id: PriorId) -> usize {
        match self.get(id) {
            Some(Prior::BlockCount(p)) => p.state(),
            _ => 0,
        }
    }

    fn partition(&self, id: PriorId) -> &'a Partition {
        match self.get(id) {
            Some(Prior::Block { prior, .. }) => prior.partition(),
            _ => &EMPTY_PARTITION,
        }
    }

    fn nested(&self, id: PriorId) -> Option<&'a NestedBlockPrior> {
        match self.get(id) {
            Some(Prior::NestedBlock(p)) => Some(p),
            _ => None,
        }
    }

    fn require_nested(&self, id: PriorId) -> Result<&'a NestedBlockPrior, NetInfError> {
        self.nested(id).ok_or_else(|| {
            NetInfError::Safety(format!("prior {} is not a nested block prior", id.0))
        })
    }
}

fn own_log_likelihood(prior: &Prior, parents: Parents<'_>) -> f64 {
    prior.log_likelihood(parents)
}

#[derive(Debug, Clone)]
struct PriorNode {
    prior: Prior,
    is_root: bool,
    processed_epoch: Cell<u64>,
}

/// Arena of priors, ordered so that parents precede children.
#[derive(Debug, Clone)]
pub struct PriorDag {
    nodes: Vec<PriorNode>,
    epoch: Cell<u64>,
}

impl Default for PriorDag {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! typed_accessor {
    ($name:ident, $name_mut:ident, $ty:ty, $pattern:pat => $value:expr) => {
        pub fn $name(&self, id: PriorId) -> Result<&$ty, NetInfError> {
            match self.get(id)? {
                $pattern => Ok($value),
                other => Err(Self::wrong_kind(id, stringify!($ty), other)),
            }
        }

        pub fn $name_mut(&mut self, id: PriorId) -> Result<&mut $ty, NetInfError> {
            let node = self
                .nodes
                .get_mut(id.0)
                .ok_or_else(|| NetInfError::Safety(format!("prior {} does not exist", id.0)))?;
            match &mut node.prior {
                $pattern => Ok($value),
                other => Err(Self::wrong_kind(id, stringify!($ty), other)),
            }
        }
    };
}

impl PriorDag {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            epoch: Cell::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = PriorId> {
        (0..self.nodes.len()).map(PriorId)
    }

    pub fn get(&self, id: PriorId) -> Result<&Prior, NetInfError> {
        self.nodes
            .get(id.0)
            .map(|node| &node.prior)
            .ok_or_else(|| NetInfError::Safety(format!("prior {} does not exist", id.0)))
    }

    fn wrong_kind(id: PriorId, expected: &str, found: &Prior) -> NetInfError {
        NetInfError::Safety(format!(
            "prior {} is a {}, expected {expected}",
            id.0,
            found.name()
        ))
    }

    typed_accessor!(edge_count_prior, edge_count_prior_mut, EdgeCountPrior,
        Prior::EdgeCount(p) => p);
    typed_accessor!(block_count_prior, block_count_prior_mut, BlockCountPrior,
        Prior::BlockCount(p) => p);
    typed_accessor!(block_prior, block_prior_mut, BlockPrior,
        Prior::Block { prior, .. } => prior);
    typed_accessor!(label_graph_prior, label_graph_prior_mut, LabelGraphPrior,
        Prior::LabelGraph { prior, .. } => prior);
    typed_accessor!(degree_prior, degree_prior_mut, DegreePrior,
        Prior::Degree { prior, .. } => prior);
    typed_accessor!(nested_block_prior, nested_block_prior_mut, NestedBlockPrior,
        Prior::NestedBlock(p) => p);
    typed_accessor!(nested_label_graph_prior, nested_label_graph_prior_mut, NestedLabelGraphPrior,
        Prior::NestedLabelGraph { prior, .. } => prior);

    /// Block count prior that `block` conditions on.
    pub fn block_count_of(&self, block: PriorId) -> Result<PriorId, NetInfError> {
        match self.get(block)? {
            Prior::Block { block_count, .. } => Ok(*block_count),
            other => Err(Self::wrong_kind(block, "BlockPrior", other)),
        }
    }

    /// Appends a prior after checking that its parents exist and have the right kind.
    pub fn insert(&mut self, prior: Prior) -> Result<PriorId, NetInfError> {
        let id = PriorId(self.nodes.len());
        for (parent, expected) in prior.typed_parents() {
            let found = self.get(parent)?;
            if found.tag() != expected {
                return Err(NetInfError::Safety(format!(
                    "{} expects parent {} to be a {expected:?} prior, found {}",
                    prior.name(),
                    parent.0,
                    found.name()
                )));
            }
        }
        for parent in prior.parents() {
            self.nodes[parent.0].is_root = false;
        }
        self.nodes.push(PriorNode {
            prior,
            is_root: true,
            processed_epoch: Cell::new(0),
        });
        Ok(id)
    }

    pub fn add_edge_count(&mut self, kind: EdgeCountKind) -> Result<PriorId, NetInfError> {
        self.insert(Prior::EdgeCount(EdgeCountPrior::new(kind)?))
    }

    pub fn add_block_count(&mut self, kind: BlockCountKind) -> Result<PriorId, NetInfError> {
        self.insert(Prior::BlockCount(BlockCountPrior::new(kind)?))
    }

    pub fn add_block(
        &mut self,
        kind: BlockPriorKind,
        size: usize,
        block_count: PriorId,
    ) -> Result<PriorId, NetInfError> {
        let prior = BlockPrior::new(kind, size)?;
        self.insert(Prior::Block { prior, block_count })
    }

    pub fn add_label_graph(
        &mut self,
        kind: LabelGraphPriorKind,
        edge_count: PriorId,
        block: PriorId,
    ) -> Result<PriorId, NetInfError> {
        self.insert(Prior::LabelGraph {
            prior: LabelGraphPrior::new(kind),
            edge_count,
            block,
        })
    }

    pub fn add_degree(
        &mut self,
        kind: DegreePriorKind,
        size: usize,
        edge_count: PriorId,
    ) -> Result<PriorId, NetInfError> {
        let prior = DegreePrior::new(kind, size)?;
        self.insert(Prior::Degree { prior, edge_count })
    }

    pub fn add_nested_block(
        &mut self,
        kind: NestedBlockPriorKind,
        size: usize,
        block_counts: &[usize],
    ) -> Result<PriorId, NetInfError> {
        self.insert(Prior::NestedBlock(NestedBlockPrior::new(kind, size, block_counts)?))
    }

    pub fn add_nested_label_graph(
        &mut self,
        edge_count: PriorId,
        nested_block: PriorId,
    ) -> Result<PriorId, NetInfError> {
        self.insert(Prior::NestedLabelGraph {
            prior: NestedLabelGraphPrior::new(),
            edge_count,
            nested_block,
        })
    }

    pub fn is_root(&self, id: PriorId) -> bool {
        self.nodes.get(id.0).is_some_and(|node| node.is_root)
    }

    pub fn roots(&self) -> impl Iterator<Item = PriorId> + '_ {
        self.ids().filter(|&id| self.is_root(id))
    }

    /// True once the node has been counted in the ongoing computation.
    pub fn is_processed(&self, id: PriorId) -> bool {
        self.nodes
            .get(id.0)
            .is_some_and(|node| node.processed_epoch.get() == self.epoch.get())
    }

    /// Ends the ongoing computation; every node becomes countable again.
    pub fn computation_finished(&self) {
        self.epoch.set(self.epoch.get() + 1);
    }

    fn parents_of(&self, id: PriorId) -> Parents<'_> {
        Parents {
            nodes: &self.nodes[..id.0],
        }
    }

    /// Sums `own` over `id` and its ancestors, skipping nodes already counted.
    fn visit(&self, id: PriorId, own: &dyn Fn(&Prior, Parents<'_>) -> f64) -> f64 {
        let Some(node) = self.nodes.get(id.0) else {
            return 0.0;
        };
        if node.processed_epoch.get() == self.epoch.get() {
            return 0.0;
        }
        node.processed_epoch.set(self.epoch.get());
        let mut total = own(&node.prior, self.parents_of(id));
        for parent in node.prior.parents() {
            total += self.visit(parent, own);
        }
        total
    }

    fn sum_over_roots(&self, own: &dyn Fn(&Prior, Parents<'_>) -> f64) -> f64 {
        let total = self.roots().map(|id| self.visit(id, own)).sum();
        self.computation_finished();
        total
    }

    /// Own log-likelihood of a single prior.
    pub fn log_likelihood(&self, id: PriorId) -> Result<f64, NetInfError> {
        let prior = self.get(id)?;
        Ok(prior.log_likelihood(self.parents_of(id)))
    }

    /// Log-joint of the parents of `id`, each distinct ancestor counted once.
    pub fn log_prior(&self, id: PriorId) -> Result<f64, NetInfError> {
        let prior = self.get(id)?;
        let total = prior
            .parents()
            .into_iter()
            .map(|parent| self.visit(parent, &own_log_likelihood))
            .sum();
        self.computation_finished();
        Ok(total)
    }

    pub fn log_joint_of(&self, id: PriorId) -> Result<f64, NetInfError> {
        self.get(id)?;
        let total = self.visit(id, &own_log_likelihood);
        self.computation_finished();
        Ok(total)
    }

    /// Log-joint of the whole DAG.
    pub fn log_joint(&self) -> f64 {
        self.sum_over_roots(&own_log_likelihood)
    }

    pub fn log_joint_ratio_from_graph_move(&self, mv: &GraphMove) -> f64 {
        self.sum_over_roots(&|p: &Prior, parents: Parents<'_>| {
            p.log_likelihood_ratio_from_graph_move(parents, mv)
        })
    }

    pub fn log_joint_ratio_from_label_move(&self, graph: &MultiGraph, mv: &LabelMove) -> f64 {
        self.sum_over_roots(&|p: &Prior, parents: Parents<'_>| {
            p.log_likelihood_ratio_from_label_move(parents, graph, mv)
        })
    }

    fn split(&mut self, index: usize) -> (&mut Prior, Parents<'_>) {
        let (before, rest) = self.nodes.split_at_mut(index);
        (&mut rest[0].prior, Parents { nodes: before })
    }

    /// Draws a new state for every prior, parents first.
    pub fn sample<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), NetInfError> {
        for index in 0..self.nodes.len() {
            let (prior, parents) = self.split(index);
            prior.sample_state(rng, parents)?;
        }
        Ok(())
    }

    /// Draws a new state for `id` given the current state of its parents.
    pub fn sample_state<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        id: PriorId,
    ) -> Result<(), NetInfError> {
        self.get(id)?;
        let (prior, parents) = self.split(id.0);
        prior.sample_state(rng, parents)
    }

    /// Draws new states for every ancestor of `id`, leaving `id` itself untouched.
    pub fn sample_priors<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        id: PriorId,
    ) -> Result<(), NetInfError> {
        let mut ancestors = BTreeSet::new();
        let mut pending: Vec<PriorId> = self.get(id)?.parents().into_vec();
        while let Some(next) = pending.pop() {
            if ancestors.insert(next) {
                pending.extend(self.get(next)?.parents());
            }
        }
        for ancestor in ancestors {
            self.sample_state(rng, ancestor)?;
        }
        Ok(())
    }

    /// Updates every prior for a graph move; the edge count comes first, dependents follow.
    pub fn apply_graph_move(&mut self, mv: &GraphMove) -> Result<(), NetInfError> {
        for index in 0..self.nodes.len() {
            let (prior, parents) = self.split(index);
            prior.apply_graph_move(parents, mv)?;
        }
        Ok(())
    }

    /// Updates every prior for a label move, children before the partitions they read.
    pub fn apply_label_move(&mut self, graph: &MultiGraph, mv: &LabelMove) -> Result<(), NetInfError> {
        for index in (0..self.nodes.len()).rev() {
            let (prior, parents) = self.split(index);
            prior.apply_label_move(parents, graph, mv)?;
        }
        Ok(())
    }

    /// Rebuilds every graph-derived state from `graph`, keeping labels as they are.
    pub fn recompute_from_graph(&mut self, graph: &MultiGraph) -> Result<(), NetInfError> {
        for index in 0..self.nodes.len() {
            let (prior, parents) = self.split(index);
            prior.recompute_from_graph(parents, graph)?;
        }
        Ok(())
    }

    pub fn check_consistency(&self, graph: &MultiGraph) -> Result<(), NetInfError> {
        for (index, node) in self.nodes.iter().enumerate() {
            node.prior
                .check_consistency(self.parents_of(PriorId(index)), graph)?;
        }
        Ok(())
    }

    /// Checks that every parent exists, precedes its child and has the expected kind.
    pub fn check_safety(&self) -> Result<(), NetInfError> {
        for (index, node) in self.nodes.iter().enumerate() {
            for (parent, expected) in node.prior.typed_parents() {
                if parent.0 >= index {
                    return Err(NetInfError::Safety(format!(
                        "{} at {index} refers to parent {} which does not precede it",
                        node.prior.name(),
                        parent.0
                    )));
                }
                if self.nodes[parent.0].prior.tag() != expected {
                    return Err(NetInfError::Safety(format!(
                        "{} at {index} expects parent {} to be a {expected:?} prior",
                        node.prior.name(),
                        parent.0
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Edge count shared by a degree prior and a label-graph prior, two roots in total.
    fn diamond() -> (PriorDag, [PriorId; 5]) {
        let mut dag = PriorDag::new();
        let e = dag.add_edge_count(EdgeCountKind::Poisson { mean: 6.0 }).expect("edge count");
        let b = dag
            .add_block_count(BlockCountKind::Uniform { min: 1, max: 3 })
            .expect("block count");
        let block = dag.add_block(BlockPriorKind::UniformHyper, 5, b).expect("block");
        let lg = dag
            .add_label_graph(LabelGraphPriorKind::ErdosRenyi, e, block)
            .expect("label graph");
        let d = dag.add_degree(DegreePriorKind::UniformHyper, 5, e).expect("degree");
        (dag, [e, b, block, lg, d])
    }

    fn graph() -> MultiGraph {
        MultiGraph::from_edges(5, [(0, 1, 2), (0, 3, 1), (0, 4, 1), (2, 3, 1)]).expect("valid edges")
    }

    fn prepared() -> (PriorDag, [PriorId; 5]) {
        let (mut dag, ids) = diamond();
        let [_, b, block, _, _] = ids;
        dag.block_count_prior_mut(b).expect("block count").set_state(2);
        dag.block_prior_mut(block)
            .expect("block")
            .set_partition(Partition::new(vec![0, 0, 1, 1, 0], 2).expect("partition"))
            .expect("set");
        dag.recompute_from_graph(&graph()).expect("recompute");
        (dag, ids)
    }

    #[test]
    fn shared_edge_count_is_counted_once() {
        let (dag, ids) = prepared();
        let roots: Vec<_> = dag.roots().collect();
        assert_eq!(roots, vec![ids[3], ids[4]]);
        let by_hand: f64 = ids
            .iter()
            .map(|&id| dag.log_likelihood(id).expect("own term"))
            .sum();
        assert!((dag.log_joint() - by_hand).abs() < 1e-12);
        // a second query starts from a fresh epoch
        assert!((dag.log_joint() - by_hand).abs() < 1e-12);
        assert!(!dag.is_processed(ids[0]));
    }

    #[test]
    fn log_prior_of_label_graph_covers_its_ancestors() {
        let (dag, [e, b, block, lg, _]) = prepared();
        let expected: f64 = [e, b, block]
            .iter()
            .map(|&id| dag.log_likelihood(id).expect("own term"))
            .sum();
        assert!((dag.log_prior(lg).expect("prior") - expected).abs() < 1e-12);
        let joint = dag.log_joint_of(lg).expect("joint");
        assert!((joint - expected - dag.log_likelihood(lg).expect("own")).abs() < 1e-12);
    }

    #[test]
    fn graph_move_ratio_matches_recomputation() {
        let (dag, _) = prepared();
        for mv in [
            GraphMove::addition(1, 2),
            GraphMove::removal(0, 1),
            GraphMove::new([(0, 3)], [(3, 4)]),
        ] {
            let mut moved = dag.clone();
            let ratio = dag.log_joint_ratio_from_graph_move(&mv);
            moved.apply_graph_move(&mv).expect("apply");
            let mut g = graph();
            for &(u, v) in &mv.removed {
                g.remove_edge(u, v).expect("remove");
            }
            for &(u, v) in &mv.added {
                g.add_edge(u, v).expect("add");
            }
            moved.check_consistency(&g).expect("consistent");
            assert!((moved.log_joint() - dag.log_joint() - ratio).abs() < 1e-9, "{mv:?}");
        }
    }

    #[test]
    fn label_move_ratio_matches_recomputation() {
        let (dag, [_, _, block, _, _]) = prepared();
        let g = graph();
        let partition = dag.block_prior(block).expect("block").partition().clone();
        for (v, next) in [(4, 1), (0, 2), (2, 0)] {
            let mv = partition.label_move(v, next, 0).expect("valid move");
            let ratio = dag.log_joint_ratio_from_label_move(&g, &mv);
            let mut moved = dag.clone();
            moved.apply_label_move(&g, &mv).expect("apply");
            moved.check_consistency(&g).expect("consistent");
            assert!((moved.log_joint() - dag.log_joint() - ratio).abs() < 1e-9, "{mv:?}");
        }
    }

    #[test]
    fn wrong_parent_kind_is_a_safety_error() {
        let mut dag = PriorDag::new();
        let e = dag.add_edge_count(EdgeCountKind::Delta(3)).expect("edge count");
        let err = dag.add_block(BlockPriorKind::Uniform, 4, e).expect_err("wrong parent");
        assert!(matches!(err, NetInfError::Safety(_)));
        assert!(dag.block_prior(e).is_err());
        dag.check_safety().expect("still safe");
    }

    #[test]
    fn sampling_respects_parent_states() {
        let (mut dag, [e, b, block, lg, d]) = diamond();
        let mut rng = StdRng::seed_from_u64(23);
        dag.sample(&mut rng).expect("sample");
        let edges = dag.edge_count_prior(e).expect("edge count").state();
        let blocks = dag.block_count_prior(b).expect("block count").state();
        assert_eq!(dag.block_prior(block).expect("block").partition().block_count(), blocks);
        assert_eq!(dag.label_graph_prior(lg).expect("lg").state().edge_count(), edges);
        let degrees = dag.degree_prior(d).expect("degree").degrees().iter().sum::<usize>();
        assert_eq!(degrees, 2 * edges);
    }
}
