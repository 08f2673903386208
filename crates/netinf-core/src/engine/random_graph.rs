//! The latent graph model: a graph state, its prior DAG, its likelihood and the proposers
//! that explore it.
//!
//! A [`RandomGraph`] starts [`ModelStatus::Uninitialized`]; [`RandomGraph::sample`],
//! [`RandomGraph::set_state`] and [`RandomGraph::set_up`] rebuild the proposers and make it
//! [`ModelStatus::Ready`]. Moves are only proposed, scored and applied on a ready model.

use rand::Rng;

use crate::engine::errors::NetInfError;
use crate::engine::graph::MultiGraph;
use crate::engine::likelihood::{BlockEnsemble, GraphLikelihood};
use crate::engine::metropolis::{accept, choose_channel, Channel, LogRatios, SweepConfig};
use crate::engine::moves::{BlockIndex, GraphMove, LabelMove, MoveKind, StepResult};
use crate::engine::prior::block::{BlockPriorKind, Partition};
use crate::engine::prior::block_count::BlockCountKind;
use crate::engine::prior::degree::DegreePriorKind;
use crate::engine::prior::edge_count::EdgeCountKind;
use crate::engine::prior::label_graph::{LabelGraph, LabelGraphPriorKind};
use crate::engine::prior::nested::NestedBlockPriorKind;
use crate::engine::prior::{PriorDag, PriorId};
use crate::engine::proposer::{EdgeProposer, EdgeProposerConfig, LabelProposer, LabelProposerConfig};

/// Attempts [`RandomGraph::sample`] makes before giving up on recoverable failures.
pub const MAX_SAMPLE_ATTEMPTS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStatus {
    Uninitialized,
    Ready,
}

/// Prior choices of a flat stochastic block model.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockModelSpec {
    pub edge_count: EdgeCountKind,
    pub block_count: BlockCountKind,
    pub block: BlockPriorKind,
    pub label_graph: LabelGraphPriorKind,
    pub ensemble: BlockEnsemble,
}

/// Prior choices of a nested stochastic block model; `block_counts[l]` blocks at level `l`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NestedBlockModelSpec {
    pub edge_count: EdgeCountKind,
    pub block_counts: Vec<usize>,
    pub block: NestedBlockPriorKind,
    pub ensemble: BlockEnsemble,
}

#[derive(Debug, Clone, Copy)]
enum LabelRole {
    Flat(PriorId),
    Nested(PriorId),
}

/// A random graph model over a fixed number of vertices.
#[derive(Debug, Clone)]
pub struct RandomGraph {
    size: usize,
    graph: MultiGraph,
    priors: PriorDag,
    likelihood: GraphLikelihood,
    edge_config: EdgeProposerConfig,
    label_config: LabelProposerConfig,
    edge_proposer: Option<EdgeProposer>,
    label_proposer: Option<LabelProposer>,
}

impl RandomGraph {
    /// Assembles a model from an already built prior DAG.
    ///
    /// The graph starts empty; call [`RandomGraph::sample`] or [`RandomGraph::set_state`]
    /// before proposing moves.
    pub fn new(
        size: usize,
        priors: PriorDag,
        likelihood: GraphLikelihood,
        edge_config: EdgeProposerConfig,
        label_config: LabelProposerConfig,
    ) -> Result<Self, NetInfError> {
        priors.check_safety()?;
        likelihood.check_safety(&priors)?;
        let model = Self {
            size,
            graph: MultiGraph::new(size),
            priors,
            likelihood,
            edge_config: edge_config.validate()?,
            label_config: label_config.validate()?,
            edge_proposer: None,
            label_proposer: None,
        };
        if let Some(labels) = model.labels() {
            if labels.len() != size {
                return Err(NetInfError::SizeMismatch {
                    expected: size,
                    actual: labels.len(),
                });
            }
        }
        Ok(model)
    }

    /// Erdős–Rényi multigraph; the self-loop and multiedge policy follows `edge_config`.
    pub fn erdos_renyi(
        size: usize,
        edge_count: EdgeCountKind,
        edge_config: EdgeProposerConfig,
    ) -> Result<Self, NetInfError> {
        let mut priors = PriorDag::new();
        let edge_count = priors.add_edge_count(edge_count)?;
        let likelihood = GraphLikelihood::ErdosRenyi {
            edge_count,
            self_loops: edge_config.allow_self_loops,
            multiedges: edge_config.allow_multiedges,
        };
        Self::new(size, priors, likelihood, edge_config, LabelProposerConfig::default())
    }

    pub fn configuration(
        size: usize,
        edge_count: EdgeCountKind,
        degree: DegreePriorKind,
        edge_config: EdgeProposerConfig,
    ) -> Result<Self, NetInfError> {
        let mut priors = PriorDag::new();
        let edge_count = priors.add_edge_count(edge_count)?;
        let degree = priors.add_degree(degree, size, edge_count)?;
        let likelihood = GraphLikelihood::Configuration { edge_count, degree };
        Self::new(size, priors, likelihood, edge_config, LabelProposerConfig::default())
    }

    pub fn stochastic_block_model(
        size: usize,
        spec: BlockModelSpec,
        edge_config: EdgeProposerConfig,
        label_config: LabelProposerConfig,
    ) -> Result<Self, NetInfError> {
        let mut priors = PriorDag::new();
        let edge_count = priors.add_edge_count(spec.edge_count)?;
        let block_count = priors.add_block_count(spec.block_count)?;
        let block = priors.add_block(spec.block, size, block_count)?;
        let label_graph = priors.add_label_graph(spec.label_graph, edge_count, block)?;
        let likelihood = GraphLikelihood::StochasticBlockModel {
            ensemble: spec.ensemble,
            block,
            label_graph,
        };
        Self::new(size, priors, likelihood, edge_config, label_config)
    }

    pub fn nested_stochastic_block_model(
        size: usize,
        spec: NestedBlockModelSpec,
        edge_config: EdgeProposerConfig,
        label_config: LabelProposerConfig,
    ) -> Result<Self, NetInfError> {
        let mut priors = PriorDag::new();
        let edge_count = priors.add_edge_count(spec.edge_count)?;
        let nested_block = priors.add_nested_block(spec.block, size, &spec.block_counts)?;
        let label_graph = priors.add_nested_label_graph(edge_count, nested_block)?;
        let likelihood = GraphLikelihood::NestedStochasticBlockModel {
            ensemble: spec.ensemble,
            nested_block,
            label_graph,
        };
        Self::new(size, priors, likelihood, edge_config, label_config)
    }

    pub fn status(&self) -> ModelStatus {
        if self.edge_proposer.is_some() {
            ModelStatus::Ready
        } else {
            ModelStatus::Uninitialized
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn graph(&self) -> &MultiGraph {
        &self.graph
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn priors(&self) -> &PriorDag {
        &self.priors
    }

    pub fn likelihood(&self) -> &GraphLikelihood {
        &self.likelihood
    }

    pub fn edge_proposer(&self) -> Option<&EdgeProposer> {
        self.edge_proposer.as_ref()
    }

    pub fn is_labeled(&self) -> bool {
        self.likelihood.is_labeled()
    }

    pub fn is_nested(&self) -> bool {
        matches!(self.label_role(), Some(LabelRole::Nested(_)))
    }

    fn label_role(&self) -> Option<LabelRole> {
        match &self.likelihood {
            GraphLikelihood::StochasticBlockModel { block, .. } => Some(LabelRole::Flat(*block)),
            GraphLikelihood::NestedStochasticBlockModel { nested_block, .. } => {
                Some(LabelRole::Nested(*nested_block))
            }
            _ => None,
        }
    }

    fn require_label_role(&self) -> Result<LabelRole, NetInfError> {
        self.label_role().ok_or_else(|| {
            NetInfError::UnsupportedMove(format!(
                "{} carries no vertex labels",
                self.likelihood.name()
            ))
        })
    }

    /// Vertex labels at the bottom level, for labeled models.
    pub fn labels(&self) -> Option<&[BlockIndex]> {
        self.nested_labels(0)
    }

    /// Labels of the elements of `level`; flat models only have level 0.
    pub fn nested_labels(&self, level: usize) -> Option<&[BlockIndex]> {
        match self.label_role()? {
            LabelRole::Flat(block) if level == 0 => {
                Some(self.priors.block_prior(block).ok()?.partition().labels())
            }
            LabelRole::Flat(_) => None,
            LabelRole::Nested(nested) => {
                let blocks = self.priors.nested_block_prior(nested).ok()?;
                (level < blocks.depth()).then(|| blocks.level(level).labels())
            }
        }
    }

    pub fn block_count(&self) -> Option<usize> {
        match self.label_role()? {
            LabelRole::Flat(block) => {
                Some(self.priors.block_prior(block).ok()?.partition().block_count())
            }
            LabelRole::Nested(nested) => {
                Some(self.priors.nested_block_prior(nested).ok()?.level(0).block_count())
            }
        }
    }

    /// Edge counts between bottom-level blocks.
    pub fn label_graph(&self) -> Option<&LabelGraph> {
        match &self.likelihood {
            GraphLikelihood::StochasticBlockModel { label_graph, .. } => {
                Some(self.priors.label_graph_prior(*label_graph).ok()?.state())
            }
            GraphLikelihood::NestedStochasticBlockModel { label_graph, .. } => self
                .priors
                .nested_label_graph_prior(*label_graph)
                .ok()?
                .level(0),
            _ => None,
        }
    }

    /// Rebuilds the proposers against the current state.
    pub fn set_up(&mut self) -> Result<(), NetInfError> {
        let mut edge_proposer = EdgeProposer::new(self.edge_config.clone(), self.size)?;
        edge_proposer.set_up_with_graph(&self.graph)?;
        self.edge_proposer = Some(edge_proposer);
        self.label_proposer = if self.is_labeled() {
            Some(LabelProposer::new(self.label_config.clone())?)
        } else {
            None
        };
        Ok(())
    }

    fn try_sample<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), NetInfError> {
        self.priors.sample(rng)?;
        self.graph = self.likelihood.sample(rng, &self.priors, self.size)?;
        self.priors.recompute_from_graph(&self.graph)
    }

    /// Samples the prior DAG, then a graph given the prior states.
    ///
    /// Recoverable failures such as an infeasible degree sequence trigger a fresh draw of the
    /// whole hierarchy, up to [`MAX_SAMPLE_ATTEMPTS`] times.
    pub fn sample<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), NetInfError> {
        let mut last_failure = String::new();
        for attempt in 0..MAX_SAMPLE_ATTEMPTS {
            match self.try_sample(rng) {
                Ok(()) => return self.set_up(),
                Err(err) if err.is_recoverable() => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        model = self.likelihood.name(),
                        attempt,
                        error = %err,
                        "graph sampling failed, retrying"
                    );
                    #[cfg(not(feature = "tracing"))]
                    let _ = attempt;
                    last_failure = err.to_string();
                }
                Err(err) => return Err(err),
            }
        }
        Err(NetInfError::RetryExhausted {
            operation: "graph sampling",
            attempts: MAX_SAMPLE_ATTEMPTS,
            last_failure,
        })
    }

    /// Replaces the graph and recomputes every graph-derived prior state.
    pub fn set_state(&mut self, graph: MultiGraph) -> Result<(), NetInfError> {
        if graph.size() != self.size {
            return Err(NetInfError::SizeMismatch {
                expected: self.size,
                actual: graph.size(),
            });
        }
        self.graph = graph;
        self.priors.recompute_from_graph(&self.graph)?;
        self.set_up()
    }

    /// Replaces the vertex labels of a flat block model; the block count follows the largest
    /// label, and every label below it must be used.
    pub fn set_labels(&mut self, labels: Vec<BlockIndex>) -> Result<(), NetInfError> {
        let LabelRole::Flat(block) = self.require_label_role()? else {
            return Err(NetInfError::UnsupportedMove(
                "nested models take one label vector per level".into(),
            ));
        };
        if labels.len() != self.size {
            return Err(NetInfError::SizeMismatch {
                expected: self.size,
                actual: labels.len(),
            });
        }
        let block_count = labels.iter().max().map_or(1, |&r| r + 1);
        let partition = Partition::new(labels, block_count)?;
        if let Some(empty) = partition.sizes().iter().position(|&n| n == 0) {
            return Err(NetInfError::InvalidArgument(format!(
                "labels skip block {empty} of {block_count}"
            )));
        }
        let block_count_id = self.priors.block_count_of(block)?;
        self.priors
            .block_count_prior_mut(block_count_id)?
            .set_state(block_count);
        self.priors.block_prior_mut(block)?.set_partition(partition)?;
        self.priors.recompute_from_graph(&self.graph)?;
        self.set_up()
    }

    /// Replaces every level of a nested hierarchy; block counts per level are kept.
    ///
    /// Empty blocks are only accepted when the nested prior gives them positive probability.
    pub fn set_nested_labels(&mut self, levels: Vec<Vec<BlockIndex>>) -> Result<(), NetInfError> {
        let LabelRole::Nested(nested) = self.require_label_role()? else {
            return Err(NetInfError::UnsupportedMove(
                "flat models take a single label vector".into(),
            ));
        };
        let counts = self.priors.nested_block_prior(nested)?.block_counts();
        if levels.len() != counts.len() {
            return Err(NetInfError::SizeMismatch {
                expected: counts.len(),
                actual: levels.len(),
            });
        }
        let partitions = levels
            .into_iter()
            .zip(counts)
            .map(|(labels, count)| Partition::new(labels, count))
            .collect::<Result<Vec<_>, _>>()?;
        let kind = self.priors.nested_block_prior(nested)?.kind();
        if kind == NestedBlockPriorKind::UniformHyper {
            if let Some(level) = partitions.iter().position(Partition::has_empty_block) {
                return Err(NetInfError::InvalidArgument(format!(
                    "level {level} has an empty block, which {kind:?} nested priors exclude"
                )));
            }
        }
        self.priors
            .nested_block_prior_mut(nested)?
            .set_levels(partitions)?;
        self.priors.recompute_from_graph(&self.graph)?;
        self.set_up()
    }

    fn ready_edge_proposer(&self) -> Result<&EdgeProposer, NetInfError> {
        self.edge_proposer.as_ref().ok_or_else(|| {
            NetInfError::Safety("random graph is not set up; sample or set a state first".into())
        })
    }

    fn ready_label_proposer(&self) -> Result<&LabelProposer, NetInfError> {
        self.require_label_role()?;
        self.label_proposer.as_ref().ok_or_else(|| {
            NetInfError::Safety("random graph is not set up; sample or set a state first".into())
        })
    }

    pub fn propose_graph_move<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<GraphMove, NetInfError> {
        self.ready_edge_proposer()?.propose_move(rng)
    }

    pub fn is_trivial_graph_move(&self, mv: &GraphMove) -> Result<bool, NetInfError> {
        Ok(self.ready_edge_proposer()?.is_trivial_move(mv))
    }

    pub fn propose_label_move<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<LabelMove, NetInfError> {
        let proposer = self.ready_label_proposer()?;
        match self.require_label_role()? {
            LabelRole::Flat(block) => {
                proposer.propose_move(rng, self.priors.block_prior(block)?.partition())
            }
            LabelRole::Nested(nested) => {
                proposer.propose_nested_move(rng, self.priors.nested_block_prior(nested)?)
            }
        }
    }

    pub fn log_likelihood(&self) -> Result<f64, NetInfError> {
        self.likelihood.log_likelihood(&self.graph, &self.priors)
    }

    pub fn log_prior(&self) -> f64 {
        self.priors.log_joint()
    }

    pub fn log_joint(&self) -> Result<f64, NetInfError> {
        Ok(self.log_likelihood()? + self.log_prior())
    }

    pub fn log_likelihood_ratio_from_graph_move(&self, mv: &GraphMove) -> Result<f64, NetInfError> {
        self.likelihood
            .log_likelihood_ratio_from_graph_move(&self.graph, &self.priors, mv)
    }

    pub fn log_prior_ratio_from_graph_move(&self, mv: &GraphMove) -> f64 {
        self.priors.log_joint_ratio_from_graph_move(mv)
    }

    pub fn log_joint_ratio_from_graph_move(&self, mv: &GraphMove) -> Result<f64, NetInfError> {
        Ok(self.log_likelihood_ratio_from_graph_move(mv)? + self.log_prior_ratio_from_graph_move(mv))
    }

    pub fn log_proposal_ratio_from_graph_move(&self, mv: &GraphMove) -> Result<f64, NetInfError> {
        Ok(self.ready_edge_proposer()?.log_proposal_ratio(mv))
    }

    pub fn log_likelihood_ratio_from_label_move(&self, mv: &LabelMove) -> Result<f64, NetInfError> {
        self.likelihood
            .log_likelihood_ratio_from_label_move(&self.graph, &self.priors, mv)
    }

    pub fn log_prior_ratio_from_label_move(&self, mv: &LabelMove) -> Result<f64, NetInfError> {
        self.require_label_role()?;
        Ok(self.priors.log_joint_ratio_from_label_move(&self.graph, mv))
    }

    pub fn log_joint_ratio_from_label_move(&self, mv: &LabelMove) -> Result<f64, NetInfError> {
        Ok(self.log_likelihood_ratio_from_label_move(mv)? + self.log_prior_ratio_from_label_move(mv)?)
    }

    /// Nested moves draw their target uniformly and are symmetric.
    pub fn log_proposal_ratio_from_label_move(&self, mv: &LabelMove) -> Result<f64, NetInfError> {
        let proposer = self.ready_label_proposer()?;
        match self.require_label_role()? {
            LabelRole::Flat(block) => {
                Ok(proposer.log_proposal_ratio(mv, self.priors.block_prior(block)?.partition()))
            }
            LabelRole::Nested(_) => Ok(0.0),
        }
    }

    /// Applies `mv` to the graph, then to the priors, then to the proposer samplers.
    ///
    /// A move that cannot be applied to the graph is rejected before anything changes.
    pub fn apply_graph_move(&mut self, mv: &GraphMove) -> Result<(), NetInfError> {
        self.ready_edge_proposer()?;
        self.graph.check_graph_move(mv)?;
        for &(u, v) in &mv.removed {
            self.graph.remove_edge(u, v)?;
        }
        for &(u, v) in &mv.added {
            self.graph.add_edge(u, v)?;
        }
        self.priors.apply_graph_move(mv)?;
        if let Some(proposer) = self.edge_proposer.as_mut() {
            proposer.apply_graph_move(mv)?;
        }
        #[cfg(debug_assertions)]
        self.check_consistency()?;
        Ok(())
    }

    pub fn apply_label_move(&mut self, mv: &LabelMove) -> Result<(), NetInfError> {
        self.ready_label_proposer()?;
        self.priors.apply_label_move(&self.graph, mv)?;
        #[cfg(debug_assertions)]
        self.check_consistency()?;
        Ok(())
    }

    /// One Metropolis-Hastings step over the graph.
    pub fn metropolis_graph_step<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        beta_prior: f64,
        beta_likelihood: f64,
    ) -> Result<StepResult, NetInfError> {
        let mv = self.propose_graph_move(rng)?;
        let kind = mv.kind();
        if self.is_trivial_graph_move(&mv)? {
            return Ok(StepResult::new(kind, 0.0, true));
        }
        let ratios = LogRatios {
            likelihood: self.log_likelihood_ratio_from_graph_move(&mv)?,
            prior: self.log_prior_ratio_from_graph_move(&mv),
            proposal: self.log_proposal_ratio_from_graph_move(&mv)?,
        };
        let accepted = accept(rng, ratios.log_acceptance(beta_likelihood, beta_prior));
        if accepted {
            self.apply_graph_move(&mv)?;
        }
        Ok(StepResult::new(kind, ratios.log_joint(), accepted))
    }

    /// One Metropolis-Hastings step over the prior states the graph does not determine.
    ///
    /// For labeled models this is a label move; other models have no free prior state and the
    /// step is accepted as a no-op.
    pub fn metropolis_prior_step<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        beta_prior: f64,
        beta_likelihood: f64,
    ) -> Result<StepResult, NetInfError> {
        if !self.is_labeled() {
            return Ok(StepResult::new(MoveKind::Prior, 0.0, true));
        }
        let mv = self.propose_label_move(rng)?;
        if mv.is_trivial() {
            return Ok(StepResult::new(MoveKind::LabelMove, 0.0, true));
        }
        let ratios = LogRatios {
            likelihood: self.log_likelihood_ratio_from_label_move(&mv)?,
            prior: self.log_prior_ratio_from_label_move(&mv)?,
            proposal: self.log_proposal_ratio_from_label_move(&mv)?,
        };
        let accepted = accept(rng, ratios.log_acceptance(beta_likelihood, beta_prior));
        if accepted {
            self.apply_label_move(&mv)?;
        }
        Ok(StepResult::new(MoveKind::LabelMove, ratios.log_joint(), accepted))
    }

    /// Draws a channel among graph and prior moves, then runs its step.
    pub fn step<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        config: &SweepConfig,
    ) -> Result<StepResult, NetInfError> {
        match choose_channel(rng, config, &[Channel::Graph, Channel::Prior])? {
            Channel::Prior => self.metropolis_prior_step(rng, config.beta_prior, config.beta_likelihood),
            _ => self.metropolis_graph_step(rng, config.beta_prior, config.beta_likelihood),
        }
    }

    /// Fails when the model is not set up or its collaborators are missing.
    pub fn check_safety(&self) -> Result<(), NetInfError> {
        self.ready_edge_proposer()?;
        if self.is_labeled() && self.label_proposer.is_none() {
            return Err(NetInfError::Safety("label proposer is missing".into()));
        }
        self.priors.check_safety()?;
        self.likelihood.check_safety(&self.priors)
    }

    /// Re-derives every cached view from the graph and compares.
    pub fn check_consistency(&self) -> Result<(), NetInfError> {
        if self.graph.size() != self.size {
            return Err(NetInfError::consistency(
                "RandomGraph",
                format!("graph has {} vertices, model has {}", self.graph.size(), self.size),
            ));
        }
        if let Some(labels) = self.labels() {
            if labels.len() != self.size {
                return Err(NetInfError::consistency(
                    "RandomGraph",
                    format!("{} labels for {} vertices", labels.len(), self.size),
                ));
            }
        }
        self.priors.check_consistency(&self.graph)?;
        if let Some(proposer) = &self.edge_proposer {
            proposer.check_consistency(&self.graph)?;
        }
        Ok(())
    }
}
