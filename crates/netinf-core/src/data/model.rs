//! Composition of a latent [`RandomGraph`] with an observation of it.

use rand::Rng;

use crate::engine::errors::NetInfError;
use crate::engine::graph::MultiGraph;
use crate::engine::metropolis::{accept, choose_channel, Channel, LogRatios, SweepConfig};
use crate::engine::moves::{GraphMove, MoveKind, ParamMove, StepResult};
use crate::engine::proposer::GaussianParamProposer;
use crate::engine::random_graph::RandomGraph;

/// Data observed on top of a latent graph.
///
/// Graph-derived caches are kept in sync through [`Observation::apply_graph_move`], which
/// receives the graph as it was *before* the move. Ratios must only touch the vertices and
/// pairs the move involves.
pub trait Observation {
    fn name(&self) -> &'static str;

    /// Number of vertices the observation covers.
    fn size(&self) -> usize;

    /// Rebuilds every graph-derived cache from scratch.
    fn set_graph(&mut self, graph: &MultiGraph) -> Result<(), NetInfError>;

    fn log_likelihood(&self, graph: &MultiGraph) -> f64;

    fn log_likelihood_ratio_from_graph_move(
        &self,
        graph: &MultiGraph,
        mv: &GraphMove,
    ) -> Result<f64, NetInfError>;

    fn apply_graph_move(&mut self, graph: &MultiGraph, mv: &GraphMove) -> Result<(), NetInfError>;

    /// Draws a new observation given `graph`.
    fn sample_state<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        graph: &MultiGraph,
    ) -> Result<(), NetInfError>;

    fn param_keys(&self) -> &'static [&'static str] {
        &[]
    }

    fn param(&self, _key: &str) -> Option<f64> {
        None
    }

    fn is_valid_param_move(&self, _mv: &ParamMove) -> bool {
        false
    }

    /// Overwrites a parameter without range checks.
    fn set_param(&mut self, key: &str, _value: f64) -> Result<(), NetInfError> {
        Err(NetInfError::UnsupportedMove(format!(
            "{} has no parameter {key}",
            self.name()
        )))
    }

    fn apply_param_move(&mut self, mv: &ParamMove) -> Result<(), NetInfError> {
        let current = self.param(&mv.key).ok_or_else(|| {
            NetInfError::UnsupportedMove(format!("{} has no parameter {}", self.name(), mv.key))
        })?;
        self.set_param(&mv.key, current + mv.value)
    }

    fn check_consistency(&self, graph: &MultiGraph) -> Result<(), NetInfError>;

    fn check_safety(&self) -> Result<(), NetInfError> {
        Ok(())
    }
}

/// A random graph prior joined with an observation model.
#[derive(Debug, Clone)]
pub struct DataModel<O> {
    graph_prior: RandomGraph,
    observation: O,
    param_proposers: Vec<GaussianParamProposer>,
}

impl<O: Observation> DataModel<O> {
    pub fn new(graph_prior: RandomGraph, mut observation: O) -> Result<Self, NetInfError> {
        if observation.size() != graph_prior.size() {
            return Err(NetInfError::SizeMismatch {
                expected: graph_prior.size(),
                actual: observation.size(),
            });
        }
        observation.set_graph(graph_prior.graph())?;
        Ok(Self {
            graph_prior,
            observation,
            param_proposers: Vec::new(),
        })
    }

    /// Registers a proposer for one of the observation's parameters.
    pub fn with_param_proposer(mut self, proposer: GaussianParamProposer) -> Result<Self, NetInfError> {
        if !self.observation.param_keys().contains(&proposer.key()) {
            return Err(NetInfError::InvalidArgument(format!(
                "{} has no parameter {}",
                self.observation.name(),
                proposer.key()
            )));
        }
        self.param_proposers.push(proposer);
        Ok(self)
    }

    pub fn graph_prior(&self) -> &RandomGraph {
        &self.graph_prior
    }

    pub fn graph(&self) -> &MultiGraph {
        self.graph_prior.graph()
    }

    pub fn observation(&self) -> &O {
        &self.observation
    }

    pub fn size(&self) -> usize {
        self.graph_prior.size()
    }

    /// Runs `f` on the observation, then resynchronizes its graph-derived caches.
    pub fn update_observation<T>(
        &mut self,
        f: impl FnOnce(&mut O, &MultiGraph) -> Result<T, NetInfError>,
    ) -> Result<T, NetInfError> {
        let graph = self.graph_prior.graph();
        let value = f(&mut self.observation, graph)?;
        self.observation.set_graph(graph)?;
        Ok(value)
    }

    pub fn set_graph(&mut self, graph: MultiGraph) -> Result<(), NetInfError> {
        self.graph_prior.set_state(graph)?;
        self.observation.set_graph(self.graph_prior.graph())
    }

    /// Samples the graph prior and then an observation of the sampled graph.
    pub fn sample<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), NetInfError> {
        self.graph_prior.sample(rng)?;
        self.observation.sample_state(rng, self.graph_prior.graph())
    }

    /// Resamples the graph only, keeping the observation.
    pub fn sample_prior<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), NetInfError> {
        self.graph_prior.sample(rng)?;
        self.observation.set_graph(self.graph_prior.graph())
    }

    /// Resamples the observation given the current graph.
    pub fn sample_state<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), NetInfError> {
        self.observation.sample_state(rng, self.graph_prior.graph())
    }

    pub fn log_likelihood(&self) -> f64 {
        self.observation.log_likelihood(self.graph_prior.graph())
    }

    pub fn log_prior(&self) -> Result<f64, NetInfError> {
        self.graph_prior.log_joint()
    }

    pub fn log_joint(&self) -> Result<f64, NetInfError> {
        Ok(self.log_prior()? + self.log_likelihood())
    }

    pub fn log_likelihood_ratio_from_graph_move(&self, mv: &GraphMove) -> Result<f64, NetInfError> {
        self.observation
            .log_likelihood_ratio_from_graph_move(self.graph_prior.graph(), mv)
    }

    pub fn log_prior_ratio_from_graph_move(&self, mv: &GraphMove) -> Result<f64, NetInfError> {
        self.graph_prior.log_joint_ratio_from_graph_move(mv)
    }

    pub fn log_joint_ratio_from_graph_move(&self, mv: &GraphMove) -> Result<f64, NetInfError> {
        Ok(self.log_likelihood_ratio_from_graph_move(mv)? + self.log_prior_ratio_from_graph_move(mv)?)
    }

    /// Evaluated by applying `mv`, recomputing, and restoring the saved value.
    pub fn log_likelihood_ratio_from_param_move(&mut self, mv: &ParamMove) -> Result<f64, NetInfError> {
        let saved = self.observation.param(&mv.key).ok_or_else(|| {
            NetInfError::InvalidArgument(format!(
                "{} has no parameter {}",
                self.observation.name(),
                mv.key
            ))
        })?;
        let before = self.log_likelihood();
        self.observation.apply_param_move(mv)?;
        let after = self.log_likelihood();
        self.observation.set_param(&mv.key, saved)?;
        Ok(after - before)
    }

    /// Updates the observation from the pre-move graph, then the graph prior.
    pub fn apply_graph_move(&mut self, mv: &GraphMove) -> Result<(), NetInfError> {
        self.observation
            .apply_graph_move(self.graph_prior.graph(), mv)?;
        self.graph_prior.apply_graph_move(mv)?;
        #[cfg(debug_assertions)]
        self.observation.check_consistency(self.graph_prior.graph())?;
        Ok(())
    }

    pub fn apply_param_move(&mut self, mv: &ParamMove) -> Result<(), NetInfError> {
        if !self.observation.is_valid_param_move(mv) {
            return Err(NetInfError::InvalidArgument(format!(
                "move of {} by {} leaves its valid range",
                mv.key, mv.value
            )));
        }
        self.observation.apply_param_move(mv)
    }

    pub fn metropolis_graph_step<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        beta_prior: f64,
        beta_likelihood: f64,
    ) -> Result<StepResult, NetInfError> {
        let mv = self.graph_prior.propose_graph_move(rng)?;
        let kind = mv.kind();
        if self.graph_prior.is_trivial_graph_move(&mv)? {
            return Ok(StepResult::new(kind, 0.0, true));
        }
        let ratios = LogRatios {
            likelihood: self.log_likelihood_ratio_from_graph_move(&mv)?,
            prior: self.log_prior_ratio_from_graph_move(&mv)?,
            proposal: self.graph_prior.log_proposal_ratio_from_graph_move(&mv)?,
        };
        let accepted = accept(rng, ratios.log_acceptance(beta_likelihood, beta_prior));
        if accepted {
            self.apply_graph_move(&mv)?;
        }
        Ok(StepResult::new(kind, ratios.log_joint(), accepted))
    }

    /// Label moves leave the graph untouched, so the observation is not consulted.
    ///
    /// Both factors of the graph prior's joint belong to this model's prior, so both are
    /// tempered by `beta_prior`, as in [`DataModel::metropolis_graph_step`].
    pub fn metropolis_prior_step<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        beta_prior: f64,
        _beta_likelihood: f64,
    ) -> Result<StepResult, NetInfError> {
        self.graph_prior
            .metropolis_prior_step(rng, beta_prior, beta_prior)
    }

    /// Perturbs one parameter drawn uniformly among the registered proposers.
    pub fn metropolis_param_step<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<StepResult, NetInfError> {
        if self.param_proposers.is_empty() {
            return Ok(StepResult::new(MoveKind::None, 0.0, true));
        }
        let index = rng.gen_range(0..self.param_proposers.len());
        let proposer = &self.param_proposers[index];
        let mv = proposer.propose_move(rng);
        let proposal = proposer.log_proposal_ratio(&mv);
        let kind = MoveKind::Param(mv.key.clone());
        if !self.observation.is_valid_param_move(&mv) {
            return Ok(StepResult::new(kind, 0.0, false));
        }
        let ratios = LogRatios {
            likelihood: self.log_likelihood_ratio_from_param_move(&mv)?,
            prior: 0.0,
            proposal,
        };
        let accepted = accept(rng, ratios.log_acceptance(1.0, 0.0));
        if accepted {
            self.observation.apply_param_move(&mv)?;
        }
        Ok(StepResult::new(kind, ratios.log_joint(), accepted))
    }

    pub fn step<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        config: &SweepConfig,
    ) -> Result<StepResult, NetInfError> {
        match choose_channel(rng, config, &[Channel::Graph, Channel::Prior, Channel::Param])? {
            Channel::Graph => self.metropolis_graph_step(rng, config.beta_prior, config.beta_likelihood),
            Channel::Prior => self.metropolis_prior_step(rng, config.beta_prior, config.beta_likelihood),
            Channel::Param => self.metropolis_param_step(rng),
        }
    }

    pub fn check_safety(&self) -> Result<(), NetInfError> {
        self.graph_prior.check_safety()?;
        self.observation.check_safety()
    }

    pub fn check_consistency(&self) -> Result<(), NetInfError> {
        self.graph_prior.check_consistency()?;
        self.observation.check_consistency(self.graph_prior.graph())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::uncertain::UncertainPoisson;
    use crate::engine::likelihood::BlockEnsemble;
    use crate::engine::prior::block::BlockPriorKind;
    use crate::engine::prior::block_count::BlockCountKind;
    use crate::engine::prior::edge_count::EdgeCountKind;
    use crate::engine::prior::label_graph::LabelGraphPriorKind;
    use crate::engine::proposer::{EdgeProposerConfig, LabelProposerConfig};
    use crate::engine::random_graph::BlockModelSpec;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn noisy_block_model(seed: u64) -> DataModel<UncertainPoisson> {
        let spec = BlockModelSpec {
            edge_count: EdgeCountKind::Poisson { mean: 16.0 },
            block_count: BlockCountKind::Delta(2),
            block: BlockPriorKind::UniformHyper,
            label_graph: LabelGraphPriorKind::ErdosRenyi,
            ensemble: BlockEnsemble::StubLabeled,
        };
        let prior = RandomGraph::stochastic_block_model(
            10,
            spec,
            EdgeProposerConfig::default(),
            LabelProposerConfig {
                label_creation_prob: 0.0,
                ..LabelProposerConfig::default()
            },
        )
        .expect("graph prior");
        let observation = UncertainPoisson::new(10, 0.2, 4.0).expect("observation");
        let mut model = DataModel::new(prior, observation).expect("model");
        model.sample(&mut StdRng::seed_from_u64(seed)).expect("sample");
        model
    }

    #[test]
    fn label_steps_ignore_the_likelihood_temperature() {
        let mut model = noisy_block_model(71);
        let mut reference = model.graph_prior().clone();
        let mut rng = StdRng::seed_from_u64(72);
        let mut reference_rng = StdRng::seed_from_u64(72);
        let mut nontrivial = 0;
        for _ in 0..500 {
            let step = model
                .metropolis_prior_step(&mut rng, 1.0, 0.0)
                .expect("label step");
            let expected = reference
                .metropolis_prior_step(&mut reference_rng, 1.0, 1.0)
                .expect("label step");
            assert_eq!(step, expected);
            if step.log_joint_ratio != 0.0 {
                nontrivial += 1;
            }
        }
        assert!(nontrivial > 0);
        assert_eq!(model.graph_prior().labels(), reference.labels());
    }

    #[test]
    fn param_ratio_restores_the_exact_value() {
        let mut model = noisy_block_model(73);
        let saved = model.observation().edge_average();
        for value in [0.1, 0.3, 1.7, -0.7] {
            let mv = ParamMove::new("edge_average", value);
            let ratio = model
                .log_likelihood_ratio_from_param_move(&mv)
                .expect("ratio");
            assert!(ratio.is_finite());
            assert_eq!(model.observation().edge_average(), saved);
        }
        assert!(model
            .log_likelihood_ratio_from_param_move(&ParamMove::new("missing", 1.0))
            .is_err());
    }
}
