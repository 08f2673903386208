//! The capability set a Markov chain exposes to the driver and its callbacks.

use rand::Rng;

use crate::data::model::{DataModel, Observation};
use crate::engine::errors::NetInfError;
use crate::engine::graph::MultiGraph;
use crate::engine::metropolis::SweepConfig;
use crate::engine::moves::{BlockIndex, StepResult};
use crate::engine::random_graph::RandomGraph;
use crate::mcmc::summary::McmcSummary;

pub trait MarkovChain {
    fn step<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        config: &SweepConfig,
    ) -> Result<StepResult, NetInfError>;

    /// Runs `config.steps` steps and tallies their outcomes.
    fn sweep<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        config: &SweepConfig,
    ) -> Result<McmcSummary, NetInfError> {
        let mut summary = McmcSummary::new();
        for _ in 0..config.steps {
            summary.update(&self.step(rng, config)?);
        }
        Ok(summary)
    }

    fn graph(&self) -> &MultiGraph;

    /// Bottom-level vertex labels of labeled models.
    fn labels(&self) -> Option<&[BlockIndex]> {
        None
    }

    fn log_likelihood(&self) -> Result<f64, NetInfError>;

    fn log_prior(&self) -> Result<f64, NetInfError>;

    fn log_joint(&self) -> Result<f64, NetInfError> {
        Ok(self.log_likelihood()? + self.log_prior()?)
    }

    fn check_consistency(&self) -> Result<(), NetInfError>;

    fn check_safety(&self) -> Result<(), NetInfError>;
}

impl MarkovChain for RandomGraph {
    fn step<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        config: &SweepConfig,
    ) -> Result<StepResult, NetInfError> {
        RandomGraph::step(self, rng, config)
    }

    fn graph(&self) -> &MultiGraph {
        RandomGraph::graph(self)
    }

    fn labels(&self) -> Option<&[BlockIndex]> {
        RandomGraph::labels(self)
    }

    fn log_likelihood(&self) -> Result<f64, NetInfError> {
        RandomGraph::log_likelihood(self)
    }

    fn log_prior(&self) -> Result<f64, NetInfError> {
        Ok(RandomGraph::log_prior(self))
    }

    fn check_consistency(&self) -> Result<(), NetInfError> {
        RandomGraph::check_consistency(self)
    }

    fn check_safety(&self) -> Result<(), NetInfError> {
        RandomGraph::check_safety(self)
    }
}

impl<O: Observation> MarkovChain for DataModel<O> {
    fn step<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        config: &SweepConfig,
    ) -> Result<StepResult, NetInfError> {
        DataModel::step(self, rng, config)
    }

    fn graph(&self) -> &MultiGraph {
        DataModel::graph(self)
    }

    fn labels(&self) -> Option<&[BlockIndex]> {
        self.graph_prior().labels()
    }

    fn log_likelihood(&self) -> Result<f64, NetInfError> {
        Ok(DataModel::log_likelihood(self))
    }

    fn log_prior(&self) -> Result<f64, NetInfError> {
        DataModel::log_prior(self)
    }

    fn check_consistency(&self) -> Result<(), NetInfError> {
        DataModel::check_consistency(self)
    }

    fn check_safety(&self) -> Result<(), NetInfError> {
        DataModel::check_safety(self)
    }
}
