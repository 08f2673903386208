//! Hooks run by the [`Mcmc`](crate::mcmc::driver::Mcmc) driver around sweeps and steps.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::engine::errors::NetInfError;
use crate::engine::graph::{Edge, MultiGraph};
use crate::engine::moves::{BlockIndex, StepResult};
use crate::mcmc::chain::MarkovChain;
use crate::mcmc::summary::McmcSummary;

/// Observer of a running chain. Every hook defaults to a no-op; an error aborts the run.
pub trait Callback<C: MarkovChain> {
    fn on_begin(&mut self, _chain: &C) -> Result<(), NetInfError> {
        Ok(())
    }

    fn on_sweep_begin(&mut self, _chain: &C, _sweep: usize) -> Result<(), NetInfError> {
        Ok(())
    }

    fn on_step(&mut self, _chain: &C, _step: &StepResult) -> Result<(), NetInfError> {
        Ok(())
    }

    fn on_sweep_end(
        &mut self,
        _chain: &C,
        _sweep: usize,
        _summary: &McmcSummary,
    ) -> Result<(), NetInfError> {
        Ok(())
    }

    fn on_end(&mut self, _chain: &C) -> Result<(), NetInfError> {
        Ok(())
    }
}

/// Re-derives every cached view at the end of each sweep, and optionally after every step.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsistencyCheck {
    pub every_step: bool,
}

impl<C: MarkovChain> Callback<C> for ConsistencyCheck {
    fn on_step(&mut self, chain: &C, _step: &StepResult) -> Result<(), NetInfError> {
        if self.every_step {
            chain.check_consistency()?;
        }
        Ok(())
    }

    fn on_sweep_end(
        &mut self,
        chain: &C,
        _sweep: usize,
        _summary: &McmcSummary,
    ) -> Result<(), NetInfError> {
        chain.check_consistency()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyCheck;

impl<C: MarkovChain> Callback<C> for SafetyCheck {
    fn on_begin(&mut self, chain: &C) -> Result<(), NetInfError> {
        chain.check_safety()
    }

    fn on_sweep_begin(&mut self, chain: &C, _sweep: usize) -> Result<(), NetInfError> {
        chain.check_safety()
    }
}

/// Stores a copy of the graph after every sweep.
#[derive(Debug, Clone, Default)]
pub struct GraphCollector {
    graphs: Vec<MultiGraph>,
}

impl GraphCollector {
    pub fn graphs(&self) -> &[MultiGraph] {
        &self.graphs
    }

    pub fn clear(&mut self) {
        self.graphs.clear();
    }
}

impl<C: MarkovChain> Callback<C> for GraphCollector {
    fn on_sweep_end(
        &mut self,
        chain: &C,
        _sweep: usize,
        _summary: &McmcSummary,
    ) -> Result<(), NetInfError> {
        self.graphs.push(chain.graph().clone());
        Ok(())
    }
}

/// Stores the vertex labels after every sweep; unlabeled chains are skipped.
#[derive(Debug, Clone, Default)]
pub struct PartitionCollector {
    partitions: Vec<Vec<BlockIndex>>,
}

impl PartitionCollector {
    pub fn partitions(&self) -> &[Vec<BlockIndex>] {
        &self.partitions
    }
}

impl<C: MarkovChain> Callback<C> for PartitionCollector {
    fn on_sweep_end(
        &mut self,
        chain: &C,
        _sweep: usize,
        _summary: &McmcSummary,
    ) -> Result<(), NetInfError> {
        if let Some(labels) = chain.labels() {
            self.partitions.push(labels.to_vec());
        }
        Ok(())
    }
}

/// Empirical marginal distribution of every edge multiplicity across sweeps.
#[derive(Debug, Clone, Default)]
pub struct EdgeMultiplicityCollector {
    sample_count: usize,
    present: FxHashMap<Edge, usize>,
    multiplicities: FxHashMap<(Edge, usize), usize>,
    max_multiplicity: FxHashMap<Edge, usize>,
}

impl EdgeMultiplicityCollector {
    pub fn collect(&mut self, graph: &MultiGraph) {
        self.sample_count += 1;
        for (u, v, m) in graph.edges() {
            *self.present.entry((u, v)).or_insert(0) += 1;
            *self.multiplicities.entry(((u, v), m)).or_insert(0) += 1;
            let max = self.max_multiplicity.entry((u, v)).or_insert(0);
            *max = (*max).max(m);
        }
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Fraction of samples in which `edge` had exactly `multiplicity` copies.
    pub fn edge_count_prob(&self, edge: Edge, multiplicity: usize) -> f64 {
        if self.sample_count == 0 {
            return 0.0;
        }
        let seen = if multiplicity == 0 {
            self.sample_count - self.present.get(&edge).copied().unwrap_or(0)
        } else {
            self.multiplicities
                .get(&(edge, multiplicity))
                .copied()
                .unwrap_or(0)
        };
        seen as f64 / self.sample_count as f64
    }

    /// Probabilities of multiplicities `0..=max` for every edge seen at least once.
    pub fn edge_probs(&self) -> BTreeMap<Edge, Vec<f64>> {
        self.max_multiplicity
            .iter()
            .map(|(&edge, &max)| {
                let probs = (0..=max).map(|m| self.edge_count_prob(edge, m)).collect();
                (edge, probs)
            })
            .collect()
    }

    /// Sum of the entropies of the per-edge marginals.
    pub fn marginal_entropy(&self) -> f64 {
        self.edge_probs()
            .values()
            .flatten()
            .filter(|&&p| p > 0.0)
            .map(|&p| -p * p.ln())
            .sum()
    }

    /// Log-probability of `graph` under the product of the per-edge marginals.
    ///
    /// Edges never observed in the samples are ignored.
    pub fn log_posterior_estimate(&self, graph: &MultiGraph) -> f64 {
        self.present
            .keys()
            .map(|&(u, v)| self.edge_count_prob((u, v), graph.edge_multiplicity(u, v)).ln())
            .sum()
    }
}

impl<C: MarkovChain> Callback<C> for EdgeMultiplicityCollector {
    fn on_sweep_end(
        &mut self,
        chain: &C,
        _sweep: usize,
        _summary: &McmcSummary,
    ) -> Result<(), NetInfError> {
        self.collect(chain.graph());
        Ok(())
    }
}

/// Which scalar a [`ScalarCollector`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    LogLikelihood,
    LogPrior,
    LogJoint,
}

/// Records one scalar of the chain after every sweep.
#[derive(Debug, Clone)]
pub struct ScalarCollector {
    scalar: Scalar,
    values: Vec<f64>,
}

impl ScalarCollector {
    pub fn new(scalar: Scalar) -> Self {
        Self {
            scalar,
            values: Vec::new(),
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn mean(&self) -> Option<f64> {
        (!self.values.is_empty()).then(|| self.values.iter().sum::<f64>() / self.values.len() as f64)
    }
}

impl<C: MarkovChain> Callback<C> for ScalarCollector {
    fn on_sweep_end(
        &mut self,
        chain: &C,
        _sweep: usize,
        _summary: &McmcSummary,
    ) -> Result<(), NetInfError> {
        let value = match self.scalar {
            Scalar::LogLikelihood => chain.log_likelihood()?,
            Scalar::LogPrior => chain.log_prior()?,
            Scalar::LogJoint => chain.log_joint()?,
        };
        self.values.push(value);
        Ok(())
    }
}

/// Emits a structured log line per sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerboseCallback;

impl<C: MarkovChain> Callback<C> for VerboseCallback {
    fn on_sweep_end(
        &mut self,
        _chain: &C,
        _sweep: usize,
        _summary: &McmcSummary,
    ) -> Result<(), NetInfError> {
        #[cfg(feature = "tracing")]
        tracing::info!(
            sweep = _sweep,
            steps = _summary.total(),
            acceptance_rate = _summary.acceptance_rate(),
            log_joint = _chain.log_joint().unwrap_or(f64::NAN),
            edges = _chain.graph().edge_count(),
            "sweep finished"
        );
        Ok(())
    }
}
