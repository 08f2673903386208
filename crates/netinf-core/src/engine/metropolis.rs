//! Metropolis-Hastings acceptance and sweep settings shared by every chain.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::engine::errors::NetInfError;

/// Family of moves a sweep step draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Channel {
    Graph,
    Prior,
    Param,
}

/// Settings of one Metropolis sweep.
///
/// A rate of zero freezes its channel without touching the state it would update.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SweepConfig {
    /// Steps per sweep.
    pub steps: usize,
    pub graph_rate: f64,
    pub prior_rate: f64,
    pub param_rate: f64,
    /// Inverse temperature of the prior ratio; zero ignores it.
    pub beta_prior: f64,
    /// Inverse temperature of the likelihood ratio; zero ignores it.
    pub beta_likelihood: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            steps: 1000,
            graph_rate: 1.0,
            prior_rate: 1.0,
            param_rate: 0.0,
            beta_prior: 1.0,
            beta_likelihood: 1.0,
        }
    }
}

impl SweepConfig {
    pub fn with_steps(steps: usize) -> Self {
        Self {
            steps,
            ..Self::default()
        }
    }

    /// Sets the rate of `channel` to zero.
    pub fn freeze(mut self, channel: Channel) -> Self {
        match channel {
            Channel::Graph => self.graph_rate = 0.0,
            Channel::Prior => self.prior_rate = 0.0,
            Channel::Param => self.param_rate = 0.0,
        }
        self
    }

    pub fn rate(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Graph => self.graph_rate,
            Channel::Prior => self.prior_rate,
            Channel::Param => self.param_rate,
        }
    }

    pub fn validate(self) -> Result<Self, NetInfError> {
        if self.steps == 0 {
            return Err(NetInfError::InvalidArgument(
                "a sweep needs at least one step".into(),
            ));
        }
        for (name, value) in [
            ("graph_rate", self.graph_rate),
            ("prior_rate", self.prior_rate),
            ("param_rate", self.param_rate),
            ("beta_prior", self.beta_prior),
            ("beta_likelihood", self.beta_likelihood),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(NetInfError::InvalidArgument(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if self.graph_rate + self.prior_rate + self.param_rate == 0.0 {
            return Err(NetInfError::InvalidArgument(
                "every move channel is frozen".into(),
            ));
        }
        Ok(self)
    }
}

/// Draws a channel proportionally to its rate among `channels`.
pub fn choose_channel<R: Rng + ?Sized>(
    rng: &mut R,
    config: &SweepConfig,
    channels: &[Channel],
) -> Result<Channel, NetInfError> {
    let weights: Vec<f64> = channels.iter().map(|&c| config.rate(c)).collect();
    let dist = WeightedIndex::new(&weights).map_err(|_| {
        NetInfError::InvalidArgument(format!("no active channel among {channels:?}"))
    })?;
    Ok(channels[dist.sample(rng)])
}

/// The three independent terms of a Metropolis-Hastings ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogRatios {
    pub likelihood: f64,
    pub prior: f64,
    pub proposal: f64,
}

impl LogRatios {
    /// Tempered log acceptance; `-inf` when either tempered term is impossible.
    pub fn log_acceptance(&self, beta_likelihood: f64, beta_prior: f64) -> f64 {
        let likelihood = if beta_likelihood > 0.0 {
            beta_likelihood * self.likelihood
        } else {
            0.0
        };
        let prior = if beta_prior > 0.0 {
            beta_prior * self.prior
        } else {
            0.0
        };
        if likelihood == f64::NEG_INFINITY || prior == f64::NEG_INFINITY {
            return f64::NEG_INFINITY;
        }
        likelihood + prior + self.proposal
    }

    /// Untempered change of the log-joint.
    pub fn log_joint(&self) -> f64 {
        self.likelihood + self.prior
    }
}

/// Accepts with probability `min(1, exp(log_acceptance))`.
///
/// A uniform variate is drawn only when acceptance is possible.
pub fn accept<R: Rng + ?Sized>(rng: &mut R, log_acceptance: f64) -> bool {
    if log_acceptance == f64::NEG_INFINITY || log_acceptance.is_nan() {
        return false;
    }
    rng.gen::<f64>() < log_acceptance.exp()
}
