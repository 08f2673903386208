//! Sweep loop with burn-in, seeding and callbacks.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::engine::errors::NetInfError;
use crate::engine::metropolis::SweepConfig;
use crate::mcmc::callbacks::Callback;
use crate::mcmc::chain::MarkovChain;
use crate::mcmc::summary::McmcSummary;

/// Run parameters of [`Mcmc`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct McmcConfig {
    /// Recorded sweeps; callbacks see each of them.
    pub sweeps: usize,
    /// Sweeps run before recording, without callbacks.
    pub burn: usize,
    pub seed: u64,
    pub sweep: SweepConfig,
}

impl Default for McmcConfig {
    fn default() -> Self {
        Self {
            sweeps: 100,
            burn: 0,
            seed: 0,
            sweep: SweepConfig::default(),
        }
    }
}

impl McmcConfig {
    pub fn validate(self) -> Result<Self, NetInfError> {
        if self.sweeps == 0 {
            return Err(NetInfError::InvalidArgument(
                "at least one sweep is required".into(),
            ));
        }
        let sweep = self.sweep.validate()?;
        Ok(Self { sweep, ..self })
    }
}

/// Drives a [`MarkovChain`] with its own seeded generator.
#[derive(Debug, Clone)]
pub struct Mcmc<C> {
    chain: C,
    rng: StdRng,
    config: McmcConfig,
}

impl<C: MarkovChain> Mcmc<C> {
    pub fn new(chain: C, config: McmcConfig) -> Result<Self, NetInfError> {
        let config = config.validate()?;
        Ok(Self {
            chain,
            rng: StdRng::seed_from_u64(config.seed),
            config,
        })
    }

    /// Reseeds the generator; later runs replay exactly from the same chain state.
    pub fn set_seed(&mut self, seed: u64) {
        self.config.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn config(&self) -> &McmcConfig {
        &self.config
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    /// Mutable access for resampling or resetting the state between runs.
    pub fn chain_mut(&mut self) -> &mut C {
        &mut self.chain
    }

    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn into_chain(self) -> C {
        self.chain
    }

    /// Runs `sweeps` sweeps without callbacks.
    pub fn burn(&mut self, sweeps: usize) -> Result<McmcSummary, NetInfError> {
        let mut summary = McmcSummary::new();
        for _ in 0..sweeps {
            summary.join(&self.chain.sweep(&mut self.rng, &self.config.sweep)?);
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(
            sweeps,
            acceptance_rate = summary.acceptance_rate(),
            "burn-in finished"
        );
        Ok(summary)
    }

    /// Burns in, then runs the configured sweeps, notifying `callbacks` in order.
    ///
    /// The returned summary covers the recorded sweeps only.
    pub fn run(&mut self, callbacks: &mut [&mut dyn Callback<C>]) -> Result<McmcSummary, NetInfError> {
        self.chain.check_safety()?;
        if self.config.burn > 0 {
            self.burn(self.config.burn)?;
        }
        for callback in callbacks.iter_mut() {
            callback.on_begin(&self.chain)?;
        }
        let mut total = McmcSummary::new();
        for sweep in 0..self.config.sweeps {
            for callback in callbacks.iter_mut() {
                callback.on_sweep_begin(&self.chain, sweep)?;
            }
            let mut summary = McmcSummary::new();
            for _ in 0..self.config.sweep.steps {
                let step = self.chain.step(&mut self.rng, &self.config.sweep)?;
                summary.update(&step);
                for callback in callbacks.iter_mut() {
                    callback.on_step(&self.chain, &step)?;
                }
            }
            for callback in callbacks.iter_mut() {
                callback.on_sweep_end(&self.chain, sweep, &summary)?;
            }
            total.join(&summary);
        }
        for callback in callbacks.iter_mut() {
            callback.on_end(&self.chain)?;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(
            sweeps = self.config.sweeps,
            steps = total.total(),
            acceptance_rate = total.acceptance_rate(),
            "MCMC run finished"
        );
        Ok(total)
    }
}
