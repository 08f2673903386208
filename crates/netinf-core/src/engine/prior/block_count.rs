//! Priors on the number of blocks `B`.

use rand::distributions::Distribution;
use rand::Rng;
use statrs::distribution::Poisson;

use crate::engine::errors::NetInfError;
use crate::engine::numeric::log_zero_truncated_poisson_pmf;

/// Draws from a zero-truncated Poisson before giving up.
const MAX_TRUNCATED_DRAWS: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BlockCountKind {
    Delta(usize),
    /// Poisson conditioned on `B >= 1`.
    Poisson { mean: f64 },
    Uniform { min: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockCountPrior {
    kind: BlockCountKind,
    state: usize,
}

impl BlockCountPrior {
    pub fn new(kind: BlockCountKind) -> Result<Self, NetInfError> {
        let state = match &kind {
            BlockCountKind::Delta(value) if *value == 0 => {
                return Err(NetInfError::InvalidArgument(
                    "block count must be at least 1".into(),
                ))
            }
            BlockCountKind::Delta(value) => *value,
            BlockCountKind::Poisson { mean } if !(*mean > 0.0 && mean.is_finite()) => {
                return Err(NetInfError::InvalidArgument(format!(
                    "block count mean must be positive, got {mean}"
                )))
            }
            BlockCountKind::Poisson { mean } => (mean.round() as usize).max(1),
            BlockCountKind::Uniform { min, max } if *min == 0 || min > max => {
                return Err(NetInfError::InvalidArgument(format!(
                    "invalid block count range {min}..={max}"
                )))
            }
            BlockCountKind::Uniform { min, .. } => *min,
        };
        Ok(Self { kind, state })
    }

    pub fn kind(&self) -> &BlockCountKind {
        &self.kind
    }

    pub fn state(&self) -> usize {
        self.state
    }

    pub fn set_state(&mut self, block_count: usize) {
        self.state = block_count;
    }

    pub fn log_likelihood_from_state(&self, block_count: usize) -> f64 {
        match self.kind {
            BlockCountKind::Delta(value) if block_count == value => 0.0,
            BlockCountKind::Delta(_) => f64::NEG_INFINITY,
            BlockCountKind::Poisson { mean } => log_zero_truncated_poisson_pmf(block_count, mean),
            BlockCountKind::Uniform { min, max } if (min..=max).contains(&block_count) => {
                -((max - min + 1) as f64).ln()
            }
            BlockCountKind::Uniform { .. } => f64::NEG_INFINITY,
        }
    }

    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood_from_state(self.state)
    }

    /// Ratio for a label move adding `added_labels` blocks.
    pub fn log_likelihood_ratio(&self, added_labels: i32) -> f64 {
        if added_labels == 0 {
            return 0.0;
        }
        match self.state.checked_add_signed(added_labels as isize) {
            Some(next) => self.log_likelihood_from_state(next) - self.log_likelihood(),
            None => f64::NEG_INFINITY,
        }
    }

    pub fn apply_delta(&mut self, added_labels: i32) -> Result<(), NetInfError> {
        self.state = self
            .state
            .checked_add_signed(added_labels as isize)
            .ok_or_else(|| NetInfError::Logic("block count would become negative".into()))?;
        Ok(())
    }

    pub fn sample_state<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), NetInfError> {
        self.state = match self.kind {
            BlockCountKind::Delta(value) => value,
            BlockCountKind::Uniform { min, max } => rng.gen_range(min..=max),
            BlockCountKind::Poisson { mean } => {
                let dist = Poisson::new(mean)
                    .map_err(|e| NetInfError::InvalidArgument(e.to_string()))?;
                let mut drawn = None;
                for _ in 0..MAX_TRUNCATED_DRAWS {
                    let draw: f64 = dist.sample(rng);
                    if draw >= 1.0 {
                        drawn = Some(draw as usize);
                        break;
                    }
                }
                drawn.ok_or_else(|| NetInfError::RetryExhausted {
                    operation: "zero-truncated Poisson draw",
                    attempts: MAX_TRUNCATED_DRAWS,
                    last_failure: format!("mean {mean} keeps producing zero"),
                })?
            }
        };
        Ok(())
    }
}
