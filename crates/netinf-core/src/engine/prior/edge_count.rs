//! Priors on the total number of edges.

use rand::distributions::Distribution;
use rand::Rng;
use statrs::distribution::{Geometric, Poisson};

use crate::engine::errors::NetInfError;
use crate::engine::numeric::{log_geometric_pmf, log_poisson_pmf};

/// Distribution of the edge count `E`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EdgeCountKind {
    /// `E` is fixed.
    Delta(usize),
    Poisson { mean: f64 },
    /// Geometric on `{0, 1, ...}` with the given mean.
    Geometric { mean: f64 },
    /// Uniform on `min..=max`.
    Uniform { min: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeCountPrior {
    kind: EdgeCountKind,
    state: usize,
}

impl EdgeCountPrior {
    pub fn new(kind: EdgeCountKind) -> Result<Self, NetInfError> {
        let state = match &kind {
            EdgeCountKind::Delta(value) => *value,
            EdgeCountKind::Poisson { mean } | EdgeCountKind::Geometric { mean } => {
                if !(*mean > 0.0 && mean.is_finite()) {
                    return Err(NetInfError::InvalidArgument(format!(
                        "edge count mean must be positive, got {mean}"
                    )));
                }
                mean.round() as usize
            }
            EdgeCountKind::Uniform { min, max } => {
                if min > max {
                    return Err(NetInfError::InvalidArgument(format!(
                        "empty edge count range {min}..={max}"
                    )));
                }
                *min
            }
        };
        Ok(Self { kind, state })
    }

    pub fn kind(&self) -> &EdgeCountKind {
        &self.kind
    }

    pub fn state(&self) -> usize {
        self.state
    }

    pub fn set_state(&mut self, edge_count: usize) {
        self.state = edge_count;
    }

    pub fn log_likelihood_from_state(&self, edge_count: usize) -> f64 {
        match self.kind {
            EdgeCountKind::Delta(value) => {
                if edge_count == value {
                    0.0
                } else {
                    f64::NEG_INFINITY
                }
            }
            EdgeCountKind::Poisson { mean } => log_poisson_pmf(edge_count, mean),
            EdgeCountKind::Geometric { mean } => log_geometric_pmf(edge_count, 1.0 / (mean + 1.0)),
            EdgeCountKind::Uniform { min, max } => {
                if (min..=max).contains(&edge_count) {
                    -((max - min + 1) as f64).ln()
                } else {
                    f64::NEG_INFINITY
                }
            }
        }
    }

    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood_from_state(self.state)
    }

    /// Ratio for a move changing the edge count by `delta`.
    pub fn log_likelihood_ratio(&self, delta: isize) -> f64 {
        if delta == 0 {
            return 0.0;
        }
        let Some(next) = self.state.checked_add_signed(delta) else {
            return f64::NEG_INFINITY;
        };
        self.log_likelihood_from_state(next) - self.log_likelihood()
    }

    pub fn apply_delta(&mut self, delta: isize) -> Result<(), NetInfError> {
        self.state = self.state.checked_add_signed(delta).ok_or_else(|| {
            NetInfError::Logic(format!(
                "edge count {} cannot change by {delta}",
                self.state
            ))
        })?;
        Ok(())
    }

    pub fn sample_state<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), NetInfError> {
        self.state = match self.kind {
            EdgeCountKind::Delta(value) => value,
            EdgeCountKind::Poisson { mean } => {
                let dist = Poisson::new(mean)
                    .map_err(|e| NetInfError::InvalidArgument(e.to_string()))?;
                let draw: f64 = dist.sample(rng);
                draw as usize
            }
            EdgeCountKind::Geometric { mean } => {
                let dist = Geometric::new(1.0 / (mean + 1.0))
                    .map_err(|e| NetInfError::InvalidArgument(e.to_string()))?;
                let trials: f64 = dist.sample(rng);
                (trials as usize).saturating_sub(1)
            }
            EdgeCountKind::Uniform { min, max } => rng.gen_range(min..=max),
        };
        Ok(())
    }
}
