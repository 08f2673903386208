//! Random-walk proposers for continuous model parameters.

use rand::distributions::Distribution;
use rand::Rng;
use statrs::distribution::Normal;

use crate::engine::errors::NetInfError;
use crate::engine::moves::ParamMove;

/// Proposes Gaussian perturbations of one named parameter.
///
/// The step distribution is symmetric, so the proposal ratio is always zero.
#[derive(Debug, Clone)]
pub struct GaussianParamProposer {
    key: String,
    step: f64,
    normal: Normal,
}

impl GaussianParamProposer {
    pub fn new(key: impl Into<String>, step: f64) -> Result<Self, NetInfError> {
        if !(step > 0.0 && step.is_finite()) {
            return Err(NetInfError::InvalidArgument(format!(
                "step must be positive, got {step}"
            )));
        }
        let normal = Normal::new(0.0, step)
            .map_err(|e| NetInfError::InvalidArgument(format!("step {step}: {e}")))?;
        Ok(Self {
            key: key.into(),
            step,
            normal,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn propose_move<R: Rng + ?Sized>(&self, rng: &mut R) -> ParamMove {
        ParamMove::new(self.key.clone(), self.normal.sample(rng))
    }

    pub fn log_proposal_ratio(&self, _mv: &ParamMove) -> f64 {
        0.0
    }
}
