//! Error types for the inference engine.

use thiserror::Error;

/// Errors raised while building, sampling or updating a model.
///
/// This enum is marked `#[non_exhaustive]` so new variants can be added without breaking
/// downstream matches.
///
/// `Safety` and `Consistency` report broken internal invariants and are not meant to be
/// recovered from. Invalid-argument style variants describe malformed input and are the only
/// ones [`RandomGraph::sample`](crate::engine::random_graph::RandomGraph::sample) retries on.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NetInfError {
    /// A required collaborator is missing or structurally invalid.
    #[error("safety error: {0}")]
    Safety(String),

    /// Two redundantly maintained views of the same quantity disagree.
    #[error("consistency error in {component}: {message}")]
    Consistency { component: String, message: String },

    /// Malformed input (out-of-range parameter, incompatible sequence, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Removal of an edge whose multiplicity is too small.
    #[error("edge ({u}, {v}) cannot be removed: multiplicity is {multiplicity}")]
    EdgeNotFound {
        u: usize,
        v: usize,
        multiplicity: usize,
    },

    /// A state does not have the size the model was built with.
    #[error("size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// A weight falls outside the range a sampler was declared with.
    #[error("weight {weight} is outside the sampler range [{min}, {max}]")]
    WeightOutOfRange { weight: f64, min: f64, max: f64 },

    /// A bounded retry loop gave up.
    #[error("{operation} failed after {attempts} attempts: {last_failure}")]
    RetryExhausted {
        operation: &'static str,
        attempts: usize,
        last_failure: String,
    },

    /// The configured move type is not supported by the model.
    #[error("unsupported move: {0}")]
    UnsupportedMove(String),

    /// Internal programmer error.
    #[error("logic error: {0}")]
    Logic(String),
}

impl NetInfError {
    /// Shorthand for a [`NetInfError::Consistency`] error.
    pub fn consistency(component: impl Into<String>, message: impl Into<String>) -> Self {
        NetInfError::Consistency {
            component: component.into(),
            message: message.into(),
        }
    }

    /// True for conditions a caller can retry past, such as an infeasible sampled sequence.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            NetInfError::InvalidArgument(_)
                | NetInfError::SizeMismatch { .. }
                | NetInfError::WeightOutOfRange { .. }
        )
    }
}
