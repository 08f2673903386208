//! Move proposers: graph edits, label reassignments and parameter perturbations.

pub mod edge;
pub mod label;
pub mod param;

pub use edge::{EdgeProposer, EdgeProposerConfig, EdgeProposerKind, VertexSampling};
pub use label::{LabelProposer, LabelProposerConfig};
pub use param::GaussianParamProposer;
