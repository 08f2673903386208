//! # netinf core
//!
//! Bayesian inference of random graphs from observed data by Markov chain Monte Carlo.

pub mod data;
pub mod engine;
pub mod mcmc;

// Re-export commonly used types
pub use data::{DataModel, Dynamics, Observation, UncertainPoisson};
pub use engine::errors::NetInfError;
pub use engine::graph::MultiGraph;
pub use engine::metropolis::SweepConfig;
pub use engine::moves::{GraphMove, LabelMove, MoveKind, StepResult};
pub use engine::random_graph::RandomGraph;
pub use mcmc::{MarkovChain, Mcmc, McmcConfig, McmcSummary};
