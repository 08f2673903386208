//! The inference engine for random graph models.
//!
//! This module provides:
//! - **errors**: Error type shared by every component
//! - **graph**: Undirected multigraph holding the latent state
//! - **moves**: Graph, label and parameter moves plus step outcomes
//! - **sampler**: Weighted edge and vertex samplers
//! - **proposer**: Move proposers and their proposal ratios
//! - **prior**: The prior DAG and its concrete priors
//! - **likelihood**: Graph likelihoods conditioned on the priors
//! - **metropolis**: Acceptance rule and sweep settings
//! - **random_graph**: Graph model composing all of the above

pub mod block_model;
pub mod errors;
pub mod generators;
pub mod graph;
pub mod likelihood;
pub mod metropolis;
pub mod moves;
pub mod numeric;
pub mod prior;
pub mod proposer;
pub mod random_graph;
pub mod sampler;
