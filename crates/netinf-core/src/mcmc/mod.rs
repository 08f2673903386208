//! Running chains: the [`MarkovChain`] contract, the [`Mcmc`] driver, step tallies and
//! sweep callbacks.

pub mod callbacks;
pub mod chain;
pub mod driver;
pub mod summary;

pub use callbacks::{
    Callback, ConsistencyCheck, EdgeMultiplicityCollector, GraphCollector, PartitionCollector,
    SafetyCheck, Scalar, ScalarCollector, VerboseCallback,
};
pub use chain::MarkovChain;
pub use driver::{Mcmc, McmcConfig};
pub use summary::{McmcSummary, MoveCounts};
