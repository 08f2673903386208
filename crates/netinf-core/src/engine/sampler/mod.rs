//! Weighted samplers kept in sync with the graph by the proposers that own them.
//!
//! - **samplable_set**: composition-rejection set with O(1) updates
//! - **edge**: edges weighted by multiplicity
//! - **vertex**: vertices weighted uniformly or by shifted degree

pub mod edge;
pub mod samplable_set;
pub mod vertex;

pub use edge::EdgeSampler;
pub use samplable_set::SamplableSet;
pub use vertex::{DegreeVertexSampler, VertexSampler};
