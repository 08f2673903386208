//! Atomic edits proposed by the samplers and consumed by the models.
//!
//! A move is created by a proposer, evaluated (ratios), and either applied once or discarded.

use std::fmt;

use smallvec::SmallVec;

use crate::engine::graph::{ordered, Edge, VertexIndex};

/// Label (block) of a vertex.
pub type BlockIndex = usize;

/// Edges touched by a single move; proposers never produce more than two per side.
pub type EdgeList = SmallVec<[Edge; 2]>;

/// Edit of the latent graph: every `removed` edge loses one unit of multiplicity and every
/// `added` edge gains one. Repeated entries stand for multi-edge changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GraphMove {
    pub removed: EdgeList,
    pub added: EdgeList,
}

impl GraphMove {
    /// Builds a move, normalizing every edge to `(min, max)`.
    pub fn new<R, A>(removed: R, added: A) -> Self
    where
        R: IntoIterator<Item = Edge>,
        A: IntoIterator<Item = Edge>,
    {
        Self {
            removed: removed.into_iter().map(|(u, v)| ordered(u, v)).collect(),
            added: added.into_iter().map(|(u, v)| ordered(u, v)).collect(),
        }
    }

    pub fn addition(u: VertexIndex, v: VertexIndex) -> Self {
        Self::new([], [(u, v)])
    }

    pub fn removal(u: VertexIndex, v: VertexIndex) -> Self {
        Self::new([(u, v)], [])
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }

    /// Net change in the total edge count.
    pub fn edge_count_delta(&self) -> isize {
        self.added.len() as isize - self.removed.len() as isize
    }

    /// The move undoing this one.
    pub fn reversed(&self) -> Self {
        Self {
            removed: self.added.clone(),
            added: self.removed.clone(),
        }
    }

    /// True when `removed` and `added` are equal as multisets, so applying the move is a no-op.
    pub fn cancels_out(&self) -> bool {
        if self.removed.len() != self.added.len() {
            return false;
        }
        let mut removed = self.removed.clone();
        let mut added = self.added.clone();
        removed.sort_unstable();
        added.sort_unstable();
        removed == added
    }

    /// Vertices touched by the move, deduplicated.
    pub fn touched_vertices(&self) -> SmallVec<[VertexIndex; 8]> {
        let mut vertices: SmallVec<[VertexIndex; 8]> = self
            .removed
            .iter()
            .chain(self.added.iter())
            .flat_map(|&(u, v)| [u, v])
            .collect();
        vertices.sort_unstable();
        vertices.dedup();
        vertices
    }

    pub fn kind(&self) -> MoveKind {
        match (self.removed.len(), self.added.len()) {
            (0, 0) => MoveKind::None,
            (0, 1) => MoveKind::Added,
            (1, 0) => MoveKind::Removed,
            (1, 1) => MoveKind::HingeFlip,
            (2, 2) => MoveKind::DoubleEdgeFlip,
            _ => MoveKind::MultiFlip,
        }
    }
}

/// Reassignment of one vertex's label at a given nesting level.
///
/// `added_labels` is `+1` when the move opens a new label, `-1` when it empties the last
/// label, and `0` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LabelMove {
    pub vertex: VertexIndex,
    pub prev_label: BlockIndex,
    pub next_label: BlockIndex,
    pub added_labels: i32,
    pub level: usize,
}

impl LabelMove {
    pub fn new(
        vertex: VertexIndex,
        prev_label: BlockIndex,
        next_label: BlockIndex,
        added_labels: i32,
        level: usize,
    ) -> Self {
        Self {
            vertex,
            prev_label,
            next_label,
            added_labels,
            level,
        }
    }

    pub fn reversed(&self) -> Self {
        Self {
            vertex: self.vertex,
            prev_label: self.next_label,
            next_label: self.prev_label,
            added_labels: -self.added_labels,
            level: self.level,
        }
    }

    pub fn is_trivial(&self) -> bool {
        self.prev_label == self.next_label
    }
}

/// Perturbation of a named scalar parameter by `value`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParamMove {
    pub key: String,
    pub value: f64,
}

impl ParamMove {
    pub fn new(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Category of a Metropolis step, used as the key of acceptance statistics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MoveKind {
    None,
    Added,
    Removed,
    HingeFlip,
    DoubleEdgeFlip,
    MultiFlip,
    LabelMove,
    Prior,
    Param(String),
}

impl fmt::Display for MoveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveKind::None => write!(f, "none"),
            MoveKind::Added => write!(f, "added"),
            MoveKind::Removed => write!(f, "removed"),
            MoveKind::HingeFlip => write!(f, "hinge_flip"),
            MoveKind::DoubleEdgeFlip => write!(f, "double_edge_flip"),
            MoveKind::MultiFlip => write!(f, "multiflip"),
            MoveKind::LabelMove => write!(f, "label_move"),
            MoveKind::Prior => write!(f, "prior"),
            MoveKind::Param(key) => write!(f, "param[{key}]"),
        }
    }
}

/// Outcome of a single Metropolis step.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StepResult {
    pub kind: MoveKind,
    /// Log joint ratio of the proposed move; zero for trivial moves and rejected invalid ones.
    pub log_joint_ratio: f64,
    pub accepted: bool,
}

impl StepResult {
    pub fn new(kind: MoveKind, log_joint_ratio: f64, accepted: bool) -> Self {
        Self {
            kind,
            log_joint_ratio,
            accepted,
        }
    }
}
