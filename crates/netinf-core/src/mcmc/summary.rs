//! Acceptance bookkeeping over many Metropolis steps.

use std::collections::BTreeMap;

use crate::engine::moves::{MoveKind, StepResult};

/// Accepted and proposed counts for one move kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MoveCounts {
    pub accepted: usize,
    pub total: usize,
}

impl MoveCounts {
    pub fn acceptance_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.accepted as f64 / self.total as f64
        }
    }
}

/// Running tally of step outcomes, keyed by move kind.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct McmcSummary {
    counts: BTreeMap<MoveKind, MoveCounts>,
    /// Sum of the log joint ratios of accepted moves.
    pub log_joint_ratio: f64,
}

impl McmcSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, step: &StepResult) {
        let counts = self.counts.entry(step.kind.clone()).or_default();
        counts.total += 1;
        if step.accepted {
            counts.accepted += 1;
            if step.log_joint_ratio.is_finite() {
                self.log_joint_ratio += step.log_joint_ratio;
            }
        }
    }

    /// Merges the tallies of `other` into `self`.
    pub fn join(&mut self, other: &McmcSummary) {
        for (kind, theirs) in &other.counts {
            let ours = self.counts.entry(kind.clone()).or_default();
            ours.accepted += theirs.accepted;
            ours.total += theirs.total;
        }
        self.log_joint_ratio += other.log_joint_ratio;
    }

    pub fn counts(&self, kind: &MoveKind) -> MoveCounts {
        self.counts.get(kind).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MoveKind, &MoveCounts)> {
        self.counts.iter()
    }

    pub fn accepted(&self) -> usize {
        self.counts.values().map(|c| c.accepted).sum()
    }

    pub fn total(&self) -> usize {
        self.counts.values().map(|c| c.total).sum()
    }

    /// Acceptance rate over every move kind.
    pub fn acceptance_rate(&self) -> f64 {
        MoveCounts {
            accepted: self.accepted(),
            total: self.total(),
        }
        .acceptance_rate()
    }
}
