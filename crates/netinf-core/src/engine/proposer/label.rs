//! Label-move proposers for flat and nested partitions.
//!
//! Flat moves pick a vertex uniformly and send it either to a brand new block, with probability
//! `label_creation_prob`, or to a uniformly chosen existing block. Draws that would leave a gap
//! in the labels are redrawn, so the proposal is conditioned on compact moves and its ratio
//! carries the normalizer of both partitions. Nested moves pick a level
//! below the top, an element of that level and a target block, all uniformly; block counts
//! never change, so nested proposals are symmetric.

use rand::Rng;

use crate::engine::block_model::resized_blocks;
use crate::engine::errors::NetInfError;
use crate::engine::moves::LabelMove;
use crate::engine::prior::block::Partition;
use crate::engine::prior::nested::NestedBlockPrior;
use crate::engine::proposer::edge::DEFAULT_MAX_ITERATION;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LabelProposerConfig {
    /// Probability of proposing a new block instead of an existing one.
    pub label_creation_prob: f64,
    pub max_iteration: usize,
}

impl Default for LabelProposerConfig {
    fn default() -> Self {
        Self {
            label_creation_prob: 0.1,
            max_iteration: DEFAULT_MAX_ITERATION,
        }
    }
}

impl LabelProposerConfig {
    pub fn validate(self) -> Result<Self, NetInfError> {
        if !(0.0..1.0).contains(&self.label_creation_prob) {
            return Err(NetInfError::InvalidArgument(format!(
                "label_creation_prob must be in [0, 1), got {}",
                self.label_creation_prob
            )));
        }
        if self.max_iteration == 0 {
            return Err(NetInfError::InvalidArgument(
                "max_iteration must be at least 1".into(),
            ));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelProposer {
    config: LabelProposerConfig,
}

impl LabelProposer {
    pub fn new(config: LabelProposerConfig) -> Result<Self, NetInfError> {
        Ok(Self {
            config: config.validate()?,
        })
    }

    pub fn config(&self) -> &LabelProposerConfig {
        &self.config
    }

    fn exhausted(&self, last_failure: String) -> NetInfError {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            attempts = self.config.max_iteration,
            reason = %last_failure,
            "label proposal exhausted its retry budget"
        );
        NetInfError::RetryExhausted {
            operation: "label proposal",
            attempts: self.config.max_iteration,
            last_failure,
        }
    }

    /// Proposes a move on a flat partition; moves that would leave a gap are redrawn.
    pub fn propose_move<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        partition: &Partition,
    ) -> Result<LabelMove, NetInfError> {
        if partition.is_empty() {
            return Err(NetInfError::UnsupportedMove("partition is empty".into()));
        }
        let mut last_failure = String::from("no candidate was drawn");
        for _ in 0..self.config.max_iteration {
            let vertex = rng.gen_range(0..partition.len());
            let block_count = partition.block_count();
            let next = if rng.gen::<f64>() < self.config.label_creation_prob {
                block_count
            } else {
                rng.gen_range(0..block_count)
            };
            match partition.label_move(vertex, next, 0) {
                Ok(mv) => return Ok(mv),
                Err(err) => last_failure = err.to_string(),
            }
        }
        Err(self.exhausted(last_failure))
    }

    fn target_prob(&self, next: usize, block_count: usize) -> f64 {
        let c = self.config.label_creation_prob;
        if next == block_count {
            c
        } else if next < block_count {
            (1.0 - c) / block_count as f64
        } else {
            0.0
        }
    }

    /// Unnormalized probability, summed over vertices, of drawing a move that keeps labels
    /// compact from a partition with block `sizes`.
    ///
    /// A vertex sharing its block may go anywhere. Alone in the last block it may not open a new
    /// one, and alone in any other block it may only stay.
    fn compact_mass(&self, sizes: &[usize]) -> f64 {
        let c = self.config.label_creation_prob;
        let block_count = sizes.len();
        sizes
            .iter()
            .enumerate()
            .map(|(r, &n)| match n {
                0 => 0.0,
                1 if r + 1 == block_count => 1.0 - c,
                1 => (1.0 - c) / block_count as f64,
                n => n as f64,
            })
            .sum()
    }

    /// `log P(reverse | after) - log P(mv | before)` for a flat move.
    ///
    /// The uniform vertex choice cancels; the target probabilities and the compact-move
    /// normalizers of both partitions do not.
    pub fn log_proposal_ratio(&self, mv: &LabelMove, partition: &Partition) -> f64 {
        if mv.is_trivial() {
            return 0.0;
        }
        let mut after = resized_blocks(partition.sizes(), mv);
        if mv.added_labels < 0 && after.last() == Some(&0) {
            after.pop();
        }
        let forward = self.target_prob(mv.next_label, partition.block_count());
        let reverse = self.target_prob(mv.prev_label, after.len());
        reverse.ln() - forward.ln() + self.compact_mass(partition.sizes()).ln()
            - self.compact_mass(&after).ln()
    }

    /// Proposes a move on one level of a hierarchy, never touching the single-block top level.
    pub fn propose_nested_move<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        blocks: &NestedBlockPrior,
    ) -> Result<LabelMove, NetInfError> {
        let movable_levels = blocks.depth().saturating_sub(1);
        if movable_levels == 0 {
            return Err(NetInfError::UnsupportedMove(
                "a single-level hierarchy has no movable labels".into(),
            ));
        }
        let level = rng.gen_range(0..movable_levels);
        let partition = blocks.level(level);
        let element = rng.gen_range(0..partition.len());
        let next = rng.gen_range(0..partition.block_count());
        Ok(LabelMove::new(element, partition.label(element), next, 0, level))
    }
}
