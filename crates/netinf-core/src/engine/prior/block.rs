//! Vertex partitions and the priors placed on them.
//!
//! Labels are kept compact: a partition with `B` blocks only uses labels `0..B`, and the only
//! label a move may empty is the last one. [`Partition::label_move_delta`] encodes the rule and
//! rejects moves that would leave a gap.

use rand::Rng;

use crate::engine::errors::NetInfError;
use crate::engine::generators::{sample_composition, shuffled_labels};
use crate::engine::graph::VertexIndex;
use crate::engine::moves::{BlockIndex, LabelMove};
use crate::engine::numeric::{log_binomial, log_multinomial};

/// Shared empty partition, returned where a partition is looked up but absent.
pub static EMPTY_PARTITION: Partition = Partition::EMPTY;

/// Assignment of every element of a domain to one of `block_count()` blocks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Partition {
    labels: Vec<BlockIndex>,
    sizes: Vec<usize>,
}

impl Partition {
    pub const EMPTY: Partition = Partition {
        labels: Vec::new(),
        sizes: Vec::new(),
    };

    pub fn new(labels: Vec<BlockIndex>, block_count: usize) -> Result<Self, NetInfError> {
        let mut sizes = vec![0; block_count];
        for (v, &r) in labels.iter().enumerate() {
            let size = sizes.get_mut(r).ok_or_else(|| {
                NetInfError::InvalidArgument(format!(
                    "label {r} of vertex {v} is out of range for {block_count} blocks"
                ))
            })?;
            *size += 1;
        }
        Ok(Self { labels, sizes })
    }

    /// Every element in block 0.
    pub fn single_block(size: usize) -> Self {
        Self {
            labels: vec![0; size],
            sizes: if size > 0 { vec![size] } else { vec![0] },
        }
    }

    pub fn labels(&self) -> &[BlockIndex] {
        &self.labels
    }

    pub fn label(&self, v: VertexIndex) -> BlockIndex {
        self.labels[v]
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Size of block `r`; zero for a block that does not exist yet.
    pub fn block_size(&self, r: BlockIndex) -> usize {
        self.sizes.get(r).copied().unwrap_or(0)
    }

    pub fn block_count(&self) -> usize {
        self.sizes.len()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn has_empty_block(&self) -> bool {
        self.sizes.iter().any(|&n| n == 0)
    }

    /// Members of every block.
    pub fn members(&self) -> Vec<Vec<VertexIndex>> {
        let mut members = vec![Vec::new(); self.block_count()];
        for (v, &r) in self.labels.iter().enumerate() {
            members[r].push(v);
        }
        members
    }

    /// Label count change caused by moving `v` to `next`, or the reason the move is not allowed.
    pub fn label_move_delta(&self, v: VertexIndex, next: BlockIndex) -> Result<i32, String> {
        let block_count = self.block_count();
        let prev = *self
            .labels
            .get(v)
            .ok_or_else(|| format!("vertex {v} is not in the partition"))?;
        if next > block_count {
            return Err(format!("label {next} skips past the {block_count} existing blocks"));
        }
        if next == prev {
            return Ok(0);
        }
        let alone = self.sizes[prev] == 1;
        if next == block_count {
            if alone {
                return Err(format!("vertex {v} already has block {prev} to itself"));
            }
            return Ok(1);
        }
        if alone {
            if prev + 1 == block_count {
                return Ok(-1);
            }
            return Err(format!("moving vertex {v} would empty block {prev}"));
        }
        Ok(0)
    }

    /// Builds a validated [`LabelMove`] for `v -> next`.
    pub fn label_move(
        &self,
        v: VertexIndex,
        next: BlockIndex,
        level: usize,
    ) -> Result<LabelMove, NetInfError> {
        let added = self
            .label_move_delta(v, next)
            .map_err(NetInfError::InvalidArgument)?;
        Ok(LabelMove::new(v, self.labels[v], next, added, level))
    }

    /// Applies a move produced against this partition.
    pub fn apply_label_move(&mut self, mv: &LabelMove) -> Result<(), NetInfError> {
        let current = self.labels.get(mv.vertex).copied();
        if current != Some(mv.prev_label) {
            return Err(NetInfError::Logic(format!(
                "label move expects vertex {} in block {}, found {:?}",
                mv.vertex, mv.prev_label, current
            )));
        }
        if mv.next_label == self.sizes.len() {
            self.sizes.push(0);
        }
        let next = self.sizes.get_mut(mv.next_label).ok_or_else(|| {
            NetInfError::Logic(format!("label {} does not exist", mv.next_label))
        })?;
        *next += 1;
        self.sizes[mv.prev_label] -= 1;
        self.labels[mv.vertex] = mv.next_label;
        if mv.added_labels < 0 {
            if self.sizes.last() != Some(&0) {
                return Err(NetInfError::Logic(
                    "label destruction must empty the last block".into(),
                ));
            }
            self.sizes.pop();
        }
        Ok(())
    }

    /// Appends an element in block `r`, growing the block list if needed.
    pub fn push(&mut self, r: BlockIndex) {
        if r >= self.sizes.len() {
            self.sizes.resize(r + 1, 0);
        }
        self.sizes[r] += 1;
        self.labels.push(r);
    }

    /// Removes the last element, which must sit alone in the last block.
    pub fn pop_last_block(&mut self) -> Result<(), NetInfError> {
        match (self.labels.last(), self.sizes.last()) {
            (Some(&r), Some(&1)) if r + 1 == self.sizes.len() => {
                self.labels.pop();
                self.sizes.pop();
                Ok(())
            }
            _ => Err(NetInfError::Logic(
                "only a singleton last block can be dropped".into(),
            )),
        }
    }
}

/// Distribution of a vertex partition given the block count.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BlockPriorKind {
    /// Partition fixed to the given labels.
    Delta(Vec<BlockIndex>),
    /// Every assignment of `N` vertices to `B` labels is equally likely.
    Uniform,
    /// Uniform block sizes (all positive), then a uniform assignment with those sizes.
    UniformHyper,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockPrior {
    kind: BlockPriorKind,
    partition: Partition,
}

impl BlockPrior {
    pub fn new(kind: BlockPriorKind, size: usize) -> Result<Self, NetInfError> {
        let partition = match &kind {
            BlockPriorKind::Delta(labels) => {
                if labels.len() != size {
                    return Err(NetInfError::SizeMismatch {
                        expected: size,
                        actual: labels.len(),
                    });
                }
                let block_count = labels.iter().max().map_or(1, |&r| r + 1);
                Partition::new(labels.clone(), block_count)?
            }
            _ => Partition::single_block(size),
        };
        Ok(Self { kind, partition })
    }

    pub fn kind(&self) -> &BlockPriorKind {
        &self.kind
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn size(&self) -> usize {
        self.partition.len()
    }

    pub fn set_partition(&mut self, partition: Partition) -> Result<(), NetInfError> {
        if partition.len() != self.size() {
            return Err(NetInfError::SizeMismatch {
                expected: self.size(),
                actual: partition.len(),
            });
        }
        self.partition = partition;
        Ok(())
    }

    fn log_likelihood_from(&self, sizes: &[usize], block_count: usize) -> f64 {
        let n = self.size();
        match &self.kind {
            BlockPriorKind::Delta(labels) => {
                if labels.as_slice() == self.partition.labels() {
                    0.0
                } else {
                    f64::NEG_INFINITY
                }
            }
            BlockPriorKind::Uniform => {
                if block_count == 0 {
                    return if n == 0 { 0.0 } else { f64::NEG_INFINITY };
                }
                -(n as f64) * (block_count as f64).ln()
            }
            BlockPriorKind::UniformHyper => {
                if block_count == 0 || sizes.len() != block_count || sizes.contains(&0) {
                    return f64::NEG_INFINITY;
                }
                -log_multinomial(sizes) - log_binomial(n - 1, block_count - 1)
            }
        }
    }

    /// Own log-likelihood given the block count held by the parent prior.
    pub fn log_likelihood(&self, block_count: usize) -> f64 {
        self.log_likelihood_from(self.partition.sizes(), block_count)
    }

    pub fn log_likelihood_ratio_from_label_move(&self, mv: &LabelMove, block_count: usize) -> f64 {
        if mv.is_trivial() {
            return 0.0;
        }
        let next_count = (block_count as i64 + i64::from(mv.added_labels)).max(0) as usize;
        match &self.kind {
            BlockPriorKind::Delta(_) => f64::NEG_INFINITY,
            BlockPriorKind::Uniform => {
                self.log_likelihood_from(&[], next_count) - self.log_likelihood(block_count)
            }
            BlockPriorKind::UniformHyper => {
                let mut sizes = self.partition.sizes().to_vec();
                if mv.next_label >= sizes.len() {
                    sizes.resize(mv.next_label + 1, 0);
                }
                sizes[mv.next_label] += 1;
                sizes[mv.prev_label] -= 1;
                if mv.added_labels < 0 {
                    sizes.pop();
                }
                let after = self.log_likelihood_from(&sizes, next_count);
                let before = self.log_likelihood(block_count);
                if after == f64::NEG_INFINITY {
                    f64::NEG_INFINITY
                } else {
                    after - before
                }
            }
        }
    }

    pub fn apply_label_move(&mut self, mv: &LabelMove) -> Result<(), NetInfError> {
        self.partition.apply_label_move(mv)
    }

    /// Draws a partition with `block_count` blocks.
    pub fn sample_state<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        block_count: usize,
    ) -> Result<(), NetInfError> {
        let n = self.size();
        self.partition = match &self.kind {
            BlockPriorKind::Delta(labels) => {
                let partition = Partition::new(labels.clone(), block_count)?;
                if partition.block_count() != block_count {
                    return Err(NetInfError::InvalidArgument(format!(
                        "fixed partition has {} blocks, block count is {block_count}",
                        partition.block_count()
                    )));
                }
                partition
            }
            BlockPriorKind::Uniform => {
                if block_count == 0 {
                    return Err(NetInfError::InvalidArgument("block count is zero".into()));
                }
                let labels = (0..n).map(|_| rng.gen_range(0..block_count)).collect();
                Partition::new(labels, block_count)?
            }
            BlockPriorKind::UniformHyper => {
                let sizes = sample_composition(rng, n, block_count)?;
                Partition::new(shuffled_labels(rng, &sizes), block_count)?
            }
        };
        Ok(())
    }

    /// Checks that the partition agrees with the block count of the parent prior.
    pub fn check_consistency(&self, block_count: usize) -> Result<(), NetInfError> {
        let recount = Partition::new(self.partition.labels().to_vec(), block_count)
            .map_err(|e| NetInfError::consistency("BlockPrior", e.to_string()))?;
        if recount != self.partition {
            return Err(NetInfError::consistency(
                "BlockPrior",
                format!(
                    "cached block sizes {:?} differ from recount {:?} for {block_count} blocks",
                    self.partition.sizes(),
                    recount.sizes()
                ),
            ));
        }
        Ok(())
    }
}
