//! Hierarchical partitions and the label graphs built on top of them.
//!
//! Level `0` partitions the vertices into `B_0` blocks, level `l` partitions the `B_{l-1}` blocks
//! of the level below, and the last level holds a single block. Block counts are fixed when the
//! prior is built; label moves reassign one element of one level without creating or removing
//! blocks.

use rand::Rng;

use crate::engine::block_model::{resized_blocks, uniform};
use crate::engine::errors::NetInfError;
use crate::engine::generators::{sample_composition, shuffled_labels};
use crate::engine::graph::{MultiGraph, VertexIndex};
use crate::engine::moves::{BlockIndex, GraphMove, LabelMove};
use crate::engine::numeric::{log_binomial, log_multinomial};
use crate::engine::prior::block::{Partition, EMPTY_PARTITION};
use crate::engine::prior::label_graph::{EdgeDeltas, LabelGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NestedBlockPriorKind {
    Uniform,
    UniformHyper,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NestedBlockPrior {
    kind: NestedBlockPriorKind,
    levels: Vec<Partition>,
}

impl NestedBlockPrior {
    /// Builds a hierarchy over `size` vertices with `block_counts[l]` blocks at level `l`.
    ///
    /// A trailing single-block level is appended when missing.
    pub fn new(
        kind: NestedBlockPriorKind,
        size: usize,
        block_counts: &[usize],
    ) -> Result<Self, NetInfError> {
        let mut counts = block_counts.to_vec();
        if counts.last() != Some(&1) {
            counts.push(1);
        }
        let mut levels = Vec::with_capacity(counts.len());
        let mut domain = size;
        for (level, &count) in counts.iter().enumerate() {
            if count == 0 || count > domain {
                return Err(NetInfError::InvalidArgument(format!(
                    "level {level} cannot split {domain} elements into {count} blocks"
                )));
            }
            let labels = (0..domain).map(|i| i % count).collect();
            levels.push(Partition::new(labels, count)?);
            domain = count;
        }
        Ok(Self { kind, levels })
    }

    pub fn kind(&self) -> NestedBlockPriorKind {
        self.kind
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn size(&self) -> usize {
        self.levels.first().map_or(0, Partition::len)
    }

    pub fn level(&self, level: usize) -> &Partition {
        self.levels.get(level).unwrap_or(&EMPTY_PARTITION)
    }

    pub fn levels(&self) -> &[Partition] {
        &self.levels
    }

    pub fn block_counts(&self) -> Vec<usize> {
        self.levels.iter().map(Partition::block_count).collect()
    }

    /// Block of vertex `v` at `level`, following the hierarchy upwards.
    pub fn block_of(&self, v: VertexIndex, level: usize) -> BlockIndex {
        self.levels
            .iter()
            .take(level + 1)
            .fold(v, |element, partition| partition.label(element))
    }

    /// Replaces the hierarchy; each level must partition the blocks of the level below.
    pub fn set_levels(&mut self, levels: Vec<Partition>) -> Result<(), NetInfError> {
        if levels.len() != self.levels.len() {
            return Err(NetInfError::SizeMismatch {
                expected: self.levels.len(),
                actual: levels.len(),
            });
        }
        let mut domain = self.size();
        for (level, (partition, current)) in levels.iter().zip(&self.levels).enumerate() {
            if partition.len() != domain || partition.block_count() != current.block_count() {
                return Err(NetInfError::InvalidArgument(format!(
                    "level {level} partitions {} elements into {} blocks, expected {domain} into {}",
                    partition.len(),
                    partition.block_count(),
                    current.block_count()
                )));
            }
            domain = partition.block_count();
        }
        self.levels = levels;
        Ok(())
    }

    fn level_term(&self, sizes: &[usize], domain: usize) -> f64 {
        let block_count = sizes.len();
        let count_term = -(domain as f64).ln();
        match self.kind {
            NestedBlockPriorKind::Uniform => {
                count_term - domain as f64 * (block_count as f64).ln()
            }
            NestedBlockPriorKind::UniformHyper => {
                if sizes.contains(&0) {
                    return f64::NEG_INFINITY;
                }
                count_term - log_multinomial(sizes) - log_binomial(domain - 1, block_count - 1)
            }
        }
    }

    pub fn log_likelihood(&self) -> f64 {
        self.levels
            .iter()
            .map(|p| self.level_term(p.sizes(), p.len()))
            .sum()
    }

    /// Reason a nested label move is not allowed, if any.
    pub fn validate_label_move(&self, mv: &LabelMove) -> Result<(), NetInfError> {
        let partition = self.levels.get(mv.level).ok_or_else(|| {
            NetInfError::InvalidArgument(format!("level {} does not exist", mv.level))
        })?;
        if mv.added_labels != 0 {
            return Err(NetInfError::UnsupportedMove(
                "nested label moves keep block counts fixed".into(),
            ));
        }
        if mv.vertex >= partition.len() || partition.label(mv.vertex) != mv.prev_label {
            return Err(NetInfError::InvalidArgument(format!(
                "element {} is not in block {} at level {}",
                mv.vertex, mv.prev_label, mv.level
            )));
        }
        if mv.next_label >= partition.block_count() {
            return Err(NetInfError::InvalidArgument(format!(
                "block {} does not exist at level {}",
                mv.next_label, mv.level
            )));
        }
        Ok(())
    }

    pub fn log_likelihood_ratio_from_label_move(&self, mv: &LabelMove) -> f64 {
        if mv.is_trivial() {
            return 0.0;
        }
        if self.validate_label_move(mv).is_err() {
            return f64::NEG_INFINITY;
        }
        let partition = &self.levels[mv.level];
        let next_sizes = resized_blocks(partition.sizes(), mv);
        let after = self.level_term(&next_sizes, partition.len());
        if after == f64::NEG_INFINITY {
            return after;
        }
        after - self.level_term(partition.sizes(), partition.len())
    }

    pub fn apply_label_move(&mut self, mv: &LabelMove) -> Result<(), NetInfError> {
        self.validate_label_move(mv)?;
        self.levels[mv.level].apply_label_move(mv)
    }

    pub fn sample_state<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), NetInfError> {
        let mut domain = self.size();
        for partition in &mut self.levels {
            let count = partition.block_count();
            let labels = match self.kind {
                NestedBlockPriorKind::Uniform => {
                    (0..domain).map(|_| rng.gen_range(0..count)).collect()
                }
                NestedBlockPriorKind::UniformHyper => {
                    let sizes = sample_composition(rng, domain, count)?;
                    shuffled_labels(rng, &sizes)
                }
            };
            *partition = Partition::new(labels, count)?;
            domain = count;
        }
        Ok(())
    }

    pub fn check_consistency(&self) -> Result<(), NetInfError> {
        let mut domain = self.size();
        for (level, partition) in self.levels.iter().enumerate() {
            let recount = Partition::new(partition.labels().to_vec(), partition.block_count())
                .map_err(|e| NetInfError::consistency("NestedBlockPrior", e.to_string()))?;
            if recount != *partition || partition.len() != domain {
                return Err(NetInfError::consistency(
                    "NestedBlockPrior",
                    format!("level {level} sizes {:?} do not match its labels", partition.sizes()),
                ));
            }
            domain = partition.block_count();
        }
        if self.levels.last().map(Partition::block_count) != Some(1) {
            return Err(NetInfError::consistency(
                "NestedBlockPrior",
                "top level must hold a single block",
            ));
        }
        Ok(())
    }
}

/// Label graphs at every level of a [`NestedBlockPrior`].
///
/// Level `k` contracts the level `k - 1` label graph (the graph itself for `k = 0`) along the
/// level `k` partition. Each level above the first is scored as a uniform block model of the
/// level below it; the level `0` label graph is scored by the graph likelihood.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NestedLabelGraphPrior {
    levels: Vec<LabelGraph>,
}

impl NestedLabelGraphPrior {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self, level: usize) -> Option<&LabelGraph> {
        self.levels.get(level)
    }

    pub fn levels(&self) -> &[LabelGraph] {
        &self.levels
    }

    pub fn log_likelihood(&self, blocks: &NestedBlockPrior) -> f64 {
        self.levels
            .iter()
            .enumerate()
            .skip(1)
            .map(|(k, lg)| uniform::log_likelihood(blocks.level(k).sizes(), lg))
            .sum()
    }

    /// Entry changes at every level, starting from `deltas` at `from_level`.
    fn propagate(
        blocks: &NestedBlockPrior,
        from_level: usize,
        deltas: EdgeDeltas,
    ) -> Vec<EdgeDeltas> {
        let mut per_level = Vec::with_capacity(blocks.depth());
        let mut current = deltas;
        for k in from_level..blocks.depth() {
            if k > from_level {
                current = LabelGraph::lift_deltas(&current, blocks.level(k).labels());
            }
            per_level.push(current.clone());
        }
        per_level
    }

    fn ratio_from_deltas(
        &self,
        blocks: &NestedBlockPrior,
        from_level: usize,
        per_level: &[EdgeDeltas],
        resized: Option<&LabelMove>,
    ) -> f64 {
        let mut ratio = 0.0;
        for (offset, deltas) in per_level.iter().enumerate() {
            let k = from_level + offset;
            if k == 0 {
                continue;
            }
            let Some(lg) = self.levels.get(k) else {
                return f64::NEG_INFINITY;
            };
            let sizes = blocks.level(k).sizes();
            ratio += match resized.filter(|mv| mv.level == k) {
                Some(mv) => uniform::log_likelihood_ratio(
                    sizes,
                    &resized_blocks(sizes, mv),
                    &[mv.prev_label, mv.next_label],
                    lg,
                    deltas,
                ),
                None => uniform::log_likelihood_ratio(sizes, sizes, &[], lg, deltas),
            };
        }
        ratio
    }

    pub fn log_likelihood_ratio_from_graph_move(
        &self,
        mv: &GraphMove,
        blocks: &NestedBlockPrior,
    ) -> f64 {
        let deltas = LabelGraph::graph_move_deltas(mv, blocks.level(0).labels());
        let per_level = Self::propagate(blocks, 0, deltas);
        self.ratio_from_deltas(blocks, 0, &per_level, None)
    }

    fn domain<'a>(&'a self, graph: &'a MultiGraph, level: usize) -> &'a MultiGraph {
        match level {
            0 => graph,
            k => self.levels[k - 1].as_graph(),
        }
    }

    fn label_move_levels(
        &self,
        mv: &LabelMove,
        graph: &MultiGraph,
        blocks: &NestedBlockPrior,
    ) -> Vec<EdgeDeltas> {
        let domain = self.domain(graph, mv.level);
        let deltas = LabelGraph::label_move_deltas(domain, blocks.level(mv.level).labels(), mv);
        Self::propagate(blocks, mv.level, deltas)
    }

    pub fn log_likelihood_ratio_from_label_move(
        &self,
        mv: &LabelMove,
        graph: &MultiGraph,
        blocks: &NestedBlockPrior,
    ) -> f64 {
        if mv.is_trivial() {
            return 0.0;
        }
        if mv.level >= self.levels.len() || blocks.validate_label_move(mv).is_err() {
            return f64::NEG_INFINITY;
        }
        let per_level = self.label_move_levels(mv, graph, blocks);
        self.ratio_from_deltas(blocks, mv.level, &per_level, Some(mv))
    }

    pub fn apply_graph_move(
        &mut self,
        mv: &GraphMove,
        blocks: &NestedBlockPrior,
    ) -> Result<(), NetInfError> {
        let deltas = LabelGraph::graph_move_deltas(mv, blocks.level(0).labels());
        for (lg, deltas) in self.levels.iter_mut().zip(Self::propagate(blocks, 0, deltas)) {
            lg.apply_deltas(&deltas)?;
        }
        Ok(())
    }

    /// Applies a label move; `blocks` must still hold the hierarchy before the move.
    pub fn apply_label_move(
        &mut self,
        mv: &LabelMove,
        graph: &MultiGraph,
        blocks: &NestedBlockPrior,
    ) -> Result<(), NetInfError> {
        if mv.is_trivial() {
            return Ok(());
        }
        blocks.validate_label_move(mv)?;
        let per_level = self.label_move_levels(mv, graph, blocks);
        for (lg, deltas) in self.levels.iter_mut().skip(mv.level).zip(per_level) {
            lg.apply_deltas(&deltas)?;
        }
        Ok(())
    }

    fn contract(
        graph: &MultiGraph,
        blocks: &NestedBlockPrior,
    ) -> Result<Vec<LabelGraph>, NetInfError> {
        let mut levels: Vec<LabelGraph> = Vec::with_capacity(blocks.depth());
        for (k, partition) in blocks.levels().iter().enumerate() {
            let domain = match levels.last() {
                Some(below) => below.as_graph(),
                None => graph,
            };
            let lg = LabelGraph::from_graph(domain, partition.labels(), partition.block_count())
                .map_err(|e| NetInfError::InvalidArgument(format!("level {k}: {e}")))?;
            levels.push(lg);
        }
        Ok(levels)
    }

    pub fn recompute_from_graph(
        &mut self,
        graph: &MultiGraph,
        blocks: &NestedBlockPrior,
    ) -> Result<(), NetInfError> {
        self.levels = Self::contract(graph, blocks)?;
        Ok(())
    }

    /// Draws every level top-down, from the edge count down to level `0`.
    pub fn sample_state<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        edge_count: usize,
        blocks: &NestedBlockPrior,
    ) -> Result<(), NetInfError> {
        let depth = blocks.depth();
        let mut levels = vec![LabelGraph::default(); depth];
        let mut top = LabelGraph::new(1);
        top.apply_deltas(&EdgeDeltas::from([((0, 0), edge_count as isize)]))?;
        levels[depth - 1] = top;
        for k in (1..depth).rev() {
            let below = uniform::sample_graph(rng, blocks.level(k), &levels[k])?;
            let identity: Vec<BlockIndex> = below.vertices().collect();
            levels[k - 1] = LabelGraph::from_graph(&below, &identity, below.size())?;
        }
        self.levels = levels;
        Ok(())
    }

    pub fn check_consistency(
        &self,
        graph: &MultiGraph,
        blocks: &NestedBlockPrior,
    ) -> Result<(), NetInfError> {
        let expected = Self::contract(graph, blocks)
            .map_err(|e| NetInfError::consistency("NestedLabelGraphPrior", e.to_string()))?;
        if expected.len() != self.levels.len() {
            return Err(NetInfError::consistency(
                "NestedLabelGraphPrior",
                format!("{} levels cached, {} expected", self.levels.len(), expected.len()),
            ));
        }
        for (k, (cached, recount)) in self.levels.iter().zip(&expected).enumerate() {
            cached.check_against(recount, &format!("NestedLabelGraphPrior level {k}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type Fixture = (MultiGraph, NestedBlockPrior, NestedLabelGraphPrior);

    fn fixture(kind: NestedBlockPriorKind) -> Fixture {
        let graph = MultiGraph::from_edges(
            6,
            [(0, 1, 2), (0, 3, 1), (0, 4, 1), (2, 3, 1), (4, 4, 1), (5, 1, 1), (5, 2, 1)],
        )
        .expect("valid edges");
        let mut blocks = NestedBlockPrior::new(kind, 6, &[3, 2]).expect("prior");
        blocks
            .set_levels(vec![
                Partition::new(vec![0, 0, 1, 1, 2, 2], 3).expect("level 0"),
                Partition::new(vec![0, 0, 1], 2).expect("level 1"),
                Partition::single_block(2),
            ])
            .expect("levels");
        let mut label_graphs = NestedLabelGraphPrior::new();
        label_graphs.recompute_from_graph(&graph, &blocks).expect("recompute");
        (graph, blocks, label_graphs)
    }

    #[test]
    fn contraction_keeps_edge_count_at_every_level() {
        let (graph, blocks, lgs) = fixture(NestedBlockPriorKind::UniformHyper);
        assert_eq!(lgs.levels().len(), 3);
        for lg in lgs.levels() {
            assert_eq!(lg.edge_count(), graph.edge_count());
        }
        assert_eq!(lgs.level(2).map(|lg| lg.get(0, 0)), Some(8));
        assert_eq!(blocks.block_of(4, 1), 1);
        assert_eq!(blocks.block_of(1, 2), 0);
    }

    #[test]
    fn label_move_ratios_match_recomputation() {
        for kind in [NestedBlockPriorKind::Uniform, NestedBlockPriorKind::UniformHyper] {
            let (graph, blocks, lgs) = fixture(kind);
            for (level, v, next) in [(0, 0, 1), (0, 5, 0), (0, 4, 2), (1, 1, 1), (1, 0, 1)] {
                let prev = blocks.level(level).label(v);
                let mv = LabelMove::new(v, prev, next, 0, level);
                let prior_ratio = blocks.log_likelihood_ratio_from_label_move(&mv);
                let lg_ratio = lgs.log_likelihood_ratio_from_label_move(&mv, &graph, &blocks);

                let mut moved_lgs = lgs.clone();
                moved_lgs.apply_label_move(&mv, &graph, &blocks).expect("apply");
                let mut moved = blocks.clone();
                moved.apply_label_move(&mv).expect("apply");
                moved_lgs.check_consistency(&graph, &moved).expect("consistent");

                let expected_prior = moved.log_likelihood() - blocks.log_likelihood();
                let expected_lg = moved_lgs.log_likelihood(&moved) - lgs.log_likelihood(&blocks);
                if expected_prior.is_finite() {
                    assert!((prior_ratio - expected_prior).abs() < 1e-9, "{kind:?} {mv:?}");
                } else {
                    assert_eq!(prior_ratio, f64::NEG_INFINITY);
                }
                assert!((lg_ratio - expected_lg).abs() < 1e-9, "{kind:?} {mv:?}");
            }
        }
    }

    #[test]
    fn graph_move_ratio_matches_recomputation() {
        let (mut graph, blocks, lgs) = fixture(NestedBlockPriorKind::Uniform);
        let mv = GraphMove::new([(0, 3)], [(1, 5)]);
        let ratio = lgs.log_likelihood_ratio_from_graph_move(&mv, &blocks);
        let before = lgs.log_likelihood(&blocks);
        let mut moved = lgs.clone();
        moved.apply_graph_move(&mv, &blocks).expect("apply");
        graph.remove_edge(0, 3).expect("remove");
        graph.add_edge(1, 5).expect("add");
        moved.check_consistency(&graph, &blocks).expect("consistent");
        assert!((moved.log_likelihood(&blocks) - before - ratio).abs() < 1e-9);
    }

    #[test]
    fn creation_is_rejected() {
        let (_, blocks, _) = fixture(NestedBlockPriorKind::Uniform);
        let mv = LabelMove::new(0, 0, 3, 1, 0);
        assert!(blocks.validate_label_move(&mv).is_err());
        assert_eq!(blocks.log_likelihood_ratio_from_label_move(&mv), f64::NEG_INFINITY);
    }

    #[test]
    fn sampled_hierarchy_is_consistent() {
        let mut rng = StdRng::seed_from_u64(17);
        let mut blocks =
            NestedBlockPrior::new(NestedBlockPriorKind::UniformHyper, 20, &[5, 2]).expect("prior");
        blocks.sample_state(&mut rng).expect("sample");
        blocks.check_consistency().expect("consistent");
        let mut lgs = NestedLabelGraphPrior::new();
        lgs.sample_state(&mut rng, 30, &blocks).expect("sample");
        assert_eq!(lgs.levels().len(), 3);
        assert!(lgs.levels().iter().all(|lg| lg.edge_count() == 30));
        assert_eq!(lgs.level(0).map(LabelGraph::block_count), Some(5));
    }
}
