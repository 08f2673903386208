//! Graph likelihoods, each reading the prior states it conditions on from a [`PriorDag`].

use std::f64::consts::LN_2;

use rand::seq::{index, SliceRandom};
use rand::Rng;

use crate::engine::block_model::{stub_labeled, uniform};
use crate::engine::errors::NetInfError;
use crate::engine::generators::{pair_with_loops, pair_without_loops, sample_multiset};
use crate::engine::graph::{ordered, MultiGraph};
use crate::engine::moves::{GraphMove, LabelMove};
use crate::engine::numeric::{log_binomial, log_factorial, log_multiset};
use crate::engine::prior::block::Partition;
use crate::engine::prior::label_graph::{EdgeDeltas, LabelGraph};
use crate::engine::prior::{PriorDag, PriorId};

/// How edges are spread inside a block model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BlockEnsemble {
    #[default]
    StubLabeled,
    Uniform,
}

/// Distribution of the graph given its priors.
///
/// Each variant names the priors it reads; [`GraphLikelihood::check_safety`] verifies that
/// they exist with the expected kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphLikelihood {
    /// Uniform over graphs with `E` edges under the given self-loop and multiedge policy.
    ErdosRenyi {
        edge_count: PriorId,
        self_loops: bool,
        multiedges: bool,
    },
    /// Configuration model with a degree prior, sampled by stub matching.
    Configuration { edge_count: PriorId, degree: PriorId },
    StochasticBlockModel {
        ensemble: BlockEnsemble,
        block: PriorId,
        label_graph: PriorId,
    },
    /// Block model on the bottom level of a hierarchy.
    NestedStochasticBlockModel {
        ensemble: BlockEnsemble,
        nested_block: PriorId,
        label_graph: PriorId,
    },
}

fn pair_count(size: usize, self_loops: bool) -> usize {
    if self_loops {
        size * (size + 1) / 2
    } else {
        size * size.saturating_sub(1) / 2
    }
}

/// `ln A_ij!`, or `ln m! + m ln 2` for a self-loop.
fn edge_term(u: usize, v: usize, m: usize) -> f64 {
    if u == v {
        log_factorial(m) + m as f64 * LN_2
    } else {
        log_factorial(m)
    }
}

/// `-ln (2E - 1)!!`.
fn matching_term(edge_count: usize) -> f64 {
    -log_factorial(2 * edge_count) + edge_count as f64 * LN_2 + log_factorial(edge_count)
}

fn pair_changes(mv: &GraphMove) -> EdgeDeltas {
    let mut changes = EdgeDeltas::new();
    for &(u, v) in &mv.removed {
        *changes.entry(ordered(u, v)).or_insert(0) -= 1;
    }
    for &(u, v) in &mv.added {
        *changes.entry(ordered(u, v)).or_insert(0) += 1;
    }
    changes.retain(|_, d| *d != 0);
    changes
}

struct Blocks<'a> {
    partition: &'a Partition,
    label_graph: &'a LabelGraph,
}

impl GraphLikelihood {
    pub fn name(&self) -> &'static str {
        match self {
            GraphLikelihood::ErdosRenyi { .. } => "ErdosRenyi",
            GraphLikelihood::Configuration { .. } => "Configuration",
            GraphLikelihood::StochasticBlockModel { .. } => "StochasticBlockModel",
            GraphLikelihood::NestedStochasticBlockModel { .. } => "NestedStochasticBlockModel",
        }
    }

    pub fn is_labeled(&self) -> bool {
        matches!(
            self,
            GraphLikelihood::StochasticBlockModel { .. }
                | GraphLikelihood::NestedStochasticBlockModel { .. }
        )
    }

    /// Partition and label graph on which the bottom-level block model is evaluated.
    fn blocks<'a>(&self, priors: &'a PriorDag) -> Result<Option<Blocks<'a>>, NetInfError> {
        match self {
            GraphLikelihood::StochasticBlockModel {
                block, label_graph, ..
            } => Ok(Some(Blocks {
                partition: priors.block_prior(*block)?.partition(),
                label_graph: priors.label_graph_prior(*label_graph)?.state(),
            })),
            GraphLikelihood::NestedStochasticBlockModel {
                nested_block,
                label_graph,
                ..
            } => {
                let levels = priors.nested_label_graph_prior(*label_graph)?;
                let bottom = levels.level(0).ok_or_else(|| {
                    NetInfError::Safety("nested label graph has no levels".into())
                })?;
                Ok(Some(Blocks {
                    partition: priors.nested_block_prior(*nested_block)?.level(0),
                    label_graph: bottom,
                }))
            }
            _ => Ok(None),
        }
    }

    fn ensemble(&self) -> BlockEnsemble {
        match self {
            GraphLikelihood::StochasticBlockModel { ensemble, .. }
            | GraphLikelihood::NestedStochasticBlockModel { ensemble, .. } => *ensemble,
            _ => BlockEnsemble::default(),
        }
    }

    pub fn log_likelihood(&self, graph: &MultiGraph, priors: &PriorDag) -> Result<f64, NetInfError> {
        match self {
            GraphLikelihood::ErdosRenyi {
                self_loops,
                multiedges,
                ..
            } => {
                let violates = graph
                    .edges()
                    .any(|(u, v, m)| (!self_loops && u == v) || (!multiedges && m > 1));
                if violates {
                    return Ok(f64::NEG_INFINITY);
                }
                let pairs = pair_count(graph.size(), *self_loops);
                Ok(if *multiedges {
                    -log_multiset(pairs, graph.edge_count())
                } else {
                    -log_binomial(pairs, graph.edge_count())
                })
            }
            GraphLikelihood::Configuration { .. } => {
                let degrees: f64 = graph.degrees().into_iter().map(log_factorial).sum();
                let edges: f64 = graph.edges().map(|(u, v, m)| edge_term(u, v, m)).sum();
                Ok(degrees - edges + matching_term(graph.edge_count()))
            }
            _ => {
                let blocks = self.require_blocks(priors)?;
                Ok(match self.ensemble() {
                    BlockEnsemble::StubLabeled => {
                        stub_labeled::log_likelihood(graph, blocks.partition, blocks.label_graph)
                    }
                    BlockEnsemble::Uniform => {
                        uniform::log_likelihood(blocks.partition.sizes(), blocks.label_graph)
                    }
                })
            }
        }
    }

    fn require_blocks<'a>(&self, priors: &'a PriorDag) -> Result<Blocks<'a>, NetInfError> {
        self.blocks(priors)?.ok_or_else(|| {
            NetInfError::Logic(format!("{} carries no vertex labels", self.name()))
        })
    }

    pub fn log_likelihood_ratio_from_graph_move(
        &self,
        graph: &MultiGraph,
        priors: &PriorDag,
        mv: &GraphMove,
    ) -> Result<f64, NetInfError> {
        let changes = pair_changes(mv);
        let mut edge_ratio = 0.0;
        for (&(u, v), &d) in &changes {
            let m = graph.edge_multiplicity(u, v);
            let Some(next) = m.checked_add_signed(d) else {
                return Err(NetInfError::EdgeNotFound {
                    u,
                    v,
                    multiplicity: m,
                });
            };
            edge_ratio += edge_term(u, v, next) - edge_term(u, v, m);
        }
        let edge_count = graph.edge_count();
        let next_edge_count = edge_count
            .checked_add_signed(mv.edge_count_delta())
            .ok_or_else(|| NetInfError::Logic("move removes more edges than exist".into()))?;
        match self {
            GraphLikelihood::ErdosRenyi {
                self_loops,
                multiedges,
                ..
            } => {
                let violates = changes.iter().any(|(&(u, v), &d)| {
                    d > 0
                        && ((!self_loops && u == v)
                            || (!multiedges && graph.edge_multiplicity(u, v) as isize + d > 1))
                });
                if violates {
                    return Ok(f64::NEG_INFINITY);
                }
                if next_edge_count == edge_count {
                    return Ok(0.0);
                }
                let pairs = pair_count(graph.size(), *self_loops);
                let term = |e| {
                    if *multiedges {
                        -log_multiset(pairs, e)
                    } else {
                        -log_binomial(pairs, e)
                    }
                };
                Ok(term(next_edge_count) - term(edge_count))
            }
            GraphLikelihood::Configuration { .. } => {
                let mut degree_changes: EdgeDeltas = EdgeDeltas::new();
                for (&(u, v), &d) in &changes {
                    *degree_changes.entry((u, u)).or_insert(0) += d;
                    *degree_changes.entry((v, v)).or_insert(0) += d;
                }
                let mut ratio = -edge_ratio + matching_term(next_edge_count)
                    - matching_term(edge_count);
                for (&(v, _), &d) in &degree_changes {
                    let k = graph.degree(v);
                    let next = k.checked_add_signed(d).ok_or_else(|| {
                        NetInfError::Logic(format!("degree of vertex {v} would become negative"))
                    })?;
                    ratio += log_factorial(next) - log_factorial(k);
                }
                Ok(ratio)
            }
            _ => {
                let blocks = self.require_blocks(priors)?;
                Ok(match self.ensemble() {
                    BlockEnsemble::StubLabeled => stub_labeled::log_likelihood_ratio_from_graph_move(
                        graph,
                        blocks.partition,
                        blocks.label_graph,
                        mv,
                    ),
                    BlockEnsemble::Uniform => uniform::log_likelihood_ratio_from_graph_move(
                        blocks.partition,
                        blocks.label_graph,
                        mv,
                    ),
                })
            }
        }
    }

    /// Ratio for a label move; only moves on the bottom level change the likelihood.
    pub fn log_likelihood_ratio_from_label_move(
        &self,
        graph: &MultiGraph,
        priors: &PriorDag,
        mv: &LabelMove,
    ) -> Result<f64, NetInfError> {
        if !self.is_labeled() {
            return Err(NetInfError::UnsupportedMove(format!(
                "{} does not accept label moves",
                self.name()
            )));
        }
        if mv.level > 0 || mv.is_trivial() {
            return Ok(0.0);
        }
        let blocks = self.require_blocks(priors)?;
        Ok(match self.ensemble() {
            BlockEnsemble::StubLabeled => stub_labeled::log_likelihood_ratio_from_label_move(
                graph,
                blocks.partition,
                blocks.label_graph,
                mv,
            ),
            BlockEnsemble::Uniform => uniform::log_likelihood_ratio_from_label_move(
                graph,
                blocks.partition,
                blocks.label_graph,
                mv,
            ),
        })
    }

    /// Draws a graph on `size` vertices given the current prior states.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        priors: &PriorDag,
        size: usize,
    ) -> Result<MultiGraph, NetInfError> {
        match self {
            GraphLikelihood::ErdosRenyi {
                edge_count,
                self_loops,
                multiedges,
            } => {
                let edges = priors.edge_count_prior(*edge_count)?.state();
                let pairs = pair_count(size, *self_loops);
                let decode = |i| {
                    if *self_loops {
                        pair_with_loops(i, size)
                    } else {
                        pair_without_loops(i, size)
                    }
                };
                let mut graph = MultiGraph::new(size);
                if *multiedges {
                    let counts = sample_multiset(rng, pairs, edges)?;
                    for (i, m) in counts.into_iter().enumerate().filter(|(_, m)| *m > 0) {
                        let (u, v) = decode(i);
                        graph.add_multiedge(u, v, m)?;
                    }
                } else {
                    if edges > pairs {
                        return Err(NetInfError::InvalidArgument(format!(
                            "{edges} edges do not fit in {pairs} vertex pairs"
                        )));
                    }
                    for i in index::sample(rng, pairs, edges) {
                        let (u, v) = decode(i);
                        graph.add_edge(u, v)?;
                    }
                }
                Ok(graph)
            }
            GraphLikelihood::Configuration { degree, .. } => {
                let degrees = priors.degree_prior(*degree)?.degrees();
                if degrees.len() != size {
                    return Err(NetInfError::SizeMismatch {
                        expected: size,
                        actual: degrees.len(),
                    });
                }
                let mut stubs: Vec<usize> = degrees
                    .iter()
                    .enumerate()
                    .flat_map(|(v, &k)| std::iter::repeat(v).take(k))
                    .collect();
                if stubs.len() % 2 != 0 {
                    return Err(NetInfError::InvalidArgument(
                        "degree sequence has an odd sum".into(),
                    ));
                }
                stubs.shuffle(rng);
                let mut graph = MultiGraph::new(size);
                for pair in stubs.chunks_exact(2) {
                    graph.add_edge(pair[0], pair[1])?;
                }
                Ok(graph)
            }
            _ => {
                let blocks = self.require_blocks(priors)?;
                if blocks.partition.len() != size {
                    return Err(NetInfError::SizeMismatch {
                        expected: size,
                        actual: blocks.partition.len(),
                    });
                }
                match self.ensemble() {
                    BlockEnsemble::StubLabeled => {
                        stub_labeled::sample_graph(rng, blocks.partition, blocks.label_graph)
                    }
                    BlockEnsemble::Uniform => {
                        uniform::sample_graph(rng, blocks.partition, blocks.label_graph)
                    }
                }
            }
        }
    }

    /// Checks that every prior the likelihood reads exists with the expected kind.
    pub fn check_safety(&self, priors: &PriorDag) -> Result<(), NetInfError> {
        match self {
            GraphLikelihood::ErdosRenyi { edge_count, .. } => {
                priors.edge_count_prior(*edge_count)?;
            }
            GraphLikelihood::Configuration { edge_count, degree } => {
                priors.edge_count_prior(*edge_count)?;
                priors.degree_prior(*degree)?;
            }
            GraphLikelihood::StochasticBlockModel {
                block, label_graph, ..
            } => {
                priors.block_prior(*block)?;
                priors.label_graph_prior(*label_graph)?;
            }
            GraphLikelihood::NestedStochasticBlockModel {
                nested_block,
                label_graph,
                ..
            } => {
                priors.nested_block_prior(*nested_block)?;
                priors.nested_label_graph_prior(*label_graph)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::prior::degree::DegreePriorKind;
    use crate::engine::prior::edge_count::EdgeCountKind;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn five_vertex_graph() -> MultiGraph {
        MultiGraph::from_edges(5, [(0, 1, 2), (0, 3, 1), (0, 4, 1), (2, 3, 1)]).expect("valid edges")
    }

    fn apply(graph: &MultiGraph, mv: &GraphMove) -> MultiGraph {
        let mut next = graph.clone();
        for &(u, v) in &mv.removed {
            next.remove_edge(u, v).expect("remove");
        }
        for &(u, v) in &mv.added {
            next.add_edge(u, v).expect("add");
        }
        next
    }

    fn check_ratios(likelihood: &GraphLikelihood, priors: &PriorDag, graph: &MultiGraph) {
        let before = likelihood.log_likelihood(graph, priors).expect("likelihood");
        for mv in [
            GraphMove::addition(1, 2),
            GraphMove::addition(3, 3),
            GraphMove::removal(0, 1),
            GraphMove::new([(0, 4)], [(2, 4)]),
            GraphMove::new([(0, 1), (2, 3)], [(0, 3), (1, 2)]),
        ] {
            let ratio = likelihood
                .log_likelihood_ratio_from_graph_move(graph, priors, &mv)
                .expect("ratio");
            let after = likelihood
                .log_likelihood(&apply(graph, &mv), priors)
                .expect("likelihood");
            if after == f64::NEG_INFINITY {
                assert_eq!(ratio, f64::NEG_INFINITY, "{mv:?}");
            } else {
                assert!((ratio - (after - before)).abs() < 1e-9, "{mv:?}");
            }
        }
    }

    #[test]
    fn erdos_renyi_ratios_match_recomputation() {
        let mut priors = PriorDag::new();
        let e = priors.add_edge_count(EdgeCountKind::Delta(5)).expect("edge count");
        let simple = MultiGraph::from_edges(5, [(0, 1, 1), (0, 3, 1), (0, 4, 1), (2, 3, 1)])
            .expect("valid edges");
        for (self_loops, multiedges) in [(true, true), (false, true), (false, false)] {
            let likelihood = GraphLikelihood::ErdosRenyi {
                edge_count: e,
                self_loops,
                multiedges,
            };
            let graph = if multiedges { five_vertex_graph() } else { simple.clone() };
            check_ratios(&likelihood, &priors, &graph);
        }
    }

    #[test]
    fn configuration_ratios_match_recomputation() {
        let mut priors = PriorDag::new();
        let e = priors.add_edge_count(EdgeCountKind::Delta(5)).expect("edge count");
        let d = priors.add_degree(DegreePriorKind::Uniform, 5, e).expect("degree");
        let likelihood = GraphLikelihood::Configuration { edge_count: e, degree: d };
        check_ratios(&likelihood, &priors, &five_vertex_graph());
    }

    #[test]
    fn configuration_matches_matching_count_on_a_triangle() {
        let mut priors = PriorDag::new();
        let e = priors.add_edge_count(EdgeCountKind::Delta(3)).expect("edge count");
        let d = priors.add_degree(DegreePriorKind::Uniform, 3, e).expect("degree");
        let triangle = MultiGraph::from_edges(3, [(0, 1, 1), (1, 2, 1), (0, 2, 1)]).expect("edges");
        // 8 of the 15 perfect matchings of six stubs produce the triangle
        let expected = (8.0f64 / 15.0).ln();
        let actual = GraphLikelihood::Configuration { edge_count: e, degree: d }
            .log_likelihood(&triangle, &priors)
            .expect("likelihood");
        assert!((actual - expected).abs() < 1e-9);
    }

    #[test]
    fn simple_erdos_renyi_sample_has_no_multiedges() {
        let mut priors = PriorDag::new();
        let e = priors.add_edge_count(EdgeCountKind::Delta(12)).expect("edge count");
        let likelihood = GraphLikelihood::ErdosRenyi {
            edge_count: e,
            self_loops: false,
            multiedges: false,
        };
        let mut rng = StdRng::seed_from_u64(1);
        let graph = likelihood.sample(&mut rng, &priors, 8).expect("sample");
        assert_eq!(graph.edge_count(), 12);
        assert!(graph.edges().all(|(u, v, m)| u != v && m == 1));
    }

    #[test]
    fn missing_role_is_a_safety_error() {
        let mut priors = PriorDag::new();
        let e = priors.add_edge_count(EdgeCountKind::Delta(1)).expect("edge count");
        let likelihood = GraphLikelihood::Configuration { edge_count: e, degree: e };
        assert!(matches!(likelihood.check_safety(&priors), Err(NetInfError::Safety(_))));
    }
}
