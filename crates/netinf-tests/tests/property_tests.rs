//! Property tests for graph bookkeeping, proposal reversibility and acceptance.

use netinf_core::engine::metropolis::{accept, LogRatios};
use netinf_core::engine::prior::block::Partition;
use netinf_core::engine::prior::edge_count::EdgeCountKind;
use netinf_core::engine::proposer::{EdgeProposerConfig, EdgeProposerKind};
use netinf_core::mcmc::EdgeMultiplicityCollector;
use netinf_core::{McmcSummary, MoveKind, MultiGraph, RandomGraph, StepResult};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn edge_list(size: usize) -> impl Strategy<Value = Vec<(usize, usize, usize)>> {
    prop::collection::vec((0..size, 0..size, 1usize..4), 0..20)
}

fn proposer_kind() -> impl Strategy<Value = EdgeProposerKind> {
    prop_oneof![
        Just(EdgeProposerKind::SingleEdge),
        Just(EdgeProposerKind::HingeFlip),
        Just(EdgeProposerKind::DoubleEdgeSwap),
        Just(EdgeProposerKind::Canonical),
        Just(EdgeProposerKind::Microcanonical),
    ]
}

proptest! {
    #[test]
    fn degrees_sum_to_twice_the_edge_count(edges in edge_list(8)) {
        let graph = MultiGraph::from_edges(8, edges.iter().copied()).unwrap();
        let expected: usize = edges.iter().map(|&(_, _, m)| m).sum();
        prop_assert_eq!(graph.edge_count(), expected);
        prop_assert_eq!(graph.degrees().iter().sum::<usize>(), 2 * expected);
        let listed: usize = graph.edges().map(|(_, _, m)| m).sum();
        prop_assert_eq!(listed, expected);
    }

    #[test]
    fn reversed_graph_moves_undo_their_proposal_ratio(
        edges in edge_list(7),
        kind in proposer_kind(),
        seed in any::<u64>(),
    ) {
        let graph = MultiGraph::from_edges(7, edges).unwrap();
        let mut model = RandomGraph::erdos_renyi(
            7,
            EdgeCountKind::Poisson { mean: 10.0 },
            EdgeProposerConfig::with_kind(kind),
        )
        .unwrap();
        model.set_state(graph).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        let Ok(mv) = model.propose_graph_move(&mut rng) else {
            return Ok(());
        };
        prop_assume!(!model.is_trivial_graph_move(&mv).unwrap());
        let forward = model.log_proposal_ratio_from_graph_move(&mv).unwrap();
        prop_assert!(forward.is_finite(), "{:?} has ratio {}", mv, forward);

        let before = model.graph().clone();
        model.apply_graph_move(&mv).unwrap();
        let backward = model.log_proposal_ratio_from_graph_move(&mv.reversed()).unwrap();
        prop_assert!((forward + backward).abs() < 1e-9, "{:?}: {} vs {}", mv, forward, backward);

        model.apply_graph_move(&mv.reversed()).unwrap();
        prop_assert_eq!(model.graph(), &before);
    }

    #[test]
    fn reversed_label_moves_restore_the_partition(
        size in 1usize..12,
        blocks in 1usize..5,
        vertex in any::<prop::sample::Index>(),
        next in 0usize..6,
    ) {
        let blocks = blocks.min(size);
        let labels = (0..size).map(|v| v % blocks).collect();
        let original = Partition::new(labels, blocks).unwrap();
        let v = vertex.index(size);
        let Ok(mv) = original.label_move(v, next, 0) else {
            return Ok(());
        };
        let mut partition = original.clone();
        partition.apply_label_move(&mv).unwrap();
        prop_assert_eq!(
            partition.block_count() as i64,
            blocks as i64 + i64::from(mv.added_labels)
        );
        partition.apply_label_move(&mv.reversed()).unwrap();
        prop_assert_eq!(partition, original);
    }

    #[test]
    fn impossible_moves_are_never_accepted(
        likelihood in -50.0f64..50.0,
        proposal in -5.0f64..5.0,
        beta in 0.1f64..2.0,
        seed in any::<u64>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let ratios = LogRatios { likelihood, prior: f64::NEG_INFINITY, proposal };
        prop_assert!(!accept(&mut rng, ratios.log_acceptance(beta, beta)));
        // A frozen prior ignores its term.
        let frozen = ratios.log_acceptance(beta, 0.0);
        prop_assert!((frozen - (beta * likelihood + proposal)).abs() < 1e-12);
    }

    #[test]
    fn joined_summaries_add_up(outcomes in prop::collection::vec((0usize..3, any::<bool>()), 0..60)) {
        let kinds = [MoveKind::Added, MoveKind::Removed, MoveKind::LabelMove];
        let mut whole = McmcSummary::new();
        let mut left = McmcSummary::new();
        let mut right = McmcSummary::new();
        for (i, &(kind, accepted)) in outcomes.iter().enumerate() {
            let step = StepResult::new(kinds[kind].clone(), 0.5, accepted);
            whole.update(&step);
            if i % 2 == 0 { left.update(&step) } else { right.update(&step) }
        }
        left.join(&right);
        prop_assert_eq!(left.total(), outcomes.len());
        prop_assert_eq!(left.accepted(), whole.accepted());
        for kind in &kinds {
            prop_assert_eq!(left.counts(kind), whole.counts(kind));
        }
        prop_assert!((0.0..=1.0).contains(&whole.acceptance_rate()));
    }

    #[test]
    fn edge_marginals_are_distributions(samples in prop::collection::vec(edge_list(5), 1..10)) {
        let mut collector = EdgeMultiplicityCollector::default();
        for edges in &samples {
            collector.collect(&MultiGraph::from_edges(5, edges.iter().copied()).unwrap());
        }
        for (edge, probs) in collector.edge_probs() {
            let total: f64 = probs.iter().sum();
            prop_assert!((total - 1.0).abs() < 1e-9, "{:?}: {:?}", edge, probs);
        }
    }
}
