//! Incremental ratios of every model family checked against full recomputation.

use netinf_core::engine::likelihood::BlockEnsemble;
use netinf_core::engine::prior::block::BlockPriorKind;
use netinf_core::engine::prior::block_count::BlockCountKind;
use netinf_core::engine::prior::degree::DegreePriorKind;
use netinf_core::engine::prior::edge_count::EdgeCountKind;
use netinf_core::engine::prior::label_graph::LabelGraphPriorKind;
use netinf_core::engine::prior::nested::NestedBlockPriorKind;
use netinf_core::engine::proposer::{EdgeProposerConfig, EdgeProposerKind, LabelProposerConfig};
use netinf_core::engine::random_graph::{BlockModelSpec, ModelStatus, NestedBlockModelSpec};
use netinf_core::{GraphMove, MultiGraph, NetInfError, RandomGraph, SweepConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;

const TOLERANCE: f64 = 1e-6;

const EDGE_PROPOSERS: [EdgeProposerKind; 5] = [
    EdgeProposerKind::SingleEdge,
    EdgeProposerKind::HingeFlip,
    EdgeProposerKind::DoubleEdgeSwap,
    EdgeProposerKind::Canonical,
    EdgeProposerKind::Microcanonical,
];

fn block_model(size: usize, ensemble: BlockEnsemble, label_graph: LabelGraphPriorKind) -> RandomGraph {
    let spec = BlockModelSpec {
        edge_count: EdgeCountKind::Poisson { mean: 2.0 * size as f64 },
        block_count: BlockCountKind::Uniform { min: 1, max: 4 },
        block: BlockPriorKind::UniformHyper,
        label_graph,
        ensemble,
    };
    RandomGraph::stochastic_block_model(
        size,
        spec,
        EdgeProposerConfig::default(),
        LabelProposerConfig::default(),
    )
    .expect("block model")
}

fn nested_model(size: usize) -> RandomGraph {
    let spec = NestedBlockModelSpec {
        edge_count: EdgeCountKind::Poisson { mean: 2.0 * size as f64 },
        block_counts: vec![4, 2],
        block: NestedBlockPriorKind::UniformHyper,
        ensemble: BlockEnsemble::StubLabeled,
    };
    RandomGraph::nested_stochastic_block_model(
        size,
        spec,
        EdgeProposerConfig::default(),
        LabelProposerConfig::default(),
    )
    .expect("nested model")
}

/// Proposes, scores and applies `steps` graph moves, comparing each ratio with the change
/// of the recomputed log-joint.
fn check_graph_moves(model: &mut RandomGraph, rng: &mut StdRng, steps: usize) {
    for _ in 0..steps {
        let mv = match model.propose_graph_move(rng) {
            Ok(mv) => mv,
            Err(NetInfError::RetryExhausted { .. } | NetInfError::UnsupportedMove(_)) => continue,
            Err(err) => panic!("proposal failed: {err}"),
        };
        if model.is_trivial_graph_move(&mv).expect("trivial") {
            continue;
        }
        let before = model.log_joint().expect("joint");
        let ratio = model.log_joint_ratio_from_graph_move(&mv).expect("ratio");
        if !ratio.is_finite() || !before.is_finite() {
            continue;
        }
        model.apply_graph_move(&mv).expect("apply");
        let after = model.log_joint().expect("joint");
        assert!(
            (ratio - (after - before)).abs() < TOLERANCE,
            "{} {mv:?}: ratio {ratio}, recomputed {}",
            model.likelihood().name(),
            after - before
        );
    }
    model.check_consistency().expect("consistency");
}

fn check_label_moves(model: &mut RandomGraph, rng: &mut StdRng, steps: usize) {
    for _ in 0..steps {
        let mv = model.propose_label_move(rng).expect("label move");
        if mv.is_trivial() {
            continue;
        }
        let before = model.log_joint().expect("joint");
        let ratio = model.log_joint_ratio_from_label_move(&mv).expect("ratio");
        if !ratio.is_finite() || !before.is_finite() {
            continue;
        }
        model.apply_label_move(&mv).expect("apply");
        let after = model.log_joint().expect("joint");
        assert!(
            (ratio - (after - before)).abs() < TOLERANCE,
            "{mv:?}: ratio {ratio}, recomputed {}",
            after - before
        );
    }
    model.check_consistency().expect("consistency");
}

#[test]
fn five_vertex_addition_updates_edge_count() {
    let graph = MultiGraph::from_edges(5, [(0, 1, 2), (0, 3, 1), (0, 4, 1), (2, 3, 1)]).expect("graph");
    let mut model = RandomGraph::erdos_renyi(
        5,
        EdgeCountKind::Poisson { mean: 5.0 },
        EdgeProposerConfig::with_kind(EdgeProposerKind::SingleEdge),
    )
    .expect("model");
    model.set_state(graph).expect("state");
    assert_eq!(model.edge_count(), 5);

    let mv = GraphMove::addition(1, 2);
    // Poisson(6; 5) / Poisson(5; 5) = 5 / 6
    let prior_ratio = model.log_prior_ratio_from_graph_move(&mv);
    assert!((prior_ratio - (5.0f64 / 6.0).ln()).abs() < 1e-12);

    let before = model.log_joint().expect("joint");
    let ratio = model.log_joint_ratio_from_graph_move(&mv).expect("ratio");
    model.apply_graph_move(&mv).expect("apply");
    assert_eq!(model.edge_count(), 6);
    assert_eq!(model.graph().degree(1), 3);
    assert!((ratio - (model.log_joint().expect("joint") - before)).abs() < TOLERANCE);
}

#[test]
fn erdos_renyi_ratios_match_for_every_proposer() {
    for (seed, kind) in EDGE_PROPOSERS.into_iter().enumerate() {
        let mut rng = StdRng::seed_from_u64(seed as u64);
        let mut model = RandomGraph::erdos_renyi(
            10,
            EdgeCountKind::Poisson { mean: 15.0 },
            EdgeProposerConfig::with_kind(kind),
        )
        .expect("model");
        model.sample(&mut rng).expect("sample");
        check_graph_moves(&mut model, &mut rng, 200);
    }
}

#[test]
fn edge_count_chain_recovers_its_prior() {
    let mean = 3.0f64;
    let poisson = |k: usize| {
        let log_fact: f64 = (1..=k).map(|i| (i as f64).ln()).sum();
        (k as f64 * mean.ln() - mean - log_fact).exp()
    };
    for kind in [EdgeProposerKind::SingleEdge, EdgeProposerKind::Canonical] {
        let mut rng = StdRng::seed_from_u64(90);
        let mut model = RandomGraph::erdos_renyi(
            4,
            EdgeCountKind::Poisson { mean },
            EdgeProposerConfig::with_kind(kind),
        )
        .expect("model");
        model.sample(&mut rng).expect("sample");
        let steps = 200_000;
        let mut visits = vec![0usize; 64];
        for _ in 0..steps {
            match model.metropolis_graph_step(&mut rng, 1.0, 1.0) {
                Ok(_) | Err(NetInfError::RetryExhausted { .. }) => {}
                Err(err) => panic!("{kind} step failed: {err}"),
            }
            visits[model.edge_count().min(63)] += 1;
        }
        let average: f64 = visits
            .iter()
            .enumerate()
            .map(|(k, &n)| k as f64 * n as f64)
            .sum::<f64>()
            / steps as f64;
        assert!((average - mean).abs() < 0.15, "{kind}: mean edge count {average}");
        for (k, &n) in visits.iter().enumerate().take(7) {
            let frequency = n as f64 / steps as f64;
            assert!(
                (frequency - poisson(k)).abs() < 0.02,
                "{kind}: P(E = {k}) is {frequency}, prior gives {}",
                poisson(k)
            );
        }
    }
}

#[test]
fn simple_erdos_renyi_keeps_its_policy() {
    let mut rng = StdRng::seed_from_u64(21);
    let config = EdgeProposerConfig {
        allow_self_loops: false,
        allow_multiedges: false,
        ..EdgeProposerConfig::with_kind(EdgeProposerKind::SingleEdge)
    };
    let mut model =
        RandomGraph::erdos_renyi(12, EdgeCountKind::Poisson { mean: 10.0 }, config).expect("model");
    model.sample(&mut rng).expect("sample");
    check_graph_moves(&mut model, &mut rng, 300);
    for (u, v, m) in model.graph().edges() {
        assert_ne!(u, v, "self-loop ({u}, {v})");
        assert_eq!(m, 1, "parallel edge ({u}, {v})");
    }
}

#[test]
fn configuration_ratios_match_for_every_proposer() {
    for (seed, kind) in EDGE_PROPOSERS.into_iter().enumerate() {
        let mut rng = StdRng::seed_from_u64(100 + seed as u64);
        let mut model = RandomGraph::configuration(
            10,
            EdgeCountKind::Poisson { mean: 12.0 },
            DegreePriorKind::UniformHyper,
            EdgeProposerConfig::with_kind(kind),
        )
        .expect("model");
        model.sample(&mut rng).expect("sample");
        check_graph_moves(&mut model, &mut rng, 200);
    }
}

#[test]
fn block_model_ratios_match_for_both_ensembles() {
    for (seed, ensemble) in [BlockEnsemble::StubLabeled, BlockEnsemble::Uniform]
        .into_iter()
        .enumerate()
    {
        for label_graph in [LabelGraphPriorKind::ErdosRenyi, LabelGraphPriorKind::PlantedPartition] {
            let mut rng = StdRng::seed_from_u64(200 + seed as u64);
            let mut model = block_model(10, ensemble, label_graph);
            model.sample(&mut rng).expect("sample");
            check_graph_moves(&mut model, &mut rng, 150);
            check_label_moves(&mut model, &mut rng, 150);
        }
    }
}

#[test]
fn nested_block_model_ratios_match() {
    let mut rng = StdRng::seed_from_u64(300);
    let mut model = nested_model(12);
    model.sample(&mut rng).expect("sample");
    assert!(model.is_nested());
    assert_eq!(model.nested_labels(1).map(<[usize]>::len), Some(4));
    check_graph_moves(&mut model, &mut rng, 150);
    check_label_moves(&mut model, &mut rng, 150);
}

#[test]
fn sampling_leaves_every_model_consistent() {
    let mut rng = StdRng::seed_from_u64(400);
    let mut models = vec![
        RandomGraph::erdos_renyi(
            8,
            EdgeCountKind::Poisson { mean: 8.0 },
            EdgeProposerConfig::default(),
        )
        .expect("erdos-renyi"),
        RandomGraph::configuration(
            8,
            EdgeCountKind::Delta(10),
            DegreePriorKind::Uniform,
            EdgeProposerConfig::default(),
        )
        .expect("configuration"),
        block_model(8, BlockEnsemble::StubLabeled, LabelGraphPriorKind::ErdosRenyi),
        nested_model(8),
    ];
    for model in &mut models {
        assert_eq!(model.status(), ModelStatus::Uninitialized);
        for _ in 0..5 {
            model.sample(&mut rng).expect("sample");
            model.check_safety().expect("safety");
            model.check_consistency().expect("consistency");
        }
        assert_eq!(model.status(), ModelStatus::Ready);
    }
    assert_eq!(models[1].edge_count(), 10);
}

#[test]
fn chains_replay_under_the_same_seed() {
    let run = |seed: u64| {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut model = block_model(9, BlockEnsemble::StubLabeled, LabelGraphPriorKind::ErdosRenyi);
        model.sample(&mut rng).expect("sample");
        let config = SweepConfig::with_steps(1);
        let steps: Vec<_> = (0..300)
            .map(|_| model.step(&mut rng, &config).expect("step"))
            .collect();
        (steps, model.graph().sorted_edges(), model.labels().map(<[usize]>::to_vec))
    };
    assert_eq!(run(8), run(8));
}
