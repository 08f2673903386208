//! A block model whose edge count also feeds a degree prior, so two paths reach one node.

use netinf_core::engine::likelihood::{BlockEnsemble, GraphLikelihood};
use netinf_core::engine::prior::block::BlockPriorKind;
use netinf_core::engine::prior::block_count::BlockCountKind;
use netinf_core::engine::prior::degree::DegreePriorKind;
use netinf_core::engine::prior::edge_count::EdgeCountKind;
use netinf_core::engine::prior::label_graph::LabelGraphPriorKind;
use netinf_core::engine::prior::PriorDag;
use netinf_core::engine::proposer::{EdgeProposerConfig, LabelProposerConfig};
use netinf_core::{NetInfError, RandomGraph};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn diamond_model() -> RandomGraph {
    let mut priors = PriorDag::new();
    let edge_count = priors
        .add_edge_count(EdgeCountKind::Poisson { mean: 12.0 })
        .expect("edge count");
    let block_count = priors
        .add_block_count(BlockCountKind::Uniform { min: 1, max: 3 })
        .expect("block count");
    let block = priors
        .add_block(BlockPriorKind::UniformHyper, 9, block_count)
        .expect("block");
    let label_graph = priors
        .add_label_graph(LabelGraphPriorKind::ErdosRenyi, edge_count, block)
        .expect("label graph");
    priors
        .add_degree(DegreePriorKind::UniformHyper, 9, edge_count)
        .expect("degree");
    let likelihood = GraphLikelihood::StochasticBlockModel {
        ensemble: BlockEnsemble::StubLabeled,
        block,
        label_graph,
    };
    RandomGraph::new(
        9,
        priors,
        likelihood,
        EdgeProposerConfig::default(),
        LabelProposerConfig::default(),
    )
    .expect("model")
}

#[test]
fn shared_parent_is_counted_once() {
    let mut rng = StdRng::seed_from_u64(31);
    let mut model = diamond_model();
    model.sample(&mut rng).expect("sample");
    let priors = model.priors();
    assert_eq!(priors.roots().count(), 2);

    let by_node: f64 = priors
        .ids()
        .map(|id| priors.log_likelihood(id).expect("own term"))
        .sum();
    assert!((model.log_prior() - by_node).abs() < 1e-9);
    // Repeated evaluation must not see stale visit marks.
    assert_eq!(model.log_prior(), model.log_prior());
    assert!(priors.ids().all(|id| !priors.is_processed(id)));
}

#[test]
fn shared_parent_ratios_match_recomputation() {
    let mut rng = StdRng::seed_from_u64(32);
    let mut model = diamond_model();
    model.sample(&mut rng).expect("sample");
    let mut checked = 0;
    for _ in 0..200 {
        let mv = match model.propose_graph_move(&mut rng) {
            Ok(mv) => mv,
            Err(NetInfError::RetryExhausted { .. }) => continue,
            Err(err) => panic!("proposal failed: {err}"),
        };
        if model.is_trivial_graph_move(&mv).expect("trivial") {
            continue;
        }
        let before = model.log_prior();
        let ratio = model.log_prior_ratio_from_graph_move(&mv);
        if !ratio.is_finite() || !before.is_finite() {
            continue;
        }
        model.apply_graph_move(&mv).expect("apply");
        assert!((ratio - (model.log_prior() - before)).abs() < 1e-6, "{mv:?}");
        checked += 1;
    }
    assert!(checked > 0);
    model.check_consistency().expect("consistency");
}

#[test]
fn parent_of_the_wrong_kind_is_rejected() {
    let mut priors = PriorDag::new();
    let block_count = priors
        .add_block_count(BlockCountKind::Delta(2))
        .expect("block count");
    let err = priors
        .add_degree(DegreePriorKind::Uniform, 4, block_count)
        .expect_err("degree prior needs an edge count parent");
    assert!(matches!(err, NetInfError::Safety(_)));
}
