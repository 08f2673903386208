//! Full runs of the driver with collectors attached.

use netinf_core::engine::likelihood::BlockEnsemble;
use netinf_core::engine::prior::block::BlockPriorKind;
use netinf_core::engine::prior::block_count::BlockCountKind;
use netinf_core::engine::prior::edge_count::EdgeCountKind;
use netinf_core::engine::prior::label_graph::LabelGraphPriorKind;
use netinf_core::engine::proposer::{EdgeProposerConfig, GaussianParamProposer, LabelProposerConfig};
use netinf_core::engine::random_graph::BlockModelSpec;
use netinf_core::mcmc::{
    ConsistencyCheck, EdgeMultiplicityCollector, PartitionCollector, SafetyCheck, Scalar,
    ScalarCollector, VerboseCallback,
};
use netinf_core::{
    DataModel, Mcmc, McmcConfig, MoveKind, RandomGraph, SweepConfig, UncertainPoisson,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn block_model(size: usize, rng: &mut StdRng) -> RandomGraph {
    let spec = BlockModelSpec {
        edge_count: EdgeCountKind::Poisson { mean: 2.0 * size as f64 },
        block_count: BlockCountKind::Uniform { min: 1, max: 3 },
        block: BlockPriorKind::UniformHyper,
        label_graph: LabelGraphPriorKind::ErdosRenyi,
        ensemble: BlockEnsemble::StubLabeled,
    };
    let mut model = RandomGraph::stochastic_block_model(
        size,
        spec,
        EdgeProposerConfig::default(),
        LabelProposerConfig::default(),
    )
    .expect("block model");
    model.sample(rng).expect("sample");
    model
}

fn noisy_model(seed: u64) -> DataModel<UncertainPoisson> {
    let mut rng = StdRng::seed_from_u64(seed);
    let prior = block_model(8, &mut rng);
    let observation = UncertainPoisson::new(8, 0.1, 5.0).expect("observation");
    let mut model = DataModel::new(prior, observation)
        .expect("model")
        .with_param_proposer(GaussianParamProposer::new("edge_average", 0.2).expect("proposer"))
        .expect("known parameter");
    model.sample(&mut rng).expect("sample");
    model
}

#[test]
fn block_model_run_collects_partitions() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(60);
    let config = McmcConfig {
        sweeps: 10,
        burn: 3,
        seed: 61,
        sweep: SweepConfig::with_steps(50),
    };
    let mut mcmc = Mcmc::new(block_model(10, &mut rng), config).expect("mcmc");
    let mut partitions = PartitionCollector::default();
    let mut prior = ScalarCollector::new(Scalar::LogPrior);
    let mut verbose = VerboseCallback;
    let mut safety = SafetyCheck;
    let mut consistency = ConsistencyCheck::default();
    let summary = mcmc
        .run(&mut [
            &mut partitions,
            &mut prior,
            &mut verbose,
            &mut safety,
            &mut consistency,
        ])
        .expect("run");

    assert_eq!(summary.total(), 500);
    assert!(summary.counts(&MoveKind::LabelMove).total > 0);
    assert_eq!(partitions.partitions().len(), 10);
    assert!(partitions.partitions().iter().all(|labels| labels.len() == 10));
    assert_eq!(prior.values().len(), 10);
}

#[test]
fn data_model_run_estimates_edge_marginals() {
    init_tracing();
    let config = McmcConfig {
        sweeps: 20,
        burn: 5,
        seed: 62,
        sweep: SweepConfig {
            param_rate: 0.2,
            ..SweepConfig::with_steps(40)
        },
    };
    let mut mcmc = Mcmc::new(noisy_model(63), config).expect("mcmc");
    let mut marginals = EdgeMultiplicityCollector::default();
    let mut joint = ScalarCollector::new(Scalar::LogJoint);
    let summary = mcmc
        .run(&mut [&mut marginals, &mut joint, &mut ConsistencyCheck::default()])
        .expect("run");

    assert_eq!(summary.total(), 800);
    assert!(summary.acceptance_rate() <= 1.0);
    assert_eq!(marginals.sample_count(), 20);
    for probs in marginals.edge_probs().values() {
        let total: f64 = probs.iter().sum();
        assert!(total <= 1.0 + 1e-12);
        assert!(probs.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }
    assert!(marginals.marginal_entropy() >= 0.0);
    assert!(joint.mean().is_some_and(f64::is_finite));
    assert!(mcmc.chain().observation().edge_average() > 0.0);
}

#[test]
fn reseeding_replays_from_the_same_state() {
    let config = McmcConfig {
        sweeps: 5,
        burn: 0,
        seed: 64,
        sweep: SweepConfig::with_steps(30),
    };
    let mut first = Mcmc::new(noisy_model(65), config.clone()).expect("mcmc");
    let mut second = Mcmc::new(noisy_model(65), config).expect("mcmc");
    let a = first.run(&mut []).expect("run");
    let b = second.run(&mut []).expect("run");
    assert_eq!(a, b);
    assert_eq!(first.chain().graph(), second.chain().graph());

    first.set_seed(9);
    second.set_seed(9);
    assert_eq!(first.burn(2).expect("burn"), second.burn(2).expect("burn"));
    assert_eq!(first.chain().graph(), second.chain().graph());
}
