//! Observation models composed with graph priors.

use netinf_core::data::dynamics::{DynamicsConfig, TransitionModel, ACTIVE, INACTIVE};
use netinf_core::engine::likelihood::BlockEnsemble;
use netinf_core::engine::prior::block::BlockPriorKind;
use netinf_core::engine::prior::block_count::BlockCountKind;
use netinf_core::engine::prior::edge_count::EdgeCountKind;
use netinf_core::engine::prior::label_graph::LabelGraphPriorKind;
use netinf_core::engine::proposer::{EdgeProposerConfig, GaussianParamProposer, LabelProposerConfig};
use netinf_core::engine::random_graph::BlockModelSpec;
use netinf_core::{
    DataModel, Dynamics, MoveKind, NetInfError, Observation, RandomGraph, SweepConfig,
    UncertainPoisson,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

const TOLERANCE: f64 = 1e-6;

fn erdos_renyi(size: usize, mean: f64) -> RandomGraph {
    RandomGraph::erdos_renyi(size, EdgeCountKind::Poisson { mean }, EdgeProposerConfig::default())
        .expect("graph prior")
}

fn check_graph_moves<O: Observation>(model: &mut DataModel<O>, rng: &mut StdRng, steps: usize) {
    for _ in 0..steps {
        let mv = match model.graph_prior().propose_graph_move(rng) {
            Ok(mv) => mv,
            Err(NetInfError::RetryExhausted { .. }) => continue,
            Err(err) => panic!("proposal failed: {err}"),
        };
        if mv.cancels_out() {
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
            model.observation().name(),
            after - before
        );
    }
    model.check_consistency().expect("consistency");
}

#[test]
fn every_transition_model_tracks_graph_moves() {
    let models = [
        TransitionModel::Sis {
            infection: 0.3,
            recovery: 0.2,
        },
        TransitionModel::Glauber { coupling: 0.5 },
        TransitionModel::Voter { random_flip: 0.1 },
        TransitionModel::Cowan {
            nu: 1.5,
            a: 0.3,
            mu: 1.0,
            eta: 0.5,
        },
    ];
    for (seed, transition) in models.into_iter().enumerate() {
        for async_mode in [false, true] {
            let config = DynamicsConfig {
                auto_activation: 0.02,
                auto_deactivation: 0.01,
                async_mode,
                ..DynamicsConfig::with_length(15)
            };
            let dynamics = Dynamics::new(transition, config, 7).expect("dynamics");
            let mut model = DataModel::new(erdos_renyi(7, 9.0), dynamics).expect("model");
            let mut rng = StdRng::seed_from_u64(500 + seed as u64);
            model.sample(&mut rng).expect("sample");
            check_graph_moves(&mut model, &mut rng, 100);
        }
    }
}

#[test]
fn sampled_traces_only_hold_binary_states() {
    let dynamics = Dynamics::new(
        TransitionModel::Glauber { coupling: 1.0 },
        DynamicsConfig {
            initial_active: Some(3),
            burn: 4,
            ..DynamicsConfig::with_length(20)
        },
        6,
    )
    .expect("dynamics");
    let mut model = DataModel::new(erdos_renyi(6, 6.0), dynamics).expect("model");
    let mut rng = StdRng::seed_from_u64(41);
    model.sample(&mut rng).expect("sample");
    let trace = model.observation();
    assert_eq!(trace.past_states().len(), 6);
    for sequence in trace.past_states().iter().chain(trace.future_states()) {
        assert_eq!(sequence.len(), 20);
        assert!(sequence.iter().all(|&s| s == ACTIVE || s == INACTIVE));
    }
    assert!(model.log_likelihood().is_finite());
}

#[test]
fn block_prior_with_noisy_observation_tracks_moves() {
    let spec = BlockModelSpec {
        edge_count: EdgeCountKind::Poisson { mean: 14.0 },
        block_count: BlockCountKind::Uniform { min: 1, max: 3 },
        block: BlockPriorKind::UniformHyper,
        label_graph: LabelGraphPriorKind::PlantedPartition,
        ensemble: BlockEnsemble::StubLabeled,
    };
    let prior = RandomGraph::stochastic_block_model(
        8,
        spec,
        EdgeProposerConfig::default(),
        LabelProposerConfig::default(),
    )
    .expect("graph prior");
    let observation = UncertainPoisson::new(8, 0.2, 4.0).expect("observation");
    let mut model = DataModel::new(prior, observation).expect("model");
    let mut rng = StdRng::seed_from_u64(42);
    model.sample(&mut rng).expect("sample");
    check_graph_moves(&mut model, &mut rng, 200);
}

#[test]
fn parameter_steps_keep_parameters_in_range() {
    let observation = UncertainPoisson::new(6, 0.5, 3.0).expect("observation");
    let mut model = DataModel::new(erdos_renyi(6, 6.0), observation)
        .expect("model")
        .with_param_proposer(GaussianParamProposer::new("edge_average", 0.5).expect("proposer"))
        .expect("known parameter")
        .with_param_proposer(GaussianParamProposer::new("no_edge_average", 0.5).expect("proposer"))
        .expect("known parameter");
    let mut rng = StdRng::seed_from_u64(43);
    model.sample(&mut rng).expect("sample");
    for _ in 0..300 {
        let step = model.metropolis_param_step(&mut rng).expect("param step");
        assert!(matches!(step.kind, MoveKind::Param(_)));
    }
    assert!(model.observation().edge_average() > 0.0);
    assert!(model.observation().no_edge_average() > 0.0);
}

#[test]
fn frozen_channels_leave_their_state_alone() {
    let observation = UncertainPoisson::new(6, 0.5, 3.0).expect("observation");
    let mut model = DataModel::new(erdos_renyi(6, 6.0), observation)
        .expect("model")
        .with_param_proposer(GaussianParamProposer::new("edge_average", 0.3).expect("proposer"))
        .expect("known parameter");
    let mut rng = StdRng::seed_from_u64(44);
    model.sample(&mut rng).expect("sample");
    let edges = model.graph().sorted_edges();

    let config = SweepConfig {
        graph_rate: 0.0,
        prior_rate: 0.0,
        param_rate: 1.0,
        ..SweepConfig::with_steps(1)
    };
    for _ in 0..100 {
        model.step(&mut rng, &config).expect("step");
    }
    assert_eq!(model.graph().sorted_edges(), edges);
}
