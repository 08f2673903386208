//! Observation models and their composition with a latent random graph.
//!
//! - **model**: the [`Observation`] contract and the [`DataModel`] that drives it
//! - **dynamics**: binary dynamical processes observed on the vertices
//! - **uncertain**: noisy edge counts observed on vertex pairs

pub mod dynamics;
pub mod model;
pub mod uncertain;

pub use dynamics::{Dynamics, DynamicsConfig, TransitionModel};
pub use model::{DataModel, Observation};
pub use uncertain::UncertainPoisson;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::graph::MultiGraph;
    use crate::engine::metropolis::SweepConfig;
    use crate::engine::moves::{GraphMove, ParamMove};
    use crate::engine::prior::edge_count::EdgeCountKind;
    use crate::engine::proposer::{EdgeProposerConfig, GaussianParamProposer};
    use crate::engine::random_graph::RandomGraph;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sis_model() -> DataModel<Dynamics> {
        let graph_prior = RandomGraph::erdos_renyi(
            6,
            EdgeCountKind::Delta(6),
            EdgeProposerConfig::default(),
        )
        .expect("graph prior");
        let dynamics = Dynamics::new(
            TransitionModel::Sis {
                infection: 0.4,
                recovery: 0.3,
            },
            DynamicsConfig {
                auto_activation: 0.05,
                ..DynamicsConfig::with_length(12)
            },
            6,
        )
        .expect("dynamics");
        let mut model = DataModel::new(graph_prior, dynamics).expect("data model");
        let mut rng = StdRng::seed_from_u64(21);
        model.sample(&mut rng).expect("sample");
        model
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let graph_prior = RandomGraph::erdos_renyi(
            4,
            EdgeCountKind::Delta(2),
            EdgeProposerConfig::default(),
        )
        .expect("graph prior");
        let observation = UncertainPoisson::new(5, 0.1, 1.0).expect("observation");
        assert!(DataModel::new(graph_prior, observation).is_err());
    }

    #[test]
    fn joint_ratio_matches_recomputation() {
        let mut model = sis_model();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..30 {
            let mv = model
                .graph_prior()
                .propose_graph_move(&mut rng)
                .expect("move");
            let before = model.log_joint().expect("joint");
            let ratio = model.log_joint_ratio_from_graph_move(&mv).expect("ratio");
            model.apply_graph_move(&mv).expect("apply");
            let after = model.log_joint().expect("joint");
            if before.is_finite() && after.is_finite() {
                assert!((ratio - (after - before)).abs() < 1e-6, "{mv:?}");
            }
        }
        model.check_consistency().expect("consistency");
    }

    #[test]
    fn param_ratio_leaves_the_parameter_untouched() {
        let mut model = sis_model();
        let mv = ParamMove::new("infection", 0.1);
        let ratio = model
            .log_likelihood_ratio_from_param_move(&mv)
            .expect("ratio");
        let infection = model.observation().model().param("infection").expect("infection");
        assert!((infection - 0.4).abs() < 1e-12);
        let before = model.log_likelihood();
        model.apply_param_move(&mv).expect("apply");
        assert!((ratio - (model.log_likelihood() - before)).abs() < 1e-9);
        assert!(model
            .apply_param_move(&ParamMove::new("infection", 2.0))
            .is_err());
    }

    #[test]
    fn unknown_param_proposers_are_rejected() {
        let model = sis_model();
        let proposer = GaussianParamProposer::new("coupling", 0.1).expect("proposer");
        assert!(model.with_param_proposer(proposer).is_err());
    }

    #[test]
    fn sweep_over_all_channels_stays_consistent() {
        let model = sis_model();
        let proposer = GaussianParamProposer::new("recovery", 0.05).expect("proposer");
        let mut model = model.with_param_proposer(proposer).expect("proposer");
        let config = SweepConfig {
            param_rate: 0.5,
            ..SweepConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..200 {
            model.step(&mut rng, &config).expect("step");
        }
        model.check_safety().expect("safety");
        model.check_consistency().expect("consistency");
        let recovery = model.observation().model().param("recovery").expect("recovery");
        assert!((0.0..=1.0).contains(&recovery));
    }

    #[test]
    fn uncertain_graph_moves_update_the_prior_graph() {
        let graph_prior = RandomGraph::erdos_renyi(
            5,
            EdgeCountKind::Poisson { mean: 4.0 },
            EdgeProposerConfig::default(),
        )
        .expect("graph prior");
        let observation = UncertainPoisson::new(5, 0.2, 2.0).expect("observation");
        let mut model = DataModel::new(graph_prior, observation).expect("data model");
        let graph = MultiGraph::from_edges(5, [(0, 1, 1), (1, 2, 1)]).expect("graph");
        model.set_graph(graph).expect("graph");
        model
            .apply_graph_move(&GraphMove::addition(3, 4))
            .expect("apply");
        assert_eq!(model.graph().edge_count(), 3);
        assert_eq!(model.graph_prior().edge_count(), 3);
    }
}
