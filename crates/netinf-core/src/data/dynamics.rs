//! Binary dynamical processes observed on the vertices of the latent graph.
//!
//! A trace is a pair of state sequences: `past[v][t]` and `future[v][t] = past[v][t + 1]`
//! for the process that produced them. The likelihood of the trace is the product of the
//! transition probabilities of every vertex at every time step, each depending on how many
//! neighbours were active in the past state. Neighbour tallies are cached per vertex and time
//! step and shifted incrementally when edges move.

use std::collections::BTreeMap;

use rand::seq::index;
use rand::Rng;

use crate::data::model::Observation;
use crate::engine::errors::NetInfError;
use crate::engine::graph::{ordered, MultiGraph, VertexIndex};
use crate::engine::moves::{GraphMove, ParamMove};
use crate::engine::numeric::{clip_prob, sigmoid};

pub type VertexState = usize;

/// Number of inactive and active neighbours, weighted by multiplicity.
pub type NeighbourCounts = [usize; 2];

pub const INACTIVE: VertexState = 0;
pub const ACTIVE: VertexState = 1;

/// Rule giving the activation and deactivation probabilities of a vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransitionModel {
    /// Susceptible-infected-susceptible epidemic.
    Sis { infection: f64, recovery: f64 },
    /// Glauber dynamics of the Ising model.
    Glauber { coupling: f64 },
    /// Voter model; with probability `random_flip` a vertex picks a state at random.
    Voter { random_flip: f64 },
    /// Wilson-Cowan neuron model.
    Cowan { nu: f64, a: f64, mu: f64, eta: f64 },
}

fn is_prob(p: f64) -> bool {
    (0.0..=1.0).contains(&p)
}

impl TransitionModel {
    pub fn name(&self) -> &'static str {
        match self {
            TransitionModel::Sis { .. } => "Sis",
            TransitionModel::Glauber { .. } => "Glauber",
            TransitionModel::Voter { .. } => "Voter",
            TransitionModel::Cowan { .. } => "Cowan",
        }
    }

    pub fn activation_prob(&self, counts: NeighbourCounts) -> f64 {
        let [inactive, active] = counts.map(|c| c as f64);
        match *self {
            TransitionModel::Sis { infection, .. } => 1.0 - (1.0 - infection).powf(active),
            TransitionModel::Glauber { coupling } => sigmoid(2.0 * coupling * (active - inactive)),
            TransitionModel::Voter { random_flip } => {
                random_flip * 0.5 + (1.0 - random_flip) * active_fraction(active, inactive)
            }
            TransitionModel::Cowan { nu, a, mu, .. } => sigmoid(a * (nu * active - mu)),
        }
    }

    pub fn deactivation_prob(&self, counts: NeighbourCounts) -> f64 {
        let [inactive, active] = counts.map(|c| c as f64);
        match *self {
            TransitionModel::Sis { recovery, .. } => recovery,
            TransitionModel::Glauber { coupling } => sigmoid(2.0 * coupling * (inactive - active)),
            TransitionModel::Voter { random_flip } => {
                random_flip * 0.5 + (1.0 - random_flip) * active_fraction(inactive, active)
            }
            TransitionModel::Cowan { eta, .. } => eta,
        }
    }

    fn param_keys(&self) -> &'static [&'static str] {
        match self {
            TransitionModel::Sis { .. } => &["infection", "recovery"],
            TransitionModel::Glauber { .. } => &["coupling"],
            TransitionModel::Voter { .. } => &["random_flip"],
            TransitionModel::Cowan { .. } => &["nu", "a", "mu", "eta"],
        }
    }

    fn param_mut(&mut self, key: &str) -> Option<&mut f64> {
        match (self, key) {
            (TransitionModel::Sis { infection, .. }, "infection") => Some(infection),
            (TransitionModel::Sis { recovery, .. }, "recovery") => Some(recovery),
            (TransitionModel::Glauber { coupling }, "coupling") => Some(coupling),
            (TransitionModel::Voter { random_flip }, "random_flip") => Some(random_flip),
            (TransitionModel::Cowan { nu, .. }, "nu") => Some(nu),
            (TransitionModel::Cowan { a, .. }, "a") => Some(a),
            (TransitionModel::Cowan { mu, .. }, "mu") => Some(mu),
            (TransitionModel::Cowan { eta, .. }, "eta") => Some(eta),
            _ => None,
        }
    }

    fn is_valid_value(key: &str, value: f64) -> bool {
        match key {
            "infection" | "recovery" | "random_flip" | "eta" => is_prob(value),
            "nu" | "a" => value >= 0.0 && value.is_finite(),
            _ => value.is_finite(),
        }
    }

    pub fn param(&self, key: &str) -> Option<f64> {
        let mut copy = *self;
        copy.param_mut(key).map(|v| *v)
    }

    pub fn validate(self) -> Result<Self, NetInfError> {
        for &key in self.param_keys() {
            let value = self.param(key).unwrap_or(f64::NAN);
            if !Self::is_valid_value(key, value) {
                return Err(NetInfError::InvalidArgument(format!(
                    "{} parameter {key} cannot be {value}",
                    self.name()
                )));
            }
        }
        Ok(self)
    }
}

/// Fraction of `numerator` among both counts; one half without neighbours.
fn active_fraction(numerator: f64, other: f64) -> f64 {
    let total = numerator + other;
    if total == 0.0 {
        0.5
    } else {
        numerator / total
    }
}

/// Settings of a dynamics trace.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DynamicsConfig {
    /// Number of recorded transitions.
    pub length: usize,
    /// Leading transitions excluded from the likelihood.
    pub past_length: usize,
    pub auto_activation: f64,
    pub auto_deactivation: f64,
    /// Self-loops count twice towards a vertex's own neighbourhood when accepted.
    pub accept_self_loops: bool,
    /// Update one random vertex at a time instead of all vertices at once.
    pub async_mode: bool,
    /// Unrecorded steps run before the trace starts.
    pub burn: usize,
    /// Number of initially active vertices; uniform random states when `None`.
    pub initial_active: Option<usize>,
}

impl Default for DynamicsConfig {
    fn default() -> Self {
        Self {
            length: 10,
            past_length: 0,
            auto_activation: 0.0,
            auto_deactivation: 0.0,
            accept_self_loops: false,
            async_mode: false,
            burn: 0,
            initial_active: None,
        }
    }
}

impl DynamicsConfig {
    pub fn with_length(length: usize) -> Self {
        Self {
            length,
            ..Self::default()
        }
    }

    pub fn validate(self) -> Result<Self, NetInfError> {
        if self.length == 0 {
            return Err(NetInfError::InvalidArgument(
                "a dynamics trace needs at least one transition".into(),
            ));
        }
        if self.past_length > self.length {
            return Err(NetInfError::InvalidArgument(format!(
                "past_length {} exceeds length {}",
                self.past_length, self.length
            )));
        }
        if !is_prob(self.auto_activation) || !is_prob(self.auto_deactivation) {
            return Err(NetInfError::InvalidArgument(format!(
                "auto activation and deactivation must be probabilities, got {} and {}",
                self.auto_activation, self.auto_deactivation
            )));
        }
        Ok(self)
    }
}

/// Observed trace of a binary process together with its neighbour tallies.
#[derive(Debug, Clone, PartialEq)]
pub struct Dynamics {
    model: TransitionModel,
    config: DynamicsConfig,
    past: Vec<Vec<VertexState>>,
    future: Vec<Vec<VertexState>>,
    neighbour_counts: Vec<Vec<NeighbourCounts>>,
}

impl Dynamics {
    /// A trace over `size` vertices, initially all inactive.
    pub fn new(
        model: TransitionModel,
        config: DynamicsConfig,
        size: usize,
    ) -> Result<Self, NetInfError> {
        let config = config.validate()?;
        let length = config.length;
        Ok(Self {
            model: model.validate()?,
            config,
            past: vec![vec![INACTIVE; length]; size],
            future: vec![vec![INACTIVE; length]; size],
            neighbour_counts: vec![vec![[0; 2]; length]; size],
        })
    }

    pub fn model(&self) -> &TransitionModel {
        &self.model
    }

    pub fn config(&self) -> &DynamicsConfig {
        &self.config
    }

    pub fn length(&self) -> usize {
        self.config.length
    }

    pub fn past_states(&self) -> &[Vec<VertexState>] {
        &self.past
    }

    pub fn future_states(&self) -> &[Vec<VertexState>] {
        &self.future
    }

    pub fn neighbour_counts(&self) -> &[Vec<NeighbourCounts>] {
        &self.neighbour_counts
    }

    /// Replaces the observed trace; both sequences are indexed `[vertex][time]`.
    pub fn set_states(
        &mut self,
        past: Vec<Vec<VertexState>>,
        future: Vec<Vec<VertexState>>,
        graph: &MultiGraph,
    ) -> Result<(), NetInfError> {
        for sequence in [&past, &future] {
            if sequence.len() != self.past.len() {
                return Err(NetInfError::SizeMismatch {
                    expected: self.past.len(),
                    actual: sequence.len(),
                });
            }
            for states in sequence {
                if states.len() != self.config.length {
                    return Err(NetInfError::SizeMismatch {
                        expected: self.config.length,
                        actual: states.len(),
                    });
                }
                if let Some(bad) = states.iter().find(|&&s| s > ACTIVE) {
                    return Err(NetInfError::InvalidArgument(format!(
                        "binary dynamics has no state {bad}"
                    )));
                }
            }
        }
        self.past = past;
        self.future = future;
        self.neighbour_counts = self.count_sequence(graph);
        Ok(())
    }

    /// Contribution of a neighbour joined by `multiplicity` edges, `None` for ignored loops.
    fn weight(&self, v: VertexIndex, u: VertexIndex, multiplicity: usize) -> Option<usize> {
        if u != v {
            Some(multiplicity)
        } else if self.config.accept_self_loops {
            Some(2 * multiplicity)
        } else {
            None
        }
    }

    fn count_state(&self, graph: &MultiGraph, state: &[VertexState]) -> Vec<NeighbourCounts> {
        graph
            .vertices()
            .map(|v| {
                let mut counts = [0; 2];
                for (u, m) in graph.neighbours(v) {
                    if let Some(w) = self.weight(v, u, m) {
                        counts[state[u]] += w;
                    }
                }
                counts
            })
            .collect()
    }

    fn count_sequence(&self, graph: &MultiGraph) -> Vec<Vec<NeighbourCounts>> {
        let mut counts = vec![vec![[0; 2]; self.config.length]; self.past.len()];
        for t in 0..self.config.length {
            let snapshot = self.snapshot(t);
            for (v, c) in self.count_state(graph, &snapshot).into_iter().enumerate() {
                counts[v][t] = c;
            }
        }
        counts
    }

    fn snapshot(&self, t: usize) -> Vec<VertexState> {
        self.past.iter().map(|states| states[t]).collect()
    }

    /// Probability of going from `prev` to `next` given the neighbourhood, clipped away from
    /// zero and one.
    pub fn transition_prob(&self, prev: VertexState, next: VertexState, counts: NeighbourCounts) -> f64 {
        let flip = if prev == INACTIVE {
            let auto = self.config.auto_activation;
            (1.0 - auto) * self.model.activation_prob(counts) + auto
        } else {
            let auto = self.config.auto_deactivation;
            (1.0 - auto) * self.model.deactivation_prob(counts) + auto
        };
        clip_prob(if prev == next { 1.0 - flip } else { flip })
    }

    fn vertex_log_likelihood(&self, v: VertexIndex, counts: &[NeighbourCounts]) -> f64 {
        (self.config.past_length..self.config.length)
            .map(|t| {
                self.transition_prob(self.past[v][t], self.future[v][t], counts[t])
                    .ln()
            })
            .sum()
    }

    /// Tallies of every vertex touched by `mv` as they would be after the move.
    fn shifted_counts(
        &self,
        graph: &MultiGraph,
        mv: &GraphMove,
    ) -> Result<BTreeMap<VertexIndex, Vec<NeighbourCounts>>, NetInfError> {
        let mut pair_deltas: BTreeMap<(VertexIndex, VertexIndex), isize> = BTreeMap::new();
        for &(u, v) in &mv.removed {
            *pair_deltas.entry(ordered(u, v)).or_insert(0) -= 1;
        }
        for &(u, v) in &mv.added {
            *pair_deltas.entry(ordered(u, v)).or_insert(0) += 1;
        }
        let mut shifted = BTreeMap::new();
        for (&(u, v), &delta) in &pair_deltas {
            let multiplicity = graph.edge_multiplicity(u, v);
            if multiplicity.checked_add_signed(delta).is_none() {
                return Err(NetInfError::EdgeNotFound { u, v, multiplicity });
            }
            let Some(weight) = self.weight(u, v, 1) else {
                continue;
            };
            let delta = delta * weight as isize;
            for vertex in [u, v] {
                shifted
                    .entry(vertex)
                    .or_insert_with(|| self.neighbour_counts[vertex].clone());
            }
            for t in 0..self.config.length {
                bump(&mut shifted, u, t, self.past[v][t], delta)?;
                if u != v {
                    bump(&mut shifted, v, t, self.past[u][t], delta)?;
                }
            }
        }
        Ok(shifted)
    }

    fn sample_initial_state<R: Rng + ?Sized>(&self, rng: &mut R, size: usize) -> Vec<VertexState> {
        match self.config.initial_active {
            Some(active) if active <= size => {
                let mut state = vec![INACTIVE; size];
                for v in index::sample(rng, size, active) {
                    state[v] = ACTIVE;
                }
                state
            }
            _ => (0..size).map(|_| rng.gen_range(INACTIVE..=ACTIVE)).collect(),
        }
    }

    fn next_state<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        prev: VertexState,
        counts: NeighbourCounts,
    ) -> VertexState {
        if rng.gen::<f64>() < self.transition_prob(prev, ACTIVE, counts) {
            ACTIVE
        } else {
            INACTIVE
        }
    }

    fn shift_neighbours(
        &self,
        graph: &MultiGraph,
        v: VertexIndex,
        prev: VertexState,
        next: VertexState,
        counts: &mut [NeighbourCounts],
    ) {
        if prev == next {
            return;
        }
        for (u, m) in graph.neighbours(v) {
            if let Some(w) = self.weight(v, u, m) {
                counts[u][prev] -= w;
                counts[u][next] += w;
            }
        }
    }

    fn update<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        graph: &MultiGraph,
        state: &mut Vec<VertexState>,
        counts: &mut [NeighbourCounts],
    ) {
        let size = state.len();
        if self.config.async_mode {
            for _ in 0..size {
                let v = rng.gen_range(0..size);
                let next = self.next_state(rng, state[v], counts[v]);
                self.shift_neighbours(graph, v, state[v], next, counts);
                state[v] = next;
            }
        } else {
            let next: Vec<VertexState> = (0..size)
                .map(|v| self.next_state(rng, state[v], counts[v]))
                .collect();
            for v in 0..size {
                self.shift_neighbours(graph, v, state[v], next[v], counts);
            }
            *state = next;
        }
    }
}

fn bump(
    shifted: &mut BTreeMap<VertexIndex, Vec<NeighbourCounts>>,
    vertex: VertexIndex,
    t: usize,
    state: VertexState,
    delta: isize,
) -> Result<(), NetInfError> {
    let Some(counts) = shifted.get_mut(&vertex) else {
        return Err(NetInfError::Logic(format!("vertex {vertex} has no tally")));
    };
    let slot = &mut counts[t][state];
    *slot = slot.checked_add_signed(delta).ok_or_else(|| {
        NetInfError::consistency(
            "Dynamics",
            format!("neighbour count of vertex {vertex} at time {t} would become negative"),
        )
    })?;
    Ok(())
}

impl Observation for Dynamics {
    fn name(&self) -> &'static str {
        "Dynamics"
    }

    fn size(&self) -> usize {
        self.past.len()
    }

    fn set_graph(&mut self, graph: &MultiGraph) -> Result<(), NetInfError> {
        if graph.size() != self.size() {
            return Err(NetInfError::SizeMismatch {
                expected: self.size(),
                actual: graph.size(),
            });
        }
        self.neighbour_counts = self.count_sequence(graph);
        Ok(())
    }

    fn log_likelihood(&self, _graph: &MultiGraph) -> f64 {
        (0..self.size())
            .map(|v| self.vertex_log_likelihood(v, &self.neighbour_counts[v]))
            .sum()
    }

    fn log_likelihood_ratio_from_graph_move(
        &self,
        graph: &MultiGraph,
        mv: &GraphMove,
    ) -> Result<f64, NetInfError> {
        let shifted = self.shifted_counts(graph, mv)?;
        Ok(shifted
            .iter()
            .map(|(&v, next)| {
                self.vertex_log_likelihood(v, next)
                    - self.vertex_log_likelihood(v, &self.neighbour_counts[v])
            })
            .sum())
    }

    fn apply_graph_move(&mut self, graph: &MultiGraph, mv: &GraphMove) -> Result<(), NetInfError> {
        for (v, counts) in self.shifted_counts(graph, mv)? {
            self.neighbour_counts[v] = counts;
        }
        Ok(())
    }

    /// Runs the process on `graph` for `burn` unrecorded steps and then `length` recorded ones.
    fn sample_state<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        graph: &MultiGraph,
    ) -> Result<(), NetInfError> {
        let size = self.size();
        if graph.size() != size {
            return Err(NetInfError::SizeMismatch {
                expected: size,
                actual: graph.size(),
            });
        }
        let mut state = self.sample_initial_state(rng, size);
        let mut counts = self.count_state(graph, &state);
        for _ in 0..self.config.burn {
            self.update(rng, graph, &mut state, &mut counts);
        }
        let length = self.config.length;
        let mut past = vec![Vec::with_capacity(length); size];
        let mut future = vec![Vec::with_capacity(length); size];
        for _ in 0..length {
            for (v, &s) in state.iter().enumerate() {
                past[v].push(s);
            }
            self.update(rng, graph, &mut state, &mut counts);
            for (v, &s) in state.iter().enumerate() {
                future[v].push(s);
            }
        }
        self.past = past;
        self.future = future;
        self.neighbour_counts = self.count_sequence(graph);
        Ok(())
    }

    fn param_keys(&self) -> &'static [&'static str] {
        match self.model {
            TransitionModel::Sis { .. } => &["infection", "recovery", "auto_activation", "auto_deactivation"],
            TransitionModel::Glauber { .. } => &["coupling", "auto_activation", "auto_deactivation"],
            TransitionModel::Voter { .. } => &["random_flip", "auto_activation", "auto_deactivation"],
            TransitionModel::Cowan { .. } => {
                &["nu", "a", "mu", "eta", "auto_activation", "auto_deactivation"]
            }
        }
    }

    fn param(&self, key: &str) -> Option<f64> {
        match key {
            "auto_activation" => Some(self.config.auto_activation),
            "auto_deactivation" => Some(self.config.auto_deactivation),
            _ => self.model.param(key),
        }
    }

    fn is_valid_param_move(&self, mv: &ParamMove) -> bool {
        let Some(current) = self.param(&mv.key) else {
            return false;
        };
        let value = current + mv.value;
        match mv.key.as_str() {
            "auto_activation" | "auto_deactivation" => is_prob(value),
            key => TransitionModel::is_valid_value(key, value),
        }
    }

    fn set_param(&mut self, key: &str, value: f64) -> Result<(), NetInfError> {
        let slot = match key {
            "auto_activation" => Some(&mut self.config.auto_activation),
            "auto_deactivation" => Some(&mut self.config.auto_deactivation),
            key => self.model.param_mut(key),
        };
        match slot {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(NetInfError::UnsupportedMove(format!(
                "{} dynamics has no parameter {key}",
                self.model.name()
            ))),
        }
    }

    fn check_consistency(&self, graph: &MultiGraph) -> Result<(), NetInfError> {
        let expected = self.count_sequence(graph);
        for (v, (actual, expected)) in self.neighbour_counts.iter().zip(&expected).enumerate() {
            if let Some(t) = (0..self.config.length).find(|&t| actual[t] != expected[t]) {
                return Err(NetInfError::consistency(
                    "Dynamics",
                    format!(
                        "vertex {v} at time {t} has neighbour counts {:?}, graph gives {:?}",
                        actual[t], expected[t]
                    ),
                ));
            }
        }
        Ok(())
    }

    fn check_safety(&self) -> Result<(), NetInfError> {
        let length = self.config.length;
        let well_formed = [&self.past, &self.future]
            .iter()
            .all(|sequence| sequence.iter().all(|states| states.len() == length))
            && self.neighbour_counts.len() == self.past.len()
            && self.future.len() == self.past.len();
        if well_formed {
            Ok(())
        } else {
            Err(NetInfError::Safety(
                "dynamics trace does not match its configured length".into(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn graph() -> MultiGraph {
        MultiGraph::from_edges(5, [(0, 1, 2), (0, 3, 1), (0, 4, 1), (2, 3, 1)]).expect("graph")
    }

    fn sampled(model: TransitionModel, config: DynamicsConfig) -> (Dynamics, MultiGraph) {
        let graph = graph();
        let mut dynamics = Dynamics::new(model, config, 5).expect("dynamics");
        let mut rng = StdRng::seed_from_u64(4);
        dynamics.sample_state(&mut rng, &graph).expect("sample");
        (dynamics, graph)
    }

    #[test]
    fn transition_probabilities_are_clipped() {
        let dynamics = Dynamics::new(
            TransitionModel::Sis {
                infection: 0.0,
                recovery: 1.0,
            },
            DynamicsConfig::default(),
            1,
        )
        .expect("dynamics");
        let p = dynamics.transition_prob(INACTIVE, ACTIVE, [0, 3]);
        assert!(p > 0.0 && p < 1e-12);
        let q = dynamics.transition_prob(ACTIVE, ACTIVE, [0, 0]);
        assert!(q > 0.0 && q < 1e-12);
    }

    #[test]
    fn sis_activation_grows_with_active_neighbours() {
        let model = TransitionModel::Sis {
            infection: 0.5,
            recovery: 0.1,
        };
        assert_eq!(model.activation_prob([3, 0]), 0.0);
        assert!((model.activation_prob([0, 2]) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn voter_without_neighbours_is_a_coin_flip() {
        let model = TransitionModel::Voter { random_flip: 0.0 };
        assert_eq!(model.activation_prob([0, 0]), 0.5);
        assert_eq!(model.activation_prob([1, 3]), 0.75);
    }

    #[test]
    fn sampled_trace_is_consistent() {
        let (dynamics, graph) = sampled(
            TransitionModel::Glauber { coupling: 0.5 },
            DynamicsConfig {
                burn: 3,
                ..DynamicsConfig::with_length(6)
            },
        );
        dynamics.check_safety().expect("safety");
        dynamics.check_consistency(&graph).expect("consistency");
        for v in 0..5 {
            for t in 0..5 {
                assert_eq!(dynamics.future_states()[v][t], dynamics.past_states()[v][t + 1]);
            }
        }
    }

    #[test]
    fn graph_move_ratios_match_recomputation() {
        for accept_self_loops in [false, true] {
            let config = DynamicsConfig {
                accept_self_loops,
                async_mode: true,
                ..DynamicsConfig::with_length(8)
            };
            let (mut dynamics, mut graph) =
                sampled(TransitionModel::Sis { infection: 0.3, recovery: 0.2 }, config);
            for mv in [
                GraphMove::addition(1, 2),
                GraphMove::new([(0, 1)], [(1, 4)]),
                GraphMove::new([(0, 3), (2, 3)], [(0, 2), (3, 3)]),
                GraphMove::new([(0, 1)], [(0, 1)]),
            ] {
                let before = dynamics.log_likelihood(&graph);
                let ratio = dynamics
                    .log_likelihood_ratio_from_graph_move(&graph, &mv)
                    .expect("ratio");
                dynamics.apply_graph_move(&graph, &mv).expect("apply");
                for &(u, v) in &mv.removed {
                    graph.remove_edge(u, v).expect("remove");
                }
                for &(u, v) in &mv.added {
                    graph.add_edge(u, v).expect("add");
                }
                dynamics.check_consistency(&graph).expect("consistency");
                let after = dynamics.log_likelihood(&graph);
                assert!((ratio - (after - before)).abs() < 1e-9, "{mv:?}");
            }
        }
    }

    #[test]
    fn removing_a_missing_edge_is_rejected() {
        let (dynamics, graph) = sampled(
            TransitionModel::Voter { random_flip: 0.1 },
            DynamicsConfig::default(),
        );
        let err = dynamics
            .log_likelihood_ratio_from_graph_move(&graph, &GraphMove::removal(1, 2))
            .expect_err("missing");
        assert!(matches!(err, NetInfError::EdgeNotFound { u: 1, v: 2, .. }));
    }

    #[test]
    fn parameters_respect_their_ranges() {
        let (mut dynamics, _) = sampled(
            TransitionModel::Cowan {
                nu: 1.0,
                a: 1.0,
                mu: 1.0,
                eta: 0.5,
            },
            DynamicsConfig::default(),
        );
        assert!(dynamics.is_valid_param_move(&ParamMove::new("eta", 0.4)));
        assert!(!dynamics.is_valid_param_move(&ParamMove::new("eta", 0.6)));
        assert!(!dynamics.is_valid_param_move(&ParamMove::new("coupling", 0.1)));
        dynamics
            .apply_param_move(&ParamMove::new("mu", -2.0))
            .expect("apply");
        assert_eq!(dynamics.param("mu"), Some(-1.0));
        dynamics
            .apply_param_move(&ParamMove::new("auto_activation", 0.25))
            .expect("apply");
        assert_eq!(dynamics.config().auto_activation, 0.25);
    }

    #[test]
    fn set_states_checks_dimensions() {
        let graph = graph();
        let mut dynamics = Dynamics::new(
            TransitionModel::Glauber { coupling: 1.0 },
            DynamicsConfig::with_length(2),
            5,
        )
        .expect("dynamics");
        let err = dynamics
            .set_states(vec![vec![0, 1]; 4], vec![vec![1, 0]; 5], &graph)
            .expect_err("size");
        assert!(matches!(err, NetInfError::SizeMismatch { expected: 5, actual: 4 }));
        dynamics
            .set_states(vec![vec![0, 1]; 5], vec![vec![1, 0]; 5], &graph)
            .expect("states");
        assert_eq!(dynamics.neighbour_counts()[0][1], [0, 4]);
    }
}
