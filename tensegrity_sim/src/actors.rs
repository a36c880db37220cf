//! Actor policies: who proposes which event each step.
//!
//! Each actor owns a ChaCha8 stream derived from the run seed and its roster
//! index. Stochastic actors pick a target node by weight and an action from a
//! weighted table; the AI agent follows the flow field deterministically.

use crate::error::{SimError, SimResult};
use crate::events::Event;
use crate::state::SimulationState;

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tensegrity_core::FieldStore;

/// Trait for decision strategies of the actors in a roster.
pub trait ActorPolicy: Send + std::fmt::Debug {
    /// Returns the actor's display name.
    fn name(&self) -> &str;

    /// Proposes one event for the current state.
    /// Never mutates the state; the gate decides whether the event lands.
    fn choose_action(&mut self, state: &SimulationState) -> Event;
}

/// Kinds of actions a stochastic actor can draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    FeatureChange,
    AddEdge,
    Refactor,
    Patch,
    AddConstraint,
    RemoveEdge,
}

/// Weighted action table, drawn in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionTable(pub Vec<(ActionKind, f64)>);

impl ActionTable {
    /// 60% FeatureChange, 20% AddEdge, 15% Refactor, 5% Patch.
    pub fn feature_default() -> Self {
        Self(vec![
            (ActionKind::FeatureChange, 0.60),
            (ActionKind::AddEdge, 0.20),
            (ActionKind::Refactor, 0.15),
            (ActionKind::Patch, 0.05),
        ])
    }

    /// 60% Refactor, 20% AddConstraint, 10% RemoveEdge, 10% Patch.
    pub fn refactor_default() -> Self {
        Self(vec![
            (ActionKind::Refactor, 0.60),
            (ActionKind::AddConstraint, 0.20),
            (ActionKind::RemoveEdge, 0.10),
            (ActionKind::Patch, 0.10),
        ])
    }

    fn sampler(&self, actor: &str) -> SimResult<WeightedIndex<f64>> {
        WeightedIndex::new(self.0.iter().map(|(_, w)| *w)).map_err(|e| {
            SimError::scenario(format!("actor {}: invalid action table: {}", actor, e))
        })
    }

    fn kind(&self, idx: usize) -> ActionKind {
        self.0[idx].0
    }
}

/// Draws an index proportional to `weights`, uniformly when every weight is
/// zero.
fn weighted_pick(rng: &mut ChaCha8Rng, weights: &[f64]) -> usize {
    match WeightedIndex::<f64>::new(weights) {
        Ok(dist) => dist.sample(rng),
        Err(_) => rng.gen_range(0..weights.len()),
    }
}

/// True when business pressure dominates stability pressure on a node.
fn business_dominates(fields: &FieldStore, idx: usize, bias: f64) -> bool {
    let flow = fields.flow(idx);
    flow.x + bias >= flow.y.abs()
}

/// Turns a drawn action on node `idx` into a concrete event.
fn materialize(
    kind: ActionKind,
    idx: usize,
    state: &SimulationState,
    rng: &mut ChaCha8Rng,
) -> Event {
    let graph = state.graph();
    let fields = state.fields();
    let node = graph.node_id(idx).clone();

    match kind {
        ActionKind::FeatureChange => {
            if business_dominates(fields, idx, 0.0) {
                Event::feature_change(node)
            } else {
                Event::refactor(node)
            }
        }
        ActionKind::AddEdge => {
            let neighbours: Vec<usize> = graph.neighbor_weights(idx).map(|(j, _)| j).collect();
            let candidates: Vec<usize> = (0..graph.node_count())
                .filter(|j| *j != idx && !neighbours.contains(j))
                .collect();
            if candidates.is_empty() {
                return Event::feature_change(node);
            }
            let weights: Vec<f64> = candidates.iter().map(|j| fields.node(*j).demand).collect();
            let partner = candidates[weighted_pick(rng, &weights)];
            Event::add_edge(node, graph.node_id(partner).clone())
        }
        ActionKind::Refactor => Event::refactor(node),
        ActionKind::Patch => Event::patch(node),
        ActionKind::AddConstraint => Event::add_constraint(node),
        ActionKind::RemoveEdge => {
            let neighbours: Vec<usize> = graph.neighbor_weights(idx).map(|(j, _)| j).collect();
            if neighbours.is_empty() {
                return Event::refactor(node);
            }
            let other = neighbours[rng.gen_range(0..neighbours.len())];
            Event::remove_edge(node, graph.node_id(other).clone())
        }
    }
}

/// Product engineer: works where demand is, ships features.
#[derive(Debug)]
pub struct FeatureEngineer {
    name: String,
    noise: f64,
    table: ActionTable,
    sampler: WeightedIndex<f64>,
    rng: ChaCha8Rng,
}

impl FeatureEngineer {
    pub fn new(
        name: impl Into<String>,
        noise: f64,
        table: ActionTable,
        rng: ChaCha8Rng,
    ) -> SimResult<Self> {
        let name = name.into();
        let sampler = table.sampler(&name)?;
        Ok(Self { name, noise: noise.max(0.0), table, sampler, rng })
    }
}

impl ActorPolicy for FeatureEngineer {
    fn name(&self) -> &str {
        &self.name
    }

    fn choose_action(&mut self, state: &SimulationState) -> Event {
        let fields = state.fields();
        if fields.is_empty() {
            return Event::NoOp;
        }
        let weights: Vec<f64> = (0..fields.len())
            .map(|i| fields.node(i).demand + self.rng.gen::<f64>() * self.noise)
            .collect();
        let idx = weighted_pick(&mut self.rng, &weights);
        let kind = self.table.kind(self.sampler.sample(&mut self.rng));
        materialize(kind, idx, state, &mut self.rng)
    }
}

/// Platform engineer: works where stress gradients are, stabilizes.
#[derive(Debug)]
pub struct RefactorEngineer {
    name: String,
    noise: f64,
    table: ActionTable,
    sampler: WeightedIndex<f64>,
    rng: ChaCha8Rng,
}

impl RefactorEngineer {
    pub fn new(
        name: impl Into<String>,
        noise: f64,
        table: ActionTable,
        rng: ChaCha8Rng,
    ) -> SimResult<Self> {
        let name = name.into();
        let sampler = table.sampler(&name)?;
        Ok(Self { name, noise: noise.max(0.0), table, sampler, rng })
    }
}

impl ActorPolicy for RefactorEngineer {
    fn name(&self) -> &str {
        &self.name
    }

    fn choose_action(&mut self, state: &SimulationState) -> Event {
        let fields = state.fields();
        if fields.is_empty() {
            return Event::NoOp;
        }
        let weights: Vec<f64> = (0..fields.len())
            .map(|i| fields.gradient(i).abs() + self.rng.gen::<f64>() * self.noise)
            .collect();
        let idx = weighted_pick(&mut self.rng, &weights);
        let kind = self.table.kind(self.sampler.sample(&mut self.rng));
        materialize(kind, idx, state, &mut self.rng)
    }
}

/// Flow-following agent.
///
/// Picks the node with the strongest flow (first index on ties). Below
/// `threshold` it stays idle; otherwise it ships a feature when business
/// pressure (plus `feature_bias`) dominates and refactors when it does not.
#[derive(Debug, Clone)]
pub struct AiAgent {
    name: String,
    threshold: f64,
    feature_bias: f64,
}

impl AiAgent {
    pub fn new(name: impl Into<String>, threshold: f64, feature_bias: f64) -> Self {
        Self { name: name.into(), threshold, feature_bias }
    }
}

impl ActorPolicy for AiAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn choose_action(&mut self, state: &SimulationState) -> Event {
        let fields = state.fields();
        let mut best: Option<(usize, f64)> = None;
        for i in 0..fields.len() {
            let magnitude = fields.flow(i).norm();
            if best.map_or(true, |(_, m)| magnitude > m) {
                best = Some((i, magnitude));
            }
        }
        let Some((idx, magnitude)) = best else {
            return Event::NoOp;
        };
        if magnitude < self.threshold {
            return Event::NoOp;
        }
        let node = state.graph().node_id(idx).clone();
        if business_dominates(fields, idx, self.feature_bias) {
            Event::feature_change(node)
        } else {
            Event::refactor(node)
        }
    }
}

fn default_noise() -> f64 {
    0.1
}

fn default_threshold() -> f64 {
    0.05
}

/// Serializable actor definition, as found in a scenario roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ActorSpec {
    FeatureEngineer {
        name: String,
        #[serde(default = "default_noise")]
        noise: f64,
        #[serde(default)]
        table: Option<ActionTable>,
    },
    RefactorEngineer {
        name: String,
        #[serde(default = "default_noise")]
        noise: f64,
        #[serde(default)]
        table: Option<ActionTable>,
    },
    AiAgent {
        name: String,
        #[serde(default = "default_threshold")]
        threshold: f64,
        #[serde(default)]
        feature_bias: f64,
    },
}

impl ActorSpec {
    pub fn feature_engineer(name: impl Into<String>) -> Self {
        ActorSpec::FeatureEngineer { name: name.into(), noise: default_noise(), table: None }
    }

    pub fn refactor_engineer(name: impl Into<String>) -> Self {
        ActorSpec::RefactorEngineer { name: name.into(), noise: default_noise(), table: None }
    }

    pub fn ai_agent(name: impl Into<String>) -> Self {
        ActorSpec::AiAgent { name: name.into(), threshold: default_threshold(), feature_bias: 0.0 }
    }

    pub fn name(&self) -> &str {
        match self {
            ActorSpec::FeatureEngineer { name, .. }
            | ActorSpec::RefactorEngineer { name, .. }
            | ActorSpec::AiAgent { name, .. } => name,
        }
    }

    /// Instantiates the policy with its RNG stream.
    pub fn build(&self, rng: ChaCha8Rng) -> SimResult<Box<dyn ActorPolicy>> {
        Ok(match self {
            ActorSpec::FeatureEngineer { name, noise, table } => Box::new(FeatureEngineer::new(
                name.clone(),
                *noise,
                table.clone().unwrap_or_else(ActionTable::feature_default),
                rng,
            )?),
            ActorSpec::RefactorEngineer { name, noise, table } => Box::new(RefactorEngineer::new(
                name.clone(),
                *noise,
                table.clone().unwrap_or_else(ActionTable::refactor_default),
                rng,
            )?),
            ActorSpec::AiAgent { name, threshold, feature_bias } => {
                Box::new(AiAgent::new(name.clone(), *threshold, *feature_bias))
            }
        })
    }
}
