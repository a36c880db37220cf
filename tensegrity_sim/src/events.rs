//! Events - immutable descriptions of graph and field mutations.
//!
//! Actors and the scenario calendar propose events; the governance gate may
//! block or rewrite them; [`Event::apply`] commits them to the state. All
//! referenced nodes are validated before anything is mutated, so a failing
//! event never leaves a half-applied change behind. Numeric deltas are
//! clamped after application, never rejected.

use crate::error::SimResult;
use crate::governance::GovernanceChange;
use crate::state::SimulationState;

use serde::{Deserialize, Serialize};
use tensegrity_core::{CoreError, Field, NodeFields, NodeId};

/// Default weight of an edge created by [`Event::AddEdge`].
pub const DEFAULT_EDGE_WEIGHT: f64 = 0.5;

/// Risk added to both endpoints of a new edge.
pub const ADD_EDGE_RISK: f64 = 0.05;

/// Complexity added to both endpoints when an edge is removed.
pub const REMOVE_EDGE_COMPLEXITY: f64 = 0.03;

/// Weight multiplier applied by [`Event::AddConstraint`].
pub const CONSTRAINT_FACTOR: f64 = 1.2;

/// Health gained by the constrained node.
pub const CONSTRAINT_HEALTH: f64 = 0.05;

/// Signed change to the primitive fields of one node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldDelta {
    pub health: f64,
    pub complexity: f64,
    pub risk: f64,
}

impl FieldDelta {
    /// New code: more complexity and risk, some health lost.
    pub const FEATURE: FieldDelta = FieldDelta { health: -0.05, complexity: 0.1, risk: 0.03 };

    /// Cleanup: less complexity and risk, health recovered.
    pub const REFACTOR: FieldDelta = FieldDelta { health: 0.08, complexity: -0.1, risk: -0.05 };

    /// Bug fix: small health gain, a little patch code.
    pub const PATCH: FieldDelta = FieldDelta { health: 0.05, complexity: 0.01, risk: -0.02 };

    fn feature() -> Self {
        Self::FEATURE
    }

    fn refactor() -> Self {
        Self::REFACTOR
    }

    fn patch() -> Self {
        Self::PATCH
    }

    fn apply_to(&self, state: &mut SimulationState, idx: usize) {
        state.fields.add(Field::Health, idx, self.health);
        state.fields.add(Field::Complexity, idx, self.complexity);
        state.fields.add(Field::Risk, idx, self.risk);
    }
}

fn default_edge_weight() -> f64 {
    DEFAULT_EDGE_WEIGHT
}

fn default_health() -> f64 {
    1.0
}

/// A proposed or committed mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// Ship a feature on a node
    FeatureChange {
        node: NodeId,
        #[serde(default = "FieldDelta::feature")]
        delta: FieldDelta,
    },

    /// Refactor a node
    Refactor {
        node: NodeId,
        #[serde(default = "FieldDelta::refactor")]
        delta: FieldDelta,
    },

    /// Patch a node
    Patch {
        node: NodeId,
        #[serde(default = "FieldDelta::patch")]
        delta: FieldDelta,
    },

    /// Couple two nodes (upsert)
    AddEdge {
        a: NodeId,
        b: NodeId,
        #[serde(default = "default_edge_weight")]
        weight: f64,
    },

    /// Decouple two nodes
    RemoveEdge { a: NodeId, b: NodeId },

    /// Tighten the contracts around a node
    AddConstraint { node: NodeId },

    /// Install or remove a governance rule from the next step on
    GovernanceChange { change: GovernanceChange },

    /// Shift business demand on a node
    DemandShock { node: NodeId, delta: f64 },

    /// Introduce a new module wired to existing ones
    NewRequirement {
        id: NodeId,
        #[serde(default)]
        demand: f64,
        #[serde(default = "default_health")]
        health: f64,
        #[serde(default)]
        complexity: f64,
        #[serde(default)]
        risk: f64,
        #[serde(default)]
        edges: Vec<(NodeId, f64)>,
    },

    /// Entropy: health lost on one node, or on every node when `node` is absent
    HealthDecay {
        #[serde(default)]
        node: Option<NodeId>,
        rate: f64,
    },

    /// Explicitly do nothing
    NoOp,
}

impl Event {
    pub fn feature_change(node: impl Into<NodeId>) -> Self {
        Event::FeatureChange { node: node.into(), delta: FieldDelta::FEATURE }
    }

    pub fn refactor(node: impl Into<NodeId>) -> Self {
        Event::Refactor { node: node.into(), delta: FieldDelta::REFACTOR }
    }

    pub fn patch(node: impl Into<NodeId>) -> Self {
        Event::Patch { node: node.into(), delta: FieldDelta::PATCH }
    }

    pub fn add_edge(a: impl Into<NodeId>, b: impl Into<NodeId>) -> Self {
        Event::AddEdge { a: a.into(), b: b.into(), weight: DEFAULT_EDGE_WEIGHT }
    }

    pub fn remove_edge(a: impl Into<NodeId>, b: impl Into<NodeId>) -> Self {
        Event::RemoveEdge { a: a.into(), b: b.into() }
    }

    pub fn add_constraint(node: impl Into<NodeId>) -> Self {
        Event::AddConstraint { node: node.into() }
    }

    pub fn demand_shock(node: impl Into<NodeId>, delta: f64) -> Self {
        Event::DemandShock { node: node.into(), delta }
    }

    /// Short variant name, used in logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Event::FeatureChange { .. } => "FeatureChange",
            Event::Refactor { .. } => "Refactor",
            Event::Patch { .. } => "Patch",
            Event::AddEdge { .. } => "AddEdge",
            Event::RemoveEdge { .. } => "RemoveEdge",
            Event::AddConstraint { .. } => "AddConstraint",
            Event::GovernanceChange { .. } => "GovernanceChange",
            Event::DemandShock { .. } => "DemandShock",
            Event::NewRequirement { .. } => "NewRequirement",
            Event::HealthDecay { .. } => "HealthDecay",
            Event::NoOp => "NoOp",
        }
    }

    /// Events that add behavior or coupling, i.e. what brakes stop.
    pub fn is_feature_class(&self) -> bool {
        matches!(
            self,
            Event::FeatureChange { .. } | Event::AddEdge { .. } | Event::NewRequirement { .. }
        )
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Event::NoOp)
    }

    /// The node an event is primarily aimed at.
    pub fn primary_target(&self) -> Option<&NodeId> {
        self.targets().into_iter().next()
    }

    /// Every node an event references.
    pub fn targets(&self) -> Vec<&NodeId> {
        match self {
            Event::FeatureChange { node, .. }
            | Event::Refactor { node, .. }
            | Event::Patch { node, .. }
            | Event::AddConstraint { node }
            | Event::DemandShock { node, .. } => vec![node],
            Event::AddEdge { a, b, .. } | Event::RemoveEdge { a, b } => vec![a, b],
            Event::NewRequirement { id, edges, .. } => {
                std::iter::once(id).chain(edges.iter().map(|(n, _)| n)).collect()
            }
            Event::HealthDecay { node, .. } => node.iter().collect(),
            Event::GovernanceChange { .. } | Event::NoOp => Vec::new(),
        }
    }

    /// Commits the event to `state`.
    ///
    /// Fails with `NodeNotFound` (or another validation error) before any
    /// mutation happens. Derived fields are not refreshed here; use
    /// [`SimulationState::apply_event`] for that.
    pub fn apply(&self, state: &mut SimulationState) -> SimResult<()> {
        match self {
            Event::FeatureChange { node, delta }
            | Event::Refactor { node, delta }
            | Event::Patch { node, delta } => {
                let idx = state.graph.index_of(node.as_str())?;
                delta.apply_to(state, idx);
            }
            Event::AddEdge { a, b, weight } => {
                let ia = state.graph.index_of(a.as_str())?;
                let ib = state.graph.index_of(b.as_str())?;
                state.graph.add_edge(a.as_str(), b.as_str(), *weight)?;
                state.fields.add(Field::Risk, ia, ADD_EDGE_RISK);
                state.fields.add(Field::Risk, ib, ADD_EDGE_RISK);
            }
            Event::RemoveEdge { a, b } => {
                let ia = state.graph.index_of(a.as_str())?;
                let ib = state.graph.index_of(b.as_str())?;
                if state.graph.remove_edge(a.as_str(), b.as_str())? {
                    state.fields.add(Field::Complexity, ia, REMOVE_EDGE_COMPLEXITY);
                    state.fields.add(Field::Complexity, ib, REMOVE_EDGE_COMPLEXITY);
                }
            }
            Event::AddConstraint { node } => {
                let idx = state.graph.index_of(node.as_str())?;
                state.graph.scale_edges_touching(node.as_str(), CONSTRAINT_FACTOR)?;
                state.fields.add(Field::Health, idx, CONSTRAINT_HEALTH);
            }
            Event::GovernanceChange { change } => {
                state.pending_governance.push(change.clone());
            }
            Event::DemandShock { node, delta } => {
                let idx = state.graph.index_of(node.as_str())?;
                state.fields.add(Field::Demand, idx, *delta);
            }
            Event::NewRequirement { id, demand, health, complexity, risk, edges } => {
                if state.graph.contains(id.as_str()) {
                    return Err(CoreError::DuplicateNode(id.to_string()).into());
                }
                for (partner, w) in edges {
                    state.graph.index_of(partner.as_str())?;
                    if !w.is_finite() || *w <= 0.0 {
                        return Err(CoreError::InvalidWeight {
                            a: id.to_string(),
                            b: partner.to_string(),
                            weight: *w,
                        }
                        .into());
                    }
                }
                state.graph.add_node(id.clone())?;
                state.fields.push_node(NodeFields::new(*health, *complexity, *risk, *demand));
                for (partner, w) in edges {
                    state.graph.add_edge(id.as_str(), partner.as_str(), *w)?;
                }
            }
            Event::HealthDecay { node, rate } => match node {
                Some(node) => {
                    let idx = state.graph.index_of(node.as_str())?;
                    state.fields.add(Field::Health, idx, -rate);
                }
                None => {
                    for idx in 0..state.fields.len() {
                        state.fields.add(Field::Health, idx, -rate);
                    }
                }
            },
            Event::NoOp => {}
        }
        Ok(())
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::FeatureChange { node, .. }
            | Event::Refactor { node, .. }
            | Event::Patch { node, .. } => {
                write!(f, "{}({})", self.kind_name(), node)
            }
            Event::AddEdge { a, b, weight } => write!(f, "AddEdge({}, {}, w={:.2})", a, b, weight),
            Event::RemoveEdge { a, b } => write!(f, "RemoveEdge({}, {})", a, b),
            Event::AddConstraint { node } => write!(f, "AddConstraint({})", node),
            Event::GovernanceChange { change } => write!(f, "GovernanceChange({})", change),
            Event::DemandShock { node, delta } => write!(f, "DemandShock({}, {:+.2})", node, delta),
            Event::NewRequirement { id, edges, .. } => {
                write!(f, "NewRequirement({}, {} edges)", id, edges.len())
            }
            Event::HealthDecay { node: Some(node), rate } => {
                write!(f, "HealthDecay({}, {:.3})", node, rate)
            }
            Event::HealthDecay { node: None, rate } => write!(f, "HealthDecay(all, {:.3})", rate),
            Event::NoOp => write!(f, "NoOp"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SeedStreams;
    use crate::governance::RuleSpec;
    use approx::assert_relative_eq;
    use tensegrity_core::{Edge, EngineParams, FieldStore, GraphModel};

    fn state() -> SimulationState {
        let graph = GraphModel::with_edges(
            ["A", "B", "C"],
            &[Edge::new("A", "B", 0.5), Edge::new("B", "C", 0.9)],
        )
        .unwrap();
        let fields = FieldStore::from_values(
            EngineParams::default(),
            vec![
                NodeFields::new(0.8, 0.5, 0.2, 0.5),
                NodeFields::new(0.6, 0.4, 0.1, 0.7),
                NodeFields::new(0.9, 0.2, 0.0, 0.3),
            ],
        );
        SimulationState::new(graph, fields, &[], SeedStreams::new(7), true).unwrap()
    }

    fn node(state: &SimulationState, id: &str) -> NodeFields {
        *state.fields().node(state.graph().index_of(id).unwrap())
    }

    #[test]
    fn test_feature_change_deltas() {
        let mut s = state();
        s.apply_event(&Event::feature_change("A")).unwrap();
        let a = node(&s, "A");
        assert_relative_eq!(a.complexity, 0.6, epsilon = 1e-12);
        assert_relative_eq!(a.health, 0.75, epsilon = 1e-12);
        assert_relative_eq!(a.risk, 0.23, epsilon = 1e-12);
    }

    #[test]
    fn test_refactor_and_patch_clamp() {
        let mut s = state();
        for _ in 0..10 {
            s.apply_event(&Event::refactor("C")).unwrap();
        }
        let c = node(&s, "C");
        assert_eq!(c.health, 1.0);
        assert_eq!(c.complexity, 0.0);
        assert_eq!(c.risk, 0.0);

        s.apply_event(&Event::patch("B")).unwrap();
        assert_relative_eq!(node(&s, "B").health, 0.65, epsilon = 1e-12);
    }

    #[test]
    fn test_add_and_remove_edge_nudges() {
        let mut s = state();
        s.apply_event(&Event::add_edge("A", "C")).unwrap();
        assert_eq!(s.graph().weight("A", "C"), Some(DEFAULT_EDGE_WEIGHT));
        assert_relative_eq!(node(&s, "A").risk, 0.25, epsilon = 1e-12);
        assert_relative_eq!(node(&s, "C").risk, 0.05, epsilon = 1e-12);

        s.apply_event(&Event::remove_edge("A", "C")).unwrap();
        assert_eq!(s.graph().weight("A", "C"), None);
        assert_relative_eq!(node(&s, "C").complexity, 0.23, epsilon = 1e-12);

        // absent edge: no nudge
        s.apply_event(&Event::remove_edge("A", "C")).unwrap();
        assert_relative_eq!(node(&s, "C").complexity, 0.23, epsilon = 1e-12);
    }

    #[test]
    fn test_add_constraint_scales_touching_edges() {
        let mut s = state();
        s.apply_event(&Event::add_constraint("B")).unwrap();
        assert_relative_eq!(s.graph().weight("A", "B").unwrap(), 0.6, epsilon = 1e-12);
        assert_eq!(s.graph().weight("B", "C"), Some(1.0));
        assert_relative_eq!(node(&s, "B").health, 0.65, epsilon = 1e-12);
    }

    #[test]
    fn test_demand_shock_and_decay() {
        let mut s = state();
        s.apply_event(&Event::demand_shock("A", 0.9)).unwrap();
        assert_eq!(node(&s, "A").demand, 1.0);

        s.apply_event(&Event::HealthDecay { node: None, rate: 0.1 }).unwrap();
        assert_relative_eq!(node(&s, "A").health, 0.7, epsilon = 1e-12);
        assert_relative_eq!(node(&s, "C").health, 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_new_requirement() {
        let mut s = state();
        let event = Event::NewRequirement {
            id: "D".into(),
            demand: 0.6,
            health: 0.7,
            complexity: 0.2,
            risk: 0.1,
            edges: vec![("A".into(), 0.4), ("C".into(), 0.3)],
        };
        s.apply_event(&event).unwrap();
        assert_eq!(s.graph().node_count(), 4);
        assert_eq!(s.fields().len(), 4);
        assert_eq!(s.graph().weight("D", "A"), Some(0.4));
        assert_eq!(node(&s, "D").demand, 0.6);

        assert!(s.apply_event(&event).is_err(), "duplicate id");
    }

    #[test]
    fn test_missing_node_leaves_state_untouched() {
        let mut s = state();
        let before: Vec<f64> = s.fields().all_values().collect();

        let err = s.apply_event(&Event::feature_change("Z")).unwrap_err();
        assert!(err.is_node_not_found());

        let partial = Event::NewRequirement {
            id: "D".into(),
            demand: 0.5,
            health: 1.0,
            complexity: 0.0,
            risk: 0.0,
            edges: vec![("A".into(), 0.5), ("Z".into(), 0.5)],
        };
        assert!(s.apply_event(&partial).unwrap_err().is_node_not_found());
        assert_eq!(s.graph().node_count(), 3);

        assert!(s.apply_event(&Event::add_edge("A", "Z")).is_err());
        assert_eq!(s.graph().edge_count(), 2);

        let after: Vec<f64> = s.fields().all_values().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_governance_change_is_queued() {
        let mut s = state();
        let event = Event::GovernanceChange {
            change: GovernanceChange::Install { rule: RuleSpec::HealthFloor { floor: 0.3 } },
        };
        s.apply_event(&event).unwrap();
        assert!(s.governance().is_empty());
        assert_eq!(s.pending_governance().len(), 1);

        s.commit_governance();
        assert_eq!(s.governance().rule_names(), vec!["health_floor"]);
    }

    #[test]
    fn test_classification() {
        assert!(Event::feature_change("A").is_feature_class());
        assert!(Event::add_edge("A", "B").is_feature_class());
        assert!(!Event::refactor("A").is_feature_class());
        assert_eq!(Event::add_edge("A", "B").primary_target(), Some(&NodeId::from("A")));
        assert_eq!(Event::NoOp.primary_target(), None);
        assert_eq!(Event::HealthDecay { node: None, rate: 0.1 }.targets().len(), 0);
    }

    #[test]
    fn test_serde_defaults() {
        let event: Event = serde_json::from_str(r#"{"kind":"feature_change","node":"A"}"#).unwrap();
        assert_eq!(event, Event::feature_change("A"));

        let event: Event = serde_json::from_str(r#"{"kind":"add_edge","a":"A","b":"C"}"#).unwrap();
        assert_eq!(event, Event::add_edge("A", "C"));

        let json = r#"{"kind":"new_requirement","id":"D","demand":0.4,"edges":[["A",0.5]]}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.targets().len(), 2);
        assert_eq!(event.to_string(), "NewRequirement(D, 1 edges)");
    }
}
