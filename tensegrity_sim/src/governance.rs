//! Governance gate - ordered admission control for proposed events.
//!
//! Rules are evaluated in installation order. The first rule that blocks or
//! replaces an event decides; later rules are not consulted and replacement
//! events are not re-evaluated. This keeps conflicting rules reproducible:
//! the earliest-installed restriction always wins.

use crate::events::Event;
use crate::incidents::IncidentModel;

use serde::{Deserialize, Serialize};
use tensegrity_core::{Diagnostics, FieldStore, GraphModel};
use tracing::debug;

/// Read-only view handed to rules.
pub struct GateContext<'a> {
    pub graph: &'a GraphModel,
    pub fields: &'a FieldStore,
    pub diagnostics: &'a Diagnostics,
    pub incidents: &'a IncidentModel,
    pub step: u64,
}

/// What a single rule says about a proposed event.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Allow,
    Block,
    Replace(Event),
}

/// Combined decision of the gate.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// No rule objected
    Allowed,

    /// `rule` rejected the event
    Blocked { rule: String },

    /// `rule` rewrote the event into `event`
    Replaced { rule: String, event: Event },
}

/// A governance predicate over `(state, proposed event)`.
pub trait GovernanceRule: Send + std::fmt::Debug {
    /// Unique rule name.
    fn name(&self) -> &str;

    /// Updates rule state from the step's diagnostics.
    ///
    /// Called once per step for every installed rule, before any proposal
    /// is judged.
    fn observe(&mut self, _ctx: &GateContext<'_>) {}

    /// Judges a proposed event.
    fn evaluate(&mut self, ctx: &GateContext<'_>, event: &Event) -> Verdict;
}

/// What a hub-protection rule substitutes for a blocked feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HubReplacement {
    #[default]
    Refactor,
    AddConstraint,
}

/// Serializable rule definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RuleSpec {
    /// Features on a node whose local energy exceeds `threshold` become
    /// stabilization work instead
    HubProtection {
        threshold: f64,
        #[serde(default)]
        replacement: HubReplacement,
    },

    /// Features on a node below `floor` health are blocked
    HealthFloor { floor: f64 },

    /// `H > ceiling` blocks every feature-class event for this step and the
    /// next `cooldown_steps` steps
    EmergencyBrake { ceiling: f64, cooldown_steps: u64 },

    /// Feature-class events are blocked while the last `window` steps saw at
    /// least `max_incidents` incidents
    IncidentBudget { max_incidents: usize, window: u64 },
}

impl RuleSpec {
    /// Name under which the rule is installed.
    pub fn name(&self) -> &'static str {
        match self {
            RuleSpec::HubProtection { .. } => "hub_protection",
            RuleSpec::HealthFloor { .. } => "health_floor",
            RuleSpec::EmergencyBrake { .. } => "emergency_brake",
            RuleSpec::IncidentBudget { .. } => "incident_budget",
        }
    }

    /// Instantiates the rule.
    pub fn build(&self) -> Box<dyn GovernanceRule> {
        match *self {
            RuleSpec::HubProtection { threshold, replacement } => {
                Box::new(HubProtection { threshold, replacement })
            }
            RuleSpec::HealthFloor { floor } => Box::new(HealthFloor { floor }),
            RuleSpec::EmergencyBrake { ceiling, cooldown_steps } => Box::new(EmergencyBrake {
                ceiling,
                cooldown_steps,
                armed_until: None,
            }),
            RuleSpec::IncidentBudget { max_incidents, window } => {
                Box::new(IncidentBudget { max_incidents, window })
            }
        }
    }
}

/// Change to the installed rule set, carried by `Event::GovernanceChange`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GovernanceChange {
    Install { rule: RuleSpec },
    Remove { name: String },
}

impl std::fmt::Display for GovernanceChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GovernanceChange::Install { rule } => write!(f, "install {}", rule.name()),
            GovernanceChange::Remove { name } => write!(f, "remove {}", name),
        }
    }
}

/// Hub protection: high local energy turns features into refactors.
#[derive(Debug, Clone)]
pub struct HubProtection {
    pub threshold: f64,
    pub replacement: HubReplacement,
}

impl GovernanceRule for HubProtection {
    fn name(&self) -> &str {
        "hub_protection"
    }

    fn evaluate(&mut self, ctx: &GateContext<'_>, event: &Event) -> Verdict {
        let Event::FeatureChange { node, .. } = event else {
            return Verdict::Allow;
        };
        let Ok(idx) = ctx.graph.index_of(node.as_str()) else {
            return Verdict::Allow;
        };
        if ctx.diagnostics.local_energy(idx) > self.threshold {
            let replacement = match self.replacement {
                HubReplacement::Refactor => Event::refactor(node.clone()),
                HubReplacement::AddConstraint => Event::add_constraint(node.clone()),
            };
            Verdict::Replace(replacement)
        } else {
            Verdict::Allow
        }
    }
}

/// Health floor: no features on sick modules.
#[derive(Debug, Clone)]
pub struct HealthFloor {
    pub floor: f64,
}

impl GovernanceRule for HealthFloor {
    fn name(&self) -> &str {
        "health_floor"
    }

    fn evaluate(&mut self, ctx: &GateContext<'_>, event: &Event) -> Verdict {
        let Event::FeatureChange { node, .. } = event else {
            return Verdict::Allow;
        };
        match ctx.graph.index_of(node.as_str()) {
            Ok(idx) if ctx.fields.node(idx).health < self.floor => Verdict::Block,
            _ => Verdict::Allow,
        }
    }
}

/// Emergency brake: a feature freeze triggered by system stress.
#[derive(Debug, Clone)]
pub struct EmergencyBrake {
    pub ceiling: f64,
    pub cooldown_steps: u64,

    /// Last step (inclusive) of the current freeze
    armed_until: Option<u64>,
}

impl EmergencyBrake {
    /// Returns true if the brake is engaged at `step`.
    pub fn is_engaged(&self, step: u64) -> bool {
        self.armed_until.is_some_and(|until| step <= until)
    }
}

impl GovernanceRule for EmergencyBrake {
    fn name(&self) -> &str {
        "emergency_brake"
    }

    fn observe(&mut self, ctx: &GateContext<'_>) {
        if ctx.diagnostics.h <= self.ceiling {
            return;
        }
        let until = ctx.step.saturating_add(self.cooldown_steps);
        if !self.is_engaged(ctx.step) {
            debug!(
                "step {}: emergency brake engaged until step {} (H={:.3})",
                ctx.step, until, ctx.diagnostics.h
            );
        }
        self.armed_until = Some(self.armed_until.map_or(until, |u| u.max(until)));
    }

    fn evaluate(&mut self, ctx: &GateContext<'_>, event: &Event) -> Verdict {
        if self.is_engaged(ctx.step) && event.is_feature_class() {
            Verdict::Block
        } else {
            Verdict::Allow
        }
    }
}

/// Incident budget: too many recent failures freeze feature work.
#[derive(Debug, Clone)]
pub struct IncidentBudget {
    pub max_incidents: usize,
    pub window: u64,
}

impl GovernanceRule for IncidentBudget {
    fn name(&self) -> &str {
        "incident_budget"
    }

    fn evaluate(&mut self, ctx: &GateContext<'_>, event: &Event) -> Verdict {
        if !event.is_feature_class() {
            return Verdict::Allow;
        }
        let recent = ctx.incidents.count_since(ctx.step.saturating_sub(self.window));
        if recent >= self.max_incidents {
            Verdict::Block
        } else {
            Verdict::Allow
        }
    }
}

/// Ordered, mutable rule list.
#[derive(Debug, Default)]
pub struct GovernanceGate {
    rules: Vec<Box<dyn GovernanceRule>>,
}

impl GovernanceGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a gate from rule definitions, in order.
    pub fn from_specs(specs: &[RuleSpec]) -> Self {
        let mut gate = Self::new();
        for spec in specs {
            gate.install(spec);
        }
        gate
    }

    /// Installs a rule. A rule with the same name is replaced in place,
    /// keeping its precedence.
    pub fn install(&mut self, spec: &RuleSpec) {
        let rule = spec.build();
        match self.rules.iter().position(|r| r.name() == spec.name()) {
            Some(pos) => self.rules[pos] = rule,
            None => self.rules.push(rule),
        }
    }

    /// Removes a rule by name. Returns whether it was installed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.name() != name);
        self.rules.len() != before
    }

    /// Installed rule names in precedence order.
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Lets every installed rule update its state for the current step.
    pub fn observe(&mut self, ctx: &GateContext<'_>) {
        for rule in self.rules.iter_mut() {
            rule.observe(ctx);
        }
    }

    /// Evaluates `event`; the first blocking or replacing rule decides.
    pub fn evaluate(&mut self, ctx: &GateContext<'_>, event: &Event) -> GateDecision {
        for rule in self.rules.iter_mut() {
            match rule.evaluate(ctx, event) {
                Verdict::Allow => continue,
                Verdict::Block => {
                    return GateDecision::Blocked { rule: rule.name().to_string() };
                }
                Verdict::Replace(replacement) => {
                    return GateDecision::Replaced {
                        rule: rule.name().to_string(),
                        event: replacement,
                    };
                }
            }
        }
        GateDecision::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SeedStreams;
    use tensegrity_core::{Edge, EngineParams, NodeFields};

    struct Fixture {
        graph: GraphModel,
        fields: FieldStore,
        diagnostics: Diagnostics,
        incidents: IncidentModel,
    }

    impl Fixture {
        fn new() -> Self {
            let graph = GraphModel::with_edges(
                ["hub", "leaf"],
                &[Edge::new("hub", "leaf", 1.0)],
            )
            .unwrap();
            let mut fields = FieldStore::from_values(
                EngineParams::default(),
                vec![NodeFields::new(0.2, 0.9, 0.8, 0.9), NodeFields::new(1.0, 0.0, 0.0, 0.1)],
            );
            fields.recompute_derived(&graph).unwrap();
            let diagnostics = Diagnostics::compute(&graph, &fields, None).unwrap();
            let incidents = IncidentModel::new(SeedStreams::new(1).incident_rng(), true);
            Self { graph, fields, diagnostics, incidents }
        }

        fn ctx(&self, step: u64) -> GateContext<'_> {
            GateContext {
                graph: &self.graph,
                fields: &self.fields,
                diagnostics: &self.diagnostics,
                incidents: &self.incidents,
                step,
            }
        }
    }

    #[test]
    fn test_hub_protection_replaces_feature() {
        let f = Fixture::new();
        let mut gate = GovernanceGate::from_specs(&[RuleSpec::HubProtection {
            threshold: 0.1,
            replacement: HubReplacement::Refactor,
        }]);

        let decision = gate.evaluate(&f.ctx(0), &Event::feature_change("hub"));
        assert_eq!(
            decision,
            GateDecision::Replaced { rule: "hub_protection".into(), event: Event::refactor("hub") }
        );
        assert_eq!(gate.evaluate(&f.ctx(0), &Event::patch("hub")), GateDecision::Allowed);
    }

    #[test]
    fn test_health_floor_blocks() {
        let f = Fixture::new();
        let mut gate = GovernanceGate::from_specs(&[RuleSpec::HealthFloor { floor: 0.3 }]);
        assert_eq!(
            gate.evaluate(&f.ctx(0), &Event::feature_change("hub")),
            GateDecision::Blocked { rule: "health_floor".into() }
        );
        assert_eq!(gate.evaluate(&f.ctx(0), &Event::feature_change("leaf")), GateDecision::Allowed);
    }

    #[test]
    fn test_first_restrictive_rule_wins() {
        let f = Fixture::new();
        let mut gate = GovernanceGate::from_specs(&[
            RuleSpec::HealthFloor { floor: 0.3 },
            RuleSpec::HubProtection { threshold: 0.0, replacement: HubReplacement::Refactor },
        ]);
        assert_eq!(
            gate.evaluate(&f.ctx(0), &Event::feature_change("hub")),
            GateDecision::Blocked { rule: "health_floor".into() }
        );

        let mut reversed = GovernanceGate::from_specs(&[
            RuleSpec::HubProtection { threshold: 0.0, replacement: HubReplacement::AddConstraint },
            RuleSpec::HealthFloor { floor: 0.3 },
        ]);
        assert_eq!(
            reversed.evaluate(&f.ctx(0), &Event::feature_change("hub")),
            GateDecision::Replaced {
                rule: "hub_protection".into(),
                event: Event::add_constraint("hub")
            }
        );
    }

    #[test]
    fn test_emergency_brake_cooldown() {
        let mut f = Fixture::new();
        let mut gate = GovernanceGate::from_specs(&[RuleSpec::EmergencyBrake {
            ceiling: 0.5,
            cooldown_steps: 2,
        }]);
        assert!(f.diagnostics.h > 0.5);

        gate.observe(&f.ctx(3));
        let add_edge = Event::add_edge("hub", "leaf");
        assert!(matches!(gate.evaluate(&f.ctx(3), &add_edge), GateDecision::Blocked { .. }));
        assert_eq!(gate.evaluate(&f.ctx(3), &Event::refactor("hub")), GateDecision::Allowed);

        // stress gone, freeze still lasts through step 5
        f.diagnostics.h = 0.0;
        gate.observe(&f.ctx(5));
        let feature = Event::feature_change("leaf");
        assert!(matches!(gate.evaluate(&f.ctx(5), &feature), GateDecision::Blocked { .. }));
        gate.observe(&f.ctx(6));
        assert_eq!(gate.evaluate(&f.ctx(6), &feature), GateDecision::Allowed);
    }

    #[test]
    fn test_emergency_brake_arms_behind_deciding_rule() {
        let mut f = Fixture::new();
        let mut gate = GovernanceGate::from_specs(&[
            RuleSpec::HealthFloor { floor: 0.3 },
            RuleSpec::EmergencyBrake { ceiling: 0.5, cooldown_steps: 3 },
        ]);

        // the only proposal of step 3 is decided by the health floor
        gate.observe(&f.ctx(3));
        assert_eq!(
            gate.evaluate(&f.ctx(3), &Event::feature_change("hub")),
            GateDecision::Blocked { rule: "health_floor".into() }
        );

        f.diagnostics.h = 0.0;
        gate.observe(&f.ctx(4));
        assert_eq!(
            gate.evaluate(&f.ctx(4), &Event::add_edge("hub", "leaf")),
            GateDecision::Blocked { rule: "emergency_brake".into() }
        );
        gate.observe(&f.ctx(7));
        assert_eq!(
            gate.evaluate(&f.ctx(7), &Event::add_edge("hub", "leaf")),
            GateDecision::Allowed
        );
    }

    #[test]
    fn test_emergency_brake_unbounded_cooldown() {
        let f = Fixture::new();
        let spec: RuleSpec = serde_json::from_str(
            r#"{"rule":"emergency_brake","ceiling":0.5,"cooldown_steps":18446744073709551615}"#,
        )
        .unwrap();
        let mut gate = GovernanceGate::from_specs(&[spec]);

        gate.observe(&f.ctx(10));
        gate.observe(&f.ctx(11));
        let feature = Event::feature_change("leaf");
        assert!(matches!(gate.evaluate(&f.ctx(u64::MAX), &feature), GateDecision::Blocked { .. }));
    }

    #[test]
    fn test_incident_budget() {
        let f = Fixture::new();
        let feature = Event::feature_change("leaf");
        let mut gate =
            GovernanceGate::from_specs(&[RuleSpec::IncidentBudget { max_incidents: 0, window: 5 }]);
        assert!(matches!(gate.evaluate(&f.ctx(0), &feature), GateDecision::Blocked { .. }));

        let mut lenient =
            GovernanceGate::from_specs(&[RuleSpec::IncidentBudget { max_incidents: 1, window: 5 }]);
        assert_eq!(lenient.evaluate(&f.ctx(0), &feature), GateDecision::Allowed);
    }

    #[test]
    fn test_install_replaces_and_remove() {
        let mut gate = GovernanceGate::from_specs(&[
            RuleSpec::HealthFloor { floor: 0.3 },
            RuleSpec::EmergencyBrake { ceiling: 2.0, cooldown_steps: 1 },
        ]);
        gate.install(&RuleSpec::HealthFloor { floor: 0.5 });
        assert_eq!(gate.rule_names(), vec!["health_floor", "emergency_brake"]);

        assert!(gate.remove("health_floor"));
        assert!(!gate.remove("health_floor"));
        assert_eq!(gate.len(), 1);
    }

    #[test]
    fn test_rule_spec_serde() {
        let spec: RuleSpec =
            serde_json::from_str(r#"{"rule":"hub_protection","threshold":0.2}"#).unwrap();
        assert_eq!(
            spec,
            RuleSpec::HubProtection { threshold: 0.2, replacement: HubReplacement::Refactor }
        );

        let change: GovernanceChange =
            serde_json::from_str(r#"{"op":"remove","name":"health_floor"}"#).unwrap();
        assert_eq!(change.to_string(), "remove health_floor");
    }
}
