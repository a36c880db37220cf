//! Scenario definitions and the built-in catalogue.

use crate::actors::ActorSpec;
use crate::context::SeedStreams;
use crate::error::{SimError, SimResult};
use crate::events::Event;
use crate::governance::{HubReplacement, RuleSpec};
use crate::schedule::ScheduledEvent;
use crate::simulation::SimConfig;
use crate::state::SimulationState;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tensegrity_core::{Edge, EngineParams, FieldStore, GraphModel, NodeFields, NodeId};

fn default_health() -> f64 {
    1.0
}

/// Initial fields of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    #[serde(default = "default_health")]
    pub health: f64,
    #[serde(default)]
    pub complexity: f64,
    #[serde(default)]
    pub risk: f64,
    #[serde(default)]
    pub demand: f64,
}

impl NodeSpec {
    pub fn new(
        id: impl Into<NodeId>,
        health: f64,
        complexity: f64,
        risk: f64,
        demand: f64,
    ) -> Self {
        Self { id: id.into(), health, complexity, risk, demand }
    }

    /// Node whose risk is derived as `complexity·(1 - health)`.
    pub fn derived_risk(id: impl Into<NodeId>, health: f64, complexity: f64, demand: f64) -> Self {
        Self::new(id, health, complexity, complexity * (1.0 - health), demand)
    }

    fn fields(&self) -> NodeFields {
        NodeFields::new(self.health, self.complexity, self.risk, self.demand)
    }
}

fn default_steps() -> u64 {
    SimConfig::default().n_steps
}

fn default_seed() -> u64 {
    SimConfig::default().seed
}

fn default_incidents() -> bool {
    true
}

/// A complete, serializable simulation setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Roster, in proposal order
    #[serde(default)]
    pub actors: Vec<ActorSpec>,
    #[serde(default)]
    pub schedule: Vec<ScheduledEvent>,
    /// Rules installed at step 0, in precedence order
    #[serde(default)]
    pub governance: Vec<RuleSpec>,
    #[serde(default)]
    pub params: Option<EngineParams>,
    #[serde(default = "default_steps")]
    pub n_steps: u64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub health_decay_rate: f64,
    #[serde(default = "default_incidents")]
    pub enable_incidents: bool,
}

impl Scenario {
    /// Parses and validates a scenario.
    pub fn from_json_str(json: &str) -> SimResult<Self> {
        let scenario: Scenario = serde_json::from_str(json)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Loads a scenario file.
    pub fn from_file(path: impl AsRef<Path>) -> SimResult<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_steps(mut self, n_steps: u64) -> Self {
        self.n_steps = n_steps;
        self
    }

    /// Same scenario with no rules installed at start.
    pub fn without_governance(mut self) -> Self {
        self.governance.clear();
        self
    }

    pub fn with_governance(mut self, rules: Vec<RuleSpec>) -> Self {
        self.governance = rules;
        self
    }

    /// Run configuration carried by the scenario.
    pub fn config(&self) -> SimConfig {
        SimConfig {
            seed: self.seed,
            n_steps: self.n_steps,
            health_decay_rate: self.health_decay_rate,
            enable_incidents: self.enable_incidents,
        }
    }

    /// Checks cross references that serde cannot.
    pub fn validate(&self) -> SimResult<()> {
        if self.nodes.is_empty() {
            return Err(SimError::scenario(format!("{}: no nodes", self.name)));
        }
        let mut names = HashSet::new();
        for actor in &self.actors {
            if !names.insert(actor.name()) {
                return Err(SimError::scenario(format!(
                    "{}: duplicate actor {}",
                    self.name,
                    actor.name()
                )));
            }
        }
        if !(self.health_decay_rate.is_finite() && self.health_decay_rate >= 0.0) {
            return Err(SimError::scenario(format!(
                "{}: invalid health decay rate {}",
                self.name, self.health_decay_rate
            )));
        }
        // graph construction rejects unknown endpoints, duplicates and bad weights
        self.build_graph().map(|_| ())
    }

    fn build_graph(&self) -> SimResult<GraphModel> {
        let ids = self.nodes.iter().map(|n| n.id.clone());
        Ok(GraphModel::with_edges(ids, &self.edges)?)
    }

    /// Builds the initial simulation state.
    pub fn build_state(
        &self,
        streams: SeedStreams,
        incidents_enabled: bool,
    ) -> SimResult<SimulationState> {
        let graph = self.build_graph()?;
        let params = self.params.unwrap_or_default().sanitized();
        let values = self.nodes.iter().map(NodeSpec::fields).collect();
        let fields = FieldStore::from_values(params, values);
        SimulationState::new(graph, fields, &self.governance, streams, incidents_enabled)
    }
}

/// Built-in scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Six-module system with a feature engineer, a refactor engineer and an agent
    Baseline,

    /// Star graph around a hot hub, worked by a single flow-following agent
    HubStress,

    /// Baseline under scheduled demand shocks and a new requirement
    DemandSurge,

    /// Baseline with hub protection, a health floor and an emergency brake
    GovernedBaseline,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Baseline,
            ScenarioId::HubStress,
            ScenarioId::DemandSurge,
            ScenarioId::GovernedBaseline,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Baseline => "baseline",
            ScenarioId::HubStress => "hub_stress",
            ScenarioId::DemandSurge => "demand_surge",
            ScenarioId::GovernedBaseline => "governed_baseline",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Baseline => "Six modules, three actors, 1% health decay per step",
            ScenarioId::HubStress => "Sick hub with four healthy leaves, one AI agent",
            ScenarioId::DemandSurge => "Baseline with demand shocks and a new payments module",
            ScenarioId::GovernedBaseline => {
                "Baseline under hub protection, health floor and emergency brake"
            }
        }
    }

    /// Builds the scenario definition.
    pub fn build(&self) -> Scenario {
        match self {
            ScenarioId::Baseline => baseline(),
            ScenarioId::HubStress => hub_stress(),
            ScenarioId::DemandSurge => demand_surge(),
            ScenarioId::GovernedBaseline => governed_baseline(),
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "baseline" => Ok(ScenarioId::Baseline),
            "hub_stress" | "hubstress" => Ok(ScenarioId::HubStress),
            "demand_surge" | "demandsurge" => Ok(ScenarioId::DemandSurge),
            "governed_baseline" | "governedbaseline" | "governed" => {
                Ok(ScenarioId::GovernedBaseline)
            }
            _ => Err(SimError::UnknownScenario(s.to_string())),
        }
    }
}

fn baseline() -> Scenario {
    Scenario {
        name: ScenarioId::Baseline.name().to_string(),
        nodes: vec![
            NodeSpec::derived_risk("A_core", 0.8, 0.7, 0.4),
            NodeSpec::derived_risk("B_api", 0.8, 0.6, 0.5),
            NodeSpec::derived_risk("C_db", 0.7, 0.5, 0.3),
            NodeSpec::derived_risk("D_featureX", 0.6, 0.4, 0.7),
            NodeSpec::derived_risk("E_featureY", 0.6, 0.4, 0.5),
            NodeSpec::derived_risk("F_util", 0.7, 0.3, 0.2),
        ],
        edges: vec![
            Edge::new("A_core", "B_api", 0.9),
            Edge::new("A_core", "C_db", 0.7),
            Edge::new("A_core", "F_util", 0.4),
            Edge::new("B_api", "D_featureX", 0.6),
            Edge::new("B_api", "E_featureY", 0.5),
            Edge::new("C_db", "D_featureX", 0.3),
        ],
        actors: vec![
            ActorSpec::feature_engineer("Alice"),
            ActorSpec::refactor_engineer("Bob"),
            ActorSpec::AiAgent { name: "Agent-1".into(), threshold: 0.05, feature_bias: 0.1 },
        ],
        schedule: Vec::new(),
        governance: Vec::new(),
        params: None,
        n_steps: 100,
        seed: 42,
        health_decay_rate: 0.01,
        enable_incidents: true,
    }
}

fn hub_stress() -> Scenario {
    let leaves = ["leaf_1", "leaf_2", "leaf_3", "leaf_4"];
    let mut nodes = vec![NodeSpec::new("core", 0.3, 0.8, 0.6, 1.0)];
    nodes.extend(leaves.iter().map(|id| NodeSpec::new(*id, 1.0, 0.0, 0.0, 0.0)));

    Scenario {
        name: ScenarioId::HubStress.name().to_string(),
        nodes,
        edges: leaves.iter().map(|id| Edge::new("core", *id, 0.5)).collect(),
        actors: vec![ActorSpec::AiAgent {
            name: "Agent-1".into(),
            threshold: 0.0,
            feature_bias: 0.0,
        }],
        schedule: Vec::new(),
        governance: Vec::new(),
        params: None,
        n_steps: 10,
        seed: 42,
        health_decay_rate: 0.0,
        enable_incidents: true,
    }
}

fn demand_surge() -> Scenario {
    let mut scenario = baseline();
    scenario.name = ScenarioId::DemandSurge.name().to_string();
    scenario.n_steps = 60;
    scenario.schedule = vec![
        ScheduledEvent::new(10, Event::demand_shock("D_featureX", 0.3)),
        ScheduledEvent::new(
            20,
            Event::NewRequirement {
                id: "G_payments".into(),
                demand: 0.8,
                health: 0.9,
                complexity: 0.3,
                risk: 0.1,
                edges: vec![("B_api".into(), 0.6), ("C_db".into(), 0.4)],
            },
        ),
        ScheduledEvent::new(35, Event::demand_shock("E_featureY", 0.4)),
        ScheduledEvent::new(45, Event::demand_shock("D_featureX", -0.5)),
    ];
    scenario
}

fn governed_baseline() -> Scenario {
    let mut scenario = baseline();
    scenario.name = ScenarioId::GovernedBaseline.name().to_string();
    scenario.governance = vec![
        RuleSpec::HubProtection { threshold: 0.02, replacement: HubReplacement::Refactor },
        RuleSpec::HealthFloor { floor: 0.3 },
        RuleSpec::EmergencyBrake { ceiling: 2.0, cooldown_steps: 3 },
    ];
    scenario
}
