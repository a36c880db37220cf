//! Step records, run logs and JSON export.
//!
//! Field names follow the physics notation (`H`, `T`, `V`, `E_local`) so the
//! exported logs can be plotted directly as phase portraits.

use crate::error::SimResult;
use crate::events::Event;
use crate::incidents::Incident;
use crate::state::SimulationState;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tensegrity_core::{NodeId, HIGH_RISK_THRESHOLD};

/// Per-node view at the end of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub health: f64,
    pub complexity: f64,
    pub risk: f64,
    pub demand: f64,
    pub bad: f64,
    pub flow: [f64; 2],
    #[serde(rename = "E_local")]
    pub e_local: f64,
}

/// An event that landed this step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedEvent {
    /// Actor name, or `schedule` / `environment`
    pub source: String,

    pub event: Event,

    /// Governance rule that rewrote the proposal
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rewritten_by: Option<String>,

    /// Original proposal when rewritten
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub original: Option<Event>,
}

/// Why a proposal did not land.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RejectionReason {
    Blocked { rule: String },
    Failed { error: String },
}

/// A proposal that was blocked or failed to apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedEvent {
    pub source: String,
    pub event: Event,
    pub reason: RejectionReason,
}

/// Everything observable about one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: u64,
    #[serde(rename = "H")]
    pub h: f64,
    #[serde(rename = "T")]
    pub t: f64,
    #[serde(rename = "V")]
    pub v: f64,
    #[serde(rename = "V_struct")]
    pub v_struct: f64,
    #[serde(rename = "V_bus")]
    pub v_bus: f64,
    #[serde(rename = "L")]
    pub lagrangian: f64,
    pub per_node: BTreeMap<String, NodeRecord>,
    pub incidents: Vec<Incident>,
    pub events_applied: Vec<AppliedEvent>,
    pub events_rejected: Vec<RejectedEvent>,
}

impl StepRecord {
    /// Captures the state after diagnostics were recomputed.
    pub fn capture(
        state: &SimulationState,
        incidents: Vec<Incident>,
        events_applied: Vec<AppliedEvent>,
        events_rejected: Vec<RejectedEvent>,
    ) -> Self {
        let d = state.diagnostics();
        let fields = state.fields();
        let per_node = state
            .graph()
            .nodes()
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let n = fields.node(i);
                let flow = fields.flow(i);
                let record = NodeRecord {
                    health: n.health,
                    complexity: n.complexity,
                    risk: n.risk,
                    demand: n.demand,
                    bad: fields.bad(i),
                    flow: [flow.x, flow.y],
                    e_local: d.local_energy(i),
                };
                (id.to_string(), record)
            })
            .collect();

        Self {
            step: state.step(),
            h: d.h,
            t: d.t,
            v: d.v,
            v_struct: d.v_struct,
            v_bus: d.v_bus,
            lagrangian: d.lagrangian,
            per_node,
            incidents,
            events_applied,
            events_rejected,
        }
    }

    pub fn blocked_count(&self) -> usize {
        self.events_rejected
            .iter()
            .filter(|r| matches!(r.reason, RejectionReason::Blocked { .. }))
            .count()
    }

    pub fn replaced_count(&self) -> usize {
        self.events_applied.iter().filter(|a| a.rewritten_by.is_some()).count()
    }
}

/// How many hubs the summary keeps.
pub const TOP_HUBS: usize = 3;

/// Aggregates over a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub steps: usize,
    pub max_h: f64,
    pub mean_h: f64,
    pub final_h: f64,
    pub total_incidents: usize,
    pub events_applied: usize,
    pub events_blocked: usize,
    pub events_replaced: usize,
    pub events_failed: usize,

    /// Highest local-energy nodes after the latest step, highest first
    #[serde(default)]
    pub top_hubs: Vec<(NodeId, f64)>,

    /// Nodes whose badness exceeded [`HIGH_RISK_THRESHOLD`] after the latest step
    #[serde(default)]
    pub high_risk_nodes: Vec<NodeId>,
}

impl RunSummary {
    /// Folds one more step into the aggregates.
    pub fn record(&mut self, record: &StepRecord) {
        self.steps += 1;
        self.max_h = if self.steps == 1 { record.h } else { self.max_h.max(record.h) };
        self.mean_h += (record.h - self.mean_h) / self.steps as f64;
        self.final_h = record.h;
        self.total_incidents += record.incidents.len();
        self.events_applied += record.events_applied.len();

        let blocked = record.blocked_count();
        self.events_blocked += blocked;
        self.events_replaced += record.replaced_count();
        self.events_failed += record.events_rejected.len() - blocked;
    }
}

/// Records of a run plus their summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunLog {
    pub records: Vec<StepRecord>,
    pub summary: RunSummary,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record and folds it into the summary.
    pub fn push(&mut self, record: StepRecord) {
        self.summary.record(&record);
        self.records.push(record);
    }

    /// Refreshes the summary's hub and high-risk lists from `state`.
    pub fn note_hotspots(&mut self, state: &SimulationState) {
        let graph = state.graph();
        self.summary.top_hubs = state.diagnostics().top_local_energy(graph, TOP_HUBS);
        self.summary.high_risk_nodes = state
            .fields()
            .high_risk(HIGH_RISK_THRESHOLD)
            .into_iter()
            .map(|i| graph.node_id(i).clone())
            .collect();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// H over time.
    pub fn hamiltonian_series(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.h).collect()
    }

    /// `(T, V)` per step, for phase portraits.
    pub fn phase_trajectory(&self) -> Vec<(f64, f64)> {
        self.records.iter().map(|r| (r.t, r.v)).collect()
    }
}

/// Complete run export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    pub n_steps: u64,

    pub log: RunLog,
}

impl RunExport {
    pub fn new(scenario: &str, seed: u64, n_steps: u64, log: RunLog) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            n_steps,
            log,
        }
    }

    /// Pretty JSON rendering.
    pub fn to_json(&self) -> SimResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> SimResult<()> {
        let json = self.to_json()?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SeedStreams;
    use approx::assert_relative_eq;
    use tensegrity_core::{Edge, EngineParams, FieldStore, GraphModel, NodeFields};

    fn record(step: u64, h: f64) -> StepRecord {
        StepRecord {
            step,
            h,
            t: 0.0,
            v: h,
            v_struct: 0.0,
            v_bus: h,
            lagrangian: -h,
            per_node: BTreeMap::new(),
            incidents: Vec::new(),
            events_applied: vec![AppliedEvent {
                source: "agent".into(),
                event: Event::refactor("a"),
                rewritten_by: Some("hub_protection".into()),
                original: Some(Event::feature_change("a")),
            }],
            events_rejected: vec![
                RejectedEvent {
                    source: "alice".into(),
                    event: Event::feature_change("b"),
                    reason: RejectionReason::Blocked { rule: "health_floor".into() },
                },
                RejectedEvent {
                    source: "schedule".into(),
                    event: Event::patch("ghost"),
                    reason: RejectionReason::Failed { error: "Node not found: ghost".into() },
                },
            ],
        }
    }

    #[test]
    fn test_summary() {
        let mut log = RunLog::new();
        log.push(record(0, 1.0));
        log.push(record(1, 3.0));
        log.push(record(2, 2.0));

        let s = &log.summary;
        assert_eq!(s.steps, 3);
        assert_eq!(s.max_h, 3.0);
        assert_eq!(s.mean_h, 2.0);
        assert_eq!(s.final_h, 2.0);
        assert_eq!(s.events_applied, 3);
        assert_eq!(s.events_replaced, 3);
        assert_eq!(s.events_blocked, 3);
        assert_eq!(s.events_failed, 3);
        assert_eq!(log.phase_trajectory()[1], (0.0, 3.0));
    }

    #[test]
    fn test_summary_folds_long_runs() {
        let mut log = RunLog::new();
        for step in 0..5000u64 {
            log.push(record(step, (step % 100) as f64));
        }
        let s = &log.summary;
        assert_eq!(s.steps, 5000);
        assert_eq!(s.max_h, 99.0);
        assert_relative_eq!(s.mean_h, 49.5, epsilon = 1e-9);
        assert_eq!(s.final_h, 99.0);
        assert_eq!(s.events_failed, 5000);
    }

    #[test]
    fn test_note_hotspots() {
        let graph = GraphModel::with_edges(
            ["core", "api", "docs"],
            &[Edge::new("core", "api", 1.0), Edge::new("api", "docs", 0.2)],
        )
        .unwrap();
        let fields = FieldStore::from_values(
            EngineParams::default(),
            vec![
                NodeFields::new(0.0, 1.0, 1.0, 0.5),
                NodeFields::new(0.5, 0.0, 0.0, 0.5),
                NodeFields::new(1.0, 0.0, 0.0, 0.1),
            ],
        );
        let state = SimulationState::new(graph, fields, &[], SeedStreams::new(1), false).unwrap();

        let mut log = RunLog::new();
        log.note_hotspots(&state);
        let hubs: Vec<&str> = log.summary.top_hubs.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(hubs, vec!["api", "core", "docs"]);
        assert_eq!(log.summary.high_risk_nodes, vec![NodeId::from("core")]);
    }

    #[test]
    fn test_physics_field_names() {
        let json = serde_json::to_value(record(0, 1.5)).unwrap();
        assert_eq!(json["H"], 1.5);
        assert_eq!(json["L"], -1.5);
        assert!(json.get("V_struct").is_some());
        assert_eq!(json["events_rejected"][0]["reason"]["type"], "blocked");
    }

    #[test]
    fn test_write_to_file() {
        let mut log = RunLog::new();
        log.push(record(0, 1.0));
        let export = RunExport::new("baseline", 42, 1, log);
        let path = std::env::temp_dir()
            .join(format!("tensegrity_export_{}.json", std::process::id()));

        export.write_to_file(&path).unwrap();
        let back: RunExport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(back, export);
    }
}
