//! SimulationState - the aggregate root of a run.

use crate::context::SeedStreams;
use crate::error::{SimError, SimResult};
use crate::events::Event;
use crate::governance::{GateContext, GateDecision, GovernanceChange, GovernanceGate, RuleSpec};
use crate::incidents::{Incident, IncidentModel};

use tensegrity_core::{Diagnostics, FieldStore, GraphModel};
use tracing::debug;

/// Everything a run mutates: topology, fields, diagnostics, governance rules,
/// the incident RNG and the step counter.
///
/// Created once per run, mutated in place once per step, and never shared
/// between runs.
#[derive(Debug)]
pub struct SimulationState {
    /// Dependency graph
    pub(crate) graph: GraphModel,

    /// Per-node fields (primitive and derived)
    pub(crate) fields: FieldStore,

    /// Badness at the end of the previous step (`None` before the first step)
    bad_prev: Option<Vec<f64>>,

    /// Diagnostics from the last recompute
    diagnostics: Diagnostics,

    /// Installed governance rules
    governance: GovernanceGate,

    /// Governance changes waiting for the next step
    pub(crate) pending_governance: Vec<GovernanceChange>,

    /// Incident sampler and history
    incidents: IncidentModel,

    /// Current step
    step: u64,
}

impl SimulationState {
    /// Builds the initial state and computes derived fields and diagnostics.
    pub fn new(
        graph: GraphModel,
        fields: FieldStore,
        rules: &[RuleSpec],
        streams: SeedStreams,
        incidents_enabled: bool,
    ) -> SimResult<Self> {
        if graph.node_count() != fields.len() {
            return Err(SimError::scenario(format!(
                "{} nodes but {} field entries",
                graph.node_count(),
                fields.len()
            )));
        }
        let mut state = Self {
            graph,
            fields,
            bad_prev: None,
            diagnostics: Diagnostics::default(),
            governance: GovernanceGate::from_specs(rules),
            pending_governance: Vec::new(),
            incidents: IncidentModel::new(streams.incident_rng(), incidents_enabled),
            step: 0,
        };
        state.refresh_derived()?;
        state.recompute_diagnostics()?;
        Ok(state)
    }

    pub fn graph(&self) -> &GraphModel {
        &self.graph
    }

    pub fn fields(&self) -> &FieldStore {
        &self.fields
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn governance(&self) -> &GovernanceGate {
        &self.governance
    }

    pub fn incidents(&self) -> &IncidentModel {
        &self.incidents
    }

    pub fn bad_prev(&self) -> Option<&[f64]> {
        self.bad_prev.as_deref()
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    /// Governance changes queued for the next step.
    pub fn pending_governance(&self) -> &[GovernanceChange] {
        &self.pending_governance
    }

    /// Applies an event and refreshes badness and flow.
    ///
    /// A failing event leaves the state untouched.
    pub fn apply_event(&mut self, event: &Event) -> SimResult<()> {
        event.apply(self)?;
        self.refresh_derived()
    }

    /// Recomputes badness, gradient and flow.
    pub fn refresh_derived(&mut self) -> SimResult<()> {
        self.fields.recompute_derived(&self.graph)?;
        Ok(())
    }

    /// Recomputes energies against the previous badness snapshot.
    pub fn recompute_diagnostics(&mut self) -> SimResult<()> {
        self.diagnostics =
            Diagnostics::compute(&self.graph, &self.fields, self.bad_prev.as_deref())?;
        Ok(())
    }

    /// Runs a proposed event through the governance gate.
    pub fn gate(&mut self, event: &Event) -> GateDecision {
        let ctx = GateContext {
            graph: &self.graph,
            fields: &self.fields,
            diagnostics: &self.diagnostics,
            incidents: &self.incidents,
            step: self.step,
        };
        self.governance.evaluate(&ctx, event)
    }

    /// Lets every installed rule update its state from this step's
    /// diagnostics, whether or not a proposal reaches it.
    pub fn observe_governance(&mut self) {
        let ctx = GateContext {
            graph: &self.graph,
            fields: &self.fields,
            diagnostics: &self.diagnostics,
            incidents: &self.incidents,
            step: self.step,
        };
        self.governance.observe(&ctx);
    }

    /// Installs or removes queued governance rules.
    pub fn commit_governance(&mut self) {
        for change in std::mem::take(&mut self.pending_governance) {
            match change {
                GovernanceChange::Install { rule } => {
                    debug!("step {}: installing rule {}", self.step, rule.name());
                    self.governance.install(&rule);
                }
                GovernanceChange::Remove { name } => {
                    if !self.governance.remove(&name) {
                        debug!(
                            "step {}: rule {} not installed, nothing to remove",
                            self.step, name
                        );
                    }
                }
            }
        }
    }

    /// Samples this step's incidents.
    pub fn sample_incidents(&mut self) -> Vec<Incident> {
        self.incidents.sample(self.step, &self.graph, &self.fields)
    }

    /// Keeps the current badness for the next step's kinetic energy.
    pub fn snapshot_badness(&mut self) {
        self.bad_prev = Some(self.fields.snapshot_badness());
    }

    pub(crate) fn advance_step(&mut self) {
        self.step += 1;
    }
}
