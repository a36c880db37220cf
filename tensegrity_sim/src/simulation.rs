//! Simulation - the discrete-event loop.
//!
//! A run is single-threaded and fully determined by its scenario and seed.
//! Each step commits queued governance, fires scheduled events, lets every
//! actor propose through the governance gate, applies entropy, recomputes
//! energies, samples incidents and appends one [`StepRecord`].

use crate::actors::ActorPolicy;
use crate::context::SeedStreams;
use crate::error::{SimError, SimResult};
use crate::events::Event;
use crate::exporter::{AppliedEvent, RejectedEvent, RejectionReason, RunLog, StepRecord};
use crate::governance::GateDecision;
use crate::scenarios::Scenario;
use crate::schedule::EventSchedule;
use crate::state::SimulationState;

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Source tag of scheduled events in the log.
pub const SCHEDULE_SOURCE: &str = "schedule";

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initialized,
    Running,
    Completed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Initialized => "initialized",
            Phase::Running => "running",
            Phase::Completed => "completed",
        }
    }
}

/// Configuration for a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Number of steps to run
    pub n_steps: u64,

    /// Health lost by every node at the end of each step
    pub health_decay_rate: f64,

    /// Whether incidents are recorded (draws are consumed either way)
    pub enable_incidents: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            n_steps: 100,
            health_decay_rate: 0.0,
            enable_incidents: true,
        }
    }
}

/// Cooperative cancellation flag, checked between steps.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A single simulation run.
#[derive(Debug)]
pub struct Simulation {
    scenario: String,
    config: SimConfig,
    state: SimulationState,
    actors: Vec<Box<dyn ActorPolicy>>,
    schedule: EventSchedule,
    phase: Phase,
    log: RunLog,
    stop: StopHandle,
}

impl Simulation {
    /// Builds the initial state, the actor roster and the schedule.
    pub fn new(scenario: &Scenario, config: SimConfig) -> SimResult<Self> {
        let streams = SeedStreams::new(config.seed);
        let state = scenario.build_state(streams, config.enable_incidents)?;
        let actors = scenario
            .actors
            .iter()
            .enumerate()
            .map(|(i, spec)| spec.build(streams.actor_rng(i)))
            .collect::<SimResult<Vec<_>>>()?;

        info!(
            "Simulation '{}' initialized: seed={}, nodes={}, actors={}, rules={}",
            scenario.name,
            config.seed,
            state.graph().node_count(),
            actors.len(),
            state.governance().len()
        );
        let schedule = EventSchedule::from_entries(&scenario.schedule);
        if let Some(last) = schedule.last_step().filter(|last| *last >= config.n_steps) {
            warn!(
                "Scenario '{}' schedules events up to step {} but runs only {} steps",
                scenario.name, last, config.n_steps
            );
        }

        Ok(Self {
            scenario: scenario.name.clone(),
            config,
            state,
            actors,
            schedule,
            phase: Phase::Initialized,
            log: RunLog::new(),
            stop: StopHandle::default(),
        })
    }

    /// Builds a run with the scenario's own seed and step count.
    pub fn from_scenario(scenario: &Scenario) -> SimResult<Self> {
        Self::new(scenario, scenario.config())
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    pub fn into_log(self) -> RunLog {
        self.log
    }

    /// Handle that stops the run before its next step.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// True when the run should not take another step.
    pub fn should_stop(&self) -> bool {
        self.stop.is_stopped() || self.state.step() >= self.config.n_steps
    }

    /// Advances the simulation by one step.
    pub fn step(&mut self) -> SimResult<&StepRecord> {
        if self.phase == Phase::Completed {
            return Err(SimError::InvalidPhase {
                phase: self.phase.as_str(),
                action: "step",
            });
        }
        self.phase = Phase::Running;
        let step = self.state.step();
        let mut applied = Vec::new();
        let mut rejected = Vec::new();

        self.state.commit_governance();
        self.state.observe_governance();

        for event in self.schedule.events_at(step) {
            Self::apply(&mut self.state, SCHEDULE_SOURCE, event, None, &mut applied, &mut rejected);
        }

        for actor in self.actors.iter_mut() {
            let proposal = actor.choose_action(&self.state);
            if proposal.is_noop() {
                continue;
            }
            match self.state.gate(&proposal) {
                GateDecision::Allowed => {
                    Self::apply(
                        &mut self.state,
                        actor.name(),
                        &proposal,
                        None,
                        &mut applied,
                        &mut rejected,
                    );
                }
                GateDecision::Blocked { rule } => {
                    debug!("step {}: {} blocked {} from {}", step, rule, proposal, actor.name());
                    rejected.push(RejectedEvent {
                        source: actor.name().to_string(),
                        event: proposal,
                        reason: RejectionReason::Blocked { rule },
                    });
                }
                GateDecision::Replaced { rule, event } => {
                    debug!("step {}: {} rewrote {} into {}", step, rule, proposal, event);
                    Self::apply(
                        &mut self.state,
                        actor.name(),
                        &event,
                        Some((rule, proposal)),
                        &mut applied,
                        &mut rejected,
                    );
                }
            }
        }

        if self.config.health_decay_rate > 0.0 {
            let decay = Event::HealthDecay { node: None, rate: self.config.health_decay_rate };
            self.state.apply_event(&decay)?;
        }

        self.state.refresh_derived()?;
        self.state.recompute_diagnostics()?;
        let incidents = self.state.sample_incidents();
        let record = StepRecord::capture(&self.state, incidents, applied, rejected);
        debug!(
            "step {}: H={:.4} T={:.4} V={:.4} incidents={}",
            step,
            record.h,
            record.t,
            record.v,
            record.incidents.len()
        );

        self.state.snapshot_badness();
        self.state.advance_step();
        self.log.push(record);
        self.log.note_hotspots(&self.state);
        if self.state.step() >= self.config.n_steps {
            self.phase = Phase::Completed;
        }

        self.log
            .records
            .last()
            .ok_or_else(|| SimError::scenario("step produced no record"))
    }

    /// Runs until `n_steps` or until stopped.
    pub fn run(&mut self) -> SimResult<&RunLog> {
        if self.phase == Phase::Completed {
            return Err(SimError::InvalidPhase {
                phase: self.phase.as_str(),
                action: "run",
            });
        }
        info!(
            "Running '{}' for {} steps (seed {})",
            self.scenario, self.config.n_steps, self.config.seed
        );

        while !self.should_stop() {
            self.step()?;
        }
        if self.stop.is_stopped() {
            warn!("Run '{}' stopped at step {}", self.scenario, self.state.step());
        }
        self.phase = Phase::Completed;

        let summary = &self.log.summary;
        info!(
            "Run '{}' complete: steps={}, max H={:.4}, final H={:.4}, incidents={}",
            self.scenario, summary.steps, summary.max_h, summary.final_h, summary.total_incidents
        );
        Ok(&self.log)
    }

    /// Applies one event and files it as applied or failed.
    fn apply(
        state: &mut SimulationState,
        source: &str,
        event: &Event,
        rewrite: Option<(String, Event)>,
        applied: &mut Vec<AppliedEvent>,
        rejected: &mut Vec<RejectedEvent>,
    ) {
        match state.apply_event(event) {
            Ok(()) => {
                let (rewritten_by, original) = rewrite.unzip();
                applied.push(AppliedEvent {
                    source: source.to_string(),
                    event: event.clone(),
                    rewritten_by,
                    original,
                });
            }
            Err(e) => {
                warn!("step {}: {} from {} failed: {}", state.step(), event, source, e);
                rejected.push(RejectedEvent {
                    source: source.to_string(),
                    event: event.clone(),
                    reason: RejectionReason::Failed { error: e.to_string() },
                });
            }
        }
    }
}
