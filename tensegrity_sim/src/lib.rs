//! Tensegrity Simulation Harness
//!
//! Deterministic discrete-event simulation of how a software system evolves
//! under the pressure of the people (and agents) working on it. The model
//! itself (graph, fields, energies) lives in `tensegrity_core`; this crate
//! drives it.
//!
//! # Core Principle: One Seed, One History
//!
//! Every source of randomness is a ChaCha8 stream derived from a single
//! 64-bit seed:
//! - **Actors**: one stream per roster slot
//! - **Incidents**: a dedicated stream, one draw per node per step
//!
//! Identical `(scenario, seed)` pairs produce byte-identical JSON logs.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Simulation                           │
//! │  ┌───────────────┐   ┌────────────┐   ┌─────────────────┐   │
//! │  │ EventSchedule │   │   Actors   │   │  IncidentModel  │   │
//! │  │  (ungated)    │   │ (propose)  │   │  (observe)      │   │
//! │  └──────┬────────┘   └─────┬──────┘   └────────▲────────┘   │
//! │         │            ┌─────▼──────┐            │            │
//! │         │            │ Governance │            │            │
//! │         │            │    Gate    │            │            │
//! │         │            └─────┬──────┘            │            │
//! │  ┌──────▼──────────────────▼───────────────────┴────────┐   │
//! │  │ SimulationState (GraphModel + FieldStore + energies) │   │
//! │  └───────────────────────────┬──────────────────────────┘   │
//! │                              ▼                              │
//! │                    RunLog / StepRecord                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use tensegrity_sim::{ScenarioId, ScenarioRunner};
//!
//! let scenario = ScenarioId::Baseline.build();
//! let result = ScenarioRunner::new(42).with_steps(50).run(&scenario)?;
//! println!("max H = {:.3}", result.summary.max_h);
//! ```

pub mod actors;
mod context;
pub mod error;
pub mod events;
pub mod exporter;
pub mod governance;
pub mod incidents;
pub mod invariants;
pub mod runner;
pub mod scenarios;
pub mod schedule;
pub mod simulation;
mod state;

pub use actors::{
    ActionKind, ActionTable, ActorPolicy, ActorSpec, AiAgent, FeatureEngineer, RefactorEngineer,
};
pub use context::SeedStreams;
pub use error::{SimError, SimResult};
pub use events::{Event, FieldDelta};
pub use exporter::{
    AppliedEvent, NodeRecord, RejectedEvent, RejectionReason, RunExport, RunLog, RunSummary,
    StepRecord,
};
pub use governance::{
    GateContext, GateDecision, GovernanceChange, GovernanceGate, GovernanceRule, HubReplacement,
    RuleSpec, Verdict,
};
pub use incidents::{incident_probability, Incident, IncidentModel};
pub use invariants::{InvariantChecker, Violation};
pub use runner::{GovernanceComparison, ScenarioResult, ScenarioRunner};
pub use scenarios::{NodeSpec, Scenario, ScenarioId};
pub use schedule::{EventSchedule, ScheduledEvent};
pub use simulation::{Phase, SimConfig, Simulation, StopHandle};
pub use state::SimulationState;
