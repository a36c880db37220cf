//! Tensegrity Core - graph-energy model of a software system
//!
//! A software system is modelled as a weighted dependency graph whose nodes
//! carry scalar fields (`health`, `complexity`, `risk`, `demand`). From those
//! the crate derives:
//!
//! - **Badness**: one scalar per node combining inverted health, complexity and risk
//! - **Flow**: a 2D vector per node (business pressure vs. stability pressure)
//! - **Energies**: structural and business potential, kinetic energy,
//!   Hamiltonian, Lagrangian and per-node local (Dirichlet) energy
//!
//! The crate is pure and synchronous; the simulation harness lives in
//! `tensegrity_sim`.

pub mod energy;
pub mod error;
pub mod fields;
pub mod graph;
pub mod params;

pub use energy::Diagnostics;
pub use error::{CoreError, CoreResult};
pub use fields::{clamp_unit, Field, FieldStore, NodeFields, HIGH_RISK_THRESHOLD};
pub use graph::{Edge, GraphModel, NodeId};
pub use params::{EngineParams, MassModel};
