//! Error types for the simulation harness.

use tensegrity_core::CoreError;
use thiserror::Error;

/// Errors that can occur while building or running a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    /// Graph or field operation failed (unknown node, invalid edge, ...)
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Scenario definition is inconsistent
    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    /// Scenario name not in the catalogue
    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    /// Operation not allowed in the current run phase
    #[error("Simulation is {phase}, cannot {action}")]
    InvalidPhase { phase: &'static str, action: &'static str },

    /// Scenario file or export could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Scenario or log (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SimError {
    /// Creates an invalid-scenario error.
    pub fn scenario(msg: impl Into<String>) -> Self {
        Self::InvalidScenario(msg.into())
    }

    /// Returns true if the error is a missing-node failure.
    pub fn is_node_not_found(&self) -> bool {
        matches!(self, SimError::Core(CoreError::NodeNotFound(_)))
    }
}

/// Result alias for simulation operations.
pub type SimResult<T> = Result<T, SimError>;
