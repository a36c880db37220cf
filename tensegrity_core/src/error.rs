//! Error types for the tensegrity core model.

use thiserror::Error;

/// Errors raised by graph and field operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// Operation referenced a node that is not part of the graph
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Node identifier is already taken
    #[error("Duplicate node: {0}")]
    DuplicateNode(String),

    /// Edges must connect two distinct nodes
    #[error("Self-loop rejected on node {0}")]
    SelfLoop(String),

    /// Edge weight is non-finite or outside the accepted range
    #[error("Invalid weight {weight} for edge {a}-{b}")]
    InvalidWeight { a: String, b: String, weight: f64 },

    /// Per-node vectors and the graph disagree on the node count
    #[error("Dimension mismatch: graph has {graph} nodes, fields have {fields}")]
    DimensionMismatch { graph: usize, fields: usize },
}

impl CoreError {
    /// Creates a node-not-found error.
    pub fn not_found(node: impl std::fmt::Display) -> Self {
        Self::NodeNotFound(node.to_string())
    }
}

/// Result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
