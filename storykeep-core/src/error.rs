//! Error types for node-tree operations.

use thiserror::Error;

/// Result type for node-tree operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in node-tree operations.
///
/// Benign conditions (a vanished id passed to a modify or delete, undo at the
/// oldest patch, a locked reorder) are not errors and never surface here.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Node not found in the store.
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// A node with this id is already present in the store.
    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    /// Structurally invalid operation (cycle, second root, orphan).
    #[error("Invalid operation on node: {0}")]
    InvalidOperation(String),

    /// Payload serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Row data written under a different schema version.
    #[error("Schema version mismatch: found {found}, expected {expected}")]
    SchemaVersion {
        /// Version stamped on the incoming row data.
        found: u32,
        /// Version this engine reads.
        expected: u32,
    },

    /// Row data that references missing entities or is otherwise inconsistent.
    #[error("Malformed row data: {0}")]
    MalformedRow(String),
}
