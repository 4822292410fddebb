//! Error types for the analysis layer.

use thiserror::Error;

/// Result type alias for analysis operations.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Errors that can occur during analysis operations.
///
/// Tolerated data inconsistencies (dangling targets, dictionary misses) are
/// never raised; they degrade to "unknown"/fallback values in results.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A state referenced by id was not found in the snapshot.
    #[error("state not found: {state_id}")]
    StateNotFound { state_id: String },

    /// A condition description was blank.
    #[error("condition description is empty")]
    EmptyDescription,

    /// An operator was detected but fewer than two operands survived.
    #[error("degenerate compound condition around '{operator}'")]
    DegenerateCompound { operator: String },

    /// A compound condition contained a blank operand.
    #[error("empty operand around '{operator}'")]
    EmptyOperand { operator: String },

    /// The requested partition count cannot be honored.
    #[error("invalid partition count: {requested} (must be >= 1)")]
    InvalidPartitionCount { requested: usize },

    /// A persisted snapshot was not found in the store.
    #[error("snapshot not found: {snapshot_id}")]
    SnapshotNotFound { snapshot_id: String },

    /// Snapshot serialization/deserialization error.
    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error (store operations).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
