//! Analysis layer for Flowgraph state machines.
//!
//! Everything here operates on a caller-owned snapshot of states and returns
//! freshly allocated result values. The algorithms are synchronous, hold no
//! state across calls, and never mutate their input.
//!
//! ## Components
//!
//! - **Condition parsing** ([`condition`]): decompose compound rule
//!   conditions into atomic parts with an operator.
//! - **Path finding** ([`paths`]): DFS enumeration of acyclic paths with
//!   cycle detection, three search modes, bounded and pageable results.
//! - **Partitioning** ([`partition`]): connected components and heuristic
//!   splitting into non-overlapping subgraphs with boundary edges.
//! - **Diffing** ([`diff`]): tiered matching and change classification
//!   between two snapshots.
//! - **Auditing** ([`audit`]): tolerant structural integrity report.
//! - **Persistence** ([`persistence`]): JSON snapshot store the differ
//!   feeds from.

pub mod audit;
pub mod condition;
pub mod diff;
mod error;
pub mod partition;
pub mod paths;
pub mod persistence;

pub use audit::{audit, AuditIssue, AuditKind, GraphAudit};
pub use condition::{describe, normalize, parse, validate, ConditionOperator, ParsedCondition};
pub use diff::{
    compare, ChangeStatus, ComparisonSummary, DiffEntry, DiffFilter, EntityKind, GraphComparison,
    RuleDiff, StateDiff,
};
pub use error::{AnalysisError, AnalysisResult};
pub use partition::{
    find_connected_components, find_entry_points, find_exit_points, split_graph,
    validate_partitions, BoundaryEdge, BoundaryKind, Partition,
};
pub use paths::{
    find_paths, CycleDetection, FoundPath, PathStep, SearchConfig, SearchMode, SearchOutcome,
    TakenRule,
};
pub use persistence::{PersistedGraph, SnapshotInfo, SnapshotMeta, SnapshotStore, STORE_DIR};
