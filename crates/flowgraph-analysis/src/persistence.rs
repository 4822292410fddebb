//! Persistence layer for graph snapshots using the `.flowgraph` folder.
//!
//! The differ compares two versions of a graph; this store is where those
//! versions come from. Snapshots are plain JSON with a metadata header.
//!
//! ## File Structure
//!
//! ```text
//! .flowgraph/
//! ├── current.json       # Working copy of the graph
//! └── snapshots/         # Timestamped snapshots
//!     ├── 1703800000.json
//!     └── 1703800100.json
//! ```

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use flowgraph_core::StateGraph;

use crate::error::{AnalysisError, AnalysisResult};

/// Name of the persistence folder.
pub const STORE_DIR: &str = ".flowgraph";

/// Subdirectory for timestamped snapshots.
const SNAPSHOTS_DIR: &str = "snapshots";

/// File name of the working copy.
const CURRENT_FILE: &str = "current.json";

/// Version of the persistence format.
const FORMAT_VERSION: u32 = 1;

/// Metadata about a persisted graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Version of the persistence format.
    pub version: u32,

    /// Timestamp when the graph was saved.
    pub saved_at: SystemTime,

    /// Number of states in the graph.
    pub state_count: usize,

    /// Total number of rules in the graph.
    pub rule_count: usize,

    /// Optional description or label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Persisted graph (metadata + states).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedGraph {
    /// Metadata about the snapshot.
    pub metadata: SnapshotMeta,

    /// The graph itself.
    pub graph: StateGraph,
}

/// A snapshot listed from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotInfo {
    /// Snapshot identifier (file stem).
    pub id: String,

    /// Full path of the snapshot file.
    pub path: PathBuf,

    /// Metadata read from the file.
    pub metadata: SnapshotMeta,
}

/// Store manages graph persistence within the `.flowgraph/` folder.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    /// Root path of the workspace.
    root: PathBuf,

    /// Path to the `.flowgraph` directory.
    store_dir: PathBuf,
}

impl SnapshotStore {
    /// Create a new store for the given workspace root.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let store_dir = root.join(STORE_DIR);
        Self { root, store_dir }
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the path to the store directory.
    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// Check if the store directory exists.
    pub fn exists(&self) -> bool {
        self.store_dir.exists()
    }

    /// Initialize the directory structure.
    pub fn init(&self) -> AnalysisResult<()> {
        let snapshots = self.store_dir.join(SNAPSHOTS_DIR);
        if !snapshots.exists() {
            std::fs::create_dir_all(&snapshots)?;
            info!(path = %self.store_dir.display(), "snapshot_store_initialized");
        }
        Ok(())
    }

    /// Save the working copy.
    pub fn save_current(&self, graph: &StateGraph) -> AnalysisResult<()> {
        self.init()?;
        let persisted = wrap(graph, None);
        let path = self.store_dir.join(CURRENT_FILE);
        write_json(&path, &persisted)?;
        debug!(states = graph.state_count(), "current_graph_saved");
        Ok(())
    }

    /// Load the working copy, if one was saved.
    pub fn load_current(&self) -> AnalysisResult<Option<PersistedGraph>> {
        let path = self.store_dir.join(CURRENT_FILE);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(read_json(&path)?))
    }

    /// Save a timestamped snapshot, returning its id.
    pub fn save_snapshot(
        &self,
        graph: &StateGraph,
        label: Option<&str>,
    ) -> AnalysisResult<String> {
        self.init()?;

        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        // Bump the id on collision.
        let snapshots = self.store_dir.join(SNAPSHOTS_DIR);
        let mut stamp = secs;
        let mut path = snapshots.join(format!("{stamp}.json"));
        while path.exists() {
            stamp += 1;
            path = snapshots.join(format!("{stamp}.json"));
        }

        let persisted = wrap(graph, label);
        write_json(&path, &persisted)?;

        let id = stamp.to_string();
        info!(
            snapshot = %id,
            states = graph.state_count(),
            "snapshot_saved"
        );
        Ok(id)
    }

    /// Load a snapshot by id.
    pub fn load_snapshot(&self, snapshot_id: &str) -> AnalysisResult<PersistedGraph> {
        let path = self
            .store_dir
            .join(SNAPSHOTS_DIR)
            .join(format!("{snapshot_id}.json"));
        if !path.exists() {
            return Err(AnalysisError::SnapshotNotFound {
                snapshot_id: snapshot_id.to_string(),
            });
        }
        let persisted = read_json(&path)?;
        debug!(snapshot = snapshot_id, "snapshot_loaded");
        Ok(persisted)
    }

    /// List all snapshots, oldest first.
    pub fn list_snapshots(&self) -> AnalysisResult<Vec<SnapshotInfo>> {
        let snapshots = self.store_dir.join(SNAPSHOTS_DIR);
        if !snapshots.exists() {
            return Ok(Vec::new());
        }

        let mut infos = Vec::new();
        for entry in std::fs::read_dir(&snapshots)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let persisted: PersistedGraph = read_json(&path)?;
            infos.push(SnapshotInfo {
                id: id.to_string(),
                path: path.clone(),
                metadata: persisted.metadata,
            });
        }

        infos.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(infos)
    }

    /// The most recent snapshot, if any.
    pub fn latest(&self) -> AnalysisResult<Option<SnapshotInfo>> {
        Ok(self.list_snapshots()?.into_iter().next_back())
    }
}

fn wrap(graph: &StateGraph, label: Option<&str>) -> PersistedGraph {
    PersistedGraph {
        metadata: SnapshotMeta {
            version: FORMAT_VERSION,
            saved_at: SystemTime::now(),
            state_count: graph.state_count(),
            rule_count: graph.rule_count(),
            label: label.map(str::to_string),
        },
        graph: graph.clone(),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> AnalysisResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> AnalysisResult<T> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}
