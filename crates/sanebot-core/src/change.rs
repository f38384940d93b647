//! Change and patch-set identity.

use serde::{Deserialize, Serialize};

/// A change under review, identified by server-assigned number, project,
/// and target branch. Observed from the startup snapshot or a live event;
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub number: u64,
    pub project: String,
    pub branch: String,
}

/// One revision of a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSet {
    /// Server ref for fetching this revision. Also the deduplication key:
    /// once a ref is marked processed it stays processed for the run.
    pub ref_name: String,

    /// Commit hash of the revision.
    pub revision: String,
}

/// A unit of review work: one patch set of one change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewTask {
    pub change: Change,
    pub patch_set: PatchSet,
}

/// Strip a single trailing path separator from a project name.
///
/// Compatibility workaround: upstream reports `project/` on one transport
/// and `project` on the other, and identity must not depend on which path
/// delivered the event.
pub fn normalize_project(project: &str) -> String {
    project.strip_suffix('/').unwrap_or(project).to_string()
}
