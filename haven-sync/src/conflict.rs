//! Conflict detection and resolution for concurrent document edits.
//!
//! A conflict exists iff two changes target the same `(document, path)` with
//! different resulting values and different authors. Same-user concurrent
//! edits (two of the user's own devices) are never flagged — self-overwrites
//! settle by last-write-wins without user-facing conflict UI.
//!
//! Value comparison is deep/structural: `serde_json::Value` equality, so two
//! differently-constructed but semantically identical objects at the same
//! path do not conflict.
//!
//! ```text
//! local change ─┐
//!               ├─► ConflictTable::detect() ──► ConflictResolution (open)
//! remote change ┘                                      │
//!                                                      ▼
//!                        resolve() / auto_resolve() ──► settled (Local /
//!                                                       Remote / Manual)
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

use crate::change::{epoch_millis, ChangeKind, ChangeOperation};

/// Classification of a detected collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictType {
    Update,
    Delete,
    Merge,
}

impl ConflictType {
    /// Derive the classification from the colliding pair.
    ///
    /// A delete on either side dominates, so a remote delete against a local
    /// update still classifies as Delete and the keep-data heuristic applies.
    /// Disjoint paths (host-registered field-disjoint edits) classify as
    /// Merge, as does an explicit merge op on either side.
    pub fn derive(local: &ChangeOperation, remote: &ChangeOperation) -> Self {
        if local.kind == ChangeKind::Delete || remote.kind == ChangeKind::Delete {
            ConflictType::Delete
        } else if local.path != remote.path
            || local.kind == ChangeKind::Merge
            || remote.kind == ChangeKind::Merge
        {
            ConflictType::Merge
        } else {
            ConflictType::Update
        }
    }
}

/// Which side of a conflict won, or that a manual merge was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Local,
    Remote,
    Manual,
}

/// A detected collision between two changes, and its settlement state.
///
/// Created at most once per colliding pair. Once `resolved` is set the record
/// is never mutated again, except to attach a missing `manual_resolution`.
/// Retained indefinitely for audit history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub id: Uuid,
    pub document_id: String,
    /// Detection time (milliseconds since epoch).
    pub timestamp_ms: u64,
    pub conflict_type: ConflictType,
    pub local_change: ChangeOperation,
    pub remote_change: ChangeOperation,
    pub resolved: bool,
    pub resolution: Option<Resolution>,
    /// Present only when `resolution == Manual`.
    pub manual_resolution: Option<Value>,
}

/// Contract violations by the caller. Recoverable conditions (unknown ids)
/// are `None` returns, never errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictError {
    /// `Resolution::Manual` was chosen without supplying the merged value.
    ManualResolutionRequired,
}

impl std::fmt::Display for ConflictError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictError::ManualResolutionRequired => {
                write!(f, "manual resolution chosen without a merged value")
            }
        }
    }
}

impl std::error::Error for ConflictError {}

/// Whether two changes may be merged without user review.
///
/// Holds iff the paths differ, both are plain updates, and both resulting
/// values are composite (object/array) — edits to different sub-fields of
/// composite values combine safely.
pub fn can_auto_merge(a: &ChangeOperation, b: &ChangeOperation) -> bool {
    a.path != b.path
        && a.kind == ChangeKind::Update
        && b.kind == ChangeKind::Update
        && a.has_composite_value()
        && b.has_composite_value()
}

/// Combine two path-disjoint changes into one merged value: an object keyed
/// by each change's path. Only meaningful when [`can_auto_merge`] holds.
pub fn merge_values(a: &ChangeOperation, b: &ChangeOperation) -> Value {
    let mut merged = Map::new();
    if let Some(v) = &a.new_value {
        merged.insert(a.path.clone(), v.clone());
    }
    if let Some(v) = &b.new_value {
        merged.insert(b.path.clone(), v.clone());
    }
    Value::Object(merged)
}

/// Per-document conflict sets: detection, lookup, and settlement.
#[derive(Default)]
pub struct ConflictTable {
    by_document: HashMap<String, Vec<ConflictResolution>>,
}

impl ConflictTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare a local change against an incoming remote change.
    ///
    /// Returns the open conflict record on collision, `None` otherwise.
    /// Re-detecting a pair that already produced a conflict returns the
    /// existing record rather than creating a duplicate.
    pub fn detect(
        &mut self,
        document_id: &str,
        local: &ChangeOperation,
        remote: &ChangeOperation,
    ) -> Option<ConflictResolution> {
        if local.user_id == remote.user_id {
            return None;
        }
        if local.path != remote.path {
            return None;
        }
        if local.new_value == remote.new_value {
            return None;
        }

        if let Some(existing) = self.find_pair(document_id, local.id, remote.id) {
            return Some(existing.clone());
        }

        Some(self.register(document_id, local.clone(), remote.clone()))
    }

    /// Record a collision the caller has already decided on.
    ///
    /// The host owns "which pairs to compare"; this bypasses the same-path
    /// rule so that field-disjoint composite edits flagged upstream can still
    /// flow through the resolution machinery (they classify as Merge).
    pub fn register(
        &mut self,
        document_id: &str,
        local: ChangeOperation,
        remote: ChangeOperation,
    ) -> ConflictResolution {
        let conflict = ConflictResolution {
            id: Uuid::new_v4(),
            document_id: document_id.to_string(),
            timestamp_ms: epoch_millis(),
            conflict_type: ConflictType::derive(&local, &remote),
            local_change: local,
            remote_change: remote,
            resolved: false,
            resolution: None,
            manual_resolution: None,
        };
        self.by_document
            .entry(document_id.to_string())
            .or_default()
            .push(conflict.clone());
        conflict
    }

    /// Settle a conflict by id. The search spans every document's conflict
    /// set — callers need not know which document a conflict belongs to.
    ///
    /// Unknown ids are `Ok(None)`, not an error. Resolving an
    /// already-resolved conflict returns the stored state unchanged, except
    /// that a missing manual value may still be attached.
    pub fn resolve(
        &mut self,
        conflict_id: Uuid,
        choice: Resolution,
        manual_resolution: Option<Value>,
    ) -> Result<Option<ConflictResolution>, ConflictError> {
        if choice == Resolution::Manual && manual_resolution.is_none() {
            return Err(ConflictError::ManualResolutionRequired);
        }

        for conflicts in self.by_document.values_mut() {
            if let Some(conflict) = conflicts.iter_mut().find(|c| c.id == conflict_id) {
                if conflict.resolved {
                    // Settled records are immutable apart from attaching a
                    // missing manual value.
                    if conflict.resolution == Some(Resolution::Manual)
                        && conflict.manual_resolution.is_none()
                    {
                        conflict.manual_resolution = manual_resolution;
                    }
                } else {
                    conflict.resolved = true;
                    conflict.resolution = Some(choice);
                    if choice == Resolution::Manual {
                        conflict.manual_resolution = manual_resolution;
                    }
                }
                return Ok(Some(conflict.clone()));
            }
        }
        Ok(None)
    }

    /// Open conflicts for a document.
    pub fn unresolved(&self, document_id: &str) -> Vec<ConflictResolution> {
        self.by_document
            .get(document_id)
            .map(|conflicts| {
                conflicts
                    .iter()
                    .filter(|c| !c.resolved)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All conflicts recorded for a document, settled or not.
    pub fn all_for_document(&self, document_id: &str) -> Vec<ConflictResolution> {
        self.by_document
            .get(document_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Settle every open conflict for a document with a fixed heuristic:
    ///
    /// - Delete-type → Local (prefer keeping data over a remote delete)
    /// - Merge-type where [`can_auto_merge`] holds → Manual, with the merged
    ///   value computed by [`merge_values`]
    /// - otherwise → Remote (remote wins plain updates)
    ///
    /// Returns the conflicts settled by this call.
    pub fn auto_resolve(&mut self, document_id: &str) -> Vec<ConflictResolution> {
        let Some(conflicts) = self.by_document.get_mut(document_id) else {
            return Vec::new();
        };

        let mut settled = Vec::new();
        for conflict in conflicts.iter_mut().filter(|c| !c.resolved) {
            match conflict.conflict_type {
                ConflictType::Delete => {
                    conflict.resolved = true;
                    conflict.resolution = Some(Resolution::Local);
                }
                ConflictType::Merge
                    if can_auto_merge(&conflict.local_change, &conflict.remote_change) =>
                {
                    conflict.resolved = true;
                    conflict.resolution = Some(Resolution::Manual);
                    conflict.manual_resolution = Some(merge_values(
                        &conflict.local_change,
                        &conflict.remote_change,
                    ));
                }
                _ => {
                    conflict.resolved = true;
                    conflict.resolution = Some(Resolution::Remote);
                }
            }
            settled.push(conflict.clone());
        }
        settled
    }

    /// Restore a persisted conflict record (recovery at startup).
    pub(crate) fn restore(&mut self, conflict: ConflictResolution) {
        self.by_document
            .entry(conflict.document_id.clone())
            .or_default()
            .push(conflict);
    }

    fn find_pair(
        &self,
        document_id: &str,
        local_id: Uuid,
        remote_id: Uuid,
    ) -> Option<&ConflictResolution> {
        self.by_document.get(document_id)?.iter().find(|c| {
            c.local_change.id == local_id && c.remote_change.id == remote_id
        })
    }
}
