//! Append-only change log: the per-document edit history.
//!
//! Every local edit becomes an immutable [`ChangeOperation`] appended to the
//! document's log. The log is ordered by insertion, never by timestamp —
//! clock skew across authors is expected, so call order within a process is
//! the only total order this core guarantees.
//!
//! ```text
//! Host edit
//!    │
//!    ▼
//! ChangeDraft ──► ChangeLog::record() ──► ChangeOperation (id assigned)
//!                        │
//!                        ▼
//!                 per-document Vec (append-only)
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::SystemTime;
use uuid::Uuid;

/// Milliseconds since the Unix epoch.
pub(crate) fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Kind of edit a change represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
    Merge,
}

/// An immutable record of one field-level edit to a document.
///
/// Field values are host-defined JSON — the log is type-agnostic and performs
/// no validation of `path` or value shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeOperation {
    /// Unique identifier, assigned at record time.
    pub id: Uuid,
    /// Document this change mutates.
    pub document_id: String,
    /// Author.
    pub user_id: String,
    /// Wall-clock authorship time (milliseconds since epoch).
    pub timestamp_ms: u64,
    /// Kind of edit.
    pub kind: ChangeKind,
    /// Dot-addressable pointer into the document's field tree.
    pub path: String,
    /// Field value before the edit.
    pub old_value: Option<Value>,
    /// Field value after the edit.
    pub new_value: Option<Value>,
    /// Document version the author believed was current.
    pub version: u64,
}

impl ChangeOperation {
    /// Whether `new_value` is a composite (object or array) value.
    pub fn has_composite_value(&self) -> bool {
        matches!(
            self.new_value,
            Some(Value::Object(_)) | Some(Value::Array(_))
        )
    }
}

/// A change as supplied by the host, before an id is assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeDraft {
    pub document_id: String,
    pub user_id: String,
    pub timestamp_ms: u64,
    pub kind: ChangeKind,
    pub path: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub version: u64,
}

impl ChangeDraft {
    /// Draft an edit timestamped now.
    pub fn new(
        document_id: impl Into<String>,
        user_id: impl Into<String>,
        kind: ChangeKind,
        path: impl Into<String>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            user_id: user_id.into(),
            timestamp_ms: epoch_millis(),
            kind,
            path: path.into(),
            old_value: None,
            new_value: None,
            version: 0,
        }
    }

    pub fn old_value(mut self, value: Value) -> Self {
        self.old_value = Some(value);
        self
    }

    pub fn new_value(mut self, value: Value) -> Self {
        self.new_value = Some(value);
        self
    }

    pub fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }
}

/// In-memory append-only change log, one ordered history per document.
///
/// Authoritative within a running process; the durable copy kept by the
/// storage layer is bounded and best-effort.
#[derive(Default)]
pub struct ChangeLog {
    histories: HashMap<String, Vec<ChangeOperation>>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign an id to `draft` and append it to its document's history.
    pub fn record(&mut self, draft: ChangeDraft) -> ChangeOperation {
        let op = ChangeOperation {
            id: Uuid::new_v4(),
            document_id: draft.document_id,
            user_id: draft.user_id,
            timestamp_ms: draft.timestamp_ms,
            kind: draft.kind,
            path: draft.path,
            old_value: draft.old_value,
            new_value: draft.new_value,
            version: draft.version,
        };
        self.histories
            .entry(op.document_id.clone())
            .or_default()
            .push(op.clone());
        op
    }

    /// Ordered history for a document. Empty for unknown documents.
    pub fn history(&self, document_id: &str) -> &[ChangeOperation] {
        self.histories
            .get(document_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of documents with at least one recorded change.
    pub fn document_count(&self) -> usize {
        self.histories.len()
    }
}
