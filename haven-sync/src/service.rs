//! The sync service: one explicit object owning every sub-component.
//!
//! Constructed once at application startup and passed by reference to
//! consumers — no global singleton, so tests and multi-profile hosts can run
//! independent instances side by side.
//!
//! ```text
//! host edit ──► record_change ──► ChangeLog ──► SyncStore (best-effort)
//!                                     │
//!                                     ▼
//!                               EventBus (document channel)
//!
//! remote op ──► detect_conflicts ──► ConflictTable ──► SyncStore
//!                                          │
//!                                          ▼
//!                                    EventBus (conflict channel)
//! ```
//!
//! Every operation is synchronous; the RocksDB write is the only I/O and is
//! treated as fire-and-forget — a failed write is logged and the in-memory
//! result still returned, since in-memory state remains correct.

use serde_json::Value;
use uuid::Uuid;

use crate::change::{ChangeDraft, ChangeLog, ChangeOperation};
use crate::conflict::{ConflictError, ConflictResolution, ConflictTable, Resolution};
use crate::events::{EventBus, SubscriptionId};
use crate::policy::{SyncPolicyStore, SyncPreference};
use crate::presence::{CursorPosition, PresenceInfo, PresenceTracker};
use crate::storage::{StoreConfig, StoreError, SyncStore};

/// Collaborative sync core: change log, conflict handling, presence, sync
/// policy, and the notification bus behind one facade.
pub struct SyncService {
    changes: ChangeLog,
    conflicts: ConflictTable,
    presence: PresenceTracker,
    policy: SyncPolicyStore,
    bus: EventBus,
    store: Option<SyncStore>,
}

impl Default for SyncService {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncService {
    /// In-memory service with no durable store (tests, previews).
    pub fn new() -> Self {
        Self {
            changes: ChangeLog::new(),
            conflicts: ConflictTable::new(),
            presence: PresenceTracker::new(),
            policy: SyncPolicyStore::new(),
            bus: EventBus::new(),
            store: None,
        }
    }

    /// Open with durable storage, recovering persisted preferences and the
    /// conflict history.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let store = SyncStore::open(config)?;
        let mut service = Self::new();

        let prefs = store.load_preferences()?;
        let conflicts = store.load_all_conflicts()?;
        log::info!(
            "Recovered {} preference(s) and {} conflict record(s) from storage",
            prefs.len(),
            conflicts.len()
        );
        for pref in prefs {
            service.policy.restore(pref);
        }
        for conflict in conflicts {
            service.conflicts.restore(conflict);
        }

        service.store = Some(store);
        Ok(service)
    }

    /// Whether a durable store is attached.
    pub fn is_durable(&self) -> bool {
        self.store.is_some()
    }

    // ─── Change log ───────────────────────────────────────────────────

    /// Record a local edit: assign an id, append to the in-memory log,
    /// persist best-effort, and notify document-change observers.
    pub fn record_change(&mut self, draft: ChangeDraft) -> ChangeOperation {
        let op = self.changes.record(draft);

        if let Some(store) = &self.store {
            if let Err(e) = store.append_change(&op) {
                log::warn!("Failed to persist change {} for {}: {e}", op.id, op.document_id);
            }
        }

        self.bus.emit_document_change(&op);
        op
    }

    /// Ordered in-process history for a document; empty if unknown.
    pub fn change_history(&self, document_id: &str) -> &[ChangeOperation] {
        self.changes.history(document_id)
    }

    /// The durable copy of a document's history (bounded by the retention
    /// cap). Errors here surface — this is an explicit storage read.
    pub fn stored_changes(&self, document_id: &str) -> Result<Vec<ChangeOperation>, StoreError> {
        match &self.store {
            Some(store) => store.load_changes(document_id),
            None => Ok(Vec::new()),
        }
    }

    // ─── Conflicts ────────────────────────────────────────────────────

    /// Compare a local change against an incoming remote change; on
    /// collision the open conflict is recorded, persisted, and published.
    pub fn detect_conflicts(
        &mut self,
        document_id: &str,
        local: &ChangeOperation,
        remote: &ChangeOperation,
    ) -> Option<ConflictResolution> {
        let conflict = self.conflicts.detect(document_id, local, remote)?;
        self.persist_conflict(&conflict);
        self.bus.emit_conflict(&conflict);
        Some(conflict)
    }

    /// Record a collision the host has already decided on (the host owns
    /// "which pairs to compare"). Persisted and published like a detection.
    pub fn register_conflict(
        &mut self,
        document_id: &str,
        local: ChangeOperation,
        remote: ChangeOperation,
    ) -> ConflictResolution {
        let conflict = self.conflicts.register(document_id, local, remote);
        self.persist_conflict(&conflict);
        self.bus.emit_conflict(&conflict);
        conflict
    }

    /// Settle a conflict by id with an explicit choice. `Ok(None)` when no
    /// such conflict exists; fail-fast when `Manual` lacks a merged value.
    pub fn resolve_conflict(
        &mut self,
        conflict_id: Uuid,
        choice: Resolution,
        manual_resolution: Option<Value>,
    ) -> Result<Option<ConflictResolution>, ConflictError> {
        let settled = self
            .conflicts
            .resolve(conflict_id, choice, manual_resolution)?;
        if let Some(conflict) = &settled {
            self.persist_conflict(conflict);
            self.bus.emit_conflict(conflict);
        }
        Ok(settled)
    }

    /// Open conflicts for a document.
    pub fn unresolved_conflicts(&self, document_id: &str) -> Vec<ConflictResolution> {
        self.conflicts.unresolved(document_id)
    }

    /// Settle every open conflict for a document with the automatic
    /// heuristic; each settlement is persisted and published.
    pub fn auto_resolve_conflicts(&mut self, document_id: &str) -> Vec<ConflictResolution> {
        let settled = self.conflicts.auto_resolve(document_id);
        for conflict in &settled {
            self.persist_conflict(conflict);
            self.bus.emit_conflict(conflict);
        }
        settled
    }

    // ─── Presence ─────────────────────────────────────────────────────

    /// Refresh a user's presence on a document and notify observers.
    /// Presence is ephemeral — never persisted.
    pub fn update_presence(
        &mut self,
        user_id: &str,
        document_id: &str,
        is_editing: bool,
        cursor_position: Option<CursorPosition>,
    ) -> PresenceInfo {
        let info = self
            .presence
            .update(user_id, document_id, is_editing, cursor_position);
        self.bus.emit_presence_change(&info);
        info
    }

    /// Who is present on a document right now (stale entries evicted).
    pub fn document_presence(&mut self, document_id: &str) -> Vec<PresenceInfo> {
        self.presence.document_presence(document_id)
    }

    // ─── Sync policy ──────────────────────────────────────────────────

    /// Store a preference (per-document or global), persisting best-effort.
    pub fn set_sync_preference(&mut self, pref: SyncPreference) -> SyncPreference {
        let stored = self.policy.set(pref);

        if let Some(store) = &self.store {
            if let Err(e) = store.save_preference(&stored) {
                log::warn!("Failed to persist sync preference '{}': {e}", stored.key());
            }
        }

        stored
    }

    /// Preference stored for exactly this key, if any.
    pub fn sync_preference(&self, document_id: Option<&str>) -> Option<&SyncPreference> {
        self.policy.get(document_id)
    }

    /// Whether to sync a document: per-document, else global, else enabled.
    pub fn is_sync_enabled(&self, document_id: Option<&str>) -> bool {
        self.policy.is_enabled(document_id)
    }

    /// Field allow-list for a document; `None` means sync everything.
    pub fn sync_fields(&self, document_id: Option<&str>) -> Option<Vec<String>> {
        self.policy.sync_fields(document_id)
    }

    // ─── Notification bus ─────────────────────────────────────────────

    pub fn on_document_change(
        &mut self,
        listener: impl Fn(&ChangeOperation) + Send + 'static,
    ) -> SubscriptionId {
        self.bus.on_document_change(listener)
    }

    pub fn on_conflict(
        &mut self,
        listener: impl Fn(&ConflictResolution) + Send + 'static,
    ) -> SubscriptionId {
        self.bus.on_conflict(listener)
    }

    pub fn on_presence_change(
        &mut self,
        listener: impl Fn(&PresenceInfo) + Send + 'static,
    ) -> SubscriptionId {
        self.bus.on_presence_change(listener)
    }

    pub fn unsubscribe(&mut self, subscription: SubscriptionId) -> bool {
        self.bus.unsubscribe(subscription)
    }

    // ─── Internal ─────────────────────────────────────────────────────

    fn persist_conflict(&self, conflict: &ConflictResolution) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_conflict(conflict) {
                log::warn!("Failed to persist conflict {}: {e}", conflict.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeKind;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn update(doc: &str, user: &str, path: &str, value: Value) -> ChangeDraft {
        ChangeDraft::new(doc, user, ChangeKind::Update, path).new_value(value)
    }

    #[test]
    fn test_record_change_appends_and_notifies() {
        let mut service = SyncService::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        service.on_document_change(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        let op = service.record_change(update("doc1", "u1", "title", json!("Hello")));
        assert_eq!(op.document_id, "doc1");
        assert_eq!(service.change_history("doc1").len(), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_detect_conflict_emits_event() {
        let mut service = SyncService::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        service.on_conflict(move |c| {
            assert!(!c.resolved);
            s.fetch_add(1, Ordering::SeqCst);
        });

        let local = service.record_change(update("doc1", "alice", "title", json!("Hello")));
        let remote = service.record_change(update("doc1", "bob", "title", json!("World")));

        let conflict = service.detect_conflicts("doc1", &local, &remote);
        assert!(conflict.is_some());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(service.unresolved_conflicts("doc1").len(), 1);
    }

    #[test]
    fn test_resolution_emits_settled_event() {
        let mut service = SyncService::new();
        let local = service.record_change(update("doc1", "alice", "title", json!("a")));
        let remote = service.record_change(update("doc1", "bob", "title", json!("b")));
        let conflict = service.detect_conflicts("doc1", &local, &remote).unwrap();

        let settled_seen = Arc::new(AtomicUsize::new(0));
        let s = settled_seen.clone();
        service.on_conflict(move |c| {
            if c.resolved {
                s.fetch_add(1, Ordering::SeqCst);
            }
        });

        service
            .resolve_conflict(conflict.id, Resolution::Local, None)
            .unwrap()
            .unwrap();
        assert_eq!(settled_seen.load(Ordering::SeqCst), 1);
        assert!(service.unresolved_conflicts("doc1").is_empty());
    }

    #[test]
    fn test_resolve_unknown_conflict_is_none() {
        let mut service = SyncService::new();
        let result = service.resolve_conflict(Uuid::new_v4(), Resolution::Remote, None);
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn test_presence_flows_through_service() {
        let mut service = SyncService::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        service.on_presence_change(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        service.update_presence("u1", "doc1", true, None);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(service.document_presence("doc1").len(), 1);
    }

    #[test]
    fn test_no_store_means_not_durable_but_functional() {
        let mut service = SyncService::new();
        assert!(!service.is_durable());
        service.record_change(update("doc1", "u1", "title", json!("x")));
        assert_eq!(service.change_history("doc1").len(), 1);
        assert!(service.stored_changes("doc1").unwrap().is_empty());
    }

    #[test]
    fn test_policy_passthrough() {
        let mut service = SyncService::new();
        assert!(service.is_sync_enabled(Some("doc1")));

        service.set_sync_preference(SyncPreference {
            enabled: false,
            ..SyncPreference::for_document("doc1")
        });
        assert!(!service.is_sync_enabled(Some("doc1")));
        assert!(service.is_sync_enabled(Some("doc2")));
        assert!(service.sync_preference(Some("doc1")).is_some());
        assert!(service.sync_preference(Some("doc2")).is_none());
    }

    #[test]
    fn test_independent_instances_do_not_share_state() {
        let mut a = SyncService::new();
        let mut b = SyncService::new();

        a.record_change(update("doc1", "u1", "title", json!("x")));
        assert_eq!(a.change_history("doc1").len(), 1);
        assert!(b.change_history("doc1").is_empty());

        b.update_presence("u1", "doc1", true, None);
        assert!(a.document_presence("doc1").is_empty());
    }
}
