//! Per-document sync policy: whether, how often, and which fields to sync.
//!
//! Preferences are keyed by document id, or the sentinel `"global"` when no
//! document is named. Lookup is per-document key first, then global, then the
//! built-in default (sync enabled, everything, normal priority). There is no
//! field-level inheritance between the two levels — a per-document preference
//! fully overrides the global one.
//!
//! This store only answers queries; interval scheduling and transport
//! ordering belong to the host.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sentinel key for the application-wide preference.
pub const GLOBAL_KEY: &str = "global";

/// Transport ordering/bandwidth hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPriority {
    Low,
    #[default]
    Normal,
    High,
}

/// The complete user-facing sync configuration surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPreference {
    /// Target document; `None` means the global preference.
    pub document_id: Option<String>,
    /// Pause/resume switch.
    pub enabled: bool,
    /// Scheduling hint for the host, in milliseconds. Never acted on here.
    pub sync_interval_ms: u64,
    pub priority: SyncPriority,
    /// Field allow-list for partial sync; `None` means sync everything.
    pub selective_fields: Option<Vec<String>>,
}

impl Default for SyncPreference {
    fn default() -> Self {
        Self {
            document_id: None,
            enabled: true,
            sync_interval_ms: 30_000,
            priority: SyncPriority::Normal,
            selective_fields: None,
        }
    }
}

impl SyncPreference {
    /// Preference scoped to one document.
    pub fn for_document(document_id: impl Into<String>) -> Self {
        Self {
            document_id: Some(document_id.into()),
            ..Self::default()
        }
    }

    /// Storage key: the document id, or the global sentinel.
    pub fn key(&self) -> &str {
        self.document_id.as_deref().unwrap_or(GLOBAL_KEY)
    }
}

/// In-memory preference table, last write wins per key.
#[derive(Default)]
pub struct SyncPolicyStore {
    prefs: HashMap<String, SyncPreference>,
}

impl SyncPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a preference under its key, replacing any previous one.
    pub fn set(&mut self, pref: SyncPreference) -> SyncPreference {
        self.prefs.insert(pref.key().to_string(), pref.clone());
        pref
    }

    /// Preference stored for exactly this key (no fallback).
    pub fn get(&self, document_id: Option<&str>) -> Option<&SyncPreference> {
        self.prefs.get(document_id.unwrap_or(GLOBAL_KEY))
    }

    /// Whether sync is on for a document: per-document preference, else the
    /// global one, else enabled by default.
    pub fn is_enabled(&self, document_id: Option<&str>) -> bool {
        if let Some(doc) = document_id {
            if let Some(pref) = self.prefs.get(doc) {
                return pref.enabled;
            }
        }
        self.prefs
            .get(GLOBAL_KEY)
            .map(|p| p.enabled)
            .unwrap_or(true)
    }

    /// Field allow-list for a document; `None` means sync all fields.
    pub fn sync_fields(&self, document_id: Option<&str>) -> Option<Vec<String>> {
        if let Some(doc) = document_id {
            if let Some(pref) = self.prefs.get(doc) {
                return pref.selective_fields.clone();
            }
        }
        self.prefs
            .get(GLOBAL_KEY)
            .and_then(|p| p.selective_fields.clone())
    }

    /// All stored preferences, for persistence.
    pub fn all(&self) -> impl Iterator<Item = (&str, &SyncPreference)> {
        self.prefs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Restore a persisted preference (recovery at startup).
    pub(crate) fn restore(&mut self, pref: SyncPreference) {
        self.prefs.insert(pref.key().to_string(), pref);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_enabled() {
        let store = SyncPolicyStore::new();
        assert!(store.is_enabled(Some("doc1")));
        assert!(store.is_enabled(None));
        assert!(store.get(Some("doc1")).is_none());
    }

    #[test]
    fn test_document_preference_overrides_global() {
        let mut store = SyncPolicyStore::new();
        store.set(SyncPreference::default()); // global, enabled
        store.set(SyncPreference {
            enabled: false,
            ..SyncPreference::for_document("doc1")
        });

        assert!(!store.is_enabled(Some("doc1")));
        assert!(store.is_enabled(Some("doc2")));
        assert!(store.is_enabled(None));
    }

    #[test]
    fn test_global_disable_applies_to_uncovered_documents() {
        let mut store = SyncPolicyStore::new();
        store.set(SyncPreference {
            enabled: false,
            ..SyncPreference::default()
        });
        store.set(SyncPreference::for_document("doc1")); // enabled

        assert!(store.is_enabled(Some("doc1")));
        assert!(!store.is_enabled(Some("doc2")));
        assert!(!store.is_enabled(None));
    }

    #[test]
    fn test_last_write_wins_per_key() {
        let mut store = SyncPolicyStore::new();
        store.set(SyncPreference {
            sync_interval_ms: 1_000,
            ..SyncPreference::for_document("doc1")
        });
        store.set(SyncPreference {
            sync_interval_ms: 5_000,
            ..SyncPreference::for_document("doc1")
        });

        assert_eq!(store.get(Some("doc1")).unwrap().sync_interval_ms, 5_000);
    }

    #[test]
    fn test_sync_fields_none_means_everything() {
        let mut store = SyncPolicyStore::new();
        assert_eq!(store.sync_fields(Some("doc1")), None);

        store.set(SyncPreference {
            selective_fields: Some(vec!["title".into(), "notes".into()]),
            ..SyncPreference::for_document("doc1")
        });
        assert_eq!(
            store.sync_fields(Some("doc1")),
            Some(vec!["title".to_string(), "notes".to_string()])
        );
        assert_eq!(store.sync_fields(Some("doc2")), None);
    }

    #[test]
    fn test_document_preference_masks_global_field_list() {
        let mut store = SyncPolicyStore::new();
        store.set(SyncPreference {
            selective_fields: Some(vec!["title".into()]),
            ..SyncPreference::default()
        });
        // Per-document preference with no list: sync everything for doc1,
        // regardless of the global allow-list.
        store.set(SyncPreference::for_document("doc1"));

        assert_eq!(store.sync_fields(Some("doc1")), None);
        assert_eq!(
            store.sync_fields(Some("doc2")),
            Some(vec!["title".to_string()])
        );
    }

    #[test]
    fn test_key_derivation() {
        assert_eq!(SyncPreference::default().key(), GLOBAL_KEY);
        assert_eq!(SyncPreference::for_document("doc9").key(), "doc9");
    }
}
