//! Presence tracking: best-effort "who is looking at / editing what".
//!
//! Each `(user, document)` pair holds exactly one entry; updates overwrite in
//! place with a fresh `last_seen`, so no partial-update races are possible.
//! Entries past the staleness window are evicted lazily on read — presence is
//! telemetry, not a correctness-critical structure, and lazy eviction avoids
//! a background sweep.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::change::epoch_millis;

/// Entries not refreshed within this window are expired.
pub const STALE_AFTER: Duration = Duration::from_secs(300);

/// Cursor location in document coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f32,
    pub y: f32,
}

impl CursorPosition {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Ephemeral liveness record for one user on one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceInfo {
    pub user_id: String,
    pub document_id: String,
    pub cursor_position: Option<CursorPosition>,
    pub is_editing: bool,
    /// Last refresh (milliseconds since epoch).
    pub last_seen_ms: u64,
}

struct PresenceEntry {
    info: PresenceInfo,
    /// Monotonic refresh instant — expiry never trusts wall clocks.
    seen: Instant,
}

/// Registry of active viewers/editors per document.
pub struct PresenceTracker {
    entries: HashMap<(String, String), PresenceEntry>,
    stale_after: Duration,
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            stale_after: STALE_AFTER,
        }
    }

    /// Create with a custom staleness window (for testing).
    pub fn with_stale_after(stale_after: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            stale_after,
        }
    }

    /// Overwrite the entry for `(user, document)` with a fresh `last_seen`.
    pub fn update(
        &mut self,
        user_id: &str,
        document_id: &str,
        is_editing: bool,
        cursor_position: Option<CursorPosition>,
    ) -> PresenceInfo {
        let info = PresenceInfo {
            user_id: user_id.to_string(),
            document_id: document_id.to_string(),
            cursor_position,
            is_editing,
            last_seen_ms: epoch_millis(),
        };
        self.entries.insert(
            (user_id.to_string(), document_id.to_string()),
            PresenceEntry {
                info: info.clone(),
                seen: Instant::now(),
            },
        );
        info
    }

    /// Everyone present on a document. Stale entries are evicted on the way.
    pub fn document_presence(&mut self, document_id: &str) -> Vec<PresenceInfo> {
        self.evict_stale();
        self.entries
            .values()
            .filter(|e| e.info.document_id == document_id)
            .map(|e| e.info.clone())
            .collect()
    }

    /// Drop every entry for a user (clean disconnect).
    pub fn remove_user(&mut self, user_id: &str) {
        self.entries.retain(|(user, _), _| user != user_id);
    }

    /// Live entries across all documents (post-eviction).
    pub fn active_count(&mut self) -> usize {
        self.evict_stale();
        self.entries.len()
    }

    fn evict_stale(&mut self) {
        let stale_after = self.stale_after;
        self.entries
            .retain(|_, entry| entry.seen.elapsed() < stale_after);
    }
}
