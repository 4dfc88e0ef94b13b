//! # haven-sync — collaborative document sync core
//!
//! Change tracking, conflict detection and resolution, presence/awareness,
//! and per-document sync policy for a shared-document application. This is a
//! library core: the host owns transport, rendering, and auth, and feeds
//! local edits and remote operations into the service.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   local edits     ┌──────────────┐
//! │     Host     │ ────────────────► │  SyncService │
//! │ (UI + wire)  │   remote ops      │              │
//! └──────┬───────┘ ────────────────► └──────┬───────┘
//!        ▲                                  │
//!        │ events (3 channels)              ▼
//! ┌──────┴───────┐                   ┌──────────────┐
//! │   EventBus   │ ◄──────────────── │ ChangeLog    │
//! │ doc/conflict │                   │ ConflictTable│
//! │ /presence    │                   │ Presence     │
//! └──────────────┘                   │ SyncPolicy   │
//!                                    └──────┬───────┘
//!                                           │ best-effort
//!                                           ▼
//!                                    ┌──────────────┐
//!                                    │  SyncStore   │
//!                                    │  (RocksDB)   │
//!                                    └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`change`] — append-only per-document change log
//! - [`conflict`] — collision rule, resolution strategies, auto-merge
//! - [`presence`] — ephemeral who-is-where registry with staleness expiry
//! - [`policy`] — per-document/global sync preferences
//! - [`events`] — synchronous three-channel notification bus
//! - [`storage`] — RocksDB-backed durable store (bounded change retention)
//! - [`service`] — the facade wiring it all together
//!
//! Conflicts settle by last-writer-wins and simple field-disjoint merges;
//! this is deliberately not a CRDT or operational-transform engine.

pub mod change;
pub mod conflict;
pub mod events;
pub mod policy;
pub mod presence;
pub mod service;
pub mod storage;

// Re-exports for convenience
pub use change::{ChangeDraft, ChangeKind, ChangeLog, ChangeOperation};
pub use conflict::{
    can_auto_merge, merge_values, ConflictError, ConflictResolution, ConflictTable, ConflictType,
    Resolution,
};
pub use events::{Channel, EventBus, SubscriptionId};
pub use policy::{SyncPolicyStore, SyncPreference, SyncPriority, GLOBAL_KEY};
pub use presence::{CursorPosition, PresenceInfo, PresenceTracker, STALE_AFTER};
pub use service::SyncService;
pub use storage::{StoreConfig, StoreError, SyncStore};
