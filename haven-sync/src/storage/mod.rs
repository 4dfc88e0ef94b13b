//! Durable persistence for the sync core.
//!
//! ```text
//! ┌─────────────┐   changes / conflicts / prefs   ┌────────────┐
//! │ SyncService │ ──────────────────────────────► │ SyncStore  │
//! │ (in-memory) │                                 │ (RocksDB)  │
//! └──────┬──────┘                                 └─────┬──────┘
//!        │ on open                                      │
//!        ▼                                              ▼
//! ┌──────────────┐            ┌─────────────────────────────────┐
//! │ prefs +      │            │ CF "changes"   — bounded log    │
//! │ conflicts    │            │ CF "conflicts" — overwrite      │
//! │ (recovered)  │            │ CF "prefs"     — overwrite      │
//! └──────────────┘            │ CF "meta"      — log bounds     │
//!                             └─────────────────────────────────┘
//! ```
//!
//! Persistence is best-effort from the caller's perspective: the service
//! logs write failures and returns the in-memory result as successful.

pub mod rocks;

pub use rocks::{StoreConfig, StoreError, SyncStore};
