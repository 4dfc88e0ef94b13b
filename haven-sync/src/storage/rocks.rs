//! RocksDB-backed durable store for the sync core.
//!
//! Column families:
//! - `changes`   — change operations, keyed `<doc_id>/<seq:8 bytes BE>`,
//!                 sliding-window retention per document (oldest first)
//! - `conflicts` — conflict records, keyed by conflict id (overwrite)
//! - `prefs`     — sync preferences, keyed by document id or "global"
//! - `meta`      — per-document log sequence bounds
//!
//! Values are JSON (field values are host-defined dynamic JSON, so the
//! encoding must be self-describing) compressed with LZ4 before the write.
//! Writes that touch two column families go through an atomic `WriteBatch`.

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::change::ChangeOperation;
use crate::conflict::ConflictResolution;
use crate::policy::SyncPreference;

const CF_CHANGES: &str = "changes";
const CF_CONFLICTS: &str = "conflicts";
const CF_PREFS: &str = "prefs";
const CF_META: &str = "meta";

const COLUMN_FAMILIES: &[&str] = &[CF_CHANGES, CF_CONFLICTS, CF_PREFS, CF_META];

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// Enable fsync on every write (default: false)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 256)
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 16MB)
    pub write_buffer_size: usize,
    /// Sliding-window retention: persisted changes kept per document.
    pub max_changes_per_document: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("haven_data"),
            block_cache_size: 64 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 256,
            write_buffer_size: 16 * 1024 * 1024,
            max_changes_per_document: 200,
        }
    }
}

impl StoreConfig {
    /// Create config for testing (small caches, temp directory).
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 4 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 2 * 1024 * 1024,
            max_changes_per_document: 200,
        }
    }
}

/// Per-document change-log sequence bounds. `first_seq..next_seq` is the
/// retained window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LogBounds {
    first_seq: u64,
    next_seq: u64,
}

/// Storage errors.
#[derive(Debug, Clone)]
pub enum StoreError {
    /// RocksDB internal error
    DatabaseError(String),
    /// Serialization failed
    SerializationError(String),
    /// Deserialization failed
    DeserializationError(String),
    /// Decompression error
    CompressionError(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::DatabaseError(e) => write!(f, "Database error: {e}"),
            StoreError::SerializationError(e) => write!(f, "Serialization error: {e}"),
            StoreError::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            StoreError::CompressionError(e) => write!(f, "Compression error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}

/// Encode a record: JSON, then LZ4 with prepended size.
fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    let json = serde_json::to_vec(value)
        .map_err(|e| StoreError::SerializationError(e.to_string()))?;
    Ok(lz4_flex::compress_prepend_size(&json))
}

/// Decode a record: LZ4 decompress, then JSON.
fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    let json = lz4_flex::decompress_size_prepended(bytes)
        .map_err(|e| StoreError::CompressionError(e.to_string()))?;
    serde_json::from_slice(&json).map_err(|e| StoreError::DeserializationError(e.to_string()))
}

/// RocksDB-backed durable store for changes, conflicts, and preferences.
pub struct SyncStore {
    /// RocksDB instance (single-threaded mode — the core is single-writer)
    db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
}

impl SyncStore {
    /// Open the store at the configured path, creating the database and
    /// column families if they don't exist.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| {
                let cf_opts = Self::cf_options(name, &config);
                ColumnFamilyDescriptor::new(*name, cf_opts)
            })
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;

        Ok(Self { db, config })
    }

    /// Build column-family-specific options.
    fn cf_options(name: &str, config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        block_opts.set_block_size(16 * 1024);
        opts.set_block_based_table_factory(&block_opts);

        // Values are already LZ4-compressed before the write.
        opts.set_compression_type(DBCompressionType::None);
        opts.set_write_buffer_size(config.write_buffer_size);

        match name {
            CF_CHANGES => {
                // Many small appends, prefix-scanned by document.
                opts.set_max_write_buffer_number(4);
            }
            CF_CONFLICTS | CF_PREFS | CF_META => {
                // Small overwritten values, frequent point reads.
                opts.set_max_write_buffer_number(2);
                opts.optimize_for_point_lookup(config.block_cache_size as u64);
            }
            _ => {}
        }

        opts
    }

    // ─── Change log ───────────────────────────────────────────────────

    /// Append a change to its document's durable log.
    ///
    /// Enforces the sliding-window retention cap: when the window exceeds
    /// `max_changes_per_document`, the oldest entries are deleted in the
    /// same atomic batch. Returns the sequence number assigned.
    pub fn append_change(&self, change: &ChangeOperation) -> Result<u64, StoreError> {
        let cf_changes = self.cf(CF_CHANGES)?;
        let cf_meta = self.cf(CF_META)?;

        let mut bounds = self.load_bounds(&change.document_id)?;
        let seq = bounds.next_seq;
        bounds.next_seq += 1;

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_changes,
            Self::change_key(&change.document_id, seq),
            encode(change)?,
        );

        // Retention: drop oldest entries past the cap.
        while bounds.next_seq - bounds.first_seq > self.config.max_changes_per_document {
            batch.delete_cf(
                &cf_changes,
                Self::change_key(&change.document_id, bounds.first_seq),
            );
            bounds.first_seq += 1;
        }

        batch.put_cf(&cf_meta, change.document_id.as_bytes(), encode(&bounds)?);

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts)?;

        Ok(seq)
    }

    /// Load the retained durable change log for a document, oldest first.
    pub fn load_changes(&self, document_id: &str) -> Result<Vec<ChangeOperation>, StoreError> {
        let cf = self.cf(CF_CHANGES)?;
        let prefix = Self::change_prefix(document_id);

        let mut changes = Vec::new();
        let iter = self.db.iterator_cf(
            &cf,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::DatabaseError(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            changes.push(decode(&value)?);
        }

        Ok(changes)
    }

    /// Number of retained durable changes for a document.
    pub fn change_count(&self, document_id: &str) -> Result<u64, StoreError> {
        let bounds = self.load_bounds(document_id)?;
        Ok(bounds.next_seq - bounds.first_seq)
    }

    // ─── Conflicts ────────────────────────────────────────────────────

    /// Persist a conflict record, overwriting any previous state for its id.
    pub fn save_conflict(&self, conflict: &ConflictResolution) -> Result<(), StoreError> {
        let cf = self.cf(CF_CONFLICTS)?;
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db
            .put_cf_opt(&cf, conflict.id.as_bytes(), encode(conflict)?, &write_opts)?;
        Ok(())
    }

    /// Load every persisted conflict record (startup recovery).
    pub fn load_all_conflicts(&self) -> Result<Vec<ConflictResolution>, StoreError> {
        let cf = self.cf(CF_CONFLICTS)?;
        let mut conflicts = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::DatabaseError(e.to_string()))?;
            conflicts.push(decode(&value)?);
        }
        Ok(conflicts)
    }

    /// Load one persisted conflict by id.
    pub fn load_conflict(&self, id: Uuid) -> Result<Option<ConflictResolution>, StoreError> {
        let cf = self.cf(CF_CONFLICTS)?;
        match self.db.get_cf(&cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    // ─── Preferences ──────────────────────────────────────────────────

    /// Persist a sync preference under its key, last write wins.
    pub fn save_preference(&self, pref: &SyncPreference) -> Result<(), StoreError> {
        let cf = self.cf(CF_PREFS)?;
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db
            .put_cf_opt(&cf, pref.key().as_bytes(), encode(pref)?, &write_opts)?;
        Ok(())
    }

    /// Load every persisted preference (startup recovery).
    pub fn load_preferences(&self) -> Result<Vec<SyncPreference>, StoreError> {
        let cf = self.cf(CF_PREFS)?;
        let mut prefs = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::DatabaseError(e.to_string()))?;
            prefs.push(decode(&value)?);
        }
        Ok(prefs)
    }

    // ─── Helpers ──────────────────────────────────────────────────────

    /// Flush memtables to disk.
    pub fn sync(&self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::DatabaseError(e.to_string()))
    }

    /// Get the database path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn load_bounds(&self, document_id: &str) -> Result<LogBounds, StoreError> {
        let cf = self.cf(CF_META)?;
        match self.db.get_cf(&cf, document_id.as_bytes())? {
            Some(bytes) => decode(&bytes),
            None => Ok(LogBounds::default()),
        }
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::DatabaseError(format!("Column family '{name}' not found")))
    }

    /// Change key: `<doc_id>/<seq:8 bytes BE>` — the big-endian suffix keeps
    /// per-document iteration in append order.
    fn change_key(document_id: &str, seq: u64) -> Vec<u8> {
        let mut key = Self::change_prefix(document_id);
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }

    fn change_prefix(document_id: &str) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(document_id.len() + 1);
        prefix.extend_from_slice(document_id.as_bytes());
        prefix.push(b'/');
        prefix
    }
}
