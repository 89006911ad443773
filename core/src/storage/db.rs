//! # VaultDB — Snapshot Store
//!
//! Persists sealed fund snapshots in sled's embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree        | Key               | Value                         |
//! |-------------|-------------------|-------------------------------|
//! | `snapshots` | `fund_id` (UTF-8) | sealed [`SnapshotEnvelope`]   |
//! | `metadata`  | key (UTF-8)       | value (bytes)                 |
//!
//! Values in `snapshots` are opaque envelopes produced by
//! [`super::envelope::seal`]; this module never decodes the payload, it only
//! checks that what it stores is a well-formed envelope.
//!
//! [`SnapshotEnvelope`]: super::envelope::SnapshotEnvelope

use sled::{Db, Tree};
use std::path::Path;

use super::envelope::{unwrap_envelope, StorageError};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] StorageError),

    #[error("invalid utf-8 key in tree {0}")]
    InvalidKey(&'static str),
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

/// Well-known key in the `metadata` tree for the most recently written fund.
const META_LAST_FUND: &[u8] = b"last_fund_id";

// ---------------------------------------------------------------------------
// VaultDB
// ---------------------------------------------------------------------------

/// Persistent store for fund snapshots.
///
/// sled is thread-safe, so a `VaultDB` can be shared via `Arc` without
/// external locking. Each fund id maps to exactly one latest snapshot.
#[derive(Debug, Clone)]
pub struct VaultDB {
    /// The underlying sled database handle.
    db: Db,
    /// Sealed snapshots keyed by fund id.
    snapshots: Tree,
    /// Arbitrary key-value metadata.
    metadata: Tree,
}

impl VaultDB {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when dropped.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let snapshots = db.open_tree("snapshots")?;
        let metadata = db.open_tree("metadata")?;
        Ok(Self {
            db,
            snapshots,
            metadata,
        })
    }

    // -- Snapshot operations ------------------------------------------------

    /// Stores a sealed snapshot for `fund_id`, replacing any previous one,
    /// and flushes to disk.
    ///
    /// The bytes must be a valid envelope; a corrupt snapshot is refused
    /// here rather than discovered on the next restart.
    pub fn put_snapshot(&self, fund_id: &str, sealed: &[u8]) -> DbResult<()> {
        let envelope = unwrap_envelope(sealed)?;
        self.snapshots.insert(fund_id.as_bytes(), sealed)?;
        self.metadata.insert(META_LAST_FUND, fund_id.as_bytes())?;
        self.db.flush()?;

        tracing::debug!(
            fund_id,
            version = envelope.version,
            checksum = %envelope.checksum_hex(),
            "snapshot persisted"
        );
        Ok(())
    }

    /// Returns the sealed snapshot for `fund_id`, or `None` if never stored.
    pub fn get_snapshot(&self, fund_id: &str) -> DbResult<Option<Vec<u8>>> {
        Ok(self.snapshots.get(fund_id.as_bytes())?.map(|v| v.to_vec()))
    }

    /// Removes a fund's snapshot. Returns `true` if one existed.
    pub fn delete_snapshot(&self, fund_id: &str) -> DbResult<bool> {
        Ok(self.snapshots.remove(fund_id.as_bytes())?.is_some())
    }

    /// Lists every fund id with a stored snapshot, in key order.
    pub fn list_funds(&self) -> DbResult<Vec<String>> {
        let mut funds = Vec::with_capacity(self.snapshots.len());
        for entry in self.snapshots.iter() {
            let (key, _) = entry?;
            let id = String::from_utf8(key.to_vec()).map_err(|_| DbError::InvalidKey("snapshots"))?;
            funds.push(id);
        }
        Ok(funds)
    }

    /// The fund id written most recently, if any.
    pub fn last_fund_id(&self) -> DbResult<Option<String>> {
        match self.metadata.get(META_LAST_FUND)? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|_| DbError::InvalidKey("metadata")),
            None => Ok(None),
        }
    }

    /// Number of stored snapshots.
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
