//! # Storage Module
//!
//! The persistence boundary for fund state.
//!
//! ```text
//! envelope.rs — versioned, checksummed snapshot encoding (bincode + BLAKE3)
//! db.rs       — sled store of sealed snapshots keyed by fund id
//! ```
//!
//! Bincode is for storage, JSON is for configs and operator output. The
//! engine decides what goes into a snapshot; this module only guarantees
//! that what comes back out is exactly what went in, at a known version.

pub mod db;
pub mod envelope;

pub use db::{DbError, VaultDB};
pub use envelope::{open, peek_version, seal, SnapshotEnvelope, StorageError};
