//! # Snapshot Envelope
//!
//! The versioned serialize/deserialize boundary for engine state. A sealed
//! snapshot is a bincode-encoded [`SnapshotEnvelope`] whose payload is the
//! bincode encoding of the caller's state type, guarded by a BLAKE3 checksum
//! over `version || payload`.
//!
//! The envelope knows nothing about fund semantics. Migration tooling can
//! call [`peek_version`] to decide how to decode an old payload without
//! pulling the engine in.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while sealing or opening a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// bincode failed to encode or decode.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The snapshot was written by a layout this build cannot read.
    #[error("unsupported snapshot version {found} (supported: {supported})")]
    UnsupportedVersion {
        /// Version found in the envelope.
        found: u32,
        /// Version this build reads.
        supported: u32,
    },

    /// The payload was altered after sealing.
    #[error("checksum mismatch: expected {expected}, computed {computed}")]
    ChecksumMismatch {
        /// Hex checksum stored in the envelope.
        expected: String,
        /// Hex checksum of the payload as read.
        computed: String,
    },
}

/// On-disk wrapper around a serialized snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEnvelope {
    /// Layout version of `payload`.
    pub version: u32,
    /// BLAKE3 over the big-endian version followed by the payload.
    pub checksum: [u8; 32],
    /// When the snapshot was sealed.
    pub sealed_at: DateTime<Utc>,
    /// bincode-encoded state.
    pub payload: Vec<u8>,
}

impl SnapshotEnvelope {
    /// Hex form of the stored checksum, for logs and status output.
    pub fn checksum_hex(&self) -> String {
        hex::encode(self.checksum)
    }
}

fn checksum(version: u32, payload: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&version.to_be_bytes());
    hasher.update(payload);
    *hasher.finalize().as_bytes()
}

/// Serializes `value` and wraps it in a checksummed envelope.
pub fn seal<T: Serialize>(
    version: u32,
    value: &T,
    sealed_at: DateTime<Utc>,
) -> Result<Vec<u8>, StorageError> {
    let payload =
        bincode::serialize(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
    let envelope = SnapshotEnvelope {
        version,
        checksum: checksum(version, &payload),
        sealed_at,
        payload,
    };
    bincode::serialize(&envelope).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Decodes the envelope only, verifying its checksum.
pub fn unwrap_envelope(bytes: &[u8]) -> Result<SnapshotEnvelope, StorageError> {
    let envelope: SnapshotEnvelope =
        bincode::deserialize(bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;

    let computed = checksum(envelope.version, &envelope.payload);
    if computed != envelope.checksum {
        return Err(StorageError::ChecksumMismatch {
            expected: hex::encode(envelope.checksum),
            computed: hex::encode(computed),
        });
    }

    Ok(envelope)
}

/// Returns the layout version of a sealed snapshot.
pub fn peek_version(bytes: &[u8]) -> Result<u32, StorageError> {
    unwrap_envelope(bytes).map(|e| e.version)
}

/// Opens a sealed snapshot written with exactly `supported` layout version.
pub fn open<T: DeserializeOwned>(bytes: &[u8], supported: u32) -> Result<T, StorageError> {
    let envelope = unwrap_envelope(bytes)?;
    if envelope.version != supported {
        return Err(StorageError::UnsupportedVersion {
            found: envelope.version,
            supported,
        });
    }
    bincode::deserialize(&envelope.payload).map_err(|e| StorageError::Serialization(e.to_string()))
}
