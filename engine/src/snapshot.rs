//! Versioned engine snapshots.
//!
//! An [`EngineSnapshot`] is everything needed to rebuild an
//! [`AccountingEngine`](crate::AccountingEngine): config, state, fee manager,
//! queues, ledger and AUM history. On disk it travels inside a checksummed
//! envelope from `vaultline_core::storage`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vaultline_core::config::SNAPSHOT_VERSION;
use vaultline_core::storage::{self, StorageError};
use vaultline_core::FundConfig;

use crate::accounting::{AumPoint, FundState};
use crate::fees::FeeManager;
use crate::ledger::ShareLedger;
use crate::queue::QueueManager;

/// Serializable image of one fund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// Layout version, [`SNAPSHOT_VERSION`] when written by this build.
    pub version: u32,
    pub config: FundConfig,
    pub state: FundState,
    pub fees: FeeManager,
    pub queues: QueueManager,
    pub ledger: ShareLedger,
    pub aum_history: Vec<AumPoint>,
}

impl EngineSnapshot {
    /// Seals the snapshot into bytes suitable for `VaultDB::put_snapshot`.
    pub fn encode(&self, sealed_at: DateTime<Utc>) -> Result<Vec<u8>, StorageError> {
        storage::seal(self.version, self, sealed_at)
    }

    /// Opens sealed bytes written by [`encode`](Self::encode).
    pub fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        storage::open(bytes, SNAPSHOT_VERSION)
    }
}
