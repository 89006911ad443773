// Copyright (c) 2026 Vaultline Contributors. MIT License.
// See LICENSE for details.

//! # Vaultline Engine
//!
//! Fund accounting on top of `vaultline-core`:
//!
//! - **ledger** — per-holder share balances and total supply.
//! - **fees** — management and performance accrual, the high-water mark and
//!   drawdown tracking, entrance and exit quotes.
//! - **queue** — FIFO deposit and redemption queues with two-phase batch
//!   settlement.
//! - **accounting** — the [`AccountingEngine`] that ties them together and
//!   owns all per-fund state.
//! - **snapshot** — versioned, checksummed engine images.
//! - **handle** — [`FundHandle`], a shared reader/writer handle.
//!
//! Time is always passed in. The engine never reads a clock.

pub mod accounting;
pub mod fees;
pub mod handle;
pub mod ledger;
pub mod queue;
pub mod snapshot;

pub use accounting::{
    AccountingEngine, AumPoint, BatchOutcome, EmergencySnapshot, EngineError, ErrorCategory,
    FundState, HwmStatus, QueueStatus,
};
pub use fees::{FeeAccrualRecord, FeeError, FeeKind, FeeManager, HwmEvent};
pub use handle::FundHandle;
pub use ledger::{LedgerError, Position, ShareLedger};
pub use queue::{QueueEntry, QueueError, QueueManager, RequestKind};
pub use snapshot::EngineSnapshot;
