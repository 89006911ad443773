//! # Operation Scripts
//!
//! An operation script is a JSON array of steps, each tagged by `op`:
//!
//! ```json
//! [
//!   { "op": "submit_deposit", "investor": "alice", "amount": "10000" },
//!   { "op": "process_deposits", "max": 16 },
//!   { "op": "update_aum", "aum": "10500", "at": "2026-02-01T00:00:00Z" },
//!   { "op": "collect_fees" }
//! ]
//! ```
//!
//! Amounts are decimal strings. `at` is optional on every step and defaults
//! to the wall clock at execution time.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vaultline_core::{Decimal, FundConfig};
use vaultline_engine::{AccountingEngine, BatchOutcome, EmergencySnapshot, EngineError, RequestKind};

/// A single scripted operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    SubmitDeposit {
        investor: String,
        amount: Decimal,
        #[serde(default)]
        min_shares: Decimal,
    },
    SubmitRedemption {
        investor: String,
        shares: Decimal,
        #[serde(default)]
        min_payout: Decimal,
    },
    CancelDeposits {
        investor: String,
        max: usize,
    },
    CancelRedemptions {
        investor: String,
        max: usize,
    },
    Reduce {
        kind: RequestKind,
        investor: String,
        entry_id: u64,
        amount: Decimal,
    },
    ProcessDeposits {
        max: usize,
    },
    ProcessRedemptions {
        max: usize,
    },
    UpdateAum {
        aum: Decimal,
    },
    CollectFees,
    Pause,
    Resume,
    TriggerEmergency,
    ExitEmergency,
    EmergencyWithdraw {
        holder: String,
        shares: Decimal,
    },
    UpdateConfig {
        config: FundConfig,
    },
}

impl Operation {
    /// The `op` tag, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::SubmitDeposit { .. } => "submit_deposit",
            Operation::SubmitRedemption { .. } => "submit_redemption",
            Operation::CancelDeposits { .. } => "cancel_deposits",
            Operation::CancelRedemptions { .. } => "cancel_redemptions",
            Operation::Reduce { .. } => "reduce",
            Operation::ProcessDeposits { .. } => "process_deposits",
            Operation::ProcessRedemptions { .. } => "process_redemptions",
            Operation::UpdateAum { .. } => "update_aum",
            Operation::CollectFees => "collect_fees",
            Operation::Pause => "pause",
            Operation::Resume => "resume",
            Operation::TriggerEmergency => "trigger_emergency",
            Operation::ExitEmergency => "exit_emergency",
            Operation::EmergencyWithdraw { .. } => "emergency_withdraw",
            Operation::UpdateConfig { .. } => "update_config",
        }
    }
}

/// One step of a script: an operation and an optional timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub op: Operation,
}

/// What a step produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    EntryId(u64),
    Cancelled(usize),
    Remaining(Decimal),
    Batch { kind: RequestKind, outcome: BatchOutcome },
    Nav(Decimal),
    Paid(Decimal),
    Emergency(EmergencySnapshot),
    Done,
}

/// Parses a script document.
pub fn parse(json: &str) -> Result<Vec<Step>> {
    serde_json::from_str(json).context("malformed operation script")
}

/// Reads and parses a script file.
pub fn load(path: &Path) -> Result<Vec<Step>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    parse(&json)
}

/// Applies one operation to the engine at `now`.
pub fn apply(
    engine: &mut AccountingEngine,
    op: &Operation,
    now: DateTime<Utc>,
) -> Result<StepOutcome, EngineError> {
    let outcome = match op {
        Operation::SubmitDeposit {
            investor,
            amount,
            min_shares,
        } => StepOutcome::EntryId(engine.submit_deposit(investor, *amount, *min_shares, now)?),
        Operation::SubmitRedemption {
            investor,
            shares,
            min_payout,
        } => StepOutcome::EntryId(engine.submit_redemption(investor, *shares, *min_payout, now)?),
        Operation::CancelDeposits { investor, max } => {
            StepOutcome::Cancelled(engine.cancel_deposits(investor, *max)?)
        }
        Operation::CancelRedemptions { investor, max } => {
            StepOutcome::Cancelled(engine.cancel_redemptions(investor, *max)?)
        }
        Operation::Reduce {
            kind,
            investor,
            entry_id,
            amount,
        } => StepOutcome::Remaining(engine.reduce_entry(*kind, investor, *entry_id, *amount)?),
        Operation::ProcessDeposits { max } => StepOutcome::Batch {
            kind: RequestKind::Deposit,
            outcome: engine.process_deposit_queue(*max, now)?,
        },
        Operation::ProcessRedemptions { max } => StepOutcome::Batch {
            kind: RequestKind::Redemption,
            outcome: engine.process_redemption_queue(*max, now)?,
        },
        Operation::UpdateAum { aum } => StepOutcome::Nav(engine.update_aum(*aum, now)?),
        Operation::CollectFees => StepOutcome::Paid(engine.collect_fees(now)?),
        Operation::Pause => {
            engine.pause(now)?;
            StepOutcome::Done
        }
        Operation::Resume => {
            engine.resume(now)?;
            StepOutcome::Done
        }
        Operation::TriggerEmergency => StepOutcome::Emergency(engine.trigger_emergency(now)?),
        Operation::ExitEmergency => {
            engine.exit_emergency(now)?;
            StepOutcome::Done
        }
        Operation::EmergencyWithdraw { holder, shares } => {
            StepOutcome::Paid(engine.emergency_withdraw(holder, *shares, now)?)
        }
        Operation::UpdateConfig { config } => {
            engine.update_config(config.clone(), now)?;
            StepOutcome::Done
        }
    };
    Ok(outcome)
}
