//! # Accounting Engine
//!
//! One [`AccountingEngine`] per fund. It owns the fund config and state,
//! the fee manager, both request queues, the share ledger and a short AUM
//! history, and it is the only thing that mutates any of them.
//!
//! ## Conversions
//!
//! | Direction  | Fee                         | Output                        |
//! |------------|-----------------------------|-------------------------------|
//! | Deposit    | `entrance_bps` of amount    | `(amount - fee) / nav` shares |
//! | Redemption | `exit_bps` of `shares * nav`| `gross - fee` base asset      |
//!
//! Batches price at the settlement NAV: AUM less the accrued fees still
//! held inside it, divided by shares outstanding. It is fixed for the
//! duration of a batch. The reported NAV stays `aum / total_shares` and is
//! recomputed once the batch is committed. Entrance fees never enter AUM.
//! Exit fees stay in AUM as an accrued liability until
//! [`AccountingEngine::collect_fees`] pays them out.
//!
//! ## Compute, then commit
//!
//! Every mutating operation first computes all of its effects against
//! borrowed state and only then writes them. An arithmetic failure leaves
//! the fund untouched. A failure during the write phase means an invariant
//! was already broken and is reported as [`EngineError::InvariantViolation`].
//!
//! ## Fund status
//!
//! ```text
//!            pause()                 trigger_emergency()
//!  Active ◀──────────▶ Paused        Any ─────────────────▶ Emergency
//!            resume()                      exit_emergency()
//! ```
//!
//! - **Paused**: submissions and batch processing fail with `FundPaused`.
//!   Cancellation, AUM updates and fee collection still work.
//! - **Emergency**: the queues are frozen (submit, cancel, reduce and
//!   process fail with `EmergencyActive`) and holders may withdraw directly
//!   at the NAV captured when the emergency was triggered.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vaultline_core::config::{MAX_AUM_HISTORY, SNAPSHOT_VERSION};
use vaultline_core::storage::StorageError;
use vaultline_core::{ConfigError, Decimal, FundConfig, MathError};

use crate::fees::{FeeAccrualRecord, FeeError, FeeKind, FeeManager, HwmEvent};
use crate::ledger::{LedgerError, Position, ShareLedger};
use crate::queue::{QueueEntry, QueueError, QueueManager, Quote, RequestKind};
use crate::snapshot::EngineSnapshot;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Broad classes of engine failure, for callers that map errors onto
/// status codes or retry policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// The request itself was malformed or out of range.
    Validation,
    /// The caller may not act on the target.
    Authorization,
    /// A fixed-point operation overflowed, underflowed or divided by zero.
    Arithmetic,
    /// Internal bookkeeping no longer reconciles.
    InvariantViolation,
    /// The fund is not in a state that allows the operation.
    State,
}

/// Errors that can occur in the accounting engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The fund config was rejected.
    #[error("invalid fund config: {0}")]
    Config(#[from] ConfigError),

    /// Amounts must be strictly positive.
    #[error("amount must be greater than zero")]
    InvalidAmount,

    /// The fund is paused.
    #[error("fund is paused")]
    FundPaused,

    /// `pause` on a fund that already is.
    #[error("fund is already paused")]
    AlreadyPaused,

    /// `resume` on a fund that is not paused.
    #[error("fund is not paused")]
    NotPaused,

    /// Emergency mode is active.
    #[error("emergency mode is active")]
    EmergencyActive,

    /// An emergency-only operation outside emergency mode.
    #[error("emergency mode is not active")]
    EmergencyNotActive,

    /// The holder does not have enough unlocked shares.
    #[error("insufficient shares: {holder} has {available} available, requested {requested}")]
    InsufficientShares {
        /// Holder being debited.
        holder: String,
        /// Balance minus shares already queued for redemption.
        available: Decimal,
        /// Shares requested.
        requested: Decimal,
    },

    /// A payout would exceed the assets under management.
    #[error("insufficient aum: {aum} available, {required} required")]
    InsufficientAum {
        /// Current AUM.
        aum: Decimal,
        /// Amount that would have left the fund.
        required: Decimal,
    },

    /// A snapshot with a layout this build cannot read.
    #[error("unsupported snapshot version {found} (supported: {supported})")]
    UnsupportedSnapshot {
        /// Version found in the snapshot.
        found: u32,
        /// Version this build reads.
        supported: u32,
    },

    /// Internal bookkeeping no longer reconciles.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Queue operation failed.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Fee accrual failed.
    #[error(transparent)]
    Fee(#[from] FeeError),

    /// Ledger operation failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Fixed-point arithmetic failed.
    #[error("arithmetic: {0}")]
    Math(#[from] MathError),

    /// Snapshot encoding or decoding failed.
    #[error("snapshot storage: {0}")]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// Classifies the error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::Config(_)
            | EngineError::InvalidAmount
            | EngineError::InsufficientShares { .. }
            | EngineError::InsufficientAum { .. }
            | EngineError::UnsupportedSnapshot { .. } => ErrorCategory::Validation,

            EngineError::FundPaused
            | EngineError::AlreadyPaused
            | EngineError::NotPaused
            | EngineError::EmergencyActive
            | EngineError::EmergencyNotActive => ErrorCategory::State,

            EngineError::InvariantViolation(_) | EngineError::Storage(_) => {
                ErrorCategory::InvariantViolation
            }

            EngineError::Math(_) => ErrorCategory::Arithmetic,

            EngineError::Queue(e) => match e {
                QueueError::Unauthorized { .. } => ErrorCategory::Authorization,
                QueueError::Math(_) | QueueError::SequenceExhausted => ErrorCategory::Arithmetic,
                QueueError::InvalidAmount
                | QueueError::BelowMinimum { .. }
                | QueueError::EntryNotFound(_)
                | QueueError::ReductionExceedsEntry { .. } => ErrorCategory::Validation,
            },

            EngineError::Fee(e) => match e {
                FeeError::InvalidTimestamp { .. } => ErrorCategory::Validation,
                FeeError::Math(_) => ErrorCategory::Arithmetic,
            },

            EngineError::Ledger(e) => match e {
                LedgerError::InsufficientShares { .. } => ErrorCategory::Validation,
                LedgerError::SupplyMismatch { .. } => ErrorCategory::InvariantViolation,
                LedgerError::Math(_) => ErrorCategory::Arithmetic,
            },
        }
    }
}

fn invariant(err: impl std::fmt::Display) -> EngineError {
    EngineError::InvariantViolation(err.to_string())
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Fund values captured when emergency mode was triggered. `nav` is the
/// settlement price, with accrued fees set aside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencySnapshot {
    pub aum: Decimal,
    pub nav: Decimal,
    pub total_shares: Decimal,
    pub triggered_at: DateTime<Utc>,
}

/// Mutable per-fund state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundState {
    /// Fund identifier.
    pub fund_id: String,
    /// Assets under management, in base asset units.
    pub aum: Decimal,
    /// Net asset value per share.
    pub nav: Decimal,
    /// Shares outstanding. Mirrors the ledger total.
    pub total_shares: Decimal,
    /// Submissions and processing are suspended.
    pub paused: bool,
    /// Present while emergency mode is active.
    pub emergency: Option<EmergencySnapshot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One point of AUM history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AumPoint {
    pub timestamp: DateTime<Utc>,
    pub aum: Decimal,
    pub nav: Decimal,
}

/// Result of a batch settlement call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Entries settled and removed from the queue.
    pub processed: usize,
    /// Entries left in the queue because `min_out` was not met.
    pub skipped: usize,
    /// Base asset moved: net deposits added to AUM, or net payouts.
    pub settled_amount: Decimal,
    /// Entrance or exit fees recorded by the batch.
    pub fees: Decimal,
}

/// Queue depths and pending totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub deposit_count: usize,
    pub redemption_count: usize,
    /// Base asset waiting to be converted into shares.
    pub pending_deposits: Decimal,
    /// Shares waiting to be redeemed.
    pub pending_redemptions: Decimal,
    pub paused: bool,
    pub emergency: bool,
}

/// High-water mark summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HwmStatus {
    pub hwm: Decimal,
    pub lowest_nav: Decimal,
    pub in_drawdown: bool,
    pub in_recovery: bool,
    pub drawdown_started_at: Option<DateTime<Utc>>,
    pub last_reset_at: Option<DateTime<Utc>>,
}

struct DepositQuote {
    fee: Decimal,
    net: Decimal,
}

struct RedemptionQuote {
    gross: Decimal,
    fee: Decimal,
}

// ---------------------------------------------------------------------------
// AccountingEngine
// ---------------------------------------------------------------------------

/// Share accounting, fee accrual and queue settlement for one fund.
#[derive(Debug, Clone)]
pub struct AccountingEngine {
    config: FundConfig,
    state: FundState,
    fees: FeeManager,
    queues: QueueManager,
    ledger: ShareLedger,
    aum_history: VecDeque<AumPoint>,
}

impl AccountingEngine {
    /// Creates a fund with a random id.
    pub fn create(config: FundConfig, now: DateTime<Utc>) -> Result<Self, EngineError> {
        Self::new(Uuid::new_v4().to_string(), config, now)
    }

    /// Creates an empty fund: no shares, zero AUM, NAV at `initial_nav`.
    pub fn new(
        fund_id: impl Into<String>,
        config: FundConfig,
        now: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let state = FundState {
            fund_id: fund_id.into(),
            aum: Decimal::ZERO,
            nav: config.initial_nav,
            total_shares: Decimal::ZERO,
            paused: config.paused,
            emergency: None,
            created_at: now,
            updated_at: now,
        };

        let fees = FeeManager::new(
            config.fees,
            config.recovery_window_secs,
            config.initial_nav,
            now,
        );
        let queues = QueueManager::new(config.min_investment);

        info!(
            fund_id = %state.fund_id,
            name = %config.name,
            base_asset = %config.base_asset,
            initial_nav = %config.initial_nav,
            "fund initialized"
        );

        let mut engine = Self {
            config,
            state,
            fees,
            queues,
            ledger: ShareLedger::new(),
            aum_history: VecDeque::new(),
        };
        engine.record_aum_point(now);
        Ok(engine)
    }

    // -- Internal helpers ---------------------------------------------------

    fn nav_for(&self, aum: Decimal, total_shares: Decimal) -> Result<Decimal, EngineError> {
        if total_shares.is_zero() {
            return Ok(self.config.initial_nav);
        }
        Ok(aum.checked_div(total_shares)?)
    }

    /// `aum` less every uncollected fee still held inside it, floored at
    /// zero.
    fn net_of_fees(&self, aum: Decimal) -> Result<Decimal, EngineError> {
        let carried = self.fees.accrued().carried_in_aum()?;
        if carried >= aum {
            return Ok(Decimal::ZERO);
        }
        Ok(aum.checked_sub(carried)?)
    }

    /// Price at which queued entries settle. Investors never buy or redeem
    /// a share of the manager's uncollected fees.
    fn settlement_nav(&self) -> Result<Decimal, EngineError> {
        let net = self.net_of_fees(self.state.aum)?;
        self.nav_for(net, self.ledger.total_shares())
    }

    /// NAV compared against the high-water mark for a valuation of `aum`:
    /// net of all uncollected fees, plus the management and performance
    /// fees already charged to the current holders.
    fn fee_basis_nav(&self, aum: Decimal, total_shares: Decimal) -> Result<Decimal, EngineError> {
        let gross = aum.checked_add(self.fees.holder_accrual())?;
        let net = self.net_of_fees(gross)?;
        self.nav_for(net, total_shares)
    }

    fn ensure_no_emergency(&self) -> Result<(), EngineError> {
        if self.state.emergency.is_some() {
            return Err(EngineError::EmergencyActive);
        }
        Ok(())
    }

    /// Submissions and processing need a fund that is neither in emergency
    /// mode nor paused.
    fn ensure_open(&self) -> Result<(), EngineError> {
        self.ensure_no_emergency()?;
        if self.state.paused {
            return Err(EngineError::FundPaused);
        }
        Ok(())
    }

    fn batch_limit(&self, max_to_process: usize) -> usize {
        max_to_process.min(self.config.max_batch_size)
    }

    fn record_aum_point(&mut self, timestamp: DateTime<Utc>) {
        self.aum_history.push_back(AumPoint {
            timestamp,
            aum: self.state.aum,
            nav: self.state.nav,
        });
        while self.aum_history.len() > MAX_AUM_HISTORY {
            self.aum_history.pop_front();
        }
    }

    /// Writes the post-commit totals. `total_shares` is always taken from
    /// the ledger.
    fn commit_totals(&mut self, aum: Decimal, nav: Decimal, now: DateTime<Utc>) {
        self.state.aum = aum;
        self.state.nav = nav;
        self.state.total_shares = self.ledger.total_shares();
        self.state.updated_at = self.state.updated_at.max(now);
    }

    fn auto_process(&mut self, kind: RequestKind, now: DateTime<Utc>) {
        if !self.config.auto_process {
            return;
        }
        let batch = self.config.auto_process_batch;
        let result = match kind {
            RequestKind::Deposit => self.process_deposit_queue(batch, now),
            RequestKind::Redemption => self.process_redemption_queue(batch, now),
        };
        if let Err(e) = result {
            warn!(
                fund_id = %self.state.fund_id,
                %kind,
                error = %e,
                "auto-processing failed, entries remain queued"
            );
        }
    }

    // -- Submissions --------------------------------------------------------

    /// Queues a deposit of `amount` base asset. `min_shares` is the least
    /// the investor will accept; below that the entry is skipped at
    /// settlement.
    pub fn submit_deposit(
        &mut self,
        investor: &str,
        amount: Decimal,
        min_shares: Decimal,
        now: DateTime<Utc>,
    ) -> Result<u64, EngineError> {
        self.ensure_open()?;
        let id = self
            .queues
            .submit(RequestKind::Deposit, investor, amount, min_shares, now)?;

        info!(
            fund_id = %self.state.fund_id,
            entry_id = id,
            investor,
            %amount,
            %min_shares,
            "deposit queued"
        );

        self.auto_process(RequestKind::Deposit, now);
        Ok(id)
    }

    /// Queues a redemption of `shares`. Shares already queued for redemption
    /// by the same holder count against their balance.
    pub fn submit_redemption(
        &mut self,
        investor: &str,
        shares: Decimal,
        min_payout: Decimal,
        now: DateTime<Utc>,
    ) -> Result<u64, EngineError> {
        self.ensure_open()?;
        let available = self.available_shares(investor)?;
        if shares > available {
            return Err(EngineError::InsufficientShares {
                holder: investor.to_string(),
                available,
                requested: shares,
            });
        }

        let id = self
            .queues
            .submit(RequestKind::Redemption, investor, shares, min_payout, now)?;

        info!(
            fund_id = %self.state.fund_id,
            entry_id = id,
            investor,
            %shares,
            %min_payout,
            "redemption queued"
        );

        self.auto_process(RequestKind::Redemption, now);
        Ok(id)
    }

    // -- Cancellation -------------------------------------------------------

    fn cancel(&mut self, kind: RequestKind, investor: &str, max: usize) -> Result<usize, EngineError> {
        self.ensure_no_emergency()?;
        let removed = self.queues.cancel(kind, investor, max);
        if !removed.is_empty() {
            info!(
                fund_id = %self.state.fund_id,
                %kind,
                investor,
                count = removed.len(),
                "queue entries cancelled"
            );
        }
        Ok(removed.len())
    }

    /// Cancels up to `max` of the investor's oldest pending deposits.
    pub fn cancel_deposits(&mut self, investor: &str, max: usize) -> Result<usize, EngineError> {
        self.cancel(RequestKind::Deposit, investor, max)
    }

    /// Cancels up to `max` of the investor's oldest pending redemptions.
    pub fn cancel_redemptions(&mut self, investor: &str, max: usize) -> Result<usize, EngineError> {
        self.cancel(RequestKind::Redemption, investor, max)
    }

    /// Partially cancels one pending entry. Returns the amount still queued.
    pub fn reduce_entry(
        &mut self,
        kind: RequestKind,
        investor: &str,
        entry_id: u64,
        amount: Decimal,
    ) -> Result<Decimal, EngineError> {
        self.ensure_no_emergency()?;
        let remaining = self.queues.reduce(kind, investor, entry_id, amount)?;
        info!(
            fund_id = %self.state.fund_id,
            %kind,
            investor,
            entry_id,
            reduced_by = %amount,
            %remaining,
            "queue entry reduced"
        );
        Ok(remaining)
    }

    // -- Batch settlement ---------------------------------------------------

    /// Settles up to `max_to_process` deposits from the head of the queue.
    pub fn process_deposit_queue(
        &mut self,
        max_to_process: usize,
        now: DateTime<Utc>,
    ) -> Result<BatchOutcome, EngineError> {
        self.ensure_open()?;
        let max = self.batch_limit(max_to_process);
        let nav = self.settlement_nav()?;
        let fees = &self.fees;

        let plan = self.queues.plan_batch(
            RequestKind::Deposit,
            max,
            |entry: &QueueEntry| -> Result<Quote<DepositQuote>, EngineError> {
                let fee = fees.entrance_fee(entry.amount)?;
                let net = entry.amount.checked_sub(fee)?;
                let shares = net.checked_div(nav)?;
                Ok(Quote {
                    output: shares,
                    detail: DepositQuote { fee, net },
                })
            },
        )?;

        let mut net_total = Decimal::ZERO;
        let mut fee_total = Decimal::ZERO;
        let mut share_total = Decimal::ZERO;
        for fill in &plan.fills {
            net_total = net_total.checked_add(fill.detail.net)?;
            fee_total = fee_total.checked_add(fill.detail.fee)?;
            share_total = share_total.checked_add(fill.output)?;
        }

        let new_aum = self.state.aum.checked_add(net_total)?;
        let new_total = self.ledger.total_shares().checked_add(share_total)?;
        let new_nav = self.nav_for(new_aum, new_total)?;
        let accrued = self.fees.accrued().with_added(FeeKind::Entrance, fee_total)?;
        let holder_accrual = self
            .fees
            .holder_accrual_for(self.ledger.total_shares(), new_total)?;

        // Commit. Individual mints cannot overflow once the new total fits.
        let mut settled = Vec::with_capacity(plan.fills.len());
        for fill in &plan.fills {
            self.ledger
                .mint(&fill.entry.requester, fill.output)
                .map_err(invariant)?;
            debug!(
                fund_id = %self.state.fund_id,
                entry_id = fill.entry.id,
                investor = %fill.entry.requester,
                amount = %fill.entry.amount,
                fee = %fill.detail.fee,
                shares = %fill.output,
                "deposit settled"
            );
            settled.push(fill.entry.id);
        }
        self.fees.set_accrued(accrued);
        self.fees.set_holder_accrual(holder_accrual);
        self.commit_totals(new_aum, new_nav, now);
        self.queues.settle(RequestKind::Deposit, &settled);

        let outcome = BatchOutcome {
            processed: plan.processed(),
            skipped: plan.skipped_count(),
            settled_amount: net_total,
            fees: fee_total,
        };
        self.log_batch(RequestKind::Deposit, &outcome);
        Ok(outcome)
    }

    /// Settles up to `max_to_process` redemptions from the head of the queue.
    pub fn process_redemption_queue(
        &mut self,
        max_to_process: usize,
        now: DateTime<Utc>,
    ) -> Result<BatchOutcome, EngineError> {
        self.ensure_open()?;
        let max = self.batch_limit(max_to_process);
        let nav = self.settlement_nav()?;
        let fees = &self.fees;

        let plan = self.queues.plan_batch(
            RequestKind::Redemption,
            max,
            |entry: &QueueEntry| -> Result<Quote<RedemptionQuote>, EngineError> {
                let gross = entry.amount.checked_mul(nav)?;
                let fee = fees.exit_fee(gross)?;
                let net = gross.checked_sub(fee)?;
                Ok(Quote {
                    output: net,
                    detail: RedemptionQuote { gross, fee },
                })
            },
        )?;

        let mut net_total = Decimal::ZERO;
        let mut fee_total = Decimal::ZERO;
        let mut burns: BTreeMap<&str, Decimal> = BTreeMap::new();
        for fill in &plan.fills {
            net_total = net_total.checked_add(fill.output)?;
            fee_total = fee_total.checked_add(fill.detail.fee)?;
            let burn = burns.entry(fill.entry.requester.as_str()).or_default();
            *burn = burn.checked_add(fill.entry.amount)?;
        }

        for (holder, shares) in &burns {
            let balance = self.ledger.balance_of(holder);
            if *shares > balance {
                return Err(invariant(format!(
                    "{holder} has {shares} shares queued for redemption but holds {balance}"
                )));
            }
        }
        if net_total > self.state.aum {
            return Err(EngineError::InsufficientAum {
                aum: self.state.aum,
                required: net_total,
            });
        }

        let new_aum = self.state.aum.checked_sub(net_total)?;
        let burned = Decimal::checked_sum(burns.values().copied())?;
        let new_total = self
            .ledger
            .total_shares()
            .checked_sub(burned)
            .map_err(invariant)?;
        let new_nav = self.nav_for(new_aum, new_total)?;
        let accrued = self.fees.accrued().with_added(FeeKind::Exit, fee_total)?;
        let holder_accrual = self
            .fees
            .holder_accrual_for(self.ledger.total_shares(), new_total)?;

        let mut settled = Vec::with_capacity(plan.fills.len());
        for fill in &plan.fills {
            self.ledger
                .burn(&fill.entry.requester, fill.entry.amount)
                .map_err(invariant)?;
            debug!(
                fund_id = %self.state.fund_id,
                entry_id = fill.entry.id,
                investor = %fill.entry.requester,
                shares = %fill.entry.amount,
                gross = %fill.detail.gross,
                fee = %fill.detail.fee,
                net = %fill.output,
                "redemption settled"
            );
            settled.push(fill.entry.id);
        }
        self.fees.set_accrued(accrued);
        self.fees.set_holder_accrual(holder_accrual);
        self.commit_totals(new_aum, new_nav, now);
        self.queues.settle(RequestKind::Redemption, &settled);

        let outcome = BatchOutcome {
            processed: plan.processed(),
            skipped: plan.skipped_count(),
            settled_amount: net_total,
            fees: fee_total,
        };
        self.log_batch(RequestKind::Redemption, &outcome);
        Ok(outcome)
    }

    fn log_batch(&self, kind: RequestKind, outcome: &BatchOutcome) {
        info!(
            fund_id = %self.state.fund_id,
            %kind,
            processed = outcome.processed,
            skipped = outcome.skipped,
            settled = %outcome.settled_amount,
            fees = %outcome.fees,
            aum = %self.state.aum,
            nav = %self.state.nav,
            total_shares = %self.state.total_shares,
            "batch committed"
        );
        if outcome.skipped > 0 {
            warn!(
                fund_id = %self.state.fund_id,
                %kind,
                skipped = outcome.skipped,
                "entries skipped: min_out not met"
            );
        }
    }

    // -- Valuation & fees ---------------------------------------------------

    /// Records a new AUM valuation and returns the resulting NAV.
    ///
    /// Management fees accrue on the AUM held since the last accrual, net
    /// of fees already owed. Performance fees and drawdown tracking use the
    /// fee-basis NAV (see [`crate::fees`]).
    pub fn update_aum(&mut self, new_aum: Decimal, now: DateTime<Utc>) -> Result<Decimal, EngineError> {
        let total_shares = self.ledger.total_shares();
        let new_nav = self.nav_for(new_aum, total_shares)?;
        let fee_nav = self.fee_basis_nav(new_aum, total_shares)?;
        let managed = self.net_of_fees(self.state.aum)?;
        let plan = self
            .fees
            .quote_accrual(managed, fee_nav, total_shares, now)?;

        let outcome = self.fees.commit_accrual(plan);
        let previous_aum = self.state.aum;
        self.commit_totals(new_aum, new_nav, now);
        self.record_aum_point(now);

        info!(
            fund_id = %self.state.fund_id,
            %previous_aum,
            aum = %new_aum,
            nav = %new_nav,
            elapsed_secs = outcome.elapsed_secs,
            management_fee = %outcome.management_fee,
            performance_fee = %outcome.performance_fee,
            "aum updated"
        );
        match &outcome.hwm_event {
            Some(HwmEvent::NewHigh { previous, current }) => {
                info!(fund_id = %self.state.fund_id, %previous, %current, "new high-water mark");
            }
            Some(HwmEvent::EnteredDrawdown { hwm, nav }) => {
                warn!(fund_id = %self.state.fund_id, %hwm, %nav, "fund entered drawdown");
            }
            Some(HwmEvent::Recovered { hwm }) => {
                info!(fund_id = %self.state.fund_id, %hwm, "fund recovered to high-water mark");
            }
            Some(HwmEvent::RecoveryReset { previous_hwm, new_hwm }) => {
                warn!(
                    fund_id = %self.state.fund_id,
                    %previous_hwm,
                    %new_hwm,
                    "recovery window elapsed, high-water mark reset"
                );
            }
            None => {}
        }

        Ok(new_nav)
    }

    /// Pays out every accrued fee bucket and returns the total paid.
    ///
    /// Management, performance and exit fees are still inside AUM and are
    /// deducted from it. Entrance fees were split off before deposits
    /// reached AUM.
    pub fn collect_fees(&mut self, now: DateTime<Utc>) -> Result<Decimal, EngineError> {
        self.ensure_no_emergency()?;
        let accrued = *self.fees.accrued();
        let carried = accrued.carried_in_aum()?;
        let total = accrued.total()?;

        if carried > self.state.aum {
            return Err(EngineError::InsufficientAum {
                aum: self.state.aum,
                required: carried,
            });
        }
        let new_aum = self.state.aum.checked_sub(carried)?;
        let new_nav = self.nav_for(new_aum, self.ledger.total_shares())?;

        let taken = self.fees.take_all()?;
        self.commit_totals(new_aum, new_nav, now);

        info!(
            fund_id = %self.state.fund_id,
            management = %taken.management,
            performance = %taken.performance,
            entrance = %taken.entrance,
            exit = %taken.exit,
            total = %total,
            aum = %new_aum,
            "fees collected"
        );
        Ok(total)
    }

    /// Replaces the fund config through the governed change path.
    ///
    /// Fees are accrued under the old schedule up to `now` before the new
    /// one takes effect.
    pub fn update_config(&mut self, config: FundConfig, now: DateTime<Utc>) -> Result<(), EngineError> {
        config.validate()?;

        let total_shares = self.ledger.total_shares();
        let fee_nav = self.fee_basis_nav(self.state.aum, total_shares)?;
        let managed = self.net_of_fees(self.state.aum)?;
        let plan = self
            .fees
            .quote_accrual(managed, fee_nav, total_shares, now)?;
        let nav = if total_shares.is_zero() {
            config.initial_nav
        } else {
            self.state.nav
        };

        let outcome = self.fees.commit_accrual(plan);
        self.fees
            .set_schedule(config.fees, config.recovery_window_secs);
        self.queues.set_min_investment(config.min_investment);
        self.state.paused = config.paused;
        self.commit_totals(self.state.aum, nav, now);

        info!(
            fund_id = %self.state.fund_id,
            management_bps = config.fees.management_bps,
            performance_bps = config.fees.performance_bps,
            entrance_bps = config.fees.entrance_bps,
            exit_bps = config.fees.exit_bps,
            min_investment = %config.min_investment,
            paused = config.paused,
            auto_process = config.auto_process,
            accrued_management = %outcome.management_fee,
            "fund config updated"
        );
        self.config = config;
        Ok(())
    }

    // -- Status transitions -------------------------------------------------

    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        if self.state.paused {
            return Err(EngineError::AlreadyPaused);
        }
        self.state.paused = true;
        self.state.updated_at = self.state.updated_at.max(now);
        warn!(fund_id = %self.state.fund_id, "fund paused");
        Ok(())
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        if !self.state.paused {
            return Err(EngineError::NotPaused);
        }
        self.state.paused = false;
        self.state.updated_at = self.state.updated_at.max(now);
        info!(fund_id = %self.state.fund_id, "fund resumed");
        Ok(())
    }

    /// Freezes the queues and captures the current valuation for
    /// emergency withdrawals.
    pub fn trigger_emergency(&mut self, now: DateTime<Utc>) -> Result<EmergencySnapshot, EngineError> {
        self.ensure_no_emergency()?;
        let snapshot = EmergencySnapshot {
            aum: self.state.aum,
            nav: self.settlement_nav()?,
            total_shares: self.ledger.total_shares(),
            triggered_at: now,
        };
        self.state.emergency = Some(snapshot.clone());
        self.state.updated_at = self.state.updated_at.max(now);

        warn!(
            fund_id = %self.state.fund_id,
            aum = %snapshot.aum,
            nav = %snapshot.nav,
            total_shares = %snapshot.total_shares,
            "emergency mode triggered"
        );
        Ok(snapshot)
    }

    /// Leaves emergency mode. Queued entries become processable again.
    pub fn exit_emergency(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        let snapshot = self
            .state
            .emergency
            .take()
            .ok_or(EngineError::EmergencyNotActive)?;
        self.state.updated_at = self.state.updated_at.max(now);
        warn!(
            fund_id = %self.state.fund_id,
            triggered_at = %snapshot.triggered_at,
            "emergency mode exited"
        );
        Ok(())
    }

    /// Burns `shares` from `holder` and pays them out at the emergency NAV,
    /// with no exit fee. Shares locked in queued redemptions cannot be
    /// withdrawn. Returns the payout.
    pub fn emergency_withdraw(
        &mut self,
        holder: &str,
        shares: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Decimal, EngineError> {
        let snapshot_nav = self
            .state
            .emergency
            .as_ref()
            .map(|s| s.nav)
            .ok_or(EngineError::EmergencyNotActive)?;
        if shares.is_zero() {
            return Err(EngineError::InvalidAmount);
        }

        let available = self.available_shares(holder)?;
        if shares > available {
            return Err(EngineError::InsufficientShares {
                holder: holder.to_string(),
                available,
                requested: shares,
            });
        }

        let payout = shares.checked_mul(snapshot_nav)?;
        if payout > self.state.aum {
            return Err(EngineError::InsufficientAum {
                aum: self.state.aum,
                required: payout,
            });
        }
        let new_aum = self.state.aum.checked_sub(payout)?;
        let new_total = self.ledger.total_shares().checked_sub(shares)?;
        let new_nav = self.nav_for(new_aum, new_total)?;
        let holder_accrual = self
            .fees
            .holder_accrual_for(self.ledger.total_shares(), new_total)?;

        self.ledger.burn(holder, shares)?;
        self.fees.set_holder_accrual(holder_accrual);
        self.commit_totals(new_aum, new_nav, now);

        warn!(
            fund_id = %self.state.fund_id,
            holder,
            %shares,
            %payout,
            nav = %snapshot_nav,
            "emergency withdrawal"
        );
        Ok(payout)
    }

    // -- Queries ------------------------------------------------------------

    pub fn fund_id(&self) -> &str {
        &self.state.fund_id
    }

    pub fn config(&self) -> &FundConfig {
        &self.config
    }

    pub fn state(&self) -> &FundState {
        &self.state
    }

    pub fn fee_manager(&self) -> &FeeManager {
        &self.fees
    }

    pub fn balance_of(&self, holder: &str) -> Decimal {
        self.ledger.balance_of(holder)
    }

    pub fn positions(&self) -> Vec<Position> {
        self.ledger.positions()
    }

    /// Holder balance minus shares already queued for redemption.
    pub fn available_shares(&self, holder: &str) -> Result<Decimal, EngineError> {
        let locked = self.queues.pending_for(RequestKind::Redemption, holder)?;
        self.ledger
            .balance_of(holder)
            .checked_sub(locked)
            .map_err(|_| invariant(format!("{holder} has more shares queued than held")))
    }

    /// Pending entries of one queue, oldest first.
    pub fn queue_entries(&self, kind: RequestKind) -> Vec<QueueEntry> {
        self.queues.entries(kind).cloned().collect()
    }

    pub fn queue_status(&self) -> Result<QueueStatus, EngineError> {
        Ok(QueueStatus {
            deposit_count: self.queues.len(RequestKind::Deposit),
            redemption_count: self.queues.len(RequestKind::Redemption),
            pending_deposits: self.queues.pending_total(RequestKind::Deposit)?,
            pending_redemptions: self.queues.pending_total(RequestKind::Redemption)?,
            paused: self.state.paused,
            emergency: self.state.emergency.is_some(),
        })
    }

    /// Accrued, not yet collected fees per kind.
    pub fn fee_breakdown(&self) -> FeeAccrualRecord {
        *self.fees.accrued()
    }

    /// Lifetime collected fees per kind.
    pub fn collected_fees(&self) -> FeeAccrualRecord {
        *self.fees.collected()
    }

    pub fn hwm_status(&self) -> HwmStatus {
        let hwm = self.fees.hwm_state();
        HwmStatus {
            hwm: hwm.hwm,
            lowest_nav: hwm.lowest_nav_since_drawdown,
            in_drawdown: hwm.in_drawdown,
            in_recovery: self.fees.in_recovery(),
            drawdown_started_at: hwm.drawdown_started_at,
            last_reset_at: hwm.last_reset_at,
        }
    }

    /// AUM history, oldest first.
    pub fn aum_history(&self) -> Vec<AumPoint> {
        self.aum_history.iter().copied().collect()
    }

    // -- Snapshots ----------------------------------------------------------

    /// Captures the full engine state.
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            version: SNAPSHOT_VERSION,
            config: self.config.clone(),
            state: self.state.clone(),
            fees: self.fees.clone(),
            queues: self.queues.clone(),
            ledger: self.ledger.clone(),
            aum_history: self.aum_history.iter().copied().collect(),
        }
    }

    /// Rebuilds an engine from a snapshot, checking that it reconciles.
    pub fn restore(snapshot: EngineSnapshot) -> Result<Self, EngineError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(EngineError::UnsupportedSnapshot {
                found: snapshot.version,
                supported: SNAPSHOT_VERSION,
            });
        }
        snapshot.config.validate()?;
        snapshot.ledger.verify()?;
        if snapshot.state.total_shares != snapshot.ledger.total_shares() {
            return Err(invariant(format!(
                "fund state records {} shares, ledger holds {}",
                snapshot.state.total_shares,
                snapshot.ledger.total_shares()
            )));
        }

        let engine = Self {
            config: snapshot.config,
            state: snapshot.state,
            fees: snapshot.fees,
            queues: snapshot.queues,
            ledger: snapshot.ledger,
            aum_history: snapshot.aum_history.into_iter().collect(),
        };
        debug!(
            fund_id = %engine.state.fund_id,
            holders = engine.ledger.holder_count(),
            "engine restored from snapshot"
        );
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use vaultline_core::config::SECONDS_PER_YEAR;
    use vaultline_core::FeeRates;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn config(fees: FeeRates) -> FundConfig {
        FundConfig::new("Test Fund", "USDC", fees, d("100"), 86_400 * 30)
    }

    fn engine(fees: FeeRates) -> AccountingEngine {
        AccountingEngine::new("fund-1", config(fees), t0()).unwrap()
    }

    fn no_fees() -> FeeRates {
        FeeRates::default()
    }

    /// Engine with `holder` owning `shares` at NAV 1.0.
    fn funded(fees: FeeRates, holder: &str, shares: &str) -> AccountingEngine {
        let mut e = engine(FeeRates {
            entrance_bps: 0,
            ..fees
        });
        e.submit_deposit(holder, d(shares), Decimal::ZERO, t0()).unwrap();
        e.process_deposit_queue(1, t0()).unwrap();
        let mut cfg = e.config().clone();
        cfg.fees = fees;
        e.update_config(cfg, t0()).unwrap();
        e
    }

    #[test]
    fn first_deposit_mints_at_initial_nav() {
        let mut e = engine(FeeRates {
            entrance_bps: 100,
            ..no_fees()
        });
        e.submit_deposit("alice", d("10000"), d("9900"), t0()).unwrap();
        let outcome = e.process_deposit_queue(1, t0()).unwrap();

        assert_eq!(outcome.processed, 1);
        assert_eq!(e.balance_of("alice"), d("9900"));
        assert_eq!(e.state().aum, d("9900"));
        assert_eq!(e.state().total_shares, d("9900"));
        assert_eq!(e.state().nav, Decimal::ONE);
        assert_eq!(e.fee_breakdown().entrance, d("100"));
    }

    #[test]
    fn performance_fee_on_nav_gain() {
        let mut e = funded(
            FeeRates {
                performance_bps: 2_000,
                ..no_fees()
            },
            "alice",
            "1000",
        );
        let nav = e.update_aum(d("1200"), t0()).unwrap();
        assert_eq!(nav, d("1.2"));
        assert_eq!(e.fee_breakdown().performance, d("40"));
        assert_eq!(e.hwm_status().hwm, d("1.2"));
    }

    #[test]
    fn partial_redemption_batch() {
        let mut e = funded(
            FeeRates {
                exit_bps: 50,
                ..no_fees()
            },
            "alice",
            "1000",
        );
        e.submit_redemption("alice", d("100"), Decimal::ZERO, t0()).unwrap();
        e.submit_redemption("alice", d("200"), Decimal::ZERO, t0()).unwrap();
        let third = e.submit_redemption("alice", d("50"), Decimal::ZERO, t0()).unwrap();

        let outcome = e.process_redemption_queue(2, t0()).unwrap();
        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.settled_amount, d("298.5"));
        assert_eq!(outcome.fees, d("1.5"));
        assert_eq!(e.balance_of("alice"), d("700"));
        assert_eq!(e.state().aum, d("701.5"));
        assert_eq!(e.fee_breakdown().exit, d("1.5"));

        let left = e.queue_entries(RequestKind::Redemption);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, third);
    }

    #[test]
    fn last_redeemer_leaves_accrued_fees_behind() {
        let mut e = funded(
            FeeRates {
                performance_bps: 2_000,
                ..no_fees()
            },
            "alice",
            "1000",
        );
        e.update_aum(d("1200"), t0()).unwrap();
        assert_eq!(e.fee_breakdown().performance, d("40"));

        e.submit_redemption("alice", d("1000"), Decimal::ZERO, t0()).unwrap();
        let outcome = e.process_redemption_queue(1, t0()).unwrap();
        assert_eq!(outcome.settled_amount, d("1160"));
        assert_eq!(e.state().aum, d("40"));
        assert!(e.state().total_shares.is_zero());

        assert_eq!(e.collect_fees(t0()).unwrap(), d("40"));
        assert!(e.state().aum.is_zero());
    }

    #[test]
    fn deposits_price_net_of_accrued_fees() {
        let mut e = funded(
            FeeRates {
                performance_bps: 2_000,
                ..no_fees()
            },
            "alice",
            "1000",
        );
        e.update_aum(d("1200"), t0()).unwrap();
        assert_eq!(e.state().nav, d("1.2"));

        e.submit_deposit("bob", d("1160"), Decimal::ZERO, t0()).unwrap();
        e.process_deposit_queue(1, t0()).unwrap();
        assert_eq!(e.balance_of("bob"), d("1000"));
        assert_eq!(e.state().aum, d("2360"));

        // Bob bought in below the reported NAV, which is no loss to the fund.
        e.update_aum(d("2360"), t0()).unwrap();
        assert!(!e.hwm_status().in_drawdown);
        assert_eq!(e.fee_breakdown().performance, d("40"));
    }

    #[test]
    fn redemption_after_performance_fee_is_not_a_gain() {
        let mut e = funded(
            FeeRates {
                performance_bps: 2_000,
                ..no_fees()
            },
            "alice",
            "1000",
        );
        e.submit_deposit("bob", d("1000"), Decimal::ZERO, t0()).unwrap();
        e.process_deposit_queue(1, t0()).unwrap();
        e.update_aum(d("2400"), t0()).unwrap();
        assert_eq!(e.fee_breakdown().performance, d("80"));

        e.submit_redemption("alice", d("1000"), Decimal::ZERO, t0()).unwrap();
        let outcome = e.process_redemption_queue(1, t0()).unwrap();
        assert_eq!(outcome.settled_amount, d("1160"));
        assert_eq!(e.state().aum, d("1240"));

        e.update_aum(d("1240"), t0() + Duration::seconds(1)).unwrap();
        assert_eq!(e.fee_breakdown().performance, d("80"));
        assert_eq!(e.hwm_status().hwm, d("1.2"));
        assert!(!e.hwm_status().in_drawdown);

        assert_eq!(e.collect_fees(t0() + Duration::seconds(1)).unwrap(), d("80"));
        assert_eq!(e.state().aum, d("1160"));
        assert_eq!(e.balance_of("bob"), d("1000"));
    }

    #[test]
    fn management_fee_excludes_uncollected_fees() {
        let mut e = funded(
            FeeRates {
                management_bps: 1_000,
                ..no_fees()
            },
            "alice",
            "1000",
        );
        let year = Duration::seconds(SECONDS_PER_YEAR as i64);
        e.update_aum(d("1000"), t0() + year).unwrap();
        assert_eq!(e.fee_breakdown().management, d("100"));

        e.update_aum(d("1000"), t0() + year + year).unwrap();
        assert_eq!(e.fee_breakdown().management, d("190"));
    }

    #[test]
    fn exit_fee_left_in_aum_is_not_a_gain() {
        let mut e = funded(
            FeeRates {
                performance_bps: 2_000,
                exit_bps: 50,
                ..no_fees()
            },
            "alice",
            "1000",
        );
        e.submit_redemption("alice", d("300"), Decimal::ZERO, t0()).unwrap();
        e.process_redemption_queue(1, t0()).unwrap();
        assert_eq!(e.state().aum, d("701.5"));
        assert!(e.state().nav > Decimal::ONE);

        e.update_aum(d("701.5"), t0() + Duration::seconds(1)).unwrap();
        assert!(e.fee_breakdown().performance.is_zero());
        let status = e.hwm_status();
        assert_eq!(status.hwm, Decimal::ONE);
        assert!(!status.in_drawdown);
    }

    #[test]
    fn exit_fee_after_full_redemption_is_not_charged_to_next_investor() {
        let mut e = funded(
            FeeRates {
                performance_bps: 2_000,
                exit_bps: 50,
                ..no_fees()
            },
            "alice",
            "1000",
        );
        e.submit_redemption("alice", d("1000"), Decimal::ZERO, t0()).unwrap();
        e.process_redemption_queue(1, t0()).unwrap();
        assert_eq!(e.state().aum, d("5"));

        e.submit_deposit("bob", d("1000"), Decimal::ZERO, t0()).unwrap();
        e.process_deposit_queue(1, t0()).unwrap();
        assert_eq!(e.balance_of("bob"), d("1000"));

        e.update_aum(d("1005"), t0() + Duration::seconds(1)).unwrap();
        assert!(e.fee_breakdown().performance.is_zero());
        assert_eq!(e.fee_breakdown().exit, d("5"));
    }

    #[test]
    fn emergency_snapshot_sets_accrued_fees_aside() {
        let mut e = funded(
            FeeRates {
                performance_bps: 2_000,
                ..no_fees()
            },
            "alice",
            "1000",
        );
        e.update_aum(d("1200"), t0()).unwrap();
        let snapshot = e.trigger_emergency(t0()).unwrap();
        assert_eq!(snapshot.nav, d("1.16"));

        assert_eq!(e.emergency_withdraw("alice", d("1000"), t0()).unwrap(), d("1160"));
        e.exit_emergency(t0()).unwrap();
        assert_eq!(e.collect_fees(t0()).unwrap(), d("40"));
    }

    #[test]
    fn emergency_withdraw_uses_snapshot_nav() {
        let mut e = funded(no_fees(), "alice", "1000");
        e.update_aum(d("5000"), t0()).unwrap();
        e.trigger_emergency(t0()).unwrap();

        let payout = e.emergency_withdraw("alice", d("100"), t0()).unwrap();
        assert_eq!(payout, d("500"));
        assert_eq!(e.state().aum, d("4500"));
        assert_eq!(e.balance_of("alice"), d("900"));
    }

    #[test]
    fn emergency_snapshot_survives_later_valuations() {
        let mut e = funded(no_fees(), "alice", "1000");
        e.update_aum(d("5000"), t0()).unwrap();
        e.trigger_emergency(t0()).unwrap();
        e.update_aum(d("2000"), t0() + Duration::hours(1)).unwrap();

        let payout = e
            .emergency_withdraw("alice", d("100"), t0() + Duration::hours(1))
            .unwrap();
        assert_eq!(payout, d("500"));
    }

    #[test]
    fn emergency_freezes_queues() {
        let mut e = funded(no_fees(), "alice", "1000");
        e.submit_redemption("alice", d("10"), Decimal::ZERO, t0()).unwrap();
        e.trigger_emergency(t0()).unwrap();

        assert_eq!(
            e.submit_deposit("bob", d("500"), Decimal::ZERO, t0()),
            Err(EngineError::EmergencyActive)
        );
        assert_eq!(e.cancel_redemptions("alice", 1), Err(EngineError::EmergencyActive));
        assert_eq!(
            e.process_redemption_queue(10, t0()),
            Err(EngineError::EmergencyActive)
        );
        assert_eq!(e.trigger_emergency(t0()), Err(EngineError::EmergencyActive));

        e.exit_emergency(t0()).unwrap();
        assert_eq!(e.process_redemption_queue(10, t0()).unwrap().processed, 1);
    }

    #[test]
    fn emergency_withdraw_excludes_queued_shares() {
        let mut e = funded(no_fees(), "alice", "1000");
        e.submit_redemption("alice", d("950"), Decimal::ZERO, t0()).unwrap();
        e.trigger_emergency(t0()).unwrap();
        let err = e.emergency_withdraw("alice", d("100"), t0()).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientShares { .. }));
        assert_eq!(e.emergency_withdraw("alice", d("50"), t0()).unwrap(), d("50"));
    }

    #[test]
    fn emergency_withdraw_requires_emergency() {
        let mut e = funded(no_fees(), "alice", "1000");
        assert_eq!(
            e.emergency_withdraw("alice", d("1"), t0()),
            Err(EngineError::EmergencyNotActive)
        );
        assert_eq!(e.exit_emergency(t0()), Err(EngineError::EmergencyNotActive));
    }

    #[test]
    fn pause_blocks_submit_and_process_but_not_cancel() {
        let mut e = engine(no_fees());
        e.submit_deposit("alice", d("100"), Decimal::ZERO, t0()).unwrap();
        e.pause(t0()).unwrap();

        assert_eq!(
            e.submit_deposit("alice", d("100"), Decimal::ZERO, t0()),
            Err(EngineError::FundPaused)
        );
        assert_eq!(e.process_deposit_queue(1, t0()), Err(EngineError::FundPaused));
        assert_eq!(e.pause(t0()), Err(EngineError::AlreadyPaused));

        e.update_aum(Decimal::ZERO, t0()).unwrap();
        assert_eq!(e.queue_status().unwrap().deposit_count, 1);
        assert_eq!(e.cancel_deposits("alice", 5).unwrap(), 1);

        e.resume(t0()).unwrap();
        assert_eq!(e.resume(t0()), Err(EngineError::NotPaused));
    }

    #[test]
    fn redemption_cannot_exceed_unqueued_balance() {
        let mut e = funded(no_fees(), "alice", "1000");
        e.submit_redemption("alice", d("600"), Decimal::ZERO, t0()).unwrap();
        let err = e
            .submit_redemption("alice", d("401"), Decimal::ZERO, t0())
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientShares { .. }));
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert_eq!(e.available_shares("alice").unwrap(), d("400"));
    }

    #[test]
    fn slippage_skip_leaves_entry_queued() {
        let mut e = funded(no_fees(), "alice", "1000");
        e.update_aum(d("500"), t0()).unwrap();
        // NAV 0.5: 100 shares pay 50, below the 60 minimum.
        e.submit_redemption("alice", d("100"), d("60"), t0()).unwrap();
        e.submit_redemption("alice", d("100"), d("50"), t0()).unwrap();

        let outcome = e.process_redemption_queue(10, t0()).unwrap();
        assert_eq!(outcome.processed, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(e.queue_status().unwrap().redemption_count, 1);
        assert_eq!(e.state().aum, d("450"));
    }

    #[test]
    fn collect_fees_deducts_only_carried_fees() {
        let mut e = engine(FeeRates {
            management_bps: 200,
            entrance_bps: 100,
            ..no_fees()
        });
        e.submit_deposit("alice", d("10000"), Decimal::ZERO, t0()).unwrap();
        e.process_deposit_queue(1, t0()).unwrap();

        let year = t0() + Duration::seconds(SECONDS_PER_YEAR as i64);
        e.update_aum(d("9900"), year).unwrap();
        assert_eq!(e.fee_breakdown().management, d("198"));

        let paid = e.collect_fees(year).unwrap();
        assert_eq!(paid, d("298"));
        assert_eq!(e.state().aum, d("9702"));
        assert!(e.fee_breakdown().is_empty());
        assert_eq!(e.collected_fees().entrance, d("100"));
    }

    #[test]
    fn collect_fees_fails_when_aum_too_small() {
        let mut e = funded(
            FeeRates {
                management_bps: 1_000,
                ..no_fees()
            },
            "alice",
            "1000",
        );
        let year = t0() + Duration::seconds(SECONDS_PER_YEAR as i64);
        e.update_aum(d("1000"), year).unwrap();
        e.update_aum(d("50"), year).unwrap();

        let err = e.collect_fees(year).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientAum { .. }));
        assert_eq!(e.fee_breakdown().management, d("100"));
    }

    #[test]
    fn update_aum_in_the_past_changes_nothing() {
        let mut e = funded(no_fees(), "alice", "1000");
        e.update_aum(d("1100"), t0() + Duration::days(1)).unwrap();
        let err = e.update_aum(d("2000"), t0()).unwrap_err();
        assert!(matches!(err, EngineError::Fee(FeeError::InvalidTimestamp { .. })));
        assert_eq!(e.state().aum, d("1100"));
    }

    #[test]
    fn update_config_accrues_under_old_schedule() {
        let mut e = funded(
            FeeRates {
                management_bps: 200,
                ..no_fees()
            },
            "alice",
            "1000",
        );
        let year = t0() + Duration::seconds(SECONDS_PER_YEAR as i64);
        let mut cfg = e.config().clone();
        cfg.fees.management_bps = 1_000;
        e.update_config(cfg, year).unwrap();

        assert_eq!(e.fee_breakdown().management, d("20"));
        assert_eq!(e.fee_manager().rates().management_bps, 1_000);
    }

    #[test]
    fn update_config_rejects_invalid() {
        let mut e = engine(no_fees());
        let mut cfg = e.config().clone();
        cfg.fees.exit_bps = 5_000;
        let err = e.update_config(cfg, t0()).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert_eq!(e.config().fees.exit_bps, 0);
    }

    #[test]
    fn auto_process_settles_on_submit() {
        let mut cfg = config(no_fees());
        cfg.auto_process = true;
        let mut e = AccountingEngine::new("fund-auto", cfg, t0()).unwrap();
        e.submit_deposit("alice", d("250"), Decimal::ZERO, t0()).unwrap();
        assert_eq!(e.balance_of("alice"), d("250"));
        assert_eq!(e.queue_status().unwrap().deposit_count, 0);
    }

    #[test]
    fn max_batch_size_caps_processing() {
        let mut cfg = config(no_fees());
        cfg.max_batch_size = 2;
        let mut e = AccountingEngine::new("fund-cap", cfg, t0()).unwrap();
        for _ in 0..5 {
            e.submit_deposit("alice", d("100"), Decimal::ZERO, t0()).unwrap();
        }
        assert_eq!(e.process_deposit_queue(100, t0()).unwrap().processed, 2);
        assert_eq!(e.queue_status().unwrap().deposit_count, 3);
    }

    #[test]
    fn reduce_entry_checks_ownership() {
        let mut e = engine(no_fees());
        let id = e.submit_deposit("alice", d("500"), Decimal::ZERO, t0()).unwrap();
        let err = e
            .reduce_entry(RequestKind::Deposit, "mallory", id, d("100"))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Authorization);
        assert_eq!(
            e.reduce_entry(RequestKind::Deposit, "alice", id, d("100")).unwrap(),
            d("400")
        );
    }

    #[test]
    fn snapshot_restore_round_trip() {
        let mut e = funded(no_fees(), "alice", "1000");
        e.submit_redemption("alice", d("10"), Decimal::ZERO, t0()).unwrap();
        let restored = AccountingEngine::restore(e.snapshot()).unwrap();
        assert_eq!(restored.state(), e.state());
        assert_eq!(restored.balance_of("alice"), d("1000"));
        assert_eq!(restored.queue_entries(RequestKind::Redemption).len(), 1);
    }

    #[test]
    fn restore_rejects_unreconciled_state() {
        let e = funded(no_fees(), "alice", "1000");
        let mut snap = e.snapshot();
        snap.state.total_shares = d("999");
        let err = AccountingEngine::restore(snap).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::InvariantViolation);

        let mut snap = e.snapshot();
        snap.version = SNAPSHOT_VERSION + 1;
        assert!(matches!(
            AccountingEngine::restore(snap),
            Err(EngineError::UnsupportedSnapshot { .. })
        ));
    }

    #[test]
    fn aum_history_is_bounded() {
        let mut e = engine(no_fees());
        for i in 0..(MAX_AUM_HISTORY + 10) {
            e.update_aum(Decimal::from_int(i as u64), t0()).unwrap();
        }
        let history = e.aum_history();
        assert_eq!(history.len(), MAX_AUM_HISTORY);
        assert_eq!(
            history.last().map(|p| p.aum),
            Some(Decimal::from_int((MAX_AUM_HISTORY + 9) as u64))
        );
    }
}
