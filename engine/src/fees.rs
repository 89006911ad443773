//! # Fee Manager
//!
//! Owns the accrued-fee buckets and the high-water mark.
//!
//! ## Accrual model
//!
//! - **Management** accrues per elapsed second on the AUM that was under
//!   management during the window: `aum * bps / 10_000 * secs / year`.
//! - **Performance** accrues only on NAV gains above the high-water mark:
//!   `(nav - hwm) * total_shares * bps / 10_000`. The HWM then moves up to
//!   the new NAV, so the same gain is never charged twice.
//! - **Entrance / exit** are flat bps of the deposit amount and of the gross
//!   redemption payout. They are quoted here and recorded by the engine at
//!   settlement time.
//!
//! Accrued fees stay in their buckets until the engine collects them.
//!
//! ## Fee basis
//!
//! The NAV handed to [`FeeManager::quote_accrual`] is not the reported NAV.
//! The engine values the fund net of every uncollected fee, then adds back
//! [`FeeManager::holder_accrual`]: the management and performance fees
//! charged to the shares still outstanding. Exit fees and accruals left
//! behind by redeemed shares therefore never count as a gain. The holder
//! accrual is rescaled with the share supply at every settlement and
//! cleared when fees are collected, so the basis moves only with valuations
//! and collections.
//!
//! ## Drawdown
//!
//! While NAV sits below the HWM the fund is in drawdown: no performance fee,
//! and the lowest NAV seen is tracked. Drawdown ends when NAV climbs back to
//! the HWM, or when it has lasted longer than the fund's recovery window. In
//! the latter case the HWM is reset down to the current NAV. That reset is
//! the only way the HWM ever decreases.
//!
//! ## Idempotency
//!
//! [`FeeManager::quote_accrual`] is pure. [`FeeManager::commit_accrual`]
//! applies a quote and advances `last_accrual` by the whole seconds that
//! were charged, so calling twice with the same `now` is a no-op and
//! sub-second remainders are carried to the next call instead of lost.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vaultline_core::config::{BPS_DENOMINATOR, SECONDS_PER_YEAR};
use vaultline_core::{Decimal, FeeRates, MathError, MathResult};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during fee accrual.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeeError {
    /// `now` is earlier than the last accrual.
    #[error("invalid timestamp: {now} is before last fee accrual at {last}")]
    InvalidTimestamp {
        /// Timestamp of the previous accrual.
        last: DateTime<Utc>,
        /// The rejected timestamp.
        now: DateTime<Utc>,
    },

    /// Fee arithmetic failed.
    #[error("fee arithmetic: {0}")]
    Math(#[from] MathError),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The four fee types a fund charges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeeKind {
    /// Time-based charge on AUM.
    Management,
    /// Charge on gains above the high-water mark.
    Performance,
    /// Flat charge on deposits.
    Entrance,
    /// Flat charge on redemptions.
    Exit,
}

impl FeeKind {
    /// Every fee kind, in reporting order.
    pub const ALL: [FeeKind; 4] = [
        FeeKind::Management,
        FeeKind::Performance,
        FeeKind::Entrance,
        FeeKind::Exit,
    ];

    /// Whether an accrued fee of this kind is still counted inside AUM.
    ///
    /// Management, performance and exit fees accrue against assets the fund
    /// holds. Entrance fees are split off the deposit before it reaches AUM.
    pub fn carried_in_aum(self) -> bool {
        match self {
            FeeKind::Management | FeeKind::Performance | FeeKind::Exit => true,
            FeeKind::Entrance => false,
        }
    }
}

impl fmt::Display for FeeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeeKind::Management => write!(f, "management"),
            FeeKind::Performance => write!(f, "performance"),
            FeeKind::Entrance => write!(f, "entrance"),
            FeeKind::Exit => write!(f, "exit"),
        }
    }
}

/// Per-kind fee amounts. Used for both outstanding accruals and lifetime
/// collection totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeAccrualRecord {
    pub management: Decimal,
    pub performance: Decimal,
    pub entrance: Decimal,
    pub exit: Decimal,
}

impl FeeAccrualRecord {
    /// Amount recorded for `kind`.
    pub fn get(&self, kind: FeeKind) -> Decimal {
        match kind {
            FeeKind::Management => self.management,
            FeeKind::Performance => self.performance,
            FeeKind::Entrance => self.entrance,
            FeeKind::Exit => self.exit,
        }
    }

    fn slot_mut(&mut self, kind: FeeKind) -> &mut Decimal {
        match kind {
            FeeKind::Management => &mut self.management,
            FeeKind::Performance => &mut self.performance,
            FeeKind::Entrance => &mut self.entrance,
            FeeKind::Exit => &mut self.exit,
        }
    }

    /// Returns a copy with `amount` added to `kind`.
    pub fn with_added(&self, kind: FeeKind, amount: Decimal) -> MathResult<Self> {
        let mut next = *self;
        let slot = next.slot_mut(kind);
        *slot = slot.checked_add(amount)?;
        Ok(next)
    }

    /// Sum over all kinds.
    pub fn total(&self) -> MathResult<Decimal> {
        Decimal::checked_sum(FeeKind::ALL.iter().map(|k| self.get(*k)))
    }

    /// Sum over the kinds still counted inside AUM.
    pub fn carried_in_aum(&self) -> MathResult<Decimal> {
        Decimal::checked_sum(
            FeeKind::ALL
                .iter()
                .filter(|k| k.carried_in_aum())
                .map(|k| self.get(*k)),
        )
    }

    /// `true` if every bucket is empty.
    pub fn is_empty(&self) -> bool {
        FeeKind::ALL.iter().all(|k| self.get(*k).is_zero())
    }
}

/// High-water mark and drawdown tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HwmState {
    /// Highest NAV at which performance fees have been fully accounted.
    pub hwm: Decimal,
    /// Lowest NAV seen since the current drawdown began. Equal to the last
    /// NAV when not in drawdown.
    pub lowest_nav_since_drawdown: Decimal,
    /// NAV is below the HWM.
    pub in_drawdown: bool,
    /// When the current drawdown began.
    pub drawdown_started_at: Option<DateTime<Utc>>,
    /// When the HWM was last reset by the recovery window.
    pub last_reset_at: Option<DateTime<Utc>>,
    /// NAV observed by the last accrual.
    pub last_nav: Decimal,
}

impl HwmState {
    fn new(initial_nav: Decimal) -> Self {
        Self {
            hwm: initial_nav,
            lowest_nav_since_drawdown: initial_nav,
            in_drawdown: false,
            drawdown_started_at: None,
            last_reset_at: None,
            last_nav: initial_nav,
        }
    }
}

/// HWM transition caused by an accrual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HwmEvent {
    /// NAV set a new high; performance fee charged on the gain.
    NewHigh { previous: Decimal, current: Decimal },
    /// NAV fell below the HWM.
    EnteredDrawdown { hwm: Decimal, nav: Decimal },
    /// NAV returned to the HWM.
    Recovered { hwm: Decimal },
    /// The recovery window expired and the HWM was reset to NAV.
    RecoveryReset { previous_hwm: Decimal, new_hwm: Decimal },
}

/// What an accrual charged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccrualOutcome {
    /// Whole seconds charged for.
    pub elapsed_secs: u64,
    /// Management fee added.
    pub management_fee: Decimal,
    /// Performance fee added.
    pub performance_fee: Decimal,
    /// HWM transition, if any.
    pub hwm_event: Option<HwmEvent>,
}

/// A fully computed accrual that has not been applied yet.
#[derive(Debug, Clone)]
pub struct AccrualPlan {
    next_accrual: DateTime<Utc>,
    accrued: FeeAccrualRecord,
    hwm: HwmState,
    holder_accrual: Decimal,
    outcome: AccrualOutcome,
}

impl AccrualPlan {
    /// What the plan will charge.
    pub fn outcome(&self) -> &AccrualOutcome {
        &self.outcome
    }
}

// ---------------------------------------------------------------------------
// FeeManager
// ---------------------------------------------------------------------------

/// Fee schedule, accrued buckets and HWM state for one fund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeManager {
    rates: FeeRates,
    recovery_window_secs: u64,
    accrued: FeeAccrualRecord,
    collected: FeeAccrualRecord,
    hwm: HwmState,
    /// Uncollected management and performance fees charged to the shares
    /// currently outstanding.
    holder_accrual: Decimal,
    last_accrual: DateTime<Utc>,
}

impl FeeManager {
    /// Creates a fee manager with empty buckets and the HWM at `initial_nav`.
    pub fn new(
        rates: FeeRates,
        recovery_window_secs: u64,
        initial_nav: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            rates,
            recovery_window_secs,
            accrued: FeeAccrualRecord::default(),
            collected: FeeAccrualRecord::default(),
            hwm: HwmState::new(initial_nav),
            holder_accrual: Decimal::ZERO,
            last_accrual: now,
        }
    }

    pub fn rates(&self) -> FeeRates {
        self.rates
    }

    pub fn recovery_window_secs(&self) -> u64 {
        self.recovery_window_secs
    }

    /// Outstanding, not yet collected fees.
    pub fn accrued(&self) -> &FeeAccrualRecord {
        &self.accrued
    }

    /// Lifetime collected fees.
    pub fn collected(&self) -> &FeeAccrualRecord {
        &self.collected
    }

    pub fn hwm_state(&self) -> &HwmState {
        &self.hwm
    }

    pub fn last_accrual(&self) -> DateTime<Utc> {
        self.last_accrual
    }

    /// Uncollected management and performance fees charged to the shares
    /// currently outstanding.
    pub fn holder_accrual(&self) -> Decimal {
        self.holder_accrual
    }

    /// The holder accrual after the supply moves from `old_shares` to
    /// `new_shares`. Keeps the per-share amount constant, flooring.
    pub fn holder_accrual_for(&self, old_shares: Decimal, new_shares: Decimal) -> MathResult<Decimal> {
        if old_shares.is_zero() {
            return Ok(Decimal::ZERO);
        }
        self.holder_accrual
            .mul_div(new_shares.raw(), old_shares.raw())
    }

    /// Replaces the holder accrual with one computed by
    /// [`holder_accrual_for`](Self::holder_accrual_for).
    pub(crate) fn set_holder_accrual(&mut self, holder_accrual: Decimal) {
        self.holder_accrual = holder_accrual;
    }

    /// In drawdown, but NAV has already bounced off its low.
    pub fn in_recovery(&self) -> bool {
        self.hwm.in_drawdown && self.hwm.last_nav > self.hwm.lowest_nav_since_drawdown
    }

    /// Replaces the fee schedule. Callers accrue under the old schedule first.
    pub fn set_schedule(&mut self, rates: FeeRates, recovery_window_secs: u64) {
        self.rates = rates;
        self.recovery_window_secs = recovery_window_secs;
    }

    // -- Quotes -------------------------------------------------------------

    /// Entrance fee on a deposit of `amount`.
    pub fn entrance_fee(&self, amount: Decimal) -> MathResult<Decimal> {
        amount.apply_bps(self.rates.entrance_bps)
    }

    /// Exit fee on a gross redemption payout.
    pub fn exit_fee(&self, gross_payout: Decimal) -> MathResult<Decimal> {
        gross_payout.apply_bps(self.rates.exit_bps)
    }

    /// Management fee on `aum` for `elapsed_secs`, in one floor division.
    pub fn management_fee(&self, aum: Decimal, elapsed_secs: u64) -> MathResult<Decimal> {
        let numerator = self.rates.management_bps as u128 * elapsed_secs as u128;
        let denominator = BPS_DENOMINATOR * SECONDS_PER_YEAR as u128;
        aum.mul_div(numerator, denominator)
    }

    /// Performance fee for moving from the current HWM to `nav`.
    pub fn performance_fee(&self, nav: Decimal, total_shares: Decimal) -> MathResult<Decimal> {
        if total_shares.is_zero() || nav <= self.hwm.hwm {
            return Ok(Decimal::ZERO);
        }
        nav.checked_sub(self.hwm.hwm)?
            .checked_mul(total_shares)?
            .apply_bps(self.rates.performance_bps)
    }

    // -- Accrual ------------------------------------------------------------

    /// Computes the accrual for the window ending at `now` without touching
    /// any state.
    ///
    /// `aum` is the AUM managed during the window, net of fees already
    /// owed; `nav` is the fee-basis NAV and `total_shares` the supply at
    /// `now`. With no shares outstanding only the
    /// management fee is computed and the HWM is left alone.
    pub fn quote_accrual(
        &self,
        aum: Decimal,
        nav: Decimal,
        total_shares: Decimal,
        now: DateTime<Utc>,
    ) -> Result<AccrualPlan, FeeError> {
        if now < self.last_accrual {
            return Err(FeeError::InvalidTimestamp {
                last: self.last_accrual,
                now,
            });
        }

        let elapsed = (now - self.last_accrual).num_seconds();
        let elapsed_secs = elapsed as u64;
        let next_accrual = self.last_accrual + Duration::seconds(elapsed);

        let management_fee = self.management_fee(aum, elapsed_secs)?;
        let mut performance_fee = Decimal::ZERO;
        let mut hwm = self.hwm.clone();
        let mut hwm_event = None;

        if !total_shares.is_zero() {
            hwm.last_nav = nav;

            if nav >= hwm.hwm {
                if hwm.in_drawdown {
                    hwm.in_drawdown = false;
                    hwm.drawdown_started_at = None;
                    hwm_event = Some(HwmEvent::Recovered { hwm: hwm.hwm });
                }
                if nav > hwm.hwm {
                    performance_fee = self.performance_fee(nav, total_shares)?;
                    hwm_event = Some(HwmEvent::NewHigh {
                        previous: hwm.hwm,
                        current: nav,
                    });
                    hwm.hwm = nav;
                }
                hwm.lowest_nav_since_drawdown = nav;
            } else {
                let started = match (hwm.in_drawdown, hwm.drawdown_started_at) {
                    (true, Some(started)) => {
                        hwm.lowest_nav_since_drawdown = hwm.lowest_nav_since_drawdown.min(nav);
                        started
                    }
                    _ => {
                        hwm.in_drawdown = true;
                        hwm.drawdown_started_at = Some(now);
                        hwm.lowest_nav_since_drawdown = nav;
                        hwm_event = Some(HwmEvent::EnteredDrawdown { hwm: hwm.hwm, nav });
                        now
                    }
                };

                let window = i64::try_from(self.recovery_window_secs).unwrap_or(i64::MAX);
                if (now - started).num_seconds() >= window {
                    hwm_event = Some(HwmEvent::RecoveryReset {
                        previous_hwm: hwm.hwm,
                        new_hwm: nav,
                    });
                    hwm.hwm = nav;
                    hwm.in_drawdown = false;
                    hwm.drawdown_started_at = None;
                    hwm.lowest_nav_since_drawdown = nav;
                    hwm.last_reset_at = Some(now);
                }
            }
        }

        let accrued = self
            .accrued
            .with_added(FeeKind::Management, management_fee)?
            .with_added(FeeKind::Performance, performance_fee)?;
        let holder_accrual = self
            .holder_accrual
            .checked_add(management_fee)?
            .checked_add(performance_fee)?;

        Ok(AccrualPlan {
            next_accrual,
            accrued,
            hwm,
            holder_accrual,
            outcome: AccrualOutcome {
                elapsed_secs,
                management_fee,
                performance_fee,
                hwm_event,
            },
        })
    }

    /// Applies a plan produced by [`quote_accrual`](Self::quote_accrual).
    pub fn commit_accrual(&mut self, plan: AccrualPlan) -> AccrualOutcome {
        self.accrued = plan.accrued;
        self.hwm = plan.hwm;
        self.holder_accrual = plan.holder_accrual;
        self.last_accrual = plan.next_accrual;
        plan.outcome
    }

    /// Quote and commit in one step.
    pub fn accrue(
        &mut self,
        aum: Decimal,
        nav: Decimal,
        total_shares: Decimal,
        now: DateTime<Utc>,
    ) -> Result<AccrualOutcome, FeeError> {
        let plan = self.quote_accrual(aum, nav, total_shares, now)?;
        Ok(self.commit_accrual(plan))
    }

    // -- Buckets ------------------------------------------------------------

    /// Adds `amount` to the `kind` bucket.
    pub fn record(&mut self, kind: FeeKind, amount: Decimal) -> MathResult<()> {
        self.accrued = self.accrued.with_added(kind, amount)?;
        Ok(())
    }

    /// Replaces the outstanding buckets wholesale. Used by the engine to
    /// commit a batch whose fee totals were computed up front.
    pub(crate) fn set_accrued(&mut self, accrued: FeeAccrualRecord) {
        self.accrued = accrued;
    }

    /// Empties every bucket, moving the amounts into lifetime totals.
    /// Returns what was taken.
    pub fn take_all(&mut self) -> MathResult<FeeAccrualRecord> {
        let taken = self.accrued;
        let mut collected = self.collected;
        for kind in FeeKind::ALL {
            collected = collected.with_added(kind, taken.get(kind))?;
        }
        self.collected = collected;
        self.accrued = FeeAccrualRecord::default();
        self.holder_accrual = Decimal::ZERO;
        Ok(taken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn rates(management_bps: u32, performance_bps: u32) -> FeeRates {
        FeeRates {
            management_bps,
            performance_bps,
            entrance_bps: 100,
            exit_bps: 50,
        }
    }

    fn manager(management_bps: u32, performance_bps: u32) -> FeeManager {
        FeeManager::new(rates(management_bps, performance_bps), 86_400 * 30, Decimal::ONE, t0())
    }

    #[test]
    fn management_fee_for_full_year() {
        let mut fees = manager(200, 0);
        let year_later = t0() + Duration::seconds(SECONDS_PER_YEAR as i64);
        let outcome = fees.accrue(d("1000000"), d("1"), d("1000000"), year_later).unwrap();
        assert_eq!(outcome.management_fee, d("20000"));
        assert_eq!(fees.accrued().management, d("20000"));
        assert_eq!(fees.last_accrual(), year_later);
    }

    #[test]
    fn management_fee_accrues_without_shares() {
        let mut fees = manager(200, 2_000);
        let later = t0() + Duration::seconds(SECONDS_PER_YEAR as i64);
        let outcome = fees.accrue(d("500"), d("3"), Decimal::ZERO, later).unwrap();
        assert_eq!(outcome.management_fee, d("10"));
        assert_eq!(outcome.performance_fee, Decimal::ZERO);
        assert_eq!(fees.hwm_state().hwm, Decimal::ONE);
    }

    #[test]
    fn performance_fee_above_hwm() {
        let mut fees = manager(0, 2_000);
        let outcome = fees.accrue(d("1200"), d("1.2"), d("1000"), t0()).unwrap();
        assert_eq!(outcome.performance_fee, d("40"));
        assert_eq!(fees.hwm_state().hwm, d("1.2"));
        assert!(matches!(outcome.hwm_event, Some(HwmEvent::NewHigh { .. })));
    }

    #[test]
    fn same_timestamp_twice_is_idempotent() {
        let mut fees = manager(200, 2_000);
        let later = t0() + Duration::days(10);
        fees.accrue(d("1200"), d("1.2"), d("1000"), later).unwrap();
        let before = *fees.accrued();

        let outcome = fees.accrue(d("1200"), d("1.2"), d("1000"), later).unwrap();
        assert_eq!(outcome.elapsed_secs, 0);
        assert_eq!(*fees.accrued(), before);
    }

    #[test]
    fn past_timestamp_rejected_without_changes() {
        let mut fees = manager(200, 2_000);
        let later = t0() + Duration::days(1);
        fees.accrue(d("1000"), d("1"), d("1000"), later).unwrap();
        let snapshot = fees.clone();

        let err = fees
            .accrue(d("1000"), d("1.5"), d("1000"), later - Duration::seconds(1))
            .unwrap_err();
        assert!(matches!(err, FeeError::InvalidTimestamp { .. }));
        assert_eq!(fees, snapshot);
    }

    #[test]
    fn sub_second_remainder_carries_forward() {
        let mut fees = manager(200, 0);
        let t1 = t0() + Duration::milliseconds(1_500);
        let outcome = fees.accrue(d("1000"), d("1"), d("1000"), t1).unwrap();
        assert_eq!(outcome.elapsed_secs, 1);
        assert_eq!(fees.last_accrual(), t0() + Duration::seconds(1));

        let t2 = t0() + Duration::milliseconds(2_000);
        let outcome = fees.accrue(d("1000"), d("1"), d("1000"), t2).unwrap();
        assert_eq!(outcome.elapsed_secs, 1);
    }

    #[test]
    fn drawdown_suspends_performance_fee() {
        let mut fees = manager(0, 2_000);
        fees.accrue(d("1200"), d("1.2"), d("1000"), t0()).unwrap();

        let t1 = t0() + Duration::days(1);
        let outcome = fees.accrue(d("900"), d("0.9"), d("1000"), t1).unwrap();
        assert!(matches!(outcome.hwm_event, Some(HwmEvent::EnteredDrawdown { .. })));
        assert!(fees.hwm_state().in_drawdown);
        assert_eq!(fees.hwm_state().lowest_nav_since_drawdown, d("0.9"));

        // Bounce to 1.1: still below 1.2, so no fee, but recovering.
        let t2 = t0() + Duration::days(2);
        let outcome = fees.accrue(d("1100"), d("1.1"), d("1000"), t2).unwrap();
        assert_eq!(outcome.performance_fee, Decimal::ZERO);
        assert!(fees.in_recovery());
        assert_eq!(fees.hwm_state().hwm, d("1.2"));
    }

    #[test]
    fn recovery_to_hwm_ends_drawdown() {
        let mut fees = manager(0, 2_000);
        fees.accrue(d("1200"), d("1.2"), d("1000"), t0()).unwrap();
        fees.accrue(d("800"), d("0.8"), d("1000"), t0() + Duration::days(1))
            .unwrap();

        let outcome = fees
            .accrue(d("1300"), d("1.3"), d("1000"), t0() + Duration::days(2))
            .unwrap();
        // Only the 0.1 above the old HWM is charged: 0.1 * 1000 * 20% = 20.
        assert_eq!(outcome.performance_fee, d("20"));
        assert!(!fees.hwm_state().in_drawdown);
        assert_eq!(fees.hwm_state().hwm, d("1.3"));
    }

    #[test]
    fn recovery_window_resets_hwm() {
        let mut fees = manager(0, 2_000);
        fees.accrue(d("1200"), d("1.2"), d("1000"), t0()).unwrap();
        fees.accrue(d("900"), d("0.9"), d("1000"), t0() + Duration::days(1))
            .unwrap();

        // 30-day window measured from drawdown entry on day 1.
        let outcome = fees
            .accrue(d("950"), d("0.95"), d("1000"), t0() + Duration::days(31))
            .unwrap();
        assert_eq!(
            outcome.hwm_event,
            Some(HwmEvent::RecoveryReset {
                previous_hwm: d("1.2"),
                new_hwm: d("0.95"),
            })
        );
        assert_eq!(fees.hwm_state().hwm, d("0.95"));
        assert!(!fees.hwm_state().in_drawdown);
        assert!(fees.hwm_state().last_reset_at.is_some());
    }

    #[test]
    fn entrance_and_exit_quotes() {
        let fees = manager(0, 0);
        assert_eq!(fees.entrance_fee(d("10000")).unwrap(), d("100"));
        assert_eq!(fees.exit_fee(d("300")).unwrap(), d("1.5"));
    }

    #[test]
    fn take_all_moves_buckets_to_lifetime() {
        let mut fees = manager(0, 0);
        fees.record(FeeKind::Entrance, d("100")).unwrap();
        fees.record(FeeKind::Exit, d("1.5")).unwrap();
        assert_eq!(fees.accrued().carried_in_aum().unwrap(), d("1.5"));

        let taken = fees.take_all().unwrap();
        assert_eq!(taken.total().unwrap(), d("101.5"));
        assert!(fees.accrued().is_empty());
        assert_eq!(fees.collected().entrance, d("100"));

        fees.record(FeeKind::Entrance, d("1")).unwrap();
        fees.take_all().unwrap();
        assert_eq!(fees.collected().entrance, d("101"));
    }

    #[test]
    fn holder_accrual_follows_share_supply() {
        let mut fees = manager(0, 2_000);
        fees.accrue(d("1200"), d("1.2"), d("1000"), t0()).unwrap();
        assert_eq!(fees.holder_accrual(), d("40"));
        assert_eq!(fees.holder_accrual_for(d("1000"), d("250")).unwrap(), d("10"));
        assert_eq!(fees.holder_accrual_for(d("1000"), d("3000")).unwrap(), d("120"));
        assert!(fees.holder_accrual_for(d("1000"), Decimal::ZERO).unwrap().is_zero());
        assert!(fees.holder_accrual_for(Decimal::ZERO, d("10")).unwrap().is_zero());

        // Exit fees belong to no holder.
        fees.record(FeeKind::Exit, d("5")).unwrap();
        assert_eq!(fees.holder_accrual(), d("40"));

        fees.take_all().unwrap();
        assert!(fees.holder_accrual().is_zero());
    }
}
