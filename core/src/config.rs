//! # Fund Configuration & Constants
//!
//! Every magic number in Vaultline lives here, next to the [`FundConfig`]
//! that the governance layer hands us. Fee caps and batch limits are checked
//! by [`FundConfig::validate`] before any engine ever sees a config, so the
//! accounting code can treat a `FundConfig` as already sane.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decimal::Decimal;

// ---------------------------------------------------------------------------
// Fixed-Point Parameters
// ---------------------------------------------------------------------------

/// Number of fractional digits carried by [`Decimal`].
pub const DECIMALS: u32 = 18;

/// Raw integer representing `1.0`. Every decimal is `raw / SCALE`.
pub const SCALE: u128 = 1_000_000_000_000_000_000;

/// 10_000 basis points = 100%.
pub const BPS_DENOMINATOR: u128 = 10_000;

/// 365 days. Management fees are quoted per year and accrue per second.
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

// ---------------------------------------------------------------------------
// Fee Caps
// ---------------------------------------------------------------------------

/// 10% per year. Anything above this is a typo or a scam.
pub const MAX_MANAGEMENT_FEE_BPS: u32 = 1_000;

/// 50% of profits above the high-water mark.
pub const MAX_PERFORMANCE_FEE_BPS: u32 = 5_000;

/// 10% of the deposited amount.
pub const MAX_ENTRANCE_FEE_BPS: u32 = 1_000;

/// 10% of the redemption payout.
pub const MAX_EXIT_FEE_BPS: u32 = 1_000;

// ---------------------------------------------------------------------------
// Engine Limits
// ---------------------------------------------------------------------------

/// Hard cap on entries settled by a single batch call when the fund config
/// does not override it.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 256;

/// Entries settled right after a submission when auto-processing is on.
pub const DEFAULT_AUTO_PROCESS_BATCH: usize = 16;

/// AUM history points retained for display. Oldest points are dropped first.
pub const MAX_AUM_HISTORY: usize = 1_024;

/// Version tag written into every engine snapshot. Bump on any change to the
/// serialized layout and teach the loader how to migrate.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Engine version string reported by the node binary.
pub const ENGINE_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A fund configuration was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A fee rate exceeds its protocol cap.
    #[error("{fee} fee of {bps} bps exceeds the cap of {max} bps")]
    FeeTooHigh {
        /// Which fee was out of range.
        fee: &'static str,
        /// Requested rate.
        bps: u32,
        /// Maximum allowed rate.
        max: u32,
    },

    /// The drawdown recovery window must be an explicit, positive duration.
    #[error("recovery window must be greater than zero seconds")]
    InvalidRecoveryWindow,

    /// Initial NAV must be strictly positive or the first deposit divides by zero.
    #[error("initial nav must be greater than zero")]
    InvalidInitialNav,

    /// The base asset identifier is blank.
    #[error("base asset identifier must not be empty")]
    EmptyBaseAsset,

    /// A batch size field is zero.
    #[error("{field} must be greater than zero")]
    InvalidBatchSize {
        /// Name of the offending field.
        field: &'static str,
    },

    /// The config document could not be parsed.
    #[error("malformed fund config: {0}")]
    Parse(String),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The four fee rates of a fund, all in basis points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRates {
    /// Annual management fee charged on AUM.
    pub management_bps: u32,
    /// Share of profits above the high-water mark.
    pub performance_bps: u32,
    /// Flat fee taken from each deposit before share conversion.
    pub entrance_bps: u32,
    /// Flat fee taken from each redemption payout.
    pub exit_bps: u32,
}

/// Static configuration of a single fund.
///
/// Created at initialization and replaced only through the governed change
/// path (`AccountingEngine::update_config`). The recovery window has no
/// default on purpose: every fund must state it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundConfig {
    /// Human-readable fund name.
    pub name: String,
    /// Identifier of the asset deposits and payouts are denominated in.
    pub base_asset: String,
    /// Fee schedule.
    pub fees: FeeRates,
    /// Smallest deposit accepted into the queue.
    pub min_investment: Decimal,
    /// NAV used while the fund has no shares outstanding.
    #[serde(default = "default_initial_nav")]
    pub initial_nav: Decimal,
    /// Seconds a drawdown may last before the high-water mark is reset to
    /// the current NAV.
    pub recovery_window_secs: u64,
    /// Whether the fund starts paused.
    #[serde(default)]
    pub paused: bool,
    /// Settle queued requests immediately after each submission.
    #[serde(default)]
    pub auto_process: bool,
    /// Batch size used by auto-processing.
    #[serde(default = "default_auto_process_batch")]
    pub auto_process_batch: usize,
    /// Upper bound on `max_to_process` for any single batch call.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_initial_nav() -> Decimal {
    Decimal::ONE
}

fn default_auto_process_batch() -> usize {
    DEFAULT_AUTO_PROCESS_BATCH
}

fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

impl FundConfig {
    /// Builds a config with the required fields and defaults for the rest:
    /// initial NAV of 1.0, unpaused, manual processing.
    pub fn new(
        name: impl Into<String>,
        base_asset: impl Into<String>,
        fees: FeeRates,
        min_investment: Decimal,
        recovery_window_secs: u64,
    ) -> Self {
        Self {
            name: name.into(),
            base_asset: base_asset.into(),
            fees,
            min_investment,
            initial_nav: Decimal::ONE,
            recovery_window_secs,
            paused: false,
            auto_process: false,
            auto_process_batch: DEFAULT_AUTO_PROCESS_BATCH,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }

    /// Parses a JSON fund config and validates it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: FundConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks fee caps, the recovery window, initial NAV, base asset and
    /// batch sizes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let caps = [
            ("management", self.fees.management_bps, MAX_MANAGEMENT_FEE_BPS),
            ("performance", self.fees.performance_bps, MAX_PERFORMANCE_FEE_BPS),
            ("entrance", self.fees.entrance_bps, MAX_ENTRANCE_FEE_BPS),
            ("exit", self.fees.exit_bps, MAX_EXIT_FEE_BPS),
        ];
        for (fee, bps, max) in caps {
            if bps > max {
                return Err(ConfigError::FeeTooHigh { fee, bps, max });
            }
        }

        if self.recovery_window_secs == 0 {
            return Err(ConfigError::InvalidRecoveryWindow);
        }
        if self.initial_nav.is_zero() {
            return Err(ConfigError::InvalidInitialNav);
        }
        if self.base_asset.trim().is_empty() {
            return Err(ConfigError::EmptyBaseAsset);
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize {
                field: "max_batch_size",
            });
        }
        if self.auto_process_batch == 0 {
            return Err(ConfigError::InvalidBatchSize {
                field: "auto_process_batch",
            });
        }

        Ok(())
    }
}
