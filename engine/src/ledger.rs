//! # Share Ledger
//!
//! Per-holder fund share balances plus the running total supply. The ledger
//! enforces two things and nothing else: a holder can never burn more than
//! they hold, and `total_shares` always equals the sum of all balances.
//!
//! Zero balances are pruned so that [`ShareLedger::holder_count`] counts
//! actual investors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vaultline_core::{Decimal, MathError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Attempted to burn more than the holder owns.
    #[error("insufficient shares: {holder} holds {balance}, tried to burn {requested}")]
    InsufficientShares {
        /// The holder being debited.
        holder: String,
        /// Their current balance.
        balance: Decimal,
        /// Shares the caller tried to burn.
        requested: Decimal,
    },

    /// The balance sum no longer matches total supply.
    #[error("supply mismatch: total_shares is {recorded}, balances sum to {summed}")]
    SupplyMismatch {
        /// The recorded total.
        recorded: Decimal,
        /// Sum of all balances.
        summed: Decimal,
    },

    /// Mint or burn overflowed.
    #[error("ledger arithmetic: {0}")]
    Math(#[from] MathError),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One holder's share balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Holder identifier.
    pub holder: String,
    /// Shares held.
    pub shares: Decimal,
}

/// Fund share balances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLedger {
    balances: BTreeMap<String, Decimal>,
    total_shares: Decimal,
}

impl ShareLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits `shares` to `holder`, returning the new balance.
    ///
    /// Both the holder balance and the total supply are checked before
    /// either is written.
    pub fn mint(&mut self, holder: &str, shares: Decimal) -> Result<Decimal, LedgerError> {
        let current = self.balance_of(holder);
        let new_balance = current.checked_add(shares)?;
        let new_total = self.total_shares.checked_add(shares)?;

        if !new_balance.is_zero() {
            self.balances.insert(holder.to_string(), new_balance);
        }
        self.total_shares = new_total;
        Ok(new_balance)
    }

    /// Debits `shares` from `holder`, returning the new balance.
    pub fn burn(&mut self, holder: &str, shares: Decimal) -> Result<Decimal, LedgerError> {
        let current = self.balance_of(holder);
        if current < shares {
            return Err(LedgerError::InsufficientShares {
                holder: holder.to_string(),
                balance: current,
                requested: shares,
            });
        }

        let new_balance = current.checked_sub(shares)?;
        let new_total = self.total_shares.checked_sub(shares)?;

        if new_balance.is_zero() {
            self.balances.remove(holder);
        } else {
            self.balances.insert(holder.to_string(), new_balance);
        }
        self.total_shares = new_total;
        Ok(new_balance)
    }

    /// Shares held by `holder`, or zero.
    pub fn balance_of(&self, holder: &str) -> Decimal {
        self.balances.get(holder).copied().unwrap_or_default()
    }

    /// Total shares outstanding.
    pub fn total_shares(&self) -> Decimal {
        self.total_shares
    }

    /// Number of holders with a non-zero balance.
    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    /// All non-zero positions, ordered by holder id.
    pub fn positions(&self) -> Vec<Position> {
        self.balances
            .iter()
            .map(|(holder, shares)| Position {
                holder: holder.clone(),
                shares: *shares,
            })
            .collect()
    }

    /// Checks that the balances sum to `total_shares`.
    pub fn verify(&self) -> Result<(), LedgerError> {
        let summed = Decimal::checked_sum(self.balances.values().copied())?;
        if summed != self.total_shares {
            return Err(LedgerError::SupplyMismatch {
                recorded: self.total_shares,
                summed,
            });
        }
        Ok(())
    }
}
