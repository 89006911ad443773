//! # Fixed-Point Decimal
//!
//! Every monetary amount, share count and ratio in Vaultline is a
//! [`Decimal`]: an unsigned 128-bit integer holding `value * 10^18`. There
//! is no floating point anywhere in the accounting path.
//!
//! ## Rounding
//!
//! Multiplication and division round toward zero. Fees, share mints and
//! payouts computed with these operations can therefore only ever come out
//! smaller than the exact rational result, never larger: the fund keeps the
//! dust, users are never credited value that does not exist.
//!
//! Products are formed in a 256-bit intermediate before dividing, so
//! `aum * nav` style multiplications do not overflow long before the result
//! would.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::config::{BPS_DENOMINATOR, DECIMALS, SCALE};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Arithmetic failures. None of these are ever clamped away.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MathError {
    /// The result does not fit in 128 bits.
    #[error("arithmetic overflow")]
    Overflow,

    /// The result would be negative.
    #[error("arithmetic underflow: result would be negative")]
    Underflow,

    /// Divisor was zero.
    #[error("division by zero")]
    DivisionByZero,

    /// A string could not be parsed as a decimal.
    #[error("invalid decimal '{input}': {reason}")]
    Parse {
        /// The rejected input.
        input: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// Convenience alias for decimal arithmetic results.
pub type MathResult<T> = Result<T, MathError>;

// ---------------------------------------------------------------------------
// Decimal
// ---------------------------------------------------------------------------

/// Non-negative fixed-point number with 18 fractional digits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Decimal(u128);

impl Decimal {
    /// `0.0`
    pub const ZERO: Decimal = Decimal(0);

    /// `1.0`
    pub const ONE: Decimal = Decimal(SCALE);

    /// Largest representable value.
    pub const MAX: Decimal = Decimal(u128::MAX);

    /// Wraps a raw scaled integer (`raw = value * 10^18`).
    pub const fn from_raw(raw: u128) -> Self {
        Decimal(raw)
    }

    /// Returns the raw scaled integer.
    pub const fn raw(self) -> u128 {
        self.0
    }

    /// Converts a whole number. Cannot overflow: `u64::MAX * 10^18 < u128::MAX`.
    pub const fn from_int(value: u64) -> Self {
        Decimal(value as u128 * SCALE)
    }

    /// `numerator / denominator`, floored.
    pub fn from_ratio(numerator: u64, denominator: u64) -> MathResult<Self> {
        Decimal::from_int(numerator).mul_div(1, denominator as u128)
    }

    /// Returns `true` for `0.0`.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// The whole-number part.
    pub const fn trunc(self) -> u128 {
        self.0 / SCALE
    }

    /// Nearest `f64`. For metrics and display only, never for accounting.
    pub fn to_f64_lossy(self) -> f64 {
        let whole = (self.0 / SCALE) as f64;
        let frac = (self.0 % SCALE) as f64 / SCALE as f64;
        whole + frac
    }

    /// `self + rhs`.
    pub fn checked_add(self, rhs: Decimal) -> MathResult<Decimal> {
        self.0
            .checked_add(rhs.0)
            .map(Decimal)
            .ok_or(MathError::Overflow)
    }

    /// `self - rhs`, failing with [`MathError::Underflow`] instead of going negative.
    pub fn checked_sub(self, rhs: Decimal) -> MathResult<Decimal> {
        self.0
            .checked_sub(rhs.0)
            .map(Decimal)
            .ok_or(MathError::Underflow)
    }

    /// `self * rhs`, rounded toward zero.
    pub fn checked_mul(self, rhs: Decimal) -> MathResult<Decimal> {
        mul_div_floor(self.0, rhs.0, SCALE).map(Decimal)
    }

    /// `self / rhs`, rounded toward zero.
    pub fn checked_div(self, rhs: Decimal) -> MathResult<Decimal> {
        if rhs.0 == 0 {
            return Err(MathError::DivisionByZero);
        }
        mul_div_floor(self.0, SCALE, rhs.0).map(Decimal)
    }

    /// `self * numerator / denominator` with integer factors, rounded toward zero.
    pub fn mul_div(self, numerator: u128, denominator: u128) -> MathResult<Decimal> {
        mul_div_floor(self.0, numerator, denominator).map(Decimal)
    }

    /// `self * bps / 10_000`, rounded toward zero.
    pub fn apply_bps(self, bps: u32) -> MathResult<Decimal> {
        self.mul_div(bps as u128, BPS_DENOMINATOR)
    }

    /// Sums an iterator, failing on overflow.
    pub fn checked_sum<I>(values: I) -> MathResult<Decimal>
    where
        I: IntoIterator<Item = Decimal>,
    {
        values
            .into_iter()
            .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
    }
}

/// `floor(a * b / d)` with a 256-bit intermediate product.
///
/// Fails with `DivisionByZero` when `d == 0` and with `Overflow` when the
/// quotient does not fit in 128 bits.
fn mul_div_floor(a: u128, b: u128, d: u128) -> MathResult<u128> {
    if d == 0 {
        return Err(MathError::DivisionByZero);
    }

    let (hi, lo) = widening_mul(a, b);
    if hi == 0 {
        return Ok(lo / d);
    }
    if hi >= d {
        return Err(MathError::Overflow);
    }

    // Restoring long division of (hi:lo) by d. `rem < d` holds on entry to
    // every iteration, so the shifted remainder is below 2d.
    let mut rem = hi;
    let mut quo: u128 = 0;
    for i in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> i) & 1);
        quo <<= 1;
        if carry == 1 || rem >= d {
            rem = rem.wrapping_sub(d);
            quo |= 1;
        }
    }

    Ok(quo)
}

/// Full 128x128 -> 256-bit product as `(high, low)` halves.
fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    const MASK: u128 = u64::MAX as u128;

    let (a1, a0) = (a >> 64, a & MASK);
    let (b1, b0) = (b >> 64, b & MASK);

    let p00 = a0 * b0;
    let p01 = a0 * b1;
    let p10 = a1 * b0;
    let p11 = a1 * b1;

    let mid = (p00 >> 64) + (p01 & MASK) + (p10 & MASK);
    let lo = (p00 & MASK) | ((mid & MASK) << 64);
    let hi = p11 + (p01 >> 64) + (p10 >> 64) + (mid >> 64);

    (hi, lo)
}

// ---------------------------------------------------------------------------
// String conversion (display layer only)
// ---------------------------------------------------------------------------

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let int = self.0 / SCALE;
        let frac = self.0 % SCALE;
        if frac == 0 {
            return write!(f, "{}", int);
        }
        let digits = format!("{:0width$}", frac, width = DECIMALS as usize);
        write!(f, "{}.{}", int, digits.trim_end_matches('0'))
    }
}

impl FromStr for Decimal {
    type Err = MathError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let reject = |reason: &'static str| MathError::Parse {
            input: input.to_string(),
            reason,
        };

        let (int_part, frac_part) = match input.split_once('.') {
            Some((int, frac)) => (int, Some(frac)),
            None => (input, None),
        };

        if int_part.is_empty() {
            return Err(reject("missing integer digits"));
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(reject("integer part must be ascii digits"));
        }

        let int: u128 = int_part.parse().map_err(|_| reject("integer part too large"))?;
        let mut raw = int
            .checked_mul(SCALE)
            .ok_or_else(|| reject("value too large"))?;

        if let Some(frac) = frac_part {
            if frac.is_empty() {
                return Err(reject("missing fractional digits"));
            }
            if frac.len() > DECIMALS as usize {
                return Err(reject("more than 18 fractional digits"));
            }
            if !frac.bytes().all(|b| b.is_ascii_digit()) {
                return Err(reject("fractional part must be ascii digits"));
            }
            let digits: u128 = frac.parse().map_err(|_| reject("invalid fraction"))?;
            let padding = 10u128.pow(DECIMALS - frac.len() as u32);
            raw = raw
                .checked_add(digits * padding)
                .ok_or_else(|| reject("value too large"))?;
        }

        Ok(Decimal(raw))
    }
}

// ---------------------------------------------------------------------------
// Serde: strings for humans, raw integers for machines
// ---------------------------------------------------------------------------

impl Serialize for Decimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            serializer.serialize_u128(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Decimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(de::Error::custom)
        } else {
            u128::deserialize(deserializer).map(Decimal)
        }
    }
}
