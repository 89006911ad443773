// Copyright (c) 2026 Vaultline Contributors. MIT License.
// See LICENSE for details.

//! # Vaultline Core
//!
//! The leaf layer of the Vaultline fund accounting stack:
//!
//! - **decimal** — 18-digit fixed-point arithmetic that always rounds toward
//!   the fund. No floats, ever.
//! - **config** — protocol constants and the per-fund [`FundConfig`].
//! - **storage** — versioned snapshot envelopes and the sled-backed store
//!   that keeps them.
//!
//! Nothing here knows about queues, fees or shares. That lives in
//! `vaultline-engine`.

pub mod config;
pub mod decimal;
pub mod storage;

pub use config::{ConfigError, FeeRates, FundConfig};
pub use decimal::{Decimal, MathError, MathResult};
