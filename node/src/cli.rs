//! # CLI Interface
//!
//! Defines the command-line argument structure for `vaultline-node` using
//! `clap` derive. Supports four subcommands: `init`, `exec`, `status`, and
//! `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Vaultline fund operator.
///
/// Creates funds from a JSON config, replays operation scripts against a
/// persisted fund, and reports fund status and Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "vaultline-node",
    about = "Vaultline fund accounting operator",
    version,
    propagate_version = true
)]
pub struct VaultlineCli {
    /// Log output format: `pretty` or `json`.
    #[arg(
        long,
        global = true,
        env = "VAULTLINE_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Pretty
    )]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a fund from a JSON config and persist its first snapshot.
    Init(InitArgs),
    /// Apply a JSON operation script to a persisted fund.
    Exec(ExecArgs),
    /// Print the status of a persisted fund.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Directory holding the snapshot database. Created if missing.
    #[arg(long, short = 'd', env = "VAULTLINE_DATA_DIR", default_value = "./vaultline-data")]
    pub data_dir: PathBuf,

    /// Path to the fund config (JSON).
    #[arg(long, short = 'c', env = "VAULTLINE_FUND_CONFIG")]
    pub config: PathBuf,

    /// Fund id. A random UUID is used when omitted.
    #[arg(long)]
    pub fund_id: Option<String>,
}

/// Arguments for the `exec` subcommand.
#[derive(Parser, Debug)]
pub struct ExecArgs {
    /// Directory holding the snapshot database.
    #[arg(long, short = 'd', env = "VAULTLINE_DATA_DIR", default_value = "./vaultline-data")]
    pub data_dir: PathBuf,

    /// Fund to operate on. Defaults to the most recently written fund.
    #[arg(long, env = "VAULTLINE_FUND_ID")]
    pub fund_id: Option<String>,

    /// Path to the operation script (JSON array).
    #[arg(long, short = 's')]
    pub script: PathBuf,

    /// Log failed steps and continue instead of discarding the whole script.
    #[arg(long)]
    pub keep_going: bool,

    /// Print Prometheus metrics after the script completes.
    #[arg(long)]
    pub metrics: bool,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Directory holding the snapshot database.
    #[arg(long, short = 'd', env = "VAULTLINE_DATA_DIR", default_value = "./vaultline-data")]
    pub data_dir: PathBuf,

    /// Fund to report on. Defaults to the most recently written fund.
    #[arg(long, env = "VAULTLINE_FUND_ID")]
    pub fund_id: Option<String>,

    /// Print Prometheus metrics instead of the JSON status report.
    #[arg(long)]
    pub metrics: bool,
}
