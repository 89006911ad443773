//! # Structured Logging
//!
//! `tracing` subscriber setup for the operator binary. Every command writes
//! its logs to stderr, leaving stdout to the JSON reports and Prometheus
//! text the commands print.
//!
//! Without `RUST_LOG` only the three Vaultline crates log, at a level
//! chosen per command: `init` and `exec` narrate each step at `info`,
//! `status` stays at `warn` so its report is the only thing on screen.

use clap::ValueEnum;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Crates whose events pass the default filter.
const VAULTLINE_TARGETS: [&str; 3] = ["vaultline_node", "vaultline_engine", "vaultline_core"];

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines for an operator's terminal.
    Pretty,
    /// One JSON object per event, fields flattened, for log shippers.
    Json,
}

/// Filter directive enabling the Vaultline crates at `level` and nothing
/// else.
pub fn default_filter(level: Level) -> String {
    let level = level.as_str().to_lowercase();
    VAULTLINE_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Installs the global subscriber. `RUST_LOG`, when set, replaces
/// [`default_filter`].
///
/// Fails if a subscriber is already installed.
pub fn init_logging(format: LogFormat, level: Level) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
    }

    tracing::debug!(?format, %level, "logging initialized");
    Ok(())
}
