// Copyright (c) 2026 Vaultline Contributors. MIT License.
// See LICENSE for details.

//! # Vaultline Node
//!
//! Entry point for the `vaultline-node` binary. Parses CLI arguments,
//! initializes logging, and operates on funds persisted in a sled snapshot
//! database.
//!
//! The binary supports four subcommands:
//!
//! - `init`    — create a fund from a JSON config
//! - `exec`    — apply an operation script to a fund
//! - `status`  — print a fund's status report or metrics
//! - `version` — print build version information

mod cli;
mod logging;
mod metrics;
mod script;

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use tracing::Level;

use vaultline_core::config::{ENGINE_VERSION, SNAPSHOT_VERSION};
use vaultline_core::storage::VaultDB;
use vaultline_core::FundConfig;
use vaultline_engine::{
    AccountingEngine, EngineSnapshot, FeeAccrualRecord, FundState, HwmStatus, QueueStatus,
};

use cli::{Commands, VaultlineCli};
use metrics::EngineMetrics;
use script::{Step, StepOutcome};

fn main() -> Result<()> {
    let cli = VaultlineCli::parse();
    let format = cli.log_format;

    match cli.command {
        Commands::Init(args) => {
            logging::init_logging(format, Level::INFO)?;
            let db = open_db(&args.data_dir)?;
            let fund_id = init_fund(&db, &args.config, args.fund_id, Utc::now())?;
            println!("Fund initialized successfully.");
            println!("  Data directory : {}", args.data_dir.display());
            println!("  Fund id        : {}", fund_id);
            Ok(())
        }
        Commands::Exec(args) => {
            logging::init_logging(format, Level::INFO)?;
            let steps = script::load(&args.script)?;
            let metrics = EngineMetrics::new().context("failed to create metrics registry")?;
            let db = open_db(&args.data_dir)?;
            let report = exec_script(
                &db,
                args.fund_id.as_deref(),
                &steps,
                args.keep_going,
                &metrics,
                Utc::now(),
            )?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if args.metrics {
                print!("{}", metrics.encode()?);
            }
            Ok(())
        }
        Commands::Status(args) => {
            logging::init_logging(format, Level::WARN)?;
            let db = open_db(&args.data_dir)?;
            let engine = load_fund(&db, args.fund_id.as_deref())?;
            if args.metrics {
                let metrics = EngineMetrics::new().context("failed to create metrics registry")?;
                metrics.observe(&engine)?;
                print!("{}", metrics.encode()?);
            } else {
                let report = StatusReport::from_engine(&engine)?;
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Ok(())
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

fn open_db(data_dir: &Path) -> Result<VaultDB> {
    let db_path = data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let db = VaultDB::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::debug!(path = %db_path.display(), "database opened");
    Ok(db)
}

/// Loads a fund by id, or the most recently written fund when `fund_id` is
/// `None`.
fn load_fund(db: &VaultDB, fund_id: Option<&str>) -> Result<AccountingEngine> {
    let fund_id = match fund_id {
        Some(id) => id.to_string(),
        None => db
            .last_fund_id()?
            .context("no fund id given and the database holds no funds")?,
    };
    let bytes = db
        .get_snapshot(&fund_id)?
        .with_context(|| format!("fund {fund_id} not found"))?;
    let snapshot = EngineSnapshot::decode(&bytes)
        .with_context(|| format!("failed to decode snapshot for fund {fund_id}"))?;
    let engine = AccountingEngine::restore(snapshot)
        .with_context(|| format!("snapshot for fund {fund_id} does not reconcile"))?;
    Ok(engine)
}

fn persist(db: &VaultDB, engine: &AccountingEngine, now: DateTime<Utc>) -> Result<()> {
    let sealed = engine
        .snapshot()
        .encode(now)
        .context("failed to seal fund snapshot")?;
    db.put_snapshot(engine.fund_id(), &sealed)?;
    tracing::info!(
        fund_id = %engine.fund_id(),
        bytes = sealed.len(),
        "fund snapshot persisted"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Creates a fund and persists its first snapshot. Returns the fund id.
fn init_fund(
    db: &VaultDB,
    config_path: &Path,
    fund_id: Option<String>,
    now: DateTime<Utc>,
) -> Result<String> {
    let json = std::fs::read_to_string(config_path)
        .with_context(|| format!("failed to read fund config {}", config_path.display()))?;
    let config = FundConfig::from_json(&json)
        .with_context(|| format!("invalid fund config {}", config_path.display()))?;

    let engine = match fund_id {
        Some(id) => {
            if db.get_snapshot(&id)?.is_some() {
                bail!("fund {id} already exists");
            }
            AccountingEngine::new(id, config, now)?
        }
        None => AccountingEngine::create(config, now)?,
    };

    persist(db, &engine, now)?;
    Ok(engine.fund_id().to_string())
}

/// Summary of a script run.
#[derive(Debug, Serialize)]
struct ExecReport {
    fund_id: String,
    applied: usize,
    failed: usize,
    aum: String,
    nav: String,
    total_shares: String,
}

/// Applies `steps` to a persisted fund and saves the result.
///
/// Without `keep_going` the first failing step aborts the run and nothing is
/// persisted.
fn exec_script(
    db: &VaultDB,
    fund_id: Option<&str>,
    steps: &[Step],
    keep_going: bool,
    metrics: &EngineMetrics,
    now: DateTime<Utc>,
) -> Result<ExecReport> {
    let mut engine = load_fund(db, fund_id)?;
    let mut applied = 0;
    let mut failed = 0;

    for (index, step) in steps.iter().enumerate() {
        let at = step.at.unwrap_or(now);
        match script::apply(&mut engine, &step.op, at) {
            Ok(outcome) => {
                if let StepOutcome::Batch { kind, outcome } = &outcome {
                    metrics.record_batch(*kind, outcome);
                }
                tracing::info!(
                    step = index,
                    op = step.op.name(),
                    outcome = ?outcome,
                    "step applied"
                );
                applied += 1;
            }
            Err(e) if keep_going => {
                tracing::warn!(
                    step = index,
                    op = step.op.name(),
                    error = %e,
                    category = ?e.category(),
                    "step failed, continuing"
                );
                failed += 1;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("step {index} ({}) failed, script discarded", step.op.name())
                });
            }
        }
    }

    persist(db, &engine, now)?;
    metrics.observe(&engine)?;

    let state = engine.state();
    Ok(ExecReport {
        fund_id: state.fund_id.clone(),
        applied,
        failed,
        aum: state.aum.to_string(),
        nav: state.nav.to_string(),
        total_shares: state.total_shares.to_string(),
    })
}

/// Everything `status` prints.
#[derive(Debug, Serialize)]
struct StatusReport {
    engine_version: &'static str,
    name: String,
    base_asset: String,
    state: FundState,
    queues: QueueStatus,
    accrued_fees: FeeAccrualRecord,
    collected_fees: FeeAccrualRecord,
    hwm: HwmStatus,
    holders: usize,
}

impl StatusReport {
    fn from_engine(engine: &AccountingEngine) -> Result<Self> {
        Ok(Self {
            engine_version: ENGINE_VERSION,
            name: engine.config().name.clone(),
            base_asset: engine.config().base_asset.clone(),
            state: engine.state().clone(),
            queues: engine.queue_status()?,
            accrued_fees: engine.fee_breakdown(),
            collected_fees: engine.collected_fees(),
            hwm: engine.hwm_status(),
            holders: engine.positions().len(),
        })
    }
}

/// Prints version information to stdout.
fn print_version() {
    println!("vaultline-node {}", env!("CARGO_PKG_VERSION"));
    println!("engine         {}", ENGINE_VERSION);
    println!("snapshot       v{}", SNAPSHOT_VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use vaultline_core::Decimal;

    const FUND_JSON: &str = r#"{
        "name": "Test Fund",
        "base_asset": "USDC",
        "fees": { "management_bps": 200, "performance_bps": 2000, "entrance_bps": 100, "exit_bps": 50 },
        "min_investment": "100",
        "recovery_window_secs": 2592000
    }"#;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    /// Helper: a temp dir holding `fund.json` and an open database with fund
    /// `alpha` initialized.
    fn setup() -> (tempfile::TempDir, VaultDB) {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("fund.json");
        std::fs::write(&config_path, FUND_JSON).unwrap();
        let db = open_db(&dir.path().join("data")).unwrap();
        init_fund(&db, &config_path, Some("alpha".into()), t0()).unwrap();
        (dir, db)
    }

    #[test]
    fn init_then_exec_persists_state() {
        let (_dir, db) = setup();
        let steps = script::parse(
            r#"[
                { "op": "submit_deposit", "investor": "alice", "amount": "10000" },
                { "op": "process_deposits", "max": 10 }
            ]"#,
        )
        .unwrap();
        let metrics = EngineMetrics::new().unwrap();

        let report = exec_script(&db, Some("alpha"), &steps, false, &metrics, t0()).unwrap();
        assert_eq!(report.applied, 2);
        assert_eq!(report.aum, "9900");

        let engine = load_fund(&db, None).unwrap();
        assert_eq!(engine.fund_id(), "alpha");
        assert_eq!(engine.balance_of("alice"), Decimal::from_int(9_900));
    }

    #[test]
    fn failing_step_discards_script() {
        let (_dir, db) = setup();
        let steps = script::parse(
            r#"[
                { "op": "submit_deposit", "investor": "alice", "amount": "10000" },
                { "op": "resume" }
            ]"#,
        )
        .unwrap();
        let metrics = EngineMetrics::new().unwrap();

        assert!(exec_script(&db, Some("alpha"), &steps, false, &metrics, t0()).is_err());
        let engine = load_fund(&db, Some("alpha")).unwrap();
        assert_eq!(engine.queue_status().unwrap().deposit_count, 0);

        let report = exec_script(&db, Some("alpha"), &steps, true, &metrics, t0()).unwrap();
        assert_eq!((report.applied, report.failed), (1, 1));
    }

    #[test]
    fn duplicate_fund_id_rejected() {
        let (dir, db) = setup();
        let config_path = dir.path().join("fund.json");
        assert!(init_fund(&db, &config_path, Some("alpha".into()), t0()).is_err());
        assert_eq!(db.list_funds().unwrap(), vec!["alpha".to_string()]);
    }

    #[test]
    fn status_report_serializes() {
        let (_dir, db) = setup();
        let steps = script::parse(
            r#"[{ "op": "update_aum", "aum": "0", "at": "2026-01-02T00:00:00Z" }]"#,
        )
        .unwrap();
        let metrics = EngineMetrics::new().unwrap();
        exec_script(&db, Some("alpha"), &steps, false, &metrics, t0() + Duration::days(1))
            .unwrap();

        let engine = load_fund(&db, Some("alpha")).unwrap();
        let json = serde_json::to_value(StatusReport::from_engine(&engine).unwrap()).unwrap();
        assert_eq!(json["name"], "Test Fund");
        assert_eq!(json["queues"]["deposit_count"], 0);
        assert_eq!(json["state"]["aum"], "0");
    }
}
