//! # Prometheus Metrics
//!
//! Fund gauges and settlement counters, rendered in the Prometheus text
//! exposition format by `exec --metrics` and `status --metrics`.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] under
//! the `vaultline` namespace so they do not collide with any default global
//! registry consumers.

use prometheus::{Encoder, Gauge, GaugeVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use vaultline_engine::{AccountingEngine, BatchOutcome, EngineError, FeeKind, RequestKind};

/// Holds all Prometheus metric handles for one fund.
#[derive(Clone)]
pub struct EngineMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Assets under management.
    pub aum: Gauge,
    /// Net asset value per share.
    pub nav: Gauge,
    /// Shares outstanding.
    pub total_shares: Gauge,
    /// Current high-water mark.
    pub high_water_mark: Gauge,
    /// Holders with a non-zero balance.
    pub holders: IntGauge,
    /// Pending entries per queue, labelled by `kind`.
    pub queue_depth: GaugeVec,
    /// Accrued, uncollected fees, labelled by `fee`.
    pub accrued_fees: GaugeVec,
    /// Entries settled, labelled by `kind`.
    pub entries_processed_total: IntCounterVec,
    /// Entries skipped for slippage, labelled by `kind`.
    pub entries_skipped_total: IntCounterVec,
}

impl EngineMetrics {
    /// Creates and registers all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("vaultline".into()), None)?;

        let aum = Gauge::new("aum", "Assets under management in base asset units")?;
        registry.register(Box::new(aum.clone()))?;

        let nav = Gauge::new("nav", "Net asset value per share")?;
        registry.register(Box::new(nav.clone()))?;

        let total_shares = Gauge::new("total_shares", "Fund shares outstanding")?;
        registry.register(Box::new(total_shares.clone()))?;

        let high_water_mark = Gauge::new("high_water_mark", "Current high-water mark NAV")?;
        registry.register(Box::new(high_water_mark.clone()))?;

        let holders = IntGauge::new("holders", "Holders with a non-zero share balance")?;
        registry.register(Box::new(holders.clone()))?;

        let queue_depth = GaugeVec::new(
            Opts::new("queue_depth", "Pending entries per request queue"),
            &["kind"],
        )?;
        registry.register(Box::new(queue_depth.clone()))?;

        let accrued_fees = GaugeVec::new(
            Opts::new("accrued_fees", "Accrued fees awaiting collection"),
            &["fee"],
        )?;
        registry.register(Box::new(accrued_fees.clone()))?;

        let entries_processed_total = IntCounterVec::new(
            Opts::new("entries_processed_total", "Queue entries settled"),
            &["kind"],
        )?;
        registry.register(Box::new(entries_processed_total.clone()))?;

        let entries_skipped_total = IntCounterVec::new(
            Opts::new(
                "entries_skipped_total",
                "Queue entries left pending because min_out was not met",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(entries_skipped_total.clone()))?;

        Ok(Self {
            registry,
            aum,
            nav,
            total_shares,
            high_water_mark,
            holders,
            queue_depth,
            accrued_fees,
            entries_processed_total,
            entries_skipped_total,
        })
    }

    /// Sets every gauge from the engine's current state.
    pub fn observe(&self, engine: &AccountingEngine) -> Result<(), EngineError> {
        let state = engine.state();
        self.aum.set(state.aum.to_f64_lossy());
        self.nav.set(state.nav.to_f64_lossy());
        self.total_shares.set(state.total_shares.to_f64_lossy());
        self.high_water_mark
            .set(engine.hwm_status().hwm.to_f64_lossy());
        self.holders.set(engine.positions().len() as i64);

        let queues = engine.queue_status()?;
        self.queue_depth
            .with_label_values(&[RequestKind::Deposit.to_string().as_str()])
            .set(queues.deposit_count as f64);
        self.queue_depth
            .with_label_values(&[RequestKind::Redemption.to_string().as_str()])
            .set(queues.redemption_count as f64);

        let accrued = engine.fee_breakdown();
        for kind in FeeKind::ALL {
            self.accrued_fees
                .with_label_values(&[kind.to_string().as_str()])
                .set(accrued.get(kind).to_f64_lossy());
        }
        Ok(())
    }

    /// Counts a committed batch.
    pub fn record_batch(&self, kind: RequestKind, outcome: &BatchOutcome) {
        let label = kind.to_string();
        self.entries_processed_total
            .with_label_values(&[label.as_str()])
            .inc_by(outcome.processed as u64);
        self.entries_skipped_total
            .with_label_values(&[label.as_str()])
            .inc_by(outcome.skipped as u64);
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
