//! Metrics collection for observability
//!
//! Series live in a registry owned by each [`Metrics`] instance, so several
//! ledgers can coexist in one process.
//!
//! # Metrics
//!
//! - `convey_ledger_records_total{kind}` - Records committed, by kind
//! - `convey_ledger_operation_duration_seconds{op}` - Write operation latency
//! - `convey_ledger_rejections_total{op,reason}` - Write operations that failed

use prometheus::{
    Encoder, HistogramOpts, HistogramTimer, HistogramVec, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Records committed
    pub records_total: IntCounterVec,

    /// Write operation latency
    pub operation_duration: HistogramVec,

    /// Failed write operations
    pub rejections_total: IntCounterVec,

    /// Prometheus registry
    registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let records_total = IntCounterVec::new(
            Opts::new("convey_ledger_records_total", "Records committed, by kind"),
            &["kind"],
        )?;
        registry.register(Box::new(records_total.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "convey_ledger_operation_duration_seconds",
                "Write operation latency",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.0]),
            &["op"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let rejections_total = IntCounterVec::new(
            Opts::new(
                "convey_ledger_rejections_total",
                "Write operations that failed",
            ),
            &["op", "reason"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        Ok(Self {
            records_total,
            operation_duration,
            rejections_total,
            registry,
        })
    }

    /// Count committed records of one kind
    pub fn record_created(&self, kind: &str, count: usize) {
        self.records_total
            .with_label_values(&[kind])
            .inc_by(count as u64);
    }

    /// Start timing a write operation
    pub fn start_operation(&self, op: &str) -> HistogramTimer {
        self.operation_duration.with_label_values(&[op]).start_timer()
    }

    /// Count a failed write operation
    pub fn record_rejection(&self, op: &str, reason: &str) {
        self.rejections_total.with_label_values(&[op, reason]).inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of every series
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
