//! Metrics collection module

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Counters
    pub mint_attempts: IntCounter,
    pub mint_success: IntCounter,
    pub mint_failed: IntCounter,
    pub mint_rejected_reentrant: IntCounter,
    pub transactions_submitted: IntCounter,
    pub transactions_confirmed: IntCounter,
    pub config_refresh_failures: IntCounter,

    // Histograms
    pub confirmation_latency: Histogram,
    pub reconcile_attempts: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let mint_attempts = IntCounter::with_opts(Opts::new(
            "mint_attempts_total",
            "Mint actions that reached dispatch",
        ))?;
        let mint_success = IntCounter::with_opts(Opts::new(
            "mint_success_total",
            "Mint actions with every transaction confirmed",
        ))?;
        let mint_failed = IntCounter::with_opts(Opts::new(
            "mint_failed_total",
            "Mint actions that failed fully or partially",
        ))?;
        let mint_rejected_reentrant = IntCounter::with_opts(Opts::new(
            "mint_rejected_reentrant_total",
            "Mint actions rejected because another was in progress",
        ))?;
        let transactions_submitted = IntCounter::with_opts(Opts::new(
            "mint_transactions_submitted_total",
            "Mint transactions accepted by the RPC node",
        ))?;
        let transactions_confirmed = IntCounter::with_opts(Opts::new(
            "mint_transactions_confirmed_total",
            "Mint transactions confirmed on chain",
        ))?;
        let config_refresh_failures = IntCounter::with_opts(Opts::new(
            "sale_config_refresh_failures_total",
            "Sale account reads that failed or did not decode",
        ))?;

        let confirmation_latency = Histogram::with_opts(
            HistogramOpts::new(
                "mint_confirmation_latency_seconds",
                "Time from submission to final status",
            )
            .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 30.0, 60.0]),
        )?;
        let reconcile_attempts = Histogram::with_opts(
            HistogramOpts::new(
                "balance_reconcile_attempts",
                "Balance reads needed before reconciliation finished",
            )
            .buckets(vec![1.0, 2.0, 3.0, 5.0, 10.0, 20.0]),
        )?;

        registry.register(Box::new(mint_attempts.clone()))?;
        registry.register(Box::new(mint_success.clone()))?;
        registry.register(Box::new(mint_failed.clone()))?;
        registry.register(Box::new(mint_rejected_reentrant.clone()))?;
        registry.register(Box::new(transactions_submitted.clone()))?;
        registry.register(Box::new(transactions_confirmed.clone()))?;
        registry.register(Box::new(config_refresh_failures.clone()))?;
        registry.register(Box::new(confirmation_latency.clone()))?;
        registry.register(Box::new(reconcile_attempts.clone()))?;

        Ok(Self {
            registry,
            mint_attempts,
            mint_success,
            mint_failed,
            mint_rejected_reentrant,
            transactions_submitted,
            transactions_confirmed,
            config_refresh_failures,
            confirmation_latency,
            reconcile_attempts,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prometheus text exposition of every registered metric
    pub fn encode_text(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}
