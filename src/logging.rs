//! Logging setup and structured mint-action events

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::mint::classifier::MintOutcome;
use crate::observability::CorrelationId;

/// Initialize the global tracing subscriber
///
/// `RUST_LOG` wins over the defaults when set.
pub fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let default_filter = if verbose {
        "candy_mint=debug,info"
    } else {
        "candy_mint=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }
    Ok(())
}

/// Structured logger for the events of one mint action
#[derive(Debug, Clone)]
pub struct MintLogger {
    correlation_id: CorrelationId,
}

impl MintLogger {
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self { correlation_id }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn log_attempt(&self, quantity: u32, unit_price: u64) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            quantity = quantity,
            unit_price = unit_price,
            "Attempting mint"
        );
    }

    pub fn log_dispatched(&self, submitted: usize, rejected: usize) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            submitted = submitted,
            rejected = rejected,
            "Mint transactions submitted"
        );
    }

    pub fn log_reconciled(&self, converged: bool, attempts: u32) {
        tracing::debug!(
            correlation_id = %self.correlation_id,
            converged = converged,
            attempts = attempts,
            "Balance reconciliation finished"
        );
    }

    pub fn log_outcome(&self, outcome: &MintOutcome, latency_ms: u64) {
        if outcome.is_success() {
            tracing::info!(
                correlation_id = %self.correlation_id,
                outcome = ?outcome,
                latency_ms = latency_ms,
                "Mint finished"
            );
        } else {
            let error = outcome.error().map(|e| e.to_string()).unwrap_or_default();
            tracing::warn!(
                correlation_id = %self.correlation_id,
                outcome = ?outcome,
                error = %error,
                latency_ms = latency_ms,
                "Mint did not fully succeed"
            );
        }
    }
}
