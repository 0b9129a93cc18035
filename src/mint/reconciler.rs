//! Balance reconciler
//!
//! Ledger reads can lag behind confirmation. After a mint the payment
//! balance is polled until it has dropped at least as far as predicted.

use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::metrics::metrics;
use crate::rpc::LedgerRpc;
use crate::sale::read_payment_balance;
use crate::types::PaymentToken;

/// Poll budget for reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilePolicy {
    pub poll_interval: Duration,
    /// Total balance reads, including the first
    pub max_attempts: u32,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_attempts: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub converged: bool,
    pub attempts: u32,
    /// Last balance successfully read, if any
    pub last_observed: Option<u64>,
}

pub struct BalanceReconciler {
    rpc: Arc<dyn LedgerRpc>,
    policy: ReconcilePolicy,
}

impl BalanceReconciler {
    pub fn new(rpc: Arc<dyn LedgerRpc>, policy: ReconcilePolicy) -> Self {
        Self { rpc, policy }
    }

    pub fn policy(&self) -> ReconcilePolicy {
        self.policy
    }

    /// Poll until the balance is at or below `expected`
    ///
    /// A failed read uses up an attempt. Running out of attempts returns
    /// `converged: false`.
    pub async fn reconcile(
        &self,
        address: &Pubkey,
        payment: &PaymentToken,
        expected: u64,
    ) -> Reconciliation {
        let mut last_observed = None;
        let mut attempts = 0;

        while attempts < self.policy.max_attempts {
            if attempts > 0 {
                sleep(self.policy.poll_interval).await;
            }
            attempts += 1;

            match read_payment_balance(self.rpc.as_ref(), address, payment).await {
                Ok(observed) => {
                    last_observed = Some(observed);
                    if observed <= expected {
                        debug!(observed, expected, attempts, "Balance reconciled");
                        metrics().reconcile_attempts.observe(attempts as f64);
                        return Reconciliation {
                            converged: true,
                            attempts,
                            last_observed,
                        };
                    }
                    debug!(observed, expected, attempts, "Balance not settled yet");
                }
                Err(e) => {
                    warn!(error = %e, attempts, "Balance read failed during reconciliation");
                }
            }
        }

        warn!(
            expected,
            last_observed = ?last_observed,
            attempts,
            "Balance did not reach expected value, treating batch as degraded"
        );
        metrics().reconcile_attempts.observe(attempts as f64);
        Reconciliation {
            converged: false,
            attempts,
            last_observed,
        }
    }
}
