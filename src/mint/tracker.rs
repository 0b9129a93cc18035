//! Confirmation tracker

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::metrics::metrics;
use crate::mint::dispatcher::TxHandle;
use crate::rpc::{LedgerRpc, SignatureStatus};
use crate::types::TxOutcome;

/// Polls submitted transactions until they reach a final status
pub struct ConfirmationTracker {
    rpc: Arc<dyn LedgerRpc>,
    poll_interval: Duration,
}

impl ConfirmationTracker {
    pub fn new(rpc: Arc<dyn LedgerRpc>, poll_interval: Duration) -> Self {
        Self { rpc, poll_interval }
    }

    /// One outcome per handle, in input order
    ///
    /// Each handle gets its own `tx_timeout`; nothing is resubmitted.
    pub async fn await_all(&self, handles: &[TxHandle], tx_timeout: Duration) -> Vec<TxOutcome> {
        join_all(handles.iter().map(|handle| self.await_one(handle, tx_timeout))).await
    }

    async fn await_one(&self, handle: &TxHandle, tx_timeout: Duration) -> TxOutcome {
        let outcome = match timeout(tx_timeout, self.poll_until_final(handle)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    signature = %handle.signature,
                    timeout_ms = tx_timeout.as_millis() as u64,
                    "Mint transaction not confirmed in time"
                );
                TxOutcome::TimedOut
            }
        };

        if outcome.is_confirmed() {
            metrics().transactions_confirmed.inc();
            metrics()
                .confirmation_latency
                .observe(handle.submitted_at.elapsed().as_secs_f64());
        }
        outcome
    }

    async fn poll_until_final(&self, handle: &TxHandle) -> TxOutcome {
        loop {
            match self.rpc.get_signature_status(&handle.signature).await {
                Ok(SignatureStatus::Confirmed) => {
                    debug!(signature = %handle.signature, "Mint transaction confirmed");
                    return TxOutcome::Confirmed;
                }
                Ok(SignatureStatus::Failed(failure)) => {
                    warn!(
                        signature = %handle.signature,
                        code = ?failure.code,
                        error = %failure.message,
                        "Mint transaction failed on chain"
                    );
                    return TxOutcome::Failed(failure);
                }
                Ok(SignatureStatus::Pending) => {}
                Err(e) => {
                    debug!(signature = %handle.signature, error = %e, "Status poll failed");
                }
            }
            sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockLedger, MockTxBuilder, SubmitPlan};
    use crate::types::TxFailure;
    use solana_sdk::pubkey::Pubkey;
    use std::time::Instant;

    async fn submit(ledger: &MockLedger, plans: Vec<SubmitPlan>) -> Vec<TxHandle> {
        let n = plans.len();
        ledger.plan_submissions(plans).await;
        let tx = MockTxBuilder::placeholder_tx(&Pubkey::new_unique());
        let mut handles = Vec::new();
        for _ in 0..n {
            let signature = ledger.send_transaction(&tx).await.unwrap();
            handles.push(TxHandle {
                signature,
                submitted_at: Instant::now(),
            });
        }
        handles
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcomes_preserve_order() {
        let ledger = Arc::new(MockLedger::new());
        let failure = TxFailure {
            code: Some(0x137),
            message: "custom program error: 0x137".into(),
        };
        let handles = submit(
            &ledger,
            vec![
                SubmitPlan::Land(SignatureStatus::Confirmed),
                SubmitPlan::Land(SignatureStatus::Failed(failure.clone())),
                SubmitPlan::NeverLand,
                SubmitPlan::Land(SignatureStatus::Confirmed),
            ],
        )
        .await;

        let tracker = ConfirmationTracker::new(ledger, Duration::from_millis(500));
        let outcomes = tracker.await_all(&handles, Duration::from_secs(30)).await;
        assert_eq!(
            outcomes,
            vec![
                TxOutcome::Confirmed,
                TxOutcome::Failed(failure),
                TxOutcome::TimedOut,
                TxOutcome::Confirmed,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_per_handle() {
        let ledger = Arc::new(MockLedger::new());
        let handles = submit(&ledger, vec![SubmitPlan::NeverLand, SubmitPlan::NeverLand]).await;

        let tracker = ConfirmationTracker::new(ledger, Duration::from_millis(100));
        let started = tokio::time::Instant::now();
        let outcomes = tracker.await_all(&handles, Duration::from_secs(5)).await;

        assert_eq!(outcomes, vec![TxOutcome::TimedOut, TxOutcome::TimedOut]);
        // Handles wait concurrently, not one after another
        assert!(started.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_handles() {
        let tracker = ConfirmationTracker::new(Arc::new(MockLedger::new()), Duration::from_millis(10));
        assert!(tracker.await_all(&[], Duration::from_secs(1)).await.is_empty());
    }
}
