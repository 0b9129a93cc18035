//! Mint dispatcher
//!
//! Builds, signs and submits mint transactions. Returns as soon as the RPC
//! node has accepted them; finality is the tracker's job.

use futures::future::join_all;
use solana_sdk::signature::Signature;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::MintError;
use crate::metrics::metrics;
use crate::rpc::LedgerRpc;
use crate::tx_builder::MintTxBuilder;
use crate::types::{SaleConfig, SaleView};
use crate::wallet::WalletSigner;

/// An accepted, not yet final, mint transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxHandle {
    pub signature: Signature,
    pub submitted_at: Instant,
}

/// Result of one dispatch
#[derive(Debug, Default)]
pub struct Dispatched {
    /// Accepted transactions, in build order
    pub handles: Vec<TxHandle>,
    /// Units that never reached the network (build or submit failures)
    pub rejected: Vec<MintError>,
}

impl Dispatched {
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty() && self.rejected.is_empty()
    }
}

pub struct MintDispatcher {
    rpc: Arc<dyn LedgerRpc>,
    builder: Arc<dyn MintTxBuilder>,
}

impl MintDispatcher {
    pub fn new(rpc: Arc<dyn LedgerRpc>, builder: Arc<dyn MintTxBuilder>) -> Self {
        Self { rpc, builder }
    }

    /// Submit `quantity` mint transactions for `signer`
    ///
    /// Outside a mintable phase, or without a signer, nothing is sent and an
    /// empty [`Dispatched`] is returned. When not a single transaction reaches
    /// the network the first error is returned so its program code survives.
    /// A wallet declining to sign is reported as `Cancelled`.
    pub async fn dispatch(
        &self,
        view: &SaleView,
        config: &SaleConfig,
        signer: Option<&dyn WalletSigner>,
        quantity: u32,
    ) -> Result<Dispatched, MintError> {
        let signer = match signer {
            Some(signer) if view.phase.is_mintable() => signer,
            _ => {
                warn!(
                    phase = %view.phase,
                    wallet_connected = signer.is_some(),
                    "Dispatch called outside a mintable state, nothing sent"
                );
                return Ok(Dispatched::default());
            }
        };

        if quantity == 1 {
            self.dispatch_one(config, signer).await
        } else {
            self.dispatch_batch(config, signer, quantity).await
        }
    }

    async fn dispatch_one(
        &self,
        config: &SaleConfig,
        signer: &dyn WalletSigner,
    ) -> Result<Dispatched, MintError> {
        let payer = signer.pubkey();
        let tx = self.builder.build_mint_transaction(config, &payer).await?;
        let signed = signer
            .sign_transaction(tx)
            .await
            .map_err(|e| cancelled(&e))?;

        let signature = self.rpc.send_transaction(&signed).await?;
        metrics().transactions_submitted.inc();
        info!(signature = %signature, "Mint transaction submitted");

        Ok(Dispatched {
            handles: vec![TxHandle {
                signature,
                submitted_at: Instant::now(),
            }],
            rejected: Vec::new(),
        })
    }

    async fn dispatch_batch(
        &self,
        config: &SaleConfig,
        signer: &dyn WalletSigner,
        quantity: u32,
    ) -> Result<Dispatched, MintError> {
        let payer = signer.pubkey();

        let mut unsigned = Vec::with_capacity(quantity as usize);
        let mut build_error = None;
        for index in 0..quantity {
            match self.builder.build_mint_transaction(config, &payer).await {
                Ok(tx) => unsigned.push(tx),
                Err(e) => {
                    warn!(index, error = %e, "Mint transaction construction failed, stopping batch");
                    build_error = Some(e);
                    break;
                }
            }
        }

        if unsigned.is_empty() {
            return Err(build_error.unwrap_or_else(|| {
                MintError::DispatchFailed("no transaction could be built".to_string())
            }));
        }

        // The wallet approves the batch as a whole
        let mut signed = Vec::with_capacity(unsigned.len());
        for tx in unsigned {
            signed.push(signer.sign_transaction(tx).await.map_err(|e| cancelled(&e))?);
        }

        let results = join_all(signed.iter().map(|tx| self.rpc.send_transaction(tx))).await;

        let mut dispatched = Dispatched::default();
        for result in results {
            match result {
                Ok(signature) => {
                    metrics().transactions_submitted.inc();
                    debug!(signature = %signature, "Batch mint transaction submitted");
                    dispatched.handles.push(TxHandle {
                        signature,
                        submitted_at: Instant::now(),
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Batch mint transaction rejected");
                    dispatched.rejected.push(e);
                }
            }
        }

        // Units that were never built count as rejected
        if let Some(err) = build_error {
            let missing = quantity as usize - dispatched.handles.len() - dispatched.rejected.len();
            dispatched
                .rejected
                .extend(std::iter::repeat(err).take(missing));
        }

        if dispatched.handles.is_empty() {
            return Err(dispatched.rejected.swap_remove(0));
        }

        info!(
            submitted = dispatched.handles.len(),
            rejected = dispatched.rejected.len(),
            "Mint batch submitted"
        );
        Ok(dispatched)
    }
}

fn cancelled(err: &MintError) -> MintError {
    info!(error = %err, "Wallet declined to sign, mint cancelled");
    MintError::Cancelled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::SignatureStatus;
    use crate::sale::SaleEvaluator;
    use crate::test_utils::{MockLedger, MockTxBuilder, MockWallet, SaleFixture, SubmitPlan};
    use crate::types::{SalePhase, WalletContext};
    use chrono::Utc;
    use solana_sdk::pubkey::Pubkey;

    fn open_sale(wallet: &Pubkey) -> (SaleConfig, SaleView) {
        let data = SaleFixture::public(100, 0, 1_000).encode();
        let config = crate::sale::decode_sale_config(Pubkey::new_unique(), &data, 9).unwrap();
        let ctx = WalletContext {
            address: *wallet,
            native_balance: 1_000_000,
            payment_balance: 1_000_000,
            allowlist_token_balance: 0,
        };
        let view = SaleEvaluator::default().evaluate(&config, Utc::now(), Some(&ctx));
        assert_eq!(view.phase, SalePhase::PublicOpen);
        (config, view)
    }

    #[tokio::test]
    async fn test_single_mint_path() {
        let ledger = Arc::new(MockLedger::new());
        let builder = Arc::new(MockTxBuilder::new());
        let dispatcher = MintDispatcher::new(ledger.clone(), builder.clone());
        let wallet = MockWallet::new(Pubkey::new_unique());
        let (config, view) = open_sale(&wallet.pubkey());

        let dispatched = dispatcher
            .dispatch(&view, &config, Some(&wallet), 1)
            .await
            .unwrap();
        assert_eq!(dispatched.handles.len(), 1);
        assert!(dispatched.rejected.is_empty());
        assert_eq!(ledger.sent_count(), 1);
        assert_eq!(builder.built_count(), 1);
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_collects_rejections() {
        let ledger = Arc::new(MockLedger::new());
        ledger
            .plan_submissions(vec![
                SubmitPlan::Land(SignatureStatus::Confirmed),
                SubmitPlan::Reject(MintError::Program {
                    code: 0x137,
                    message: "sold out".into(),
                }),
                SubmitPlan::Land(SignatureStatus::Confirmed),
            ])
            .await;
        let dispatcher = MintDispatcher::new(ledger.clone(), Arc::new(MockTxBuilder::new()));
        let wallet = MockWallet::new(Pubkey::new_unique());
        let (config, view) = open_sale(&wallet.pubkey());

        let dispatched = dispatcher
            .dispatch(&view, &config, Some(&wallet), 3)
            .await
            .unwrap();
        assert_eq!(dispatched.handles.len(), 2);
        assert_eq!(dispatched.rejected.len(), 1);
        assert_eq!(dispatched.rejected[0].program_code(), Some(0x137));
        assert_ne!(dispatched.handles[0].signature, dispatched.handles[1].signature);
    }

    #[tokio::test]
    async fn test_not_mintable_sends_nothing() {
        let ledger = Arc::new(MockLedger::new());
        let dispatcher = MintDispatcher::new(ledger.clone(), Arc::new(MockTxBuilder::new()));
        let wallet = MockWallet::new(Pubkey::new_unique());
        let (config, mut view) = open_sale(&wallet.pubkey());
        view.phase = SalePhase::SoldOut;

        let dispatched = dispatcher
            .dispatch(&view, &config, Some(&wallet), 2)
            .await
            .unwrap();
        assert!(dispatched.is_empty());

        view.phase = SalePhase::PublicOpen;
        let dispatched = dispatcher.dispatch(&view, &config, None, 2).await.unwrap();
        assert!(dispatched.is_empty());
        assert_eq!(ledger.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_declined_signature_is_cancellation() {
        let ledger = Arc::new(MockLedger::new());
        let dispatcher = MintDispatcher::new(ledger.clone(), Arc::new(MockTxBuilder::new()));
        let wallet = MockWallet::declining(Pubkey::new_unique());
        let (config, view) = open_sale(&wallet.pubkey());

        assert_eq!(
            dispatcher.dispatch(&view, &config, Some(&wallet), 3).await.unwrap_err(),
            MintError::Cancelled
        );
        assert_eq!(ledger.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_build_failure_stops_batch() {
        let ledger = Arc::new(MockLedger::new());
        let dispatcher =
            MintDispatcher::new(ledger.clone(), Arc::new(MockTxBuilder::failing_after(2)));
        let wallet = MockWallet::new(Pubkey::new_unique());
        let (config, view) = open_sale(&wallet.pubkey());

        let dispatched = dispatcher
            .dispatch(&view, &config, Some(&wallet), 5)
            .await
            .unwrap();
        assert_eq!(dispatched.handles.len(), 2);
        assert_eq!(dispatched.rejected.len(), 3);
        assert_eq!(ledger.sent_count(), 2);

        let none_built = MintDispatcher::new(ledger, Arc::new(MockTxBuilder::failing_after(0)));
        assert!(matches!(
            none_built.dispatch(&view, &config, Some(&wallet), 2).await,
            Err(MintError::DispatchFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_all_rejected_returns_first_error() {
        let ledger = Arc::new(MockLedger::new());
        ledger
            .plan_submissions(vec![
                SubmitPlan::Reject(MintError::InsufficientFunds),
                SubmitPlan::Reject(MintError::InsufficientFunds),
            ])
            .await;
        let dispatcher = MintDispatcher::new(ledger, Arc::new(MockTxBuilder::new()));
        let wallet = MockWallet::new(Pubkey::new_unique());
        let (config, view) = open_sale(&wallet.pubkey());

        assert_eq!(
            dispatcher.dispatch(&view, &config, Some(&wallet), 2).await.unwrap_err(),
            MintError::InsufficientFunds
        );
    }
}
