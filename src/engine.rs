//! Mint engine
//!
//! Owns the session state (wallet, sale snapshot, alert, minting flag) and
//! composes reader, evaluator, dispatcher, tracker, reconciler and
//! classifier into the two user actions: `refresh` and `start_mint`.

use anyhow::Context;
use arc_swap::ArcSwap;
use chrono::Utc;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::errors::MintError;
use crate::gatekeeper::HumanGate;
use crate::logging::MintLogger;
use crate::metrics::metrics;
use crate::mint::{
    classify, classify_error, BalanceReconciler, BatchReport, ConfirmationTracker,
    MintDispatcher, MintObserver, MintOutcome, ReconcilePolicy, Reconciliation,
};
use crate::observability::CorrelationId;
use crate::rpc::LedgerRpc;
use crate::sale::{read_payment_balance, SaleEvaluator, SaleReader};
use crate::tx_builder::MintTxBuilder;
use crate::types::{
    AlertState, MintBatchRequest, PaymentToken, SaleConfig, SaleView, WalletContext,
};
use crate::wallet::WalletSigner;

pub struct MintEngine {
    config: EngineConfig,
    sale_id: Pubkey,
    rpc: Arc<dyn LedgerRpc>,

    reader: SaleReader,
    evaluator: SaleEvaluator,
    dispatcher: MintDispatcher,
    tracker: ConfirmationTracker,
    reconciler: BalanceReconciler,

    gate: Option<Arc<dyn HumanGate>>,
    observer: Option<Arc<dyn MintObserver>>,

    wallet: RwLock<Option<Arc<dyn WalletSigner>>>,
    sale: RwLock<Option<SaleConfig>>,
    context: RwLock<Option<WalletContext>>,
    view: ArcSwap<SaleView>,
    alert: RwLock<AlertState>,
    explorer_link: RwLock<Option<String>>,

    minting: AtomicBool,
}

impl MintEngine {
    pub fn new(
        config: EngineConfig,
        rpc: Arc<dyn LedgerRpc>,
        builder: Arc<dyn MintTxBuilder>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let sale_id = config.sale.candy_machine_pubkey()?;

        let reconcile_policy = ReconcilePolicy {
            poll_interval: config.mint.reconcile_interval(),
            max_attempts: config.mint.reconcile_max_attempts,
        };

        Ok(Self {
            sale_id,
            reader: SaleReader::new(
                rpc.clone(),
                config.sale.payment_token_decimals,
                config.rpc.max_retries,
            ),
            evaluator: SaleEvaluator::new(config.sale.payment_token_name.clone()),
            dispatcher: MintDispatcher::new(rpc.clone(), builder),
            tracker: ConfirmationTracker::new(rpc.clone(), config.mint.confirmation_poll()),
            reconciler: BalanceReconciler::new(rpc.clone(), reconcile_policy),
            rpc,
            gate: None,
            observer: None,
            wallet: RwLock::new(None),
            sale: RwLock::new(None),
            context: RwLock::new(None),
            view: ArcSwap::from_pointee(SaleView::default()),
            alert: RwLock::new(AlertState::default()),
            explorer_link: RwLock::new(None),
            minting: AtomicBool::new(false),
            config,
        })
    }

    /// Engine talking to the configured RPC endpoint
    pub fn connect(config: EngineConfig, builder: Arc<dyn MintTxBuilder>) -> anyhow::Result<Self> {
        let commitment = config.commitment().context("Invalid rpc.commitment")?;
        let client = RpcClient::new_with_timeout_and_commitment(
            config.rpc.url.clone(),
            Duration::from_secs(config.rpc.timeout_secs),
            commitment,
        );
        info!(url = %config.rpc.url, cluster = config.sale.cluster.as_str(), "Connecting mint engine");
        Self::new(config, Arc::new(client), builder)
    }

    pub fn with_gate(mut self, gate: Arc<dyn HumanGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn MintObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current sale view
    pub fn view(&self) -> SaleView {
        (**self.view.load()).clone()
    }

    pub async fn alert(&self) -> AlertState {
        self.alert.read().await.clone()
    }

    pub async fn dismiss_alert(&self) {
        self.alert.write().await.open = false;
    }

    /// Metrics in Prometheus text format, `None` when disabled
    pub fn metrics_text(&self) -> Option<String> {
        if !self.config.monitoring.enable_metrics {
            return None;
        }
        match metrics().encode_text() {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(error = %e, "Failed to encode metrics");
                None
            }
        }
    }

    pub fn is_minting(&self) -> bool {
        self.minting.load(Ordering::Acquire)
    }

    /// Explorer URL of the most recent confirmed mint
    pub async fn explorer_link(&self) -> Option<String> {
        self.explorer_link.read().await.clone()
    }

    pub async fn wallet_context(&self) -> Option<WalletContext> {
        *self.context.read().await
    }

    /// Connect or disconnect the wallet and refresh the view
    pub async fn set_wallet(&self, wallet: Option<Arc<dyn WalletSigner>>) -> SaleView {
        let connected = wallet.is_some();
        *self.wallet.write().await = wallet;
        *self.context.write().await = None;

        if connected {
            return self.refresh().await;
        }

        // Disconnected: keep sale data, drop everything wallet-specific
        let sale = self.sale.read().await.clone();
        match sale {
            Some(config) => self.publish(&config, None),
            None => {
                let view = SaleView::default();
                self.view.store(Arc::new(view.clone()));
                view
            }
        }
    }

    /// Re-read the sale and wallet balances and recompute the view
    ///
    /// Without a wallet this returns the current view untouched. A sale that
    /// cannot be read yields a degraded, non-eligible view.
    #[instrument(skip(self), fields(sale = %self.sale_id))]
    pub async fn refresh(&self) -> SaleView {
        let wallet = self.wallet.read().await.clone();
        let Some(wallet) = wallet else {
            return self.view();
        };
        let address = wallet.pubkey();

        let config = match self.reader.fetch_config(&self.sale_id).await {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Sale configuration unavailable, view degraded");
                metrics().config_refresh_failures.inc();
                *self.sale.write().await = None;
                *self.context.write().await = None;
                let view = SaleView::degraded(true);
                self.view.store(Arc::new(view.clone()));
                return view;
            }
        };

        let context = match self.reader.fetch_wallet_context(address, &config).await {
            Ok(context) => context,
            Err(e) => {
                warn!(wallet = %address, error = %e, "Wallet balances unavailable, assuming zero");
                WalletContext {
                    address,
                    native_balance: 0,
                    payment_balance: 0,
                    allowlist_token_balance: 0,
                }
            }
        };

        *self.sale.write().await = Some(config.clone());
        *self.context.write().await = Some(context);
        let view = self.publish(&config, Some(&context));
        debug!(phase = %view.phase, remaining = view.items_remaining, "Sale view refreshed");
        view
    }

    /// Refresh on a fixed cadence so time-based phase changes show up
    pub fn spawn_auto_refresh(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                if !engine.is_minting() {
                    engine.refresh().await;
                }
            }
        })
    }

    /// Mint `quantity` items; the result is also stored as the current alert
    #[instrument(skip(self))]
    pub async fn start_mint(&self, quantity: u32) -> MintOutcome {
        let outcome = match self.try_start_mint(quantity).await {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!(error = %e, "Mint action ended with an error");
                classify_error(&e)
            }
        };

        match &outcome {
            o if o.is_success() => metrics().mint_success.inc(),
            MintOutcome::Rejected { .. } => {}
            _ => metrics().mint_failed.inc(),
        }

        *self.alert.write().await = outcome.alert();
        outcome
    }

    async fn try_start_mint(&self, quantity: u32) -> Result<MintOutcome, MintError> {
        let request = MintBatchRequest::new(quantity, self.config.mint.max_batch_size)?;

        // Phase may have moved with the clock since the last refresh
        let view = self.current_view().await;
        let wallet = self
            .wallet
            .read()
            .await
            .clone()
            .ok_or(MintError::NotEligible { phase: view.phase })?;
        if !view.eligibility.is_eligible() {
            return Err(MintError::NotEligible { phase: view.phase });
        }
        let config = self.sale.read().await.clone().ok_or_else(|| {
            MintError::ConfigUnavailable("sale has not been loaded".to_string())
        })?;

        if self.is_minting() {
            metrics().mint_rejected_reentrant.inc();
            return Err(MintError::AlreadyMinting);
        }

        // Gate before the flag: a missing pass must not occupy the session
        if let Some(network) = config.gatekeeper_network {
            self.check_gate(&network, &wallet.pubkey()).await?;
        }

        if self
            .minting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            metrics().mint_rejected_reentrant.inc();
            return Err(MintError::AlreadyMinting);
        }
        let _guard = scopeguard::guard((), |_| {
            self.minting.store(false, Ordering::Release);
        });

        self.run_batch(request, wallet, view, config).await
    }

    /// Re-evaluate the cached sale and wallet data at the current instant
    async fn current_view(&self) -> SaleView {
        let sale = self.sale.read().await.clone();
        let context = *self.context.read().await;
        match sale {
            Some(config) => self.publish(&config, context.as_ref()),
            None => self.view(),
        }
    }

    async fn check_gate(&self, network: &Pubkey, wallet: &Pubkey) -> Result<(), MintError> {
        let passed = match &self.gate {
            Some(gate) => gate.verify(network, wallet).await,
            None => false,
        };
        if passed {
            Ok(())
        } else {
            info!(network = %network, wallet = %wallet, "Human verification missing, mint blocked");
            Err(MintError::HumanGateRequired { network: *network })
        }
    }

    async fn run_batch(
        &self,
        request: MintBatchRequest,
        wallet: Arc<dyn WalletSigner>,
        view: SaleView,
        config: SaleConfig,
    ) -> Result<MintOutcome, MintError> {
        let logger = MintLogger::new(CorrelationId::new());
        let started = Instant::now();
        let address = wallet.pubkey();
        let unit_price = view.price.raw;

        metrics().mint_attempts.inc();
        logger.log_attempt(request.quantity(), unit_price);

        let pre_balance = match read_payment_balance(self.rpc.as_ref(), &address, &config.payment)
            .await
        {
            Ok(balance) => balance,
            Err(e) => {
                debug!(error = %e, "Pre-mint balance read failed, using cached value");
                self.context
                    .read()
                    .await
                    .map(|c| c.payment_balance)
                    .unwrap_or(0)
            }
        };

        let dispatched = self
            .dispatcher
            .dispatch(&view, &config, Some(wallet.as_ref()), request.quantity())
            .await?;
        logger.log_dispatched(dispatched.handles.len(), dispatched.rejected.len());

        let outcomes = self
            .tracker
            .await_all(&dispatched.handles, self.config.mint.tx_timeout())
            .await;
        let confirmed = outcomes.iter().filter(|o| o.is_confirmed()).count() as u64;
        let first_confirmed = dispatched
            .handles
            .iter()
            .zip(&outcomes)
            .find(|(_, outcome)| outcome.is_confirmed())
            .map(|(handle, _)| handle.signature);

        let reconciliation = if dispatched.handles.is_empty() {
            None
        } else {
            let expected = pre_balance.saturating_sub(unit_price.saturating_mul(confirmed));
            let result = self
                .reconciler
                .reconcile(&address, &config.payment, expected)
                .await;
            logger.log_reconciled(result.converged, result.attempts);
            Some(result)
        };

        let outcome = classify(&BatchReport {
            requested: request.quantity(),
            outcomes,
            rejected: dispatched.rejected.len() as u32,
            reconciliation,
        });

        if outcome.minted() > 0 {
            self.apply_local_success(&config, outcome.minted(), unit_price, reconciliation)
                .await;
            if let Some(signature) = first_confirmed {
                self.record_explorer_link(&signature).await;
            }
        }
        if outcome.is_success() {
            if let Some(observer) = &self.observer {
                observer.on_celebrate(&outcome);
            }
        }

        logger.log_outcome(&outcome, started.elapsed().as_millis() as u64);
        Ok(outcome)
    }

    /// Reflect `minted` new items locally without waiting for a refresh
    async fn apply_local_success(
        &self,
        config: &SaleConfig,
        minted: u32,
        unit_price: u64,
        reconciliation: Option<Reconciliation>,
    ) {
        let minted = minted as u64;

        let updated = {
            let mut sale = self.sale.write().await;
            if let Some(cached) = sale.as_mut() {
                cached.items_redeemed = (cached.items_redeemed + minted).min(cached.items_available);
            }
            sale.clone()
        };

        let context = {
            let mut context = self.context.write().await;
            if let Some(ctx) = context.as_mut() {
                if config.burns_allowlist_token() {
                    ctx.allowlist_token_balance = ctx.allowlist_token_balance.saturating_sub(minted);
                }
                let fees = self.config.mint.fee_estimate_lamports.saturating_mul(minted);
                ctx.payment_balance = match reconciliation.and_then(|r| r.last_observed) {
                    Some(observed) => observed,
                    None => {
                        let spent = unit_price.saturating_mul(minted);
                        match config.payment {
                            PaymentToken::Native => ctx.payment_balance.saturating_sub(spent + fees),
                            PaymentToken::Fungible { .. } => ctx.payment_balance.saturating_sub(spent),
                        }
                    }
                };
                ctx.native_balance = match config.payment {
                    PaymentToken::Native => ctx.payment_balance,
                    PaymentToken::Fungible { .. } => ctx.native_balance.saturating_sub(fees),
                };
            }
            *context
        };

        if let Some(sale) = updated {
            let view = self.publish(&sale, context.as_ref());
            info!(
                minted,
                remaining = view.items_remaining,
                phase = %view.phase,
                "Local sale state updated"
            );
        }
    }

    async fn record_explorer_link(&self, signature: &Signature) {
        let url = self.config.sale.cluster.explorer_url(signature);
        debug!(url = %url, "Mint explorer link");
        *self.explorer_link.write().await = Some(url);
    }

    fn publish(&self, config: &SaleConfig, context: Option<&WalletContext>) -> SaleView {
        let view = self.evaluator.evaluate(config, Utc::now(), context);
        self.view.store(Arc::new(view.clone()));
        view
    }
}
