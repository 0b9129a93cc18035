//! Test Utilities Module
//!
//! Scripted ledger, wallet, transaction builder and human gate used to drive
//! the engine deterministically without a network.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use solana_sdk::{
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    message::Message,
    pubkey::Pubkey,
    signature::Signature,
    transaction::{Transaction, VersionedTransaction},
};
use spl_associated_token_account::get_associated_token_address;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::errors::MintError;
use crate::gatekeeper::HumanGate;
use crate::mint::classifier::MintOutcome;
use crate::mint::MintObserver;
use crate::rpc::{LedgerRpc, SignatureStatus};
use crate::sale::reader::{
    encode_raw, RawCandyMachine, RawCandyMachineData, RawEndSettingType, RawEndSettings,
    RawGatekeeperConfig, RawWhitelistMintMode, RawWhitelistMintSettings,
};
use crate::tx_builder::MintTxBuilder;
use crate::types::SaleConfig;
use crate::wallet::WalletSigner;

pub const LAMPORTS: u64 = 1_000_000_000;

/// Builder for encoded candy machine accounts
#[derive(Debug, Clone)]
pub struct SaleFixture {
    raw: RawCandyMachine,
}

impl SaleFixture {
    /// Native-priced sale that went live a day ago
    pub fn public(items_available: u64, items_redeemed: u64, price: u64) -> Self {
        let go_live = (Utc::now() - ChronoDuration::days(1)).timestamp();
        Self {
            raw: RawCandyMachine {
                authority: Pubkey::new_unique().to_bytes(),
                wallet: Pubkey::new_unique().to_bytes(),
                token_mint: None,
                items_redeemed,
                data: RawCandyMachineData {
                    uuid: "ABC123".to_string(),
                    price,
                    symbol: "CNDY".to_string(),
                    seller_fee_basis_points: 500,
                    max_supply: 0,
                    is_mutable: true,
                    retain_authority: true,
                    go_live_date: Some(go_live),
                    end_settings: None,
                    creators: vec![],
                    hidden_settings: None,
                    whitelist_mint_settings: None,
                    items_available,
                    gatekeeper: None,
                },
            },
        }
    }

    pub fn with_go_live(mut self, go_live: Option<DateTime<Utc>>) -> Self {
        self.raw.data.go_live_date = go_live.map(|d| d.timestamp());
        self
    }

    pub fn with_token_mint(mut self, mint: Pubkey) -> Self {
        self.raw.token_mint = Some(mint.to_bytes());
        self
    }

    pub fn with_allowlist(
        mut self,
        mint: Pubkey,
        burn_every_time: bool,
        presale: bool,
        discount_price: Option<u64>,
    ) -> Self {
        self.raw.data.whitelist_mint_settings = Some(RawWhitelistMintSettings {
            mode: if burn_every_time {
                RawWhitelistMintMode::BurnEveryTime
            } else {
                RawWhitelistMintMode::NeverBurn
            },
            mint: mint.to_bytes(),
            presale,
            discount_price,
        });
        self
    }

    pub fn with_end_amount(mut self, amount: u64) -> Self {
        self.raw.data.end_settings = Some(RawEndSettings {
            end_setting_type: RawEndSettingType::Amount,
            number: amount,
        });
        self
    }

    pub fn with_end_date(mut self, date: DateTime<Utc>) -> Self {
        self.raw.data.end_settings = Some(RawEndSettings {
            end_setting_type: RawEndSettingType::Date,
            number: date.timestamp().max(0) as u64,
        });
        self
    }

    pub fn with_gatekeeper(mut self, network: Pubkey) -> Self {
        self.raw.data.gatekeeper = Some(RawGatekeeperConfig {
            gatekeeper_network: network.to_bytes(),
            expire_on_use: false,
        });
        self
    }

    pub fn go_live_at(&self) -> Option<DateTime<Utc>> {
        self.raw
            .data
            .go_live_date
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    pub fn encode(&self) -> Vec<u8> {
        encode_raw(&self.raw)
    }
}

/// What happens to the next submitted transaction
#[derive(Debug, Clone)]
pub enum SubmitPlan {
    /// Accepted; status queries return this status
    Land(SignatureStatus),
    /// Rejected at submission (e.g. preflight failure)
    Reject(MintError),
    /// Accepted but never reaches a final status
    NeverLand,
}

/// Scripted ledger
///
/// Balances are scripted per address; each read pops the front value
/// until one is left, which then sticks. Submissions follow the queued
/// plans, defaulting to `Land(Confirmed)`.
#[derive(Default)]
pub struct MockLedger {
    accounts: Mutex<HashMap<Pubkey, Vec<u8>>>,
    balances: Mutex<HashMap<Pubkey, VecDeque<u64>>>,
    token_balances: Mutex<HashMap<Pubkey, u64>>,
    plans: Mutex<VecDeque<SubmitPlan>>,
    statuses: Mutex<HashMap<Signature, SignatureStatus>>,
    account_failures: AtomicUsize,
    sent: AtomicU64,
    balance_reads: AtomicUsize,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_account(&self, id: Pubkey, data: Vec<u8>) {
        self.accounts.lock().await.insert(id, data);
    }

    pub async fn script_balances(&self, address: Pubkey, values: Vec<u64>) {
        self.balances
            .lock()
            .await
            .insert(address, values.into_iter().collect());
    }

    /// Set the balance of `owner`'s associated token account for `mint`
    pub async fn set_token_balance(&self, owner: &Pubkey, mint: &Pubkey, amount: u64) {
        self.token_balances
            .lock()
            .await
            .insert(get_associated_token_address(owner, mint), amount);
    }

    pub async fn plan_submissions(&self, plans: Vec<SubmitPlan>) {
        self.plans.lock().await.extend(plans);
    }

    /// Make the next `n` account reads fail with a transport error
    pub fn fail_account_reads(&self, n: usize) {
        self.account_failures.store(n, Ordering::SeqCst);
    }

    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn balance_reads(&self) -> usize {
        self.balance_reads.load(Ordering::SeqCst)
    }

    fn transport(message: &str) -> MintError {
        MintError::Transport {
            endpoint: "mock".to_string(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl LedgerRpc for MockLedger {
    async fn get_balance(&self, address: &Pubkey) -> Result<u64, MintError> {
        self.balance_reads.fetch_add(1, Ordering::SeqCst);
        let mut balances = self.balances.lock().await;
        let value = match balances.get_mut(address) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().copied(),
            None => None,
        };
        // Unknown accounts hold nothing, as on chain
        Ok(value.unwrap_or(0))
    }

    async fn get_account(&self, id: &Pubkey) -> Result<Option<Vec<u8>>, MintError> {
        let remaining = self.account_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.account_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Self::transport("connection reset"));
        }
        Ok(self.accounts.lock().await.get(id).cloned())
    }

    async fn get_token_balance(&self, token_account: &Pubkey) -> Result<u64, MintError> {
        self.token_balances
            .lock()
            .await
            .get(token_account)
            .copied()
            .ok_or_else(|| Self::transport("could not find account"))
    }

    async fn send_transaction(&self, _tx: &VersionedTransaction) -> Result<Signature, MintError> {
        let plan = self
            .plans
            .lock()
            .await
            .pop_front()
            .unwrap_or(SubmitPlan::Land(SignatureStatus::Confirmed));

        let status = match plan {
            SubmitPlan::Reject(err) => return Err(err),
            SubmitPlan::Land(status) => status,
            SubmitPlan::NeverLand => SignatureStatus::Pending,
        };

        let n = self.sent.fetch_add(1, Ordering::SeqCst) + 1;
        let mut bytes = [0u8; 64];
        bytes[..8].copy_from_slice(&n.to_le_bytes());
        let signature = Signature::from(bytes);
        self.statuses.lock().await.insert(signature, status);
        Ok(signature)
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<SignatureStatus, MintError> {
        Ok(self
            .statuses
            .lock()
            .await
            .get(signature)
            .cloned()
            .unwrap_or(SignatureStatus::Pending))
    }
}

/// Deterministic transaction builder
pub struct MockTxBuilder {
    built: AtomicUsize,
    fail_after: Option<usize>,
    delay: Duration,
}

impl MockTxBuilder {
    pub fn new() -> Self {
        Self {
            built: AtomicUsize::new(0),
            fail_after: None,
            delay: Duration::ZERO,
        }
    }

    /// Fail every build after the first `n`
    pub fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::new()
        }
    }

    /// Hold each build for `delay` (keeps a mint in flight)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn built_count(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }

    /// Placeholder transaction with `payer` as fee payer and signer
    pub fn placeholder_tx(payer: &Pubkey) -> VersionedTransaction {
        let ix = Instruction::new_with_bytes(
            Pubkey::new_from_array([7u8; 32]),
            &[0],
            vec![AccountMeta::new(*payer, true)],
        );
        let mut message = Message::new(&[ix], Some(payer));
        message.recent_blockhash = Hash::new_unique();
        VersionedTransaction::from(Transaction::new_unsigned(message))
    }
}

impl Default for MockTxBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MintTxBuilder for MockTxBuilder {
    async fn build_mint_transaction(
        &self,
        _sale: &SaleConfig,
        payer: &Pubkey,
    ) -> Result<VersionedTransaction, MintError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(limit) = self.fail_after {
            if self.built.load(Ordering::SeqCst) >= limit {
                return Err(MintError::DispatchFailed(
                    "mock build failed (configured to fail)".to_string(),
                ));
            }
        }
        self.built.fetch_add(1, Ordering::SeqCst);
        Ok(Self::placeholder_tx(payer))
    }
}

/// Wallet that signs nothing but can be told to decline
pub struct MockWallet {
    pubkey: Pubkey,
    decline: bool,
}

impl MockWallet {
    pub fn new(pubkey: Pubkey) -> Self {
        Self {
            pubkey,
            decline: false,
        }
    }

    pub fn declining(pubkey: Pubkey) -> Self {
        Self {
            pubkey,
            decline: true,
        }
    }
}

#[async_trait]
impl WalletSigner for MockWallet {
    fn pubkey(&self) -> Pubkey {
        self.pubkey
    }

    async fn sign_transaction(
        &self,
        tx: VersionedTransaction,
    ) -> Result<VersionedTransaction, MintError> {
        if self.decline {
            return Err(MintError::Signing("user rejected the request".to_string()));
        }
        Ok(tx)
    }
}

/// Human gate with a fixed answer
pub struct MockGate {
    pass: bool,
    checks: AtomicUsize,
}

impl MockGate {
    pub fn new(pass: bool) -> Self {
        Self {
            pass,
            checks: AtomicUsize::new(0),
        }
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HumanGate for MockGate {
    async fn verify(&self, _network: &Pubkey, _wallet: &Pubkey) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.pass
    }
}

/// Observer counting celebrations
#[derive(Default)]
pub struct CountingObserver {
    celebrations: AtomicUsize,
}

impl CountingObserver {
    pub fn celebrations(&self) -> usize {
        self.celebrations.load(Ordering::SeqCst)
    }
}

impl MintObserver for CountingObserver {
    fn on_celebrate(&self, _outcome: &MintOutcome) {
        self.celebrations.fetch_add(1, Ordering::SeqCst);
    }
}
