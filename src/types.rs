//! Common types used throughout the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::fmt;

use crate::errors::MintError;

/// Asset the sale is paid in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentToken {
    /// Native SOL, priced in lamports
    Native,
    /// SPL token, priced in its smallest unit
    Fungible { mint: Pubkey, decimals: u8 },
}

/// Condition that closes the sale before supply runs out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndCondition {
    ByDate(DateTime<Utc>),
    ByAmount(u64),
}

/// How allowlist tokens are treated on redemption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllowlistMode {
    /// One allowlist token is burned per mint
    BurnOnRedeem,
    /// Holding the token grants access before go-live
    Presale,
    /// Holding the token only grants the discount price
    DiscountOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowlistSettings {
    pub mint: Pubkey,
    pub mode: AllowlistMode,
    pub presale: bool,
    pub discount_price: Option<u64>,
}

/// Snapshot of the on-chain sale descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleConfig {
    pub sale_id: Pubkey,
    pub authority: Pubkey,
    pub treasury: Pubkey,
    pub items_available: u64,
    pub items_redeemed: u64,
    pub price: u64,
    pub payment: PaymentToken,
    pub go_live_at: Option<DateTime<Utc>>,
    pub end_condition: Option<EndCondition>,
    pub allowlist: Option<AllowlistSettings>,
    pub gatekeeper_network: Option<Pubkey>,
}

impl SaleConfig {
    pub fn items_remaining(&self) -> u64 {
        self.items_available.saturating_sub(self.items_redeemed)
    }

    pub fn is_sold_out(&self) -> bool {
        self.items_remaining() == 0
    }

    /// True when every redemption burns one allowlist token
    pub fn burns_allowlist_token(&self) -> bool {
        matches!(
            self.allowlist,
            Some(AllowlistSettings {
                mode: AllowlistMode::BurnOnRedeem,
                ..
            })
        )
    }

    pub fn end_date(&self) -> Option<DateTime<Utc>> {
        match self.end_condition {
            Some(EndCondition::ByDate(date)) => Some(date),
            _ => None,
        }
    }
}

/// Derived state of the sale. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalePhase {
    NotStarted,
    PrivateOnly,
    AllowlistOpen,
    PublicOpen,
    /// Public sale with a date-based end still ahead
    Ending(DateTime<Utc>),
    Ended,
    SoldOut,
}

impl SalePhase {
    /// Phases in which a mint may be dispatched
    pub fn is_mintable(&self) -> bool {
        matches!(
            self,
            SalePhase::AllowlistOpen | SalePhase::PublicOpen | SalePhase::Ending(_)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SalePhase::Ended | SalePhase::SoldOut)
    }
}

impl fmt::Display for SalePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SalePhase::NotStarted => write!(f, "not started"),
            SalePhase::PrivateOnly => write!(f, "private"),
            SalePhase::AllowlistOpen => write!(f, "allowlist open"),
            SalePhase::PublicOpen => write!(f, "public open"),
            SalePhase::Ending(deadline) => write!(f, "ending at {}", deadline.to_rfc3339()),
            SalePhase::Ended => write!(f, "ended"),
            SalePhase::SoldOut => write!(f, "sold out"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IneligibleReason {
    WalletDisconnected,
    NotStarted,
    AllowlistRequired,
    Ended,
    SoldOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Eligibility {
    Eligible,
    Ineligible(IneligibleReason),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

/// Wallet state as last read from the ledger, patched locally after mints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletContext {
    pub address: Pubkey,

    /// Native balance in lamports
    pub native_balance: u64,

    /// Balance of the sale's payment asset (same as `native_balance` for SOL)
    pub payment_balance: u64,

    /// Allowlist tokens held (0 if none)
    pub allowlist_token_balance: u64,
}

/// Price as shown to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayPrice {
    /// Price charged per mint in the payment asset's smallest unit
    pub raw: u64,
    /// `raw` scaled to display units
    pub amount: f64,
    pub label: String,
    /// True when the allowlist discount applies and differs from the base price
    pub discounted: bool,
}

impl Default for DisplayPrice {
    fn default() -> Self {
        Self {
            raw: 0,
            amount: 0.0,
            label: "SOL".to_string(),
            discounted: false,
        }
    }
}

impl fmt::Display for DisplayPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.label)
    }
}

/// Immutable view of the sale, recomputed as a whole on every refresh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleView {
    pub phase: SalePhase,
    pub eligibility: Eligibility,
    pub price: DisplayPrice,

    /// Supply after clamping to an amount-based end condition
    pub items_available: u64,
    pub items_redeemed: u64,
    pub items_remaining: u64,

    pub allowlist_token_balance: u64,
    pub burns_allowlist_token: bool,

    /// Countdown target while `NotStarted`
    pub go_live_at: Option<DateTime<Utc>>,
    /// Countdown target while `Ending`
    pub end_at: Option<DateTime<Utc>>,

    pub requires_gatekeeper: bool,
    pub wallet_connected: bool,
}

impl SaleView {
    /// View used when the sale descriptor could not be read
    pub fn degraded(wallet_connected: bool) -> Self {
        Self {
            eligibility: Eligibility::Ineligible(if wallet_connected {
                IneligibleReason::NotStarted
            } else {
                IneligibleReason::WalletDisconnected
            }),
            wallet_connected,
            ..Self::default()
        }
    }
}

impl Default for SaleView {
    fn default() -> Self {
        Self {
            phase: SalePhase::NotStarted,
            eligibility: Eligibility::Ineligible(IneligibleReason::WalletDisconnected),
            price: DisplayPrice::default(),
            items_available: 0,
            items_redeemed: 0,
            items_remaining: 0,
            allowlist_token_balance: 0,
            burns_allowlist_token: false,
            go_live_at: None,
            end_at: None,
            requires_gatekeeper: false,
            wallet_connected: false,
        }
    }
}

/// Validated request for a mint action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintBatchRequest {
    quantity: u32,
}

impl MintBatchRequest {
    pub fn new(quantity: u32, max_batch_size: u32) -> Result<Self, MintError> {
        if quantity == 0 || quantity > max_batch_size {
            return Err(MintError::InvalidQuantity {
                quantity,
                max: max_batch_size,
            });
        }
        Ok(Self { quantity })
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }
}

/// Why a landed transaction failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxFailure {
    /// Custom program error code, when the failure carried one
    pub code: Option<u32>,
    pub message: String,
}

/// Final state of one submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxOutcome {
    Confirmed,
    Failed(TxFailure),
    TimedOut,
}

impl TxOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, TxOutcome::Confirmed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Success,
    Error,
}

/// The single user-facing result of a mint action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertState {
    pub open: bool,
    pub message: String,
    pub severity: Severity,
}

impl AlertState {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            open: true,
            message: message.into(),
            severity: Severity::Success,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            open: true,
            message: message.into(),
            severity: Severity::Error,
        }
    }
}

impl Default for AlertState {
    fn default() -> Self {
        Self {
            open: false,
            message: String::new(),
            severity: Severity::Info,
        }
    }
}
