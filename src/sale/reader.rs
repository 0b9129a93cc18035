//! Sale configuration reader
//!
//! Fetches the candy machine account and decodes it into a [`SaleConfig`].
//! The account is an Anchor account: an 8-byte discriminator followed by
//! the Borsh-encoded body. Trailing config-line data is ignored.

use borsh::{BorshDeserialize, BorshSerialize};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::{strategy::ExponentialBackoff, RetryIf};
use tracing::{debug, instrument};

use crate::errors::MintError;
use crate::rpc::LedgerRpc;
use crate::types::{
    AllowlistMode, AllowlistSettings, EndCondition, PaymentToken, SaleConfig, WalletContext,
};

/// Anchor discriminator of an account type
pub fn account_discriminator(name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("account:{}", name).as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

// On-chain layout of the candy machine v2 account.

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub(crate) struct RawCandyMachine {
    pub authority: [u8; 32],
    pub wallet: [u8; 32],
    pub token_mint: Option<[u8; 32]>,
    pub items_redeemed: u64,
    pub data: RawCandyMachineData,
}

#[allow(dead_code)]
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub(crate) struct RawCandyMachineData {
    pub uuid: String,
    pub price: u64,
    pub symbol: String,
    pub seller_fee_basis_points: u16,
    pub max_supply: u64,
    pub is_mutable: bool,
    pub retain_authority: bool,
    pub go_live_date: Option<i64>,
    pub end_settings: Option<RawEndSettings>,
    pub creators: Vec<RawCreator>,
    pub hidden_settings: Option<RawHiddenSettings>,
    pub whitelist_mint_settings: Option<RawWhitelistMintSettings>,
    pub items_available: u64,
    pub gatekeeper: Option<RawGatekeeperConfig>,
}

#[derive(Debug, Clone, Copy, BorshSerialize, BorshDeserialize)]
pub(crate) enum RawEndSettingType {
    Date,
    Amount,
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub(crate) struct RawEndSettings {
    pub end_setting_type: RawEndSettingType,
    pub number: u64,
}

#[allow(dead_code)]
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub(crate) struct RawCreator {
    pub address: [u8; 32],
    pub verified: bool,
    pub share: u8,
}

#[allow(dead_code)]
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub(crate) struct RawHiddenSettings {
    pub name: String,
    pub uri: String,
    pub hash: [u8; 32],
}

#[derive(Debug, Clone, Copy, BorshSerialize, BorshDeserialize)]
pub(crate) enum RawWhitelistMintMode {
    BurnEveryTime,
    NeverBurn,
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub(crate) struct RawWhitelistMintSettings {
    pub mode: RawWhitelistMintMode,
    pub mint: [u8; 32],
    pub presale: bool,
    pub discount_price: Option<u64>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub(crate) struct RawGatekeeperConfig {
    pub gatekeeper_network: [u8; 32],
    pub expire_on_use: bool,
}

fn timestamp(secs: i64, field: &str) -> Result<DateTime<Utc>, MintError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| MintError::ConfigUnavailable(format!("{} out of range: {}", field, secs)))
}

/// Decode raw candy machine account data
///
/// `payment_decimals` is applied when the sale is priced in an SPL token;
/// the account only records the token mint.
pub fn decode_sale_config(
    sale_id: Pubkey,
    data: &[u8],
    payment_decimals: u8,
) -> Result<SaleConfig, MintError> {
    if data.len() < 8 {
        return Err(MintError::ConfigUnavailable(format!(
            "account {} too short ({} bytes)",
            sale_id,
            data.len()
        )));
    }
    let (discriminator, mut body) = data.split_at(8);
    if discriminator != account_discriminator("CandyMachine") {
        return Err(MintError::ConfigUnavailable(format!(
            "account {} is not a candy machine",
            sale_id
        )));
    }

    let raw = RawCandyMachine::deserialize(&mut body).map_err(|e| {
        MintError::ConfigUnavailable(format!("failed to decode {}: {}", sale_id, e))
    })?;

    if raw.items_redeemed > raw.data.items_available {
        return Err(MintError::ConfigUnavailable(format!(
            "account {} redeemed {} of {} items",
            sale_id, raw.items_redeemed, raw.data.items_available
        )));
    }

    let payment = match raw.token_mint {
        Some(mint) => PaymentToken::Fungible {
            mint: Pubkey::new_from_array(mint),
            decimals: payment_decimals,
        },
        None => PaymentToken::Native,
    };

    let go_live_at = raw
        .data
        .go_live_date
        .map(|secs| timestamp(secs, "go_live_date"))
        .transpose()?;

    let end_condition = match raw.data.end_settings {
        Some(RawEndSettings {
            end_setting_type: RawEndSettingType::Date,
            number,
        }) => {
            let secs = i64::try_from(number).map_err(|_| {
                MintError::ConfigUnavailable(format!("end date out of range: {}", number))
            })?;
            Some(EndCondition::ByDate(timestamp(secs, "end_settings")?))
        }
        Some(RawEndSettings {
            end_setting_type: RawEndSettingType::Amount,
            number,
        }) => Some(EndCondition::ByAmount(number)),
        None => None,
    };

    let allowlist = raw.data.whitelist_mint_settings.map(|settings| {
        let mode = match (settings.mode, settings.presale) {
            (RawWhitelistMintMode::BurnEveryTime, _) => AllowlistMode::BurnOnRedeem,
            (RawWhitelistMintMode::NeverBurn, true) => AllowlistMode::Presale,
            (RawWhitelistMintMode::NeverBurn, false) => AllowlistMode::DiscountOnly,
        };
        AllowlistSettings {
            mint: Pubkey::new_from_array(settings.mint),
            mode,
            presale: settings.presale,
            discount_price: settings.discount_price,
        }
    });

    Ok(SaleConfig {
        sale_id,
        authority: Pubkey::new_from_array(raw.authority),
        treasury: Pubkey::new_from_array(raw.wallet),
        items_available: raw.data.items_available,
        items_redeemed: raw.items_redeemed,
        price: raw.data.price,
        payment,
        go_live_at,
        end_condition,
        allowlist,
        gatekeeper_network: raw
            .data
            .gatekeeper
            .map(|g| Pubkey::new_from_array(g.gatekeeper_network)),
    })
}

/// Balance of the sale's payment asset held by `owner`
pub async fn read_payment_balance(
    rpc: &dyn LedgerRpc,
    owner: &Pubkey,
    payment: &PaymentToken,
) -> Result<u64, MintError> {
    match payment {
        PaymentToken::Native => rpc.get_balance(owner).await,
        PaymentToken::Fungible { mint, .. } => {
            rpc.get_token_balance(&get_associated_token_address(owner, mint))
                .await
        }
    }
}

/// Reads the sale descriptor and the wallet's view of it
pub struct SaleReader {
    rpc: Arc<dyn LedgerRpc>,
    payment_decimals: u8,
    max_retries: usize,
}

impl SaleReader {
    pub fn new(rpc: Arc<dyn LedgerRpc>, payment_decimals: u8, max_retries: usize) -> Self {
        Self {
            rpc,
            payment_decimals,
            max_retries,
        }
    }

    /// Fetch and decode the sale account
    ///
    /// Transport failures are retried with backoff; anything left over is
    /// reported as `ConfigUnavailable`.
    #[instrument(skip(self), fields(sale = %sale_id))]
    pub async fn fetch_config(&self, sale_id: &Pubkey) -> Result<SaleConfig, MintError> {
        let strategy = ExponentialBackoff::from_millis(10)
            .max_delay(Duration::from_secs(2))
            .take(self.max_retries);

        let data = RetryIf::spawn(
            strategy,
            || self.rpc.get_account(sale_id),
            |e: &MintError| {
                debug!(error = %e, "Sale account read failed");
                e.is_retryable()
            },
        )
        .await
        .map_err(|e| match e {
            MintError::ConfigUnavailable(_) => e,
            other => MintError::ConfigUnavailable(other.to_string()),
        })?
        .ok_or_else(|| MintError::ConfigUnavailable(format!("account {} not found", sale_id)))?;

        decode_sale_config(*sale_id, &data, self.payment_decimals)
    }

    /// Read balances relevant to `config` for the connected wallet
    ///
    /// Missing token accounts count as a zero balance.
    #[instrument(skip(self, config), fields(wallet = %address))]
    pub async fn fetch_wallet_context(
        &self,
        address: Pubkey,
        config: &SaleConfig,
    ) -> Result<WalletContext, MintError> {
        let native_balance = self.rpc.get_balance(&address).await?;

        let payment_balance = match config.payment {
            PaymentToken::Native => native_balance,
            ref token => read_payment_balance(self.rpc.as_ref(), &address, token)
                .await
                .unwrap_or_else(|e| {
                    debug!(error = %e, "No payment token balance, treating as zero");
                    0
                }),
        };

        let allowlist_token_balance = match &config.allowlist {
            Some(settings) => {
                let ata = get_associated_token_address(&address, &settings.mint);
                match self.rpc.get_token_balance(&ata).await {
                    Ok(balance) => balance,
                    Err(e) => {
                        debug!(error = %e, "No allowlist token account, treating as zero");
                        0
                    }
                }
            }
            None => 0,
        };

        Ok(WalletContext {
            address,
            native_balance,
            payment_balance,
            allowlist_token_balance,
        })
    }
}

/// Encode a candy machine account, used to build fixtures
#[cfg(any(test, feature = "test_utils"))]
pub(crate) fn encode_raw(raw: &RawCandyMachine) -> Vec<u8> {
    let mut data = account_discriminator("CandyMachine").to_vec();
    data.extend(borsh::to_vec(raw).expect("in-memory borsh encoding"));
    // Config lines follow the fixed layout on chain
    data.extend_from_slice(&[0u8; 16]);
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::SaleFixture;

    #[test]
    fn test_decode_public_native_sale() {
        let fixture = SaleFixture::public(100, 40, 500_000_000);
        let sale_id = Pubkey::new_unique();
        let config = decode_sale_config(sale_id, &fixture.encode(), 9).unwrap();

        assert_eq!(config.sale_id, sale_id);
        assert_eq!(config.items_available, 100);
        assert_eq!(config.items_redeemed, 40);
        assert_eq!(config.items_remaining(), 60);
        assert_eq!(config.price, 500_000_000);
        assert_eq!(config.payment, PaymentToken::Native);
        assert_eq!(config.go_live_at, fixture.go_live_at());
        assert!(config.allowlist.is_none());
        assert!(config.gatekeeper_network.is_none());
    }

    #[test]
    fn test_decode_gated_token_sale() {
        let token_mint = Pubkey::new_unique();
        let wl_mint = Pubkey::new_unique();
        let network = Pubkey::new_unique();
        let fixture = SaleFixture::public(10, 0, 25_000_000)
            .with_token_mint(token_mint)
            .with_allowlist(wl_mint, true, true, Some(20_000_000))
            .with_end_amount(5)
            .with_gatekeeper(network);

        let config = decode_sale_config(Pubkey::new_unique(), &fixture.encode(), 6).unwrap();
        assert_eq!(
            config.payment,
            PaymentToken::Fungible {
                mint: token_mint,
                decimals: 6
            }
        );
        let allowlist = config.allowlist.unwrap();
        assert_eq!(allowlist.mint, wl_mint);
        assert_eq!(allowlist.mode, AllowlistMode::BurnOnRedeem);
        assert!(allowlist.presale);
        assert_eq!(allowlist.discount_price, Some(20_000_000));
        assert_eq!(config.end_condition, Some(EndCondition::ByAmount(5)));
        assert_eq!(config.gatekeeper_network, Some(network));
        assert!(config.burns_allowlist_token());
    }

    #[test]
    fn test_never_burn_mode_maps_on_presale_flag() {
        let wl = Pubkey::new_unique();
        let presale = SaleFixture::public(10, 0, 1)
            .with_allowlist(wl, false, true, None)
            .encode();
        let discount = SaleFixture::public(10, 0, 1)
            .with_allowlist(wl, false, false, Some(0))
            .encode();

        let presale = decode_sale_config(Pubkey::new_unique(), &presale, 9).unwrap();
        let discount = decode_sale_config(Pubkey::new_unique(), &discount, 9).unwrap();
        assert_eq!(presale.allowlist.unwrap().mode, AllowlistMode::Presale);
        assert_eq!(discount.allowlist.unwrap().mode, AllowlistMode::DiscountOnly);
    }

    #[test]
    fn test_decode_rejects_bad_accounts() {
        let id = Pubkey::new_unique();
        assert!(matches!(
            decode_sale_config(id, &[1, 2, 3], 9),
            Err(MintError::ConfigUnavailable(_))
        ));

        let mut wrong_owner = SaleFixture::public(10, 0, 1).encode();
        wrong_owner[0] ^= 0xff;
        assert!(matches!(
            decode_sale_config(id, &wrong_owner, 9),
            Err(MintError::ConfigUnavailable(_))
        ));

        let truncated = SaleFixture::public(10, 0, 1).encode();
        assert!(decode_sale_config(id, &truncated[..40], 9).is_err());

        let over_redeemed = SaleFixture::public(10, 11, 1).encode();
        assert!(decode_sale_config(id, &over_redeemed, 9).is_err());
    }
}
