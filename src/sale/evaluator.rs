//! Sale-state evaluator
//!
//! Turns a [`SaleConfig`], the wall clock and the connected wallet's balances
//! into a [`SaleView`]. No I/O; the same inputs always give the same view.

use chrono::{DateTime, Utc};
use solana_sdk::native_token::LAMPORTS_PER_SOL;

use crate::types::{
    DisplayPrice, Eligibility, EndCondition, IneligibleReason, PaymentToken, SaleConfig,
    SalePhase, SaleView, WalletContext,
};

/// Pure phase/eligibility/price derivation
#[derive(Debug, Clone)]
pub struct SaleEvaluator {
    token_label: String,
}

impl SaleEvaluator {
    /// `token_label` names the payment token when the sale is not priced in SOL
    pub fn new(token_label: impl Into<String>) -> Self {
        Self {
            token_label: token_label.into(),
        }
    }

    pub fn evaluate(
        &self,
        config: &SaleConfig,
        now: DateTime<Utc>,
        wallet: Option<&WalletContext>,
    ) -> SaleView {
        let allowlist_balance = wallet.map(|w| w.allowlist_token_balance).unwrap_or(0);

        // Amount-based end shrinks the reported supply
        let cap = match config.end_condition {
            Some(EndCondition::ByAmount(n)) => n.min(config.items_available),
            _ => config.items_available,
        };
        let remaining = cap.saturating_sub(config.items_redeemed);

        let phase = self.phase(config, now, cap, allowlist_balance);

        let eligibility = match (phase, wallet) {
            (_, None) => Eligibility::Ineligible(IneligibleReason::WalletDisconnected),
            (p, Some(_)) if p.is_mintable() => Eligibility::Eligible,
            (SalePhase::SoldOut, _) => Eligibility::Ineligible(IneligibleReason::SoldOut),
            (SalePhase::Ended, _) => Eligibility::Ineligible(IneligibleReason::Ended),
            (SalePhase::PrivateOnly, _) => {
                Eligibility::Ineligible(IneligibleReason::AllowlistRequired)
            }
            _ => Eligibility::Ineligible(IneligibleReason::NotStarted),
        };

        SaleView {
            phase,
            eligibility,
            price: self.price(config, allowlist_balance),
            items_available: cap,
            items_redeemed: config.items_redeemed,
            items_remaining: remaining,
            allowlist_token_balance: allowlist_balance,
            burns_allowlist_token: config.burns_allowlist_token(),
            go_live_at: config.go_live_at,
            end_at: match phase {
                SalePhase::Ending(deadline) => Some(deadline),
                _ => None,
            },
            requires_gatekeeper: config.gatekeeper_network.is_some(),
            wallet_connected: wallet.is_some(),
        }
    }

    fn phase(
        &self,
        config: &SaleConfig,
        now: DateTime<Utc>,
        cap: u64,
        allowlist_balance: u64,
    ) -> SalePhase {
        // Physical supply first: redeemed == available is always SoldOut
        if config.is_sold_out() {
            return SalePhase::SoldOut;
        }
        if cap < config.items_available && config.items_redeemed >= cap {
            return SalePhase::Ended;
        }
        if let Some(end) = config.end_date() {
            if now >= end {
                return SalePhase::Ended;
            }
        }

        if let Some(allowlist) = &config.allowlist {
            if allowlist.presale && allowlist_balance > 0 {
                return SalePhase::AllowlistOpen;
            }
            if !allowlist.presale && allowlist.discount_price.is_none() && allowlist_balance == 0
            {
                return SalePhase::PrivateOnly;
            }
        }

        match config.go_live_at {
            Some(go_live) if now >= go_live => match config.end_date() {
                Some(end) => SalePhase::Ending(end),
                None => SalePhase::PublicOpen,
            },
            _ => SalePhase::NotStarted,
        }
    }

    fn price(&self, config: &SaleConfig, allowlist_balance: u64) -> DisplayPrice {
        let discount = config
            .allowlist
            .and_then(|a| a.discount_price)
            .filter(|d| allowlist_balance > 0 && *d != config.price);

        let raw = discount.unwrap_or(config.price);
        let (amount, label) = match config.payment {
            PaymentToken::Native => (raw as f64 / LAMPORTS_PER_SOL as f64, "SOL".to_string()),
            PaymentToken::Fungible { decimals, .. } => (
                raw as f64 / 10f64.powi(decimals as i32),
                self.token_label.clone(),
            ),
        };

        DisplayPrice {
            raw,
            amount,
            label,
            discounted: discount.is_some(),
        }
    }
}

impl Default for SaleEvaluator {
    fn default() -> Self {
        Self::new("TOKEN")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AllowlistMode, AllowlistSettings};
    use chrono::Duration;
    use proptest::prelude::*;
    use solana_sdk::pubkey::Pubkey;

    fn config(available: u64, redeemed: u64) -> SaleConfig {
        SaleConfig {
            sale_id: Pubkey::new_unique(),
            authority: Pubkey::new_unique(),
            treasury: Pubkey::new_unique(),
            items_available: available,
            items_redeemed: redeemed,
            price: 1_500_000_000,
            payment: PaymentToken::Native,
            go_live_at: Some(now() - Duration::hours(1)),
            end_condition: None,
            allowlist: None,
            gatekeeper_network: None,
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn wallet(allowlist_token_balance: u64) -> WalletContext {
        WalletContext {
            address: Pubkey::new_unique(),
            native_balance: 10 * LAMPORTS_PER_SOL,
            payment_balance: 10 * LAMPORTS_PER_SOL,
            allowlist_token_balance,
        }
    }

    fn allowlist(presale: bool, discount_price: Option<u64>) -> Option<AllowlistSettings> {
        Some(AllowlistSettings {
            mint: Pubkey::new_unique(),
            mode: AllowlistMode::BurnOnRedeem,
            presale,
            discount_price,
        })
    }

    #[test]
    fn test_public_sale_is_open_and_eligible() {
        let w = wallet(0);
        let view = SaleEvaluator::default().evaluate(&config(100, 10), now(), Some(&w));
        assert_eq!(view.phase, SalePhase::PublicOpen);
        assert_eq!(view.eligibility, Eligibility::Eligible);
        assert_eq!(view.items_remaining, 90);
        assert_eq!(view.price.amount, 1.5);
        assert_eq!(view.price.label, "SOL");
        assert!(view.wallet_connected);
    }

    #[test]
    fn test_disconnected_wallet_is_never_eligible() {
        let view = SaleEvaluator::default().evaluate(&config(100, 10), now(), None);
        assert_eq!(view.phase, SalePhase::PublicOpen);
        assert_eq!(
            view.eligibility,
            Eligibility::Ineligible(IneligibleReason::WalletDisconnected)
        );
    }

    #[test]
    fn test_before_go_live_and_missing_go_live() {
        let mut cfg = config(100, 0);
        cfg.go_live_at = Some(now() + Duration::minutes(5));
        let w = wallet(0);
        let view = SaleEvaluator::default().evaluate(&cfg, now(), Some(&w));
        assert_eq!(view.phase, SalePhase::NotStarted);
        assert_eq!(view.go_live_at, cfg.go_live_at);
        assert_eq!(
            view.eligibility,
            Eligibility::Ineligible(IneligibleReason::NotStarted)
        );

        cfg.go_live_at = None;
        let view = SaleEvaluator::default().evaluate(&cfg, now(), Some(&w));
        assert_eq!(view.phase, SalePhase::NotStarted);
    }

    #[test]
    fn test_presale_holder_mints_before_go_live() {
        let mut cfg = config(100, 0);
        cfg.go_live_at = Some(now() + Duration::days(1));
        cfg.allowlist = allowlist(true, None);

        let holder = wallet(2);
        let view = SaleEvaluator::default().evaluate(&cfg, now(), Some(&holder));
        assert_eq!(view.phase, SalePhase::AllowlistOpen);
        assert!(view.eligibility.is_eligible());
        assert_eq!(view.allowlist_token_balance, 2);
        assert!(view.burns_allowlist_token);

        let outsider = wallet(0);
        let view = SaleEvaluator::default().evaluate(&cfg, now(), Some(&outsider));
        assert_eq!(view.phase, SalePhase::NotStarted);
    }

    #[test]
    fn test_holder_only_sale_without_tokens_is_private() {
        let mut cfg = config(100, 0);
        cfg.allowlist = allowlist(false, None);
        let w = wallet(0);
        let view = SaleEvaluator::default().evaluate(&cfg, now(), Some(&w));
        assert_eq!(view.phase, SalePhase::PrivateOnly);
        assert_eq!(
            view.eligibility,
            Eligibility::Ineligible(IneligibleReason::AllowlistRequired)
        );
    }

    #[test]
    fn test_amount_cap_clamps_supply_and_ends_sale() {
        let mut cfg = config(100, 20);
        cfg.end_condition = Some(EndCondition::ByAmount(50));
        let view = SaleEvaluator::default().evaluate(&cfg, now(), None);
        assert_eq!(view.items_available, 50);
        assert_eq!(view.items_remaining, 30);
        assert_eq!(view.phase, SalePhase::PublicOpen);

        cfg.items_redeemed = 50;
        let view = SaleEvaluator::default().evaluate(&cfg, now(), None);
        assert_eq!(view.phase, SalePhase::Ended);
        assert_eq!(view.items_remaining, 0);

        // Cap equal to supply is an ordinary sell-out
        cfg.end_condition = Some(EndCondition::ByAmount(100));
        cfg.items_redeemed = 100;
        let view = SaleEvaluator::default().evaluate(&cfg, now(), None);
        assert_eq!(view.phase, SalePhase::SoldOut);
    }

    #[test]
    fn test_date_end_condition() {
        let mut cfg = config(100, 0);
        let deadline = now() + Duration::hours(2);
        cfg.end_condition = Some(EndCondition::ByDate(deadline));
        let w = wallet(0);

        let view = SaleEvaluator::default().evaluate(&cfg, now(), Some(&w));
        assert_eq!(view.phase, SalePhase::Ending(deadline));
        assert_eq!(view.end_at, Some(deadline));
        assert!(view.eligibility.is_eligible());

        let view = SaleEvaluator::default().evaluate(&cfg, deadline, Some(&w));
        assert_eq!(view.phase, SalePhase::Ended);
        assert_eq!(view.eligibility, Eligibility::Ineligible(IneligibleReason::Ended));
    }

    #[test]
    fn test_discount_price_applies_to_holders_only() {
        let mut cfg = config(100, 0);
        cfg.allowlist = allowlist(false, Some(500_000_000));

        let holder = wallet(1);
        let view = SaleEvaluator::default().evaluate(&cfg, now(), Some(&holder));
        assert!(view.price.discounted);
        assert_eq!(view.price.raw, 500_000_000);
        assert_eq!(view.price.amount, 0.5);

        let outsider = wallet(0);
        let view = SaleEvaluator::default().evaluate(&cfg, now(), Some(&outsider));
        assert!(!view.price.discounted);
        assert_eq!(view.price.raw, cfg.price);

        // Discount equal to the base price is not a discount
        cfg.allowlist = allowlist(false, Some(cfg.price));
        let view = SaleEvaluator::default().evaluate(&cfg, now(), Some(&holder));
        assert!(!view.price.discounted);
    }

    #[test]
    fn test_token_price_uses_decimals_and_label() {
        let mut cfg = config(10, 0);
        cfg.price = 2_500_000;
        cfg.payment = PaymentToken::Fungible {
            mint: Pubkey::new_unique(),
            decimals: 6,
        };
        let view = SaleEvaluator::new("USDC").evaluate(&cfg, now(), None);
        assert_eq!(view.price.amount, 2.5);
        assert_eq!(view.price.label, "USDC");
        assert_eq!(view.price.to_string(), "2.5 USDC");
    }

    #[test]
    fn test_gatekeeper_flag() {
        let mut cfg = config(10, 0);
        cfg.gatekeeper_network = Some(Pubkey::new_unique());
        let view = SaleEvaluator::default().evaluate(&cfg, now(), None);
        assert!(view.requires_gatekeeper);
    }

    proptest! {
        #[test]
        fn prop_fully_redeemed_is_sold_out(
            available in 0u64..10_000,
            offset_mins in -10_000i64..10_000,
            cap in proptest::option::of(0u64..20_000),
            balance in 0u64..5,
        ) {
            let mut cfg = config(available, available);
            cfg.go_live_at = Some(now() + Duration::minutes(offset_mins));
            cfg.end_condition = cap.map(EndCondition::ByAmount);
            cfg.allowlist = allowlist(balance % 2 == 0, None);
            let w = wallet(balance);
            let view = SaleEvaluator::default().evaluate(&cfg, now(), Some(&w));
            prop_assert_eq!(view.phase, SalePhase::SoldOut);
            prop_assert!(!view.eligibility.is_eligible());
            prop_assert_eq!(view.items_remaining, 0);
        }

        #[test]
        fn prop_evaluation_is_idempotent(
            available in 1u64..1_000,
            redeemed_frac in 0u64..=100,
            offset_mins in -600i64..600,
            balance in 0u64..3,
        ) {
            let redeemed = available * redeemed_frac / 100;
            let mut cfg = config(available, redeemed);
            cfg.go_live_at = Some(now() + Duration::minutes(offset_mins));
            let w = wallet(balance);
            let evaluator = SaleEvaluator::default();
            let first = evaluator.evaluate(&cfg, now(), Some(&w));
            let second = evaluator.evaluate(&cfg, now(), Some(&w));
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_remaining_never_exceeds_cap(
            available in 0u64..1_000,
            redeemed in 0u64..1_000,
            cap in 0u64..2_000,
        ) {
            let mut cfg = config(available, redeemed.min(available));
            cfg.end_condition = Some(EndCondition::ByAmount(cap));
            let view = SaleEvaluator::default().evaluate(&cfg, now(), None);
            prop_assert!(view.items_available <= available);
            prop_assert!(view.items_remaining <= view.items_available);
        }

        #[test]
        fn prop_go_live_is_the_only_gate_for_public_sales(
            offset_secs in -86_400i64..86_400,
        ) {
            let mut cfg = config(10, 0);
            cfg.go_live_at = Some(now() + Duration::seconds(offset_secs));
            let w = wallet(0);
            let view = SaleEvaluator::default().evaluate(&cfg, now(), Some(&w));
            if offset_secs <= 0 {
                prop_assert_eq!(view.phase, SalePhase::PublicOpen);
                prop_assert!(view.eligibility.is_eligible());
            } else {
                prop_assert_eq!(view.phase, SalePhase::NotStarted);
            }
        }
    }
}
