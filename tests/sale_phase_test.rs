//! Phase transitions of decoded sale accounts over time

use candy_mint::sale::{decode_sale_config, SaleEvaluator};
use candy_mint::test_utils::{SaleFixture, LAMPORTS};
use candy_mint::types::{Eligibility, IneligibleReason, WalletContext};
use candy_mint::SalePhase;
use chrono::{Duration, Utc};
use solana_sdk::pubkey::Pubkey;

fn wallet(allowlist_token_balance: u64) -> WalletContext {
    WalletContext {
        address: Pubkey::new_unique(),
        native_balance: 2 * LAMPORTS,
        payment_balance: 2 * LAMPORTS,
        allowlist_token_balance,
    }
}

#[test]
fn test_countdown_then_public_then_ending_then_ended() {
    let go_live = Utc::now() + Duration::hours(1);
    let end = go_live + Duration::hours(2);
    let fixture = SaleFixture::public(100, 0, LAMPORTS)
        .with_go_live(Some(go_live))
        .with_end_date(end);
    let config = decode_sale_config(Pubkey::new_unique(), &fixture.encode(), 9).unwrap();
    let evaluator = SaleEvaluator::default();
    let w = wallet(0);

    let before = evaluator.evaluate(&config, go_live - Duration::seconds(1), Some(&w));
    assert_eq!(before.phase, SalePhase::NotStarted);
    assert_eq!(before.go_live_at.map(|d| d.timestamp()), Some(go_live.timestamp()));

    let during = evaluator.evaluate(&config, go_live + Duration::minutes(1), Some(&w));
    assert!(matches!(during.phase, SalePhase::Ending(_)));
    assert!(during.eligibility.is_eligible());
    assert_eq!(during.end_at.map(|d| d.timestamp()), Some(end.timestamp()));

    let after = evaluator.evaluate(&config, end + Duration::seconds(1), Some(&w));
    assert_eq!(after.phase, SalePhase::Ended);
    assert_eq!(
        after.eligibility,
        Eligibility::Ineligible(IneligibleReason::Ended)
    );
}

#[test]
fn test_presale_opens_only_for_holders() {
    let fixture = SaleFixture::public(100, 0, LAMPORTS)
        .with_go_live(Some(Utc::now() + Duration::days(2)))
        .with_allowlist(Pubkey::new_unique(), false, true, Some(LAMPORTS / 2));
    let config = decode_sale_config(Pubkey::new_unique(), &fixture.encode(), 9).unwrap();
    let evaluator = SaleEvaluator::default();

    let holder = evaluator.evaluate(&config, Utc::now(), Some(&wallet(1)));
    assert_eq!(holder.phase, SalePhase::AllowlistOpen);
    assert!(holder.price.discounted);
    assert_eq!(holder.price.amount, 0.5);
    assert!(!holder.burns_allowlist_token);

    let outsider = evaluator.evaluate(&config, Utc::now(), Some(&wallet(0)));
    assert_eq!(outsider.phase, SalePhase::NotStarted);
    assert_eq!(outsider.price.amount, 1.0);
}

#[test]
fn test_missing_go_live_never_opens() {
    let fixture = SaleFixture::public(10, 0, LAMPORTS).with_go_live(None);
    let config = decode_sale_config(Pubkey::new_unique(), &fixture.encode(), 9).unwrap();
    let view = SaleEvaluator::default().evaluate(
        &config,
        Utc::now() + Duration::days(365),
        Some(&wallet(0)),
    );
    assert_eq!(view.phase, SalePhase::NotStarted);
    assert!(view.go_live_at.is_none());
}

#[test]
fn test_amount_cap_reached() {
    let fixture = SaleFixture::public(1_000, 250, LAMPORTS).with_end_amount(250);
    let config = decode_sale_config(Pubkey::new_unique(), &fixture.encode(), 9).unwrap();
    let view = SaleEvaluator::default().evaluate(&config, Utc::now(), Some(&wallet(0)));
    assert_eq!(view.phase, SalePhase::Ended);
    assert_eq!(view.items_available, 250);
    assert_eq!(view.items_remaining, 0);
}

#[test]
fn test_token_priced_sale_label() {
    let fixture = SaleFixture::public(10, 0, 15_000_000).with_token_mint(Pubkey::new_unique());
    let config = decode_sale_config(Pubkey::new_unique(), &fixture.encode(), 6).unwrap();
    let view = SaleEvaluator::new("USDC").evaluate(&config, Utc::now(), None);
    assert_eq!(view.price.to_string(), "15 USDC");
}
