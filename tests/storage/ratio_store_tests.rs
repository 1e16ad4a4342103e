//! RatioStore interface tests.
//!
//! These run against a store that also implements MemberStore, since tier
//! replacement rewrites member referral links.

use loyalty_ledger::interfaces::{MemberStore, RatioStore};
use loyalty_ledger::model::{tiers_from_fractions, RatioSync, RatioTier, ReferralLink, REFERRAL_TIER};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::member;

async fn insert_linked<S: MemberStore>(store: &S, id: &str, ratio: Decimal) {
    let mut m = member(id, None, None, id);
    m.referral = Some(ReferralLink {
        referrer_id: "rs_root".into(),
        tier: REFERRAL_TIER,
        ratio,
    });
    store.insert(&m).await.expect("insert should succeed");
}

async fn recorded_ratio<S: MemberStore>(store: &S, id: &str) -> Decimal {
    store
        .get(id)
        .await
        .unwrap()
        .and_then(|m| m.referral)
        .map(|link| link.ratio)
        .expect("member should carry a link")
}

// =============================================================================
// RatioStore::load_tiers / replace_tiers tests
// =============================================================================

pub async fn test_load_empty<S: RatioStore>(store: &S) {
    let tiers = store.load_tiers().await.expect("load should succeed");
    assert!(tiers.is_empty(), "fresh store has no tiers");
}

pub async fn test_replace_then_load<S: RatioStore>(store: &S) {
    let first = tiers_from_fractions(&[dec!(0.1), dec!(0.05), dec!(0.01)]);
    store.replace_tiers(&first, &[]).await.unwrap();
    assert_eq!(store.load_tiers().await.unwrap(), first);

    // A shorter table drops the tiers it no longer names.
    let second = vec![RatioTier::new(0, dec!(0.2)), RatioTier::new(1, dec!(0.3))];
    store.replace_tiers(&second, &[]).await.unwrap();
    assert_eq!(store.load_tiers().await.unwrap(), second);
}

pub async fn test_replace_without_sync_keeps_links<S: RatioStore + MemberStore>(store: &S) {
    insert_linked(store, "rs_keep", dec!(0.05)).await;

    let rewritten = store
        .replace_tiers(&tiers_from_fractions(&[dec!(0.1), dec!(0.08)]), &[])
        .await
        .unwrap();
    assert_eq!(rewritten, 0);
    assert_eq!(recorded_ratio(store, "rs_keep").await, dec!(0.05));
}

pub async fn test_sync_matching_only<S: RatioStore + MemberStore>(store: &S) {
    insert_linked(store, "rs_match_a", dec!(0.05)).await;
    insert_linked(store, "rs_match_b", dec!(0.02)).await;

    let sync = RatioSync {
        tier: REFERRAL_TIER,
        from: dec!(0.05),
        to: dec!(0.08),
        update_all: false,
    };
    let rewritten = store
        .replace_tiers(&tiers_from_fractions(&[dec!(0.1), dec!(0.08)]), &[sync])
        .await
        .unwrap();
    assert_eq!(rewritten, 1);
    assert_eq!(recorded_ratio(store, "rs_match_a").await, dec!(0.08));
    assert_eq!(recorded_ratio(store, "rs_match_b").await, dec!(0.02));
}

pub async fn test_sync_update_all<S: RatioStore + MemberStore>(store: &S) {
    insert_linked(store, "rs_all_a", dec!(0.05)).await;
    insert_linked(store, "rs_all_b", dec!(0.02)).await;
    store
        .insert(&member("rs_all_unlinked", None, None, "Unlinked"))
        .await
        .unwrap();

    let sync = RatioSync {
        tier: REFERRAL_TIER,
        from: dec!(0.05),
        to: dec!(0.07),
        update_all: true,
    };
    let rewritten = store
        .replace_tiers(&tiers_from_fractions(&[dec!(0.1), dec!(0.07)]), &[sync])
        .await
        .unwrap();
    assert_eq!(rewritten, 2);
    assert_eq!(recorded_ratio(store, "rs_all_a").await, dec!(0.07));
    assert_eq!(recorded_ratio(store, "rs_all_b").await, dec!(0.07));
    assert!(store
        .get("rs_all_unlinked")
        .await
        .unwrap()
        .and_then(|m| m.referral)
        .is_none());
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all RatioStore interface tests. Takes a factory expression so each
/// test gets an empty store.
#[macro_export]
macro_rules! run_ratio_store_tests {
    ($make_store:expr) => {
        use $crate::storage::ratio_store_tests::*;

        test_load_empty(&$make_store).await;
        println!("  test_load_empty: PASSED");

        test_replace_then_load(&$make_store).await;
        println!("  test_replace_then_load: PASSED");

        test_replace_without_sync_keeps_links(&$make_store).await;
        println!("  test_replace_without_sync_keeps_links: PASSED");

        test_sync_matching_only(&$make_store).await;
        println!("  test_sync_matching_only: PASSED");

        test_sync_update_all(&$make_store).await;
        println!("  test_sync_update_all: PASSED");
    };
}
