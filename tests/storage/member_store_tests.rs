//! MemberStore interface tests.
//!
//! These tests verify the contract of the MemberStore trait.
//! Each storage implementation should run these tests.

use chrono::Duration;
use loyalty_ledger::interfaces::{MemberStore, StorageError};
use loyalty_ledger::model::{MemberSearch, ReferralLink, REFERRAL_TIER};
use rust_decimal_macros::dec;

use super::{member, now};

// =============================================================================
// MemberStore::get / insert tests
// =============================================================================

pub async fn test_get_nonexistent<S: MemberStore>(store: &S) {
    let result = store.get("ms_nonexistent").await.expect("get should succeed");
    assert!(result.is_none(), "nonexistent member should be None");
}

pub async fn test_insert_and_get<S: MemberStore>(store: &S) {
    let mut new = member("ms_insert", Some("10000000001"), Some("MS-C-1"), "Insert Test");
    new.referral = Some(ReferralLink {
        referrer_id: "ms_insert_ref".into(),
        tier: REFERRAL_TIER,
        ratio: dec!(0.05),
    });
    store.insert(&new).await.expect("insert should succeed");

    let loaded = store
        .get("ms_insert")
        .await
        .expect("get should succeed")
        .expect("member should exist");
    assert_eq!(loaded, new, "stored member should round-trip");
}

pub async fn test_insert_duplicate_keys<S: MemberStore>(store: &S) {
    store
        .insert(&member("ms_dup_a", Some("10000000002"), Some("MS-C-2"), "A"))
        .await
        .unwrap();

    let same_phone = store
        .insert(&member("ms_dup_b", Some("10000000002"), None, "B"))
        .await;
    assert!(
        matches!(same_phone, Err(StorageError::DuplicateKey(_))),
        "taken phone should be rejected"
    );

    let same_card = store
        .insert(&member("ms_dup_c", None, Some("MS-C-2"), "C"))
        .await;
    assert!(
        matches!(same_card, Err(StorageError::DuplicateKey(_))),
        "taken card should be rejected"
    );

    assert!(store.get("ms_dup_b").await.unwrap().is_none());
    assert!(store.get("ms_dup_c").await.unwrap().is_none());
}

pub async fn test_members_without_keys_coexist<S: MemberStore>(store: &S) {
    store.insert(&member("ms_nokey_a", None, None, "")).await.unwrap();
    store.insert(&member("ms_nokey_b", None, None, "")).await.unwrap();
    assert!(store.get("ms_nokey_b").await.unwrap().is_some());
}

// =============================================================================
// Lookup tests
// =============================================================================

pub async fn test_find_by_phone_and_card<S: MemberStore>(store: &S) {
    store
        .insert(&member("ms_find", Some("10000000003"), Some("MS-C-3"), "Find"))
        .await
        .unwrap();

    let by_phone = store.find_by_phone("10000000003").await.unwrap();
    assert_eq!(by_phone.map(|m| m.id).as_deref(), Some("ms_find"));

    let by_card = store.find_by_card("MS-C-3").await.unwrap();
    assert_eq!(by_card.map(|m| m.id).as_deref(), Some("ms_find"));

    assert!(store.find_by_phone("10000000999").await.unwrap().is_none());
    assert!(store.find_by_card("MS-C-999").await.unwrap().is_none());
}

pub async fn test_search_or_combined_in_creation_order<S: MemberStore>(store: &S) {
    let base = now();
    for (i, id) in ["ms_search_1", "ms_search_2", "ms_search_3"].iter().enumerate() {
        let mut m = member(id, None, None, &format!("Searchname {i}"));
        m.created_at = base + Duration::seconds(i as i64);
        store.insert(&m).await.unwrap();
    }
    let mut by_phone = member("ms_search_4", Some("10000000004"), None, "Other");
    by_phone.created_at = base + Duration::seconds(10);
    store.insert(&by_phone).await.unwrap();

    let hits = store
        .search(&MemberSearch::new("10000000004", "", "Searchname"))
        .await
        .unwrap();
    let ids: Vec<&str> = hits.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids.len(), 4, "phone and name hits should be combined");
    assert_eq!(&ids[..3], &["ms_search_1", "ms_search_2", "ms_search_3"]);

    let name_only = store
        .search(&MemberSearch::new("", "", "name 2"))
        .await
        .unwrap();
    assert_eq!(name_only.len(), 1, "name should match as a substring");
}

pub async fn test_search_name_wildcards_are_literal<S: MemberStore>(store: &S) {
    for (id, name) in [
        ("ms_wild_pct", "Wild 100% Club"),
        ("ms_wild_us", "Wild_Card"),
        ("ms_wild_bang", "Wild Bang!"),
        ("ms_wild_plain", "Wild Plain"),
    ] {
        store.insert(&member(id, None, None, name)).await.unwrap();
    }

    let ids = |hits: Vec<loyalty_ledger::model::Member>| -> Vec<String> {
        hits.into_iter().map(|m| m.id).collect()
    };

    let percent = store.search(&MemberSearch::new("", "", "%")).await.unwrap();
    assert_eq!(ids(percent), vec!["ms_wild_pct"], "'%' matches only itself");

    let underscore = store.search(&MemberSearch::new("", "", "_")).await.unwrap();
    assert_eq!(ids(underscore), vec!["ms_wild_us"], "'_' matches only itself");

    let bang = store.search(&MemberSearch::new("", "", "g!")).await.unwrap();
    assert_eq!(ids(bang), vec!["ms_wild_bang"]);

    let nothing = store
        .search(&MemberSearch::new("", "", "Wild%Plain"))
        .await
        .unwrap();
    assert!(nothing.is_empty());
}

pub async fn test_search_empty_returns_nothing<S: MemberStore>(store: &S) {
    let hits = store.search(&MemberSearch::default()).await.unwrap();
    assert!(hits.is_empty());
}

// =============================================================================
// MemberStore::update_profile tests
// =============================================================================

pub async fn test_update_profile<S: MemberStore>(store: &S) {
    store
        .insert(&member("ms_upd_a", Some("10000000005"), None, "Before"))
        .await
        .unwrap();
    store
        .insert(&member("ms_upd_b", Some("10000000006"), None, "Other"))
        .await
        .unwrap();

    store
        .update_profile("ms_upd_a", Some("10000000007"), Some("MS-C-7"), "After")
        .await
        .expect("update should succeed");
    let updated = store.get("ms_upd_a").await.unwrap().unwrap();
    assert_eq!(updated.phone.as_deref(), Some("10000000007"));
    assert_eq!(updated.card_no.as_deref(), Some("MS-C-7"));
    assert_eq!(updated.name, "After");
    assert!(store.find_by_phone("10000000005").await.unwrap().is_none());

    // Keeping its own keys is not a conflict.
    store
        .update_profile("ms_upd_a", Some("10000000007"), Some("MS-C-7"), "Again")
        .await
        .expect("re-saving own keys should succeed");

    let taken = store
        .update_profile("ms_upd_a", Some("10000000006"), None, "After")
        .await;
    assert!(matches!(taken, Err(StorageError::DuplicateKey(_))));

    let missing = store
        .update_profile("ms_upd_missing", None, None, "Nobody")
        .await;
    assert!(matches!(missing, Err(StorageError::NotFound(_))));
}

// =============================================================================
// Referral link tests
// =============================================================================

pub async fn test_set_referral_only_once<S: MemberStore>(store: &S) {
    store.insert(&member("ms_ref_root", None, None, "Root")).await.unwrap();
    store.insert(&member("ms_ref_other", None, None, "Other")).await.unwrap();
    store.insert(&member("ms_ref_child", None, None, "Child")).await.unwrap();

    let link = ReferralLink {
        referrer_id: "ms_ref_root".into(),
        tier: REFERRAL_TIER,
        ratio: dec!(0.05),
    };
    assert!(store.set_referral("ms_ref_child", &link).await.unwrap());

    let other = ReferralLink {
        referrer_id: "ms_ref_other".into(),
        ..link.clone()
    };
    assert!(
        !store.set_referral("ms_ref_child", &other).await.unwrap(),
        "existing link must not be replaced"
    );

    let child = store.get("ms_ref_child").await.unwrap().unwrap();
    assert_eq!(child.referral, Some(link.clone()));

    let missing = store.set_referral("ms_ref_missing", &link).await;
    assert!(matches!(missing, Err(StorageError::NotFound(_))));
}

pub async fn test_list_referred<S: MemberStore>(store: &S) {
    let base = now();
    store.insert(&member("ms_list_root", None, None, "Root")).await.unwrap();
    for (i, id) in ["ms_list_a", "ms_list_b"].iter().enumerate() {
        let mut child = member(id, None, None, id);
        child.created_at = base + Duration::seconds(i as i64);
        child.referral = Some(ReferralLink {
            referrer_id: "ms_list_root".into(),
            tier: REFERRAL_TIER,
            ratio: dec!(0.05),
        });
        store.insert(&child).await.unwrap();
    }
    let mut grandchild = member("ms_list_grand", None, None, "Grand");
    grandchild.referral = Some(ReferralLink {
        referrer_id: "ms_list_a".into(),
        tier: REFERRAL_TIER,
        ratio: dec!(0.05),
    });
    store.insert(&grandchild).await.unwrap();

    let children: Vec<String> = store
        .list_referred("ms_list_root")
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(children, vec!["ms_list_a", "ms_list_b"], "direct children only");
    assert!(store.list_referred("ms_list_grand").await.unwrap().is_empty());
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all MemberStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_member_store_tests {
    ($store:expr) => {
        use $crate::storage::member_store_tests::*;

        test_get_nonexistent($store).await;
        println!("  test_get_nonexistent: PASSED");

        test_insert_and_get($store).await;
        println!("  test_insert_and_get: PASSED");

        test_insert_duplicate_keys($store).await;
        println!("  test_insert_duplicate_keys: PASSED");

        test_members_without_keys_coexist($store).await;
        println!("  test_members_without_keys_coexist: PASSED");

        test_find_by_phone_and_card($store).await;
        println!("  test_find_by_phone_and_card: PASSED");

        test_search_or_combined_in_creation_order($store).await;
        println!("  test_search_or_combined_in_creation_order: PASSED");

        test_search_name_wildcards_are_literal($store).await;
        println!("  test_search_name_wildcards_are_literal: PASSED");

        test_search_empty_returns_nothing($store).await;
        println!("  test_search_empty_returns_nothing: PASSED");

        test_update_profile($store).await;
        println!("  test_update_profile: PASSED");

        test_set_referral_only_once($store).await;
        println!("  test_set_referral_only_once: PASSED");

        test_list_referred($store).await;
        println!("  test_list_referred: PASSED");
    };
}
