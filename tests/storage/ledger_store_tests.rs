//! LedgerStore interface tests.
//!
//! These tests verify the contract of the LedgerStore trait.
//! Each storage implementation should run these tests.

use chrono::Duration;
use loyalty_ledger::interfaces::{LedgerStore, StorageError};
use loyalty_ledger::model::{
    Balance, Direction, HistoryQuery, OrderKey, Posting, TransactionDraft, TransactionKind,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::now;

fn draft(member_id: &str, kind: TransactionKind, points: Decimal, order_no: Option<&str>) -> TransactionDraft {
    TransactionDraft {
        member_id: member_id.to_string(),
        relation_id: None,
        kind,
        points,
        amount: 100,
        order_no: order_no.map(str::to_string),
    }
}

fn consume_key(member_id: &str, order_no: &str) -> OrderKey {
    OrderKey {
        member_id: member_id.to_string(),
        order_no: order_no.to_string(),
        kind: TransactionKind::Consume,
    }
}

/// Credit `points` to a member as a plain self-gain.
async fn fund<S: LedgerStore>(store: &S, member_id: &str, points: Decimal) {
    store
        .post(
            Posting::new(now(), None)
                .delta(member_id, points, points)
                .record(draft(member_id, TransactionKind::SelfGain, points, None)),
        )
        .await
        .expect("funding post should succeed");
}

// =============================================================================
// LedgerStore::balance tests
// =============================================================================

pub async fn test_balance_defaults_to_zero<S: LedgerStore>(store: &S) {
    let balance = store.balance("ls_nobody").await.expect("balance should succeed");
    assert_eq!(balance, Balance::default());
}

// =============================================================================
// LedgerStore::post tests
// =============================================================================

pub async fn test_post_applies_deltas_and_records<S: LedgerStore>(store: &S) {
    let posting = Posting::new(now(), Some(consume_key("ls_post_m", "LS-O1")))
        .delta("ls_post_m", dec!(12.5), dec!(12.5))
        .delta("ls_post_r", dec!(2.25), dec!(2.25))
        .record(draft("ls_post_m", TransactionKind::SelfGain, dec!(12.5), Some("LS-O1")))
        .record(TransactionDraft {
            relation_id: Some("ls_post_m".into()),
            ..draft("ls_post_r", TransactionKind::ReferralGain, dec!(2.25), Some("LS-O1"))
        })
        .record(draft("ls_post_m", TransactionKind::Consume, Decimal::ZERO, Some("LS-O1")));

    let written = store.post(posting).await.expect("post should succeed");
    assert_eq!(written.len(), 3);
    assert!(
        written.windows(2).all(|w| w[0].id < w[1].id),
        "ids should ascend in posting order"
    );
    assert_eq!(written[1].relation_id.as_deref(), Some("ls_post_m"));

    let member = store.balance("ls_post_m").await.unwrap();
    assert_eq!(member.available, dec!(12.5));
    assert_eq!(member.lifetime, dec!(12.5));
    let referrer = store.balance("ls_post_r").await.unwrap();
    assert_eq!(referrer.available, dec!(2.25));
}

pub async fn test_post_folds_repeated_member<S: LedgerStore>(store: &S) {
    fund(store, "ls_fold", dec!(10)).await;

    // Spend 10, earn 3 in the same unit.
    let posting = Posting::new(now(), None)
        .delta("ls_fold", dec!(-10), Decimal::ZERO)
        .delta("ls_fold", dec!(3), dec!(3));
    store.post(posting).await.expect("post should succeed");

    let balance = store.balance("ls_fold").await.unwrap();
    assert_eq!(balance.available, dec!(3));
    assert_eq!(balance.lifetime, dec!(13));
}

pub async fn test_post_rejects_overdraw_atomically<S: LedgerStore>(store: &S) {
    fund(store, "ls_floor_a", dec!(5)).await;

    let posting = Posting::new(now(), Some(consume_key("ls_floor_a", "LS-O2")))
        .delta("ls_floor_b", dec!(1), dec!(1))
        .delta("ls_floor_a", dec!(-5.01), Decimal::ZERO)
        .record(draft("ls_floor_b", TransactionKind::SelfGain, dec!(1), Some("LS-O2")))
        .record(draft("ls_floor_a", TransactionKind::Consume, dec!(-5.01), Some("LS-O2")));

    let result = store.post(posting).await;
    assert!(
        matches!(result, Err(StorageError::InsufficientBalance)),
        "overdraw should be rejected"
    );

    assert_eq!(store.balance("ls_floor_a").await.unwrap().available, dec!(5));
    assert_eq!(store.balance("ls_floor_b").await.unwrap(), Balance::default());
    assert!(
        store
            .find_order(&consume_key("ls_floor_a", "LS-O2"))
            .await
            .unwrap()
            .is_none(),
        "no record should survive a rejected posting"
    );
}

pub async fn test_post_rejects_duplicate_order<S: LedgerStore>(store: &S) {
    let first = Posting::new(now(), Some(consume_key("ls_dup", "LS-O3")))
        .delta("ls_dup", dec!(1), dec!(1))
        .record(draft("ls_dup", TransactionKind::Consume, Decimal::ZERO, Some("LS-O3")));
    store.post(first.clone()).await.expect("first post should succeed");

    let replay = store.post(first).await;
    assert!(matches!(replay, Err(StorageError::DuplicateOrder)));
    assert_eq!(
        store.balance("ls_dup").await.unwrap().available,
        dec!(1),
        "replay must not touch the balance"
    );

    // Same order number, different kind.
    let cashout = Posting::new(
        now(),
        Some(OrderKey {
            kind: TransactionKind::Cashout,
            ..consume_key("ls_dup", "LS-O3")
        }),
    )
    .delta("ls_dup", dec!(-1), Decimal::ZERO)
    .record(draft("ls_dup", TransactionKind::Cashout, dec!(-1), Some("LS-O3")));
    store.post(cashout).await.expect("cashout with same order should succeed");

    // Same order number, different member.
    let other = Posting::new(now(), Some(consume_key("ls_dup_other", "LS-O3")))
        .record(draft("ls_dup_other", TransactionKind::Consume, Decimal::ZERO, Some("LS-O3")));
    store.post(other).await.expect("other member's order should succeed");
}

pub async fn test_find_order<S: LedgerStore>(store: &S) {
    let posting = Posting::new(now(), Some(consume_key("ls_find", "LS-O4")))
        .record(draft("ls_find", TransactionKind::Consume, Decimal::ZERO, Some("LS-O4")));
    let written = store.post(posting).await.unwrap();

    let found = store
        .find_order(&consume_key("ls_find", "LS-O4"))
        .await
        .unwrap()
        .expect("order should be found");
    assert_eq!(found, written[0]);

    assert!(store
        .find_order(&consume_key("ls_find", "LS-O5"))
        .await
        .unwrap()
        .is_none());
}

// =============================================================================
// LedgerStore::history tests
// =============================================================================

pub async fn test_history_direction_and_order<S: LedgerStore>(store: &S) {
    let base = now() - Duration::days(3);
    for (day, points) in [(0, dec!(1)), (1, dec!(2)), (2, dec!(3))] {
        store
            .post(
                Posting::new(base + Duration::days(day), None)
                    .delta("ls_hist", points, points)
                    .record(draft("ls_hist", TransactionKind::SelfGain, points, None))
                    .record(draft("ls_hist", TransactionKind::Consume, Decimal::ZERO, None)),
            )
            .await
            .unwrap();
    }

    let gains = store
        .history(&HistoryQuery::new("ls_hist", Direction::Gain))
        .await
        .unwrap();
    let points: Vec<Decimal> = gains.iter().map(|tx| tx.points).collect();
    assert_eq!(points, vec![dec!(3), dec!(2), dec!(1)], "newest first");

    let spends = store
        .history(&HistoryQuery::new("ls_hist", Direction::Spend))
        .await
        .unwrap();
    assert_eq!(spends.len(), 3);
    assert!(spends.iter().all(|tx| tx.kind == TransactionKind::Consume));
}

pub async fn test_history_same_instant_ties_by_id<S: LedgerStore>(store: &S) {
    let at = now();
    store
        .post(
            Posting::new(at, None)
                .delta("ls_tie", dec!(3), dec!(3))
                .record(draft("ls_tie", TransactionKind::SelfGain, dec!(1), None))
                .record(draft("ls_tie", TransactionKind::SelfGain, dec!(2), None)),
        )
        .await
        .unwrap();

    let rows = store
        .history(&HistoryQuery::new("ls_tie", Direction::Gain))
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].id > rows[1].id, "ties should break by id descending");
}

pub async fn test_history_bounds_and_paging<S: LedgerStore>(store: &S) {
    let base = now() - Duration::days(10);
    for day in 0..5 {
        let points = Decimal::from(day + 1);
        store
            .post(
                Posting::new(base + Duration::days(day), None)
                    .delta("ls_page", points, points)
                    .record(draft("ls_page", TransactionKind::SelfGain, points, None)),
            )
            .await
            .unwrap();
    }

    let bounded = store
        .history(
            &HistoryQuery::new("ls_page", Direction::Gain)
                .between(Some(base + Duration::days(1)), Some(base + Duration::days(3))),
        )
        .await
        .unwrap();
    let points: Vec<Decimal> = bounded.iter().map(|tx| tx.points).collect();
    assert_eq!(points, vec![dec!(4), dec!(3), dec!(2)], "bounds are inclusive");

    let page = store
        .history(&HistoryQuery::new("ls_page", Direction::Gain).page(2, 1))
        .await
        .unwrap();
    let points: Vec<Decimal> = page.iter().map(|tx| tx.points).collect();
    assert_eq!(points, vec![dec!(4), dec!(3)]);

    let unbounded = store
        .history(&HistoryQuery::new("ls_page", Direction::Gain).page(0, 3))
        .await
        .unwrap();
    assert_eq!(unbounded.len(), 2, "offset without a page size");
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all LedgerStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_ledger_store_tests {
    ($store:expr) => {
        use $crate::storage::ledger_store_tests::*;

        test_balance_defaults_to_zero($store).await;
        println!("  test_balance_defaults_to_zero: PASSED");

        test_post_applies_deltas_and_records($store).await;
        println!("  test_post_applies_deltas_and_records: PASSED");

        test_post_folds_repeated_member($store).await;
        println!("  test_post_folds_repeated_member: PASSED");

        test_post_rejects_overdraw_atomically($store).await;
        println!("  test_post_rejects_overdraw_atomically: PASSED");

        test_post_rejects_duplicate_order($store).await;
        println!("  test_post_rejects_duplicate_order: PASSED");

        test_find_order($store).await;
        println!("  test_find_order: PASSED");

        test_history_direction_and_order($store).await;
        println!("  test_history_direction_and_order: PASSED");

        test_history_same_instant_ties_by_id($store).await;
        println!("  test_history_same_instant_ties_by_id: PASSED");

        test_history_bounds_and_paging($store).await;
        println!("  test_history_bounds_and_paging: PASSED");
    };
}
