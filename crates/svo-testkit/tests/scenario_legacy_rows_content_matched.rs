//! Scenario: Rejecting an amendment whose rows carry no amendment link.
//!
//! # Invariant under test
//! Rows written without a link are located by content. A confident match
//! is deleted; anything the matcher cannot vouch for is left in place and
//! reported. A reversal that did not fully take is reported as
//! inconsistent, never as a clean success, while the rest of the reversal
//! still commits.
//!
//! All tests are pure in-process; no DB or network required.

use svo_orders::OrderStatus;
use svo_pricing::Money;
use svo_reconcile::{LocatePath, RejectionWarning, UnmatchedReason};
use svo_schemas::FulfillmentStatus;
use svo_testkit::{proposal, Harness, BELT, DIAGNOSIS};
use tracing_subscriber::EnvFilter;

/// `RUST_LOG=svo_runtime=debug` shows the rejection warnings.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn legacy_amendment(h: &Harness) -> (uuid::Uuid, uuid::Uuid, uuid::Uuid) {
    init_tracing();
    let order = h.active_order(&[DIAGNOSIS]).await.unwrap();
    let a = h
        .desk
        .propose_amendment(&proposal(order.order_id, &[BELT], "belt cracked"))
        .await
        .unwrap();
    assert_eq!(h.store.strip_amendment_links(a.amendment_id).unwrap(), 1);

    let snap = h.desk.snapshot(order.order_id).await.unwrap();
    let belt = snap
        .items
        .iter()
        .find(|i| i.catalog_ref == BELT)
        .unwrap()
        .item_id;
    (order.order_id, a.amendment_id, belt)
}

#[tokio::test]
async fn unlinked_row_is_matched_by_content() {
    let h = Harness::new();
    let (order_id, amendment_id, belt) = legacy_amendment(&h).await;

    let report = h
        .desk
        .reject_amendment(order_id, amendment_id)
        .await
        .unwrap();
    assert_eq!(report.path, LocatePath::ContentMatch);
    assert!(report.is_clean(), "warnings: {:?}", report.warnings());

    let snap = h.desk.snapshot(order_id).await.unwrap();
    assert!(snap.items.iter().all(|i| i.item_id != belt));
    assert_eq!(snap.order.total, Money::new(1_160));
    assert_eq!(snap.order.status, OrderStatus::Active);
}

#[tokio::test]
async fn row_with_work_started_is_left_and_reported() {
    let h = Harness::new();
    let (order_id, amendment_id, belt) = legacy_amendment(&h).await;
    h.desk
        .set_item_fulfillment(order_id, belt, FulfillmentStatus::InProgress)
        .await
        .unwrap();

    let report = h
        .desk
        .reject_amendment(order_id, amendment_id)
        .await
        .unwrap();
    assert!(!report.is_clean());
    assert_eq!(report.deleted, 0);
    assert!(report.warnings().iter().any(|w| matches!(
        w,
        RejectionWarning::UnmatchedEntry {
            reason: UnmatchedReason::NoCandidate,
            ..
        }
    )));

    // The rest of the reversal still commits.
    let snap = h.desk.snapshot(order_id).await.unwrap();
    assert!(snap.items.iter().any(|i| i.item_id == belt));
    assert!(snap.amendments.is_empty());
    assert_eq!(snap.order.total, Money::new(1_160));
    assert_eq!(snap.order.status, OrderStatus::Active);
}

#[tokio::test]
async fn delete_that_did_not_take_is_inconsistent() {
    let h = Harness::new();
    let (order_id, amendment_id, belt) = legacy_amendment(&h).await;
    h.store.stick_row(belt).unwrap();

    let report = h
        .desk
        .reject_amendment(order_id, amendment_id)
        .await
        .unwrap();
    assert!(!report.is_clean());
    assert!(report
        .warnings()
        .contains(&RejectionWarning::ItemCountMismatch {
            pre_count: 2,
            expected_removed: 1,
            post_count: 2,
        }));
    // The surviving row still prices in, so the live total drifts.
    let drift = report.total_drift.unwrap();
    assert_eq!(drift.restored, Money::new(1_160));
    assert_eq!(drift.recomputed, Money::new(1_660));
}

#[tokio::test]
async fn linked_row_with_work_started_is_skipped() {
    let h = Harness::new();
    let order = h.active_order(&[DIAGNOSIS]).await.unwrap();
    let a = h
        .desk
        .propose_amendment(&proposal(order.order_id, &[BELT], "belt cracked"))
        .await
        .unwrap();
    let belt = h
        .desk
        .snapshot(order.order_id)
        .await
        .unwrap()
        .items
        .iter()
        .find(|i| i.amendment_id == Some(a.amendment_id))
        .unwrap()
        .item_id;
    h.desk
        .set_item_fulfillment(order.order_id, belt, FulfillmentStatus::Completed)
        .await
        .unwrap();

    let report = h
        .desk
        .reject_amendment(order.order_id, a.amendment_id)
        .await
        .unwrap();
    assert_eq!(report.path, LocatePath::Linked);
    assert!(report
        .warnings()
        .contains(&RejectionWarning::LinkedRowSkipped { item_id: belt }));
}
