//! Scenario: A second amendment while the first is unresolved.
//!
//! # Invariant under test
//! Nothing prevents two unresolved amendments on one order. Each one moves
//! the total by its own delta, and resolving one of them takes back only
//! its own delta. The order keeps waiting on consent until the last one is
//! resolved.
//!
//! Racing resolutions of one amendment: exactly one wins.
//!
//! All tests are pure in-process; no DB or network required.

use svo_orders::OrderStatus;
use svo_pricing::Money;
use svo_reconcile::PreviousTotalDeviation;
use svo_testkit::{proposal, signer, Harness, BELT, DIAGNOSIS, HOSE};

#[tokio::test]
async fn second_proposal_is_accepted() {
    let h = Harness::new();
    let order = h.active_order(&[DIAGNOSIS]).await.unwrap();

    let first = h
        .desk
        .propose_amendment(&proposal(order.order_id, &[BELT], "belt cracked"))
        .await
        .unwrap();
    let second = h
        .desk
        .propose_amendment(&proposal(order.order_id, &[HOSE], "hose leaking"))
        .await
        .unwrap();

    assert_eq!(second.previous_total, first.new_total);
    assert_eq!(second.new_total, Money::new(2_660));

    let snap = h.desk.snapshot(order.order_id).await.unwrap();
    assert_eq!(snap.unresolved_amendments().count(), 2);
    assert_eq!(snap.order.status, OrderStatus::AwaitingAmendmentAuthorization);
}

#[tokio::test]
async fn each_rejection_takes_back_only_its_delta() {
    let h = Harness::new();
    let order = h.active_order(&[DIAGNOSIS]).await.unwrap();
    let first = h
        .desk
        .propose_amendment(&proposal(order.order_id, &[BELT], "belt cracked"))
        .await
        .unwrap();
    let second = h
        .desk
        .propose_amendment(&proposal(order.order_id, &[HOSE], "hose leaking"))
        .await
        .unwrap();

    let report = h
        .desk
        .reject_amendment(order.order_id, first.amendment_id)
        .await
        .unwrap();
    assert!(report.is_clean(), "warnings: {:?}", report.warnings());
    assert_eq!(
        report.previous_total_deviation,
        Some(PreviousTotalDeviation {
            previous_total: Money::new(1_160),
            restored: Money::new(2_160),
        })
    );

    let snap = h.desk.snapshot(order.order_id).await.unwrap();
    assert_eq!(snap.order.total, Money::new(2_160));
    assert_eq!(snap.order.status, OrderStatus::AwaitingAmendmentAuthorization);
    assert!(h.desk.is_awaiting_consent(order.order_id).await.unwrap());

    h.desk
        .reject_amendment(order.order_id, second.amendment_id)
        .await
        .unwrap();
    let snap = h.desk.snapshot(order.order_id).await.unwrap();
    assert_eq!(snap.order.total, Money::new(1_160));
    assert_eq!(snap.order.status, OrderStatus::Active);
    assert_eq!(snap.items.len(), 1);
    assert!(!h.desk.is_awaiting_consent(order.order_id).await.unwrap());
}

#[tokio::test]
async fn racing_approve_and_reject_has_one_winner() {
    let h = Harness::new();
    let order = h.active_order(&[DIAGNOSIS]).await.unwrap();
    let a = h
        .desk
        .propose_amendment(&proposal(order.order_id, &[BELT], "belt cracked"))
        .await
        .unwrap();

    let capture = signer("Ana Client");
    let (approved, rejected) = tokio::join!(
        h.desk
            .approve_amendment(order.order_id, a.amendment_id, &capture),
        h.desk.reject_amendment(order.order_id, a.amendment_id),
    );
    assert!(
        approved.is_ok() != rejected.is_ok(),
        "approve={approved:?} reject={rejected:?}"
    );

    let snap = h.desk.snapshot(order.order_id).await.unwrap();
    assert_eq!(snap.order.status, OrderStatus::Active);
    if approved.is_ok() {
        assert_eq!(snap.order.total, Money::new(1_660));
        assert_eq!(snap.items.len(), 2);
    } else {
        assert_eq!(snap.order.total, Money::new(1_160));
        assert_eq!(snap.items.len(), 1);
    }
}
