//! Scenario: Approving an amendment signs for the new total.
//!
//! # Invariant under test
//! Approval writes an amendment signature for the current computed total
//! (1660), returns the order to active and leaves the total where the
//! proposal put it. The approved lines are frozen: later catalog drift does
//! not change what the client agreed to pay.
//!
//! All tests are pure in-process; no DB or network required.

use svo_orders::OrderStatus;
use svo_pricing::{Money, TotalSource};
use svo_schemas::{AmendmentResolution, SignatureKind};
use svo_testkit::{proposal, repriced_service, signer, Harness, BELT, DIAGNOSIS, INSPECTION};

#[tokio::test]
async fn approval_signs_for_1660_and_resumes_work() {
    let h = Harness::new();
    let order = h.active_order(&[DIAGNOSIS]).await.unwrap();
    let a = h
        .desk
        .propose_amendment(&proposal(order.order_id, &[BELT], "belt cracked"))
        .await
        .unwrap();

    let sig = h
        .desk
        .approve_amendment(order.order_id, a.amendment_id, &signer("Ana Client"))
        .await
        .unwrap();
    assert_eq!(sig.kind, SignatureKind::Amendment);
    assert_eq!(sig.authorized_amount, Money::new(1_660));
    assert_eq!(sig.reason, "belt cracked");
    assert_eq!(sig.amendment_id, Some(a.amendment_id));

    let snap = h.desk.snapshot(order.order_id).await.unwrap();
    assert_eq!(snap.order.status, OrderStatus::Active);
    assert_eq!(snap.order.total, Money::new(1_660));
    assert_eq!(snap.amendments[0].resolution, AmendmentResolution::Approved);
    assert!(snap.items.iter().all(|i| i.pricing.pricing_locked));
    assert_eq!(
        snap.signatures
            .iter()
            .map(|s| s.kind)
            .collect::<Vec<_>>(),
        vec![SignatureKind::Initial, SignatureKind::Amendment]
    );
}

#[tokio::test]
async fn approved_lines_ignore_catalog_drift() {
    let h = Harness::new();
    let order = h.active_order(&[DIAGNOSIS]).await.unwrap();
    let a = h
        .desk
        .propose_amendment(&proposal(order.order_id, &[INSPECTION], "timing check"))
        .await
        .unwrap();

    // Unapproved line follows the catalog.
    h.catalog
        .upsert(repriced_service(INSPECTION, "Inspection", 3_000));
    let pricing = h.desk.price_order(order.order_id).await.unwrap();
    assert_eq!(pricing.total, Money::new(1_160 + 3_480));

    // Approval freezes the line at the price the amendment proposed.
    let sig = h
        .desk
        .approve_amendment(order.order_id, a.amendment_id, &signer("Ana Client"))
        .await
        .unwrap();
    assert_eq!(sig.authorized_amount, a.new_total);
    h.catalog
        .upsert(repriced_service(INSPECTION, "Inspection", 9_000));

    let pricing = h.desk.price_order(order.order_id).await.unwrap();
    assert!(pricing
        .lines
        .iter()
        .all(|l| l.displayed.source == TotalSource::Locked));
    let inspection = pricing
        .lines
        .iter()
        .find(|l| l.catalog_ref == INSPECTION)
        .unwrap();
    assert_eq!(inspection.displayed.amount, Money::new(2_900));
}

#[tokio::test]
async fn approval_without_signer_name_writes_nothing() {
    let h = Harness::new();
    let order = h.active_order(&[DIAGNOSIS]).await.unwrap();
    let a = h
        .desk
        .propose_amendment(&proposal(order.order_id, &[INSPECTION], "timing check"))
        .await
        .unwrap();

    let err = h
        .desk
        .approve_amendment(order.order_id, a.amendment_id, &signer("   "))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("signer name"), "{err}");

    let snap = h.desk.snapshot(order.order_id).await.unwrap();
    assert_eq!(snap.order.status, OrderStatus::AwaitingAmendmentAuthorization);
    assert_eq!(snap.signatures.len(), 1);
    assert!(snap.amendments[0].is_pending());
}
