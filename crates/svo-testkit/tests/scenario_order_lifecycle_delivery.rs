//! Scenario: Order lifecycle from creation to delivery.
//!
//! # Invariant under test
//! Work starts only after the initial signature, which freezes every line
//! at the price the client saw. Delivery can be requested only once every
//! non-cancelled item is completed, and the delivery signature ends the
//! order. Cancelled items do not count towards the total.
//!
//! All tests are pure in-process; no DB or network required.

use svo_orders::{OrderStatus, TransitionError};
use svo_pricing::Money;
use svo_runtime::DeskError;
use svo_schemas::{FulfillmentStatus, SignatureKind};
use svo_testkit::{repriced_service, signer, staff, units, Harness, BELT, DIAGNOSIS, HOSE};

#[tokio::test]
async fn new_order_waits_for_initial_signature() {
    let h = Harness::new();
    let order = h
        .desk
        .create_order("CLIENT-9", &units(&[DIAGNOSIS, BELT]))
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::AwaitingInitialAuthorization);
    assert_eq!(order.total, Money::new(1_660));
    assert!(h.desk.is_awaiting_consent(order.order_id).await.unwrap());

    // Price drift before signing is picked up by the signature.
    h.catalog
        .upsert(repriced_service(DIAGNOSIS, "Diagnosis", 1_500));
    let sig = h
        .desk
        .authorize_initial(order.order_id, &signer("Ana Client"))
        .await
        .unwrap();
    assert_eq!(sig.kind, SignatureKind::Initial);
    assert_eq!(sig.authorized_amount, Money::new(1_740 + 500));

    let snap = h.desk.snapshot(order.order_id).await.unwrap();
    assert_eq!(snap.order.status, OrderStatus::Active);
    assert_eq!(snap.order.total, Money::new(2_240));
    assert!(snap.items.iter().all(|i| i.pricing.pricing_locked));
    assert!(!h.desk.is_awaiting_consent(order.order_id).await.unwrap());

    // After signing, drift no longer moves the price.
    h.catalog
        .upsert(repriced_service(DIAGNOSIS, "Diagnosis", 5_000));
    let pricing = h.desk.price_order(order.order_id).await.unwrap();
    assert_eq!(pricing.total, Money::new(2_240));
}

#[tokio::test]
async fn empty_orders_are_refused() {
    let h = Harness::new();
    assert!(matches!(
        h.desk.create_order("CLIENT-9", &[]).await,
        Err(DeskError::EmptyOrder)
    ));
    assert!(matches!(
        h.desk.create_order("  ", &units(&[BELT])).await,
        Err(DeskError::EmptyClientRef)
    ));
}

#[tokio::test]
async fn delivery_needs_every_item_completed() {
    let h = Harness::new();
    let order = h.active_order(&[DIAGNOSIS, BELT, HOSE]).await.unwrap();
    assert_eq!(order.total, Money::new(2_660));
    let items = h.desk.snapshot(order.order_id).await.unwrap().items;
    let id_of = |r: &str| items.iter().find(|i| i.catalog_ref == r).unwrap().item_id;
    let (diag, belt, hose) = (id_of(DIAGNOSIS), id_of(BELT), id_of(HOSE));

    h.desk
        .set_item_fulfillment(order.order_id, diag, FulfillmentStatus::Completed)
        .await
        .unwrap();
    let err = h
        .desk
        .request_delivery_signature(order.order_id)
        .await
        .unwrap_err();
    assert!(matches!(err, DeskError::ItemsIncomplete { remaining: 2 }));

    h.desk
        .set_item_fulfillment(order.order_id, belt, FulfillmentStatus::InProgress)
        .await
        .unwrap();
    h.desk
        .set_item_fulfillment(order.order_id, belt, FulfillmentStatus::Completed)
        .await
        .unwrap();
    // Hose no longer needed.
    h.desk
        .set_item_fulfillment(order.order_id, hose, FulfillmentStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(
        h.desk.snapshot(order.order_id).await.unwrap().order.total,
        Money::new(1_660)
    );

    let o = h
        .desk
        .request_delivery_signature(order.order_id)
        .await
        .unwrap();
    assert_eq!(o.status, OrderStatus::AwaitingDeliverySignature);

    let sig = h
        .desk
        .sign_delivery(order.order_id, &signer("Ana Client"))
        .await
        .unwrap();
    assert_eq!(sig.kind, SignatureKind::Delivery);
    assert_eq!(sig.authorized_amount, Money::new(1_660));

    let snap = h.desk.snapshot(order.order_id).await.unwrap();
    assert_eq!(snap.order.status, OrderStatus::Delivered);
    assert_eq!(snap.signatures.len(), 2);

    let err = h
        .desk
        .cancel_order(order.order_id, &staff())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DeskError::Transition(TransitionError::Illegal {
            from: OrderStatus::Delivered,
            ..
        })
    ));
}

#[tokio::test]
async fn fulfillment_never_moves_backwards() {
    let h = Harness::new();
    let order = h.active_order(&[DIAGNOSIS]).await.unwrap();
    let item = h.desk.snapshot(order.order_id).await.unwrap().items[0].item_id;
    h.desk
        .set_item_fulfillment(order.order_id, item, FulfillmentStatus::Completed)
        .await
        .unwrap();

    let err = h
        .desk
        .set_item_fulfillment(order.order_id, item, FulfillmentStatus::Pending)
        .await
        .unwrap_err();
    assert!(matches!(err, DeskError::InvalidFulfillment { .. }));
}

#[tokio::test]
async fn unlocked_item_can_be_removed_before_signing() {
    let h = Harness::new();
    let order = h
        .desk
        .create_order("CLIENT-9", &units(&[DIAGNOSIS, BELT]))
        .await
        .unwrap();
    let belt = h
        .desk
        .snapshot(order.order_id)
        .await
        .unwrap()
        .items
        .into_iter()
        .find(|i| i.catalog_ref == BELT)
        .unwrap();

    let total = h.desk.remove_item(order.order_id, belt.item_id).await.unwrap();
    assert_eq!(total, Money::new(1_160));
    let snap = h.desk.snapshot(order.order_id).await.unwrap();
    assert_eq!(snap.items.len(), 1);
    assert_eq!(snap.order.total, Money::new(1_160));
}

#[tokio::test]
async fn signed_item_cannot_be_removed() {
    let h = Harness::new();
    let order = h.active_order(&[DIAGNOSIS, BELT]).await.unwrap();
    let item = h.desk.snapshot(order.order_id).await.unwrap().items[1].item_id;

    let err = h.desk.remove_item(order.order_id, item).await.unwrap_err();
    assert!(matches!(err, DeskError::ItemLocked { .. }));
}
