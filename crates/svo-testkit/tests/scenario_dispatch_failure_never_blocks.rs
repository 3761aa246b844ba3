//! Scenario: Event dispatch is fire-and-forget.
//!
//! # Invariant under test
//! A dispatcher that fails on every event never blocks or undoes a
//! committed transition. With the journal dispatcher, every committed
//! transition leaves one hash-chained line that verifies.
//!
//! All tests are pure in-process; no DB or network required.

use std::sync::Arc;

use svo_audit::{read_journal, verify_journal, VerifyResult};
use svo_orders::OrderStatus;
use svo_pricing::Money;
use svo_runtime::JournalDispatcher;
use svo_schemas::event_names;
use svo_testkit::{proposal, FailingDispatcher, Harness, RecordingDispatcher, BELT, DIAGNOSIS};

#[tokio::test]
async fn failing_dispatcher_does_not_block_transitions() {
    let failing = Arc::new(FailingDispatcher::new());
    let h = Harness::with_dispatcher(failing.clone(), Arc::new(RecordingDispatcher::new()));

    let order = h.active_order(&[DIAGNOSIS]).await.unwrap();
    let a = h
        .desk
        .propose_amendment(&proposal(order.order_id, &[BELT], "belt cracked"))
        .await
        .unwrap();
    let report = h
        .desk
        .reject_amendment(order.order_id, a.amendment_id)
        .await
        .unwrap();
    assert!(report.is_clean());

    let snap = h.desk.snapshot(order.order_id).await.unwrap();
    assert_eq!(snap.order.status, OrderStatus::Active);
    assert_eq!(snap.order.total, Money::new(1_160));
    // created, authorized, proposed, rejected
    assert_eq!(failing.attempts(), 4);
}

#[tokio::test]
async fn journal_dispatcher_chains_every_event() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("svo_journal.jsonl");
    let journal = Arc::new(JournalDispatcher::open(&path, true).unwrap());
    let h = Harness::with_dispatcher(journal, Arc::new(RecordingDispatcher::new()));

    let order = h.active_order(&[DIAGNOSIS]).await.unwrap();
    let a = h
        .desk
        .propose_amendment(&proposal(order.order_id, &[BELT], "belt cracked"))
        .await
        .unwrap();
    h.desk
        .approve_amendment(order.order_id, a.amendment_id, &svo_testkit::signer("Ana Client"))
        .await
        .unwrap();

    assert_eq!(verify_journal(&path).unwrap(), VerifyResult::Valid { lines: 4 });
    let entries = read_journal(&path).unwrap();
    assert_eq!(
        entries.iter().map(|e| e.event_name.as_str()).collect::<Vec<_>>(),
        vec![
            event_names::ORDER_CREATED,
            event_names::ORDER_AUTHORIZED,
            event_names::AMENDMENT_PROPOSED,
            event_names::AMENDMENT_APPROVED,
        ]
    );
    assert!(entries.iter().all(|e| e.order_id == order.order_id));
}
