//! svo-testkit
//!
//! In-process doubles for exercising an [`svo_runtime::AmendmentDesk`]
//! without a database: an in-memory [`svo_runtime::OrderStore`] that keeps
//! the commit semantics of the Postgres store, recording and failing
//! dispatchers, and a small workshop catalog.

mod catalog;
mod dispatch;
mod store;

use std::sync::Arc;

use anyhow::Result;
use uuid::Uuid;

use svo_ledger::ProposalRequest;
use svo_orders::{Actor, ActorRole};
use svo_pricing::PricingRules;
use svo_reconcile::MatchPolicy;
use svo_runtime::{AmendmentDesk, EventDispatcher};
use svo_schemas::{ItemRequest, Order, SignatureCapture};

pub use catalog::{
    repriced_service, workshop_catalog, SwitchableCatalog, BELT, DIAGNOSIS, HOSE, INSPECTION,
};
pub use dispatch::{FailingDispatcher, RecordingDispatcher};
pub use store::InMemoryOrderStore;

/// A desk wired to in-memory collaborators, with handles kept for
/// assertions.
pub struct Harness {
    pub desk: AmendmentDesk,
    pub store: Arc<InMemoryOrderStore>,
    pub catalog: Arc<SwitchableCatalog>,
    pub events: Arc<RecordingDispatcher>,
}

impl Harness {
    /// Default rules and match policy, recording dispatcher.
    pub fn new() -> Self {
        let events = Arc::new(RecordingDispatcher::new());
        Self::with_dispatcher(events.clone(), events)
    }

    /// Events go to `dispatcher`; `events` stays empty unless it is the same
    /// recorder.
    pub fn with_dispatcher(
        dispatcher: Arc<dyn EventDispatcher>,
        events: Arc<RecordingDispatcher>,
    ) -> Self {
        let store = Arc::new(InMemoryOrderStore::new());
        let catalog = Arc::new(SwitchableCatalog::default());
        let desk = AmendmentDesk::new(
            store.clone(),
            catalog.clone(),
            dispatcher,
            PricingRules::default(),
            MatchPolicy::default(),
        );
        Self {
            desk,
            store,
            catalog,
            events,
        }
    }

    /// Create an order from `refs` (one unit each) and sign it, leaving it
    /// active.
    pub async fn active_order(&self, refs: &[&str]) -> Result<Order> {
        let order = self.desk.create_order("CLIENT-1", &units(refs)).await?;
        self.desk
            .authorize_initial(order.order_id, &signer("Ana Client"))
            .await?;
        Ok(self.desk.snapshot(order.order_id).await?.order)
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// One unit of each catalog ref.
pub fn units(refs: &[&str]) -> Vec<ItemRequest> {
    refs.iter().map(|r| ItemRequest::new(*r, 1)).collect()
}

pub fn staff() -> Actor {
    Actor::new("staff-7", ActorRole::Staff)
}

pub fn supervisor() -> Actor {
    Actor::new("sup-1", ActorRole::Supervisor)
}

pub fn signer(name: &str) -> SignatureCapture {
    SignatureCapture::new(name, vec![0x89, 0x50, 0x4e, 0x47])
}

pub fn proposal(order_id: Uuid, refs: &[&str], reason: &str) -> ProposalRequest {
    ProposalRequest {
        order_id,
        items: units(refs),
        reason: reason.to_string(),
        author: staff(),
    }
}
