use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use svo_config::DeskConfig;
use svo_ledger::{build_items, plan_proposal, ProposalRequest};
use svo_orders::{Actor, ForcedTransition, OrderEvent, OrderMachine, OrderStatus};
use svo_pricing::{
    displayed_total_with_catalog, overlay_catalog, Catalog, DisplayedTotal, Money, PricingRules,
};
use svo_reconcile::{
    plan_approval, plan_rejection, verify_rejection, MatchPolicy, RejectionReport,
};
use svo_schemas::{
    event_names, order_total, Amendment, AuthorizationSignature, DispatchEvent, FulfillmentStatus,
    ItemRequest, Order, OrderChange, OrderItem, OrderSnapshot, SignatureCapture, SignatureKind,
};

use crate::dispatch::EventDispatcher;
use crate::error::DeskError;
use crate::store::OrderStore;

/// Buffered change-feed messages per subscriber before it starts lagging.
pub const CHANGE_FEED_CAPACITY: usize = 1024;

const INITIAL_REASON: &str = "initial authorization";
const DELIVERY_REASON: &str = "delivery";

/// Status tracker seeded from a fresh read.
fn machine(snapshot: &OrderSnapshot) -> OrderMachine {
    OrderMachine::with_status(snapshot.order.order_id, snapshot.order.status)
}

/// One line as it would be shown right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinePrice {
    pub item_id: Uuid,
    pub catalog_ref: String,
    pub name: String,
    pub quantity: i64,
    pub fulfillment: FulfillmentStatus,
    pub displayed: DisplayedTotal,
}

/// Live pricing of an order: per-line displayed totals and their sum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPricing {
    pub order_id: Uuid,
    pub lines: Vec<LinePrice>,
    /// Sum over non-cancelled lines.
    pub total: Money,
}

// ---------------------------------------------------------------------------
// AmendmentDesk
// ---------------------------------------------------------------------------

/// Orchestrates the order lifecycle, the amendment ledger and reconciliation
/// over an [`OrderStore`].
pub struct AmendmentDesk {
    store: Arc<dyn OrderStore>,
    catalog: Arc<dyn Catalog>,
    dispatcher: Arc<dyn EventDispatcher>,
    rules: PricingRules,
    policy: MatchPolicy,
    changes: broadcast::Sender<OrderChange>,
}

impl AmendmentDesk {
    pub fn new(
        store: Arc<dyn OrderStore>,
        catalog: Arc<dyn Catalog>,
        dispatcher: Arc<dyn EventDispatcher>,
        rules: PricingRules,
        policy: MatchPolicy,
    ) -> Self {
        let (changes, _rx) = broadcast::channel::<OrderChange>(CHANGE_FEED_CAPACITY);
        Self {
            store,
            catalog,
            dispatcher,
            rules,
            policy,
            changes,
        }
    }

    pub fn from_config(
        store: Arc<dyn OrderStore>,
        catalog: Arc<dyn Catalog>,
        dispatcher: Arc<dyn EventDispatcher>,
        cfg: &DeskConfig,
    ) -> Self {
        Self::new(
            store,
            catalog,
            dispatcher,
            cfg.pricing_rules(),
            cfg.match_policy(),
        )
    }

    pub fn rules(&self) -> &PricingRules {
        &self.rules
    }

    pub fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    /// Read-only feed of committed order-row updates.
    pub fn subscribe(&self) -> broadcast::Receiver<OrderChange> {
        self.changes.subscribe()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn load(&self, order_id: Uuid) -> Result<OrderSnapshot, DeskError> {
        self.store
            .load_snapshot(order_id)
            .await
            .map_err(DeskError::from_store)?
            .ok_or(DeskError::OrderNotFound { order_id })
    }

    fn publish(&self, order_id: Uuid, status: OrderStatus, total: Money) {
        // No subscribers is fine.
        let _ = self.changes.send(OrderChange {
            order_id,
            status,
            total,
            ts_utc: Utc::now(),
        });
    }

    /// Hand an event to the dispatcher. Failures are logged, never returned:
    /// the transition is already committed.
    fn notify(&self, name: &str, order_id: Uuid, data: Value) {
        let event = DispatchEvent::new(name, order_id, data);
        if let Err(err) = self.dispatcher.dispatch(&event) {
            warn!(
                order_id = %order_id,
                event = name,
                error = %format!("{err:#}"),
                "event dispatch failed"
            );
        }
    }

    fn price_items(&self, items: &[OrderItem]) -> Vec<LinePrice> {
        items
            .iter()
            .map(|i| LinePrice {
                item_id: i.item_id,
                catalog_ref: i.catalog_ref.clone(),
                name: i.name.clone(),
                quantity: i.quantity,
                fulfillment: i.fulfillment,
                displayed: displayed_total_with_catalog(
                    &self.rules,
                    self.catalog.as_ref(),
                    &i.catalog_ref,
                    &i.pricing,
                    i.quantity,
                ),
            })
            .collect()
    }

    fn live_total(&self, items: &[OrderItem]) -> Money {
        self.price_items(items)
            .iter()
            .filter(|l| l.fulfillment != FulfillmentStatus::Cancelled)
            .map(|l| l.displayed.amount)
            .sum()
    }

    fn signature(
        &self,
        order_id: Uuid,
        kind: SignatureKind,
        capture: &SignatureCapture,
        reason: &str,
        authorized_amount: Money,
    ) -> Result<AuthorizationSignature, DeskError> {
        let signer_name = capture.signer_name.trim();
        if signer_name.is_empty() {
            return Err(DeskError::MissingSignerName);
        }
        Ok(AuthorizationSignature {
            signature_id: Uuid::new_v4(),
            order_id,
            kind,
            signature_image: capture.signature_image.clone(),
            signer_name: signer_name.to_string(),
            signed_at_utc: Utc::now(),
            reason: reason.to_string(),
            authorized_amount,
            amendment_id: None,
        })
    }

    // -----------------------------------------------------------------------
    // Order lifecycle
    // -----------------------------------------------------------------------

    /// Build an order from catalog selections. It starts out awaiting the
    /// client's initial authorization.
    pub async fn create_order(
        &self,
        client_ref: &str,
        requests: &[ItemRequest],
    ) -> Result<Order, DeskError> {
        let client_ref = client_ref.trim();
        if client_ref.is_empty() {
            return Err(DeskError::EmptyClientRef);
        }
        if requests.is_empty() {
            return Err(DeskError::EmptyOrder);
        }

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let items = build_items(
            &self.rules,
            self.catalog.as_ref(),
            order_id,
            requests,
            None,
            now,
        )?;
        let order = Order {
            order_id,
            client_ref: client_ref.to_string(),
            status: OrderStatus::AwaitingInitialAuthorization,
            total: order_total(&self.rules, &items),
            created_at_utc: now,
        };

        self.store
            .insert_order(&order, &items)
            .await
            .map_err(DeskError::from_store)?;

        info!(
            order_id = %order_id,
            items = items.len(),
            total = order.total.minor(),
            "order created"
        );
        self.publish(order_id, order.status, order.total);
        self.notify(
            event_names::ORDER_CREATED,
            order_id,
            json!({ "client_ref": order.client_ref, "total": order.total.minor(), "items": items.len() }),
        );
        Ok(order)
    }

    /// Record the client's initial signature and start work.
    ///
    /// Every unlocked line is repriced from the live catalog and frozen at
    /// that price; the signature carries the resulting total.
    pub async fn authorize_initial(
        &self,
        order_id: Uuid,
        capture: &SignatureCapture,
    ) -> Result<AuthorizationSignature, DeskError> {
        let snapshot = self.load(order_id).await?;

        let mut items = snapshot.items.clone();
        let mut locked_items = Vec::with_capacity(items.len());
        for item in items.iter_mut().filter(|i| !i.pricing.pricing_locked) {
            if let Ok(entry) = self.catalog.lookup(&item.catalog_ref) {
                item.pricing = overlay_catalog(&item.pricing, &entry);
            }
            item.lock_pricing(&self.rules);
            locked_items.push(item.clone());
        }
        let total = order_total(&self.rules, &items);

        let signature =
            self.signature(order_id, SignatureKind::Initial, capture, INITIAL_REASON, total)?;
        let to = machine(&snapshot).apply(&OrderEvent::InitialSignatureRecorded {
            signature_id: signature.signature_id,
        })?;

        self.store
            .commit_initial_authorization(&signature, &locked_items, total)
            .await
            .map_err(DeskError::from_store)?;

        info!(
            order_id = %order_id,
            signature_id = %signature.signature_id,
            locked = locked_items.len(),
            total = total.minor(),
            "initial authorization recorded"
        );
        self.publish(order_id, to, total);
        self.notify(
            event_names::ORDER_AUTHORIZED,
            order_id,
            json!({ "signature_id": signature.signature_id, "total": total.minor() }),
        );
        Ok(signature)
    }

    /// Move one item's fulfillment forward, or cancel it.
    ///
    /// Cancelling takes the line's displayed total out of the order total.
    pub async fn set_item_fulfillment(
        &self,
        order_id: Uuid,
        item_id: Uuid,
        to: FulfillmentStatus,
    ) -> Result<OrderItem, DeskError> {
        let snapshot = self.load(order_id).await?;
        let status = snapshot.order.status;
        if !matches!(
            status,
            OrderStatus::Active | OrderStatus::AwaitingAmendmentAuthorization
        ) {
            return Err(DeskError::NotEditable { status });
        }

        let mut item = snapshot
            .items
            .iter()
            .find(|i| i.item_id == item_id)
            .cloned()
            .ok_or(DeskError::ItemNotFound { order_id, item_id })?;
        if !item.fulfillment.can_move_to(to) {
            return Err(DeskError::InvalidFulfillment {
                item_id,
                from: item.fulfillment,
                to,
            });
        }

        let mut total = snapshot.order.total;
        if to == FulfillmentStatus::Cancelled {
            let line = item.displayed_total(&self.rules);
            total = total.checked_sub(line).unwrap_or_else(|| {
                let rest: Vec<OrderItem> = snapshot
                    .items
                    .iter()
                    .filter(|i| i.item_id != item_id)
                    .cloned()
                    .collect();
                order_total(&self.rules, &rest)
            });
        }

        self.store
            .commit_item_fulfillment(order_id, item_id, to, total)
            .await
            .map_err(DeskError::from_store)?;

        debug!(
            order_id = %order_id,
            item_id = %item_id,
            from = item.fulfillment.as_str(),
            to = to.as_str(),
            "item fulfillment changed"
        );
        item.fulfillment = to;
        self.publish(order_id, status, total);
        Ok(item)
    }

    /// Remove an unlocked line before work is frozen by a signature, and
    /// recompute the order total. Returns the new total.
    pub async fn remove_item(&self, order_id: Uuid, item_id: Uuid) -> Result<Money, DeskError> {
        let snapshot = self.load(order_id).await?;
        let status = snapshot.order.status;
        if !matches!(
            status,
            OrderStatus::AwaitingInitialAuthorization | OrderStatus::Active
        ) {
            return Err(DeskError::NotEditable { status });
        }

        let item = snapshot
            .items
            .iter()
            .find(|i| i.item_id == item_id)
            .ok_or(DeskError::ItemNotFound { order_id, item_id })?;
        if item.pricing.pricing_locked {
            return Err(DeskError::ItemLocked { item_id });
        }

        let rest: Vec<OrderItem> = snapshot
            .items
            .iter()
            .filter(|i| i.item_id != item_id)
            .cloned()
            .collect();
        let new_total = order_total(&self.rules, &rest);

        self.store
            .commit_item_removal(order_id, item_id, new_total)
            .await
            .map_err(DeskError::from_store)?;

        debug!(
            order_id = %order_id,
            item_id = %item_id,
            total = new_total.minor(),
            "item removed"
        );
        self.publish(order_id, status, new_total);
        Ok(new_total)
    }

    /// Every non-cancelled item is completed: ask the client to sign for
    /// delivery.
    pub async fn request_delivery_signature(&self, order_id: Uuid) -> Result<Order, DeskError> {
        let snapshot = self.load(order_id).await?;
        let remaining = snapshot
            .items
            .iter()
            .filter(|i| i.counts_toward_total() && i.fulfillment != FulfillmentStatus::Completed)
            .count();
        if remaining > 0 {
            return Err(DeskError::ItemsIncomplete { remaining });
        }

        let from = snapshot.order.status;
        let to = machine(&snapshot).apply(&OrderEvent::AllItemsCompleted)?;
        self.store
            .commit_status(order_id, from, to)
            .await
            .map_err(DeskError::from_store)?;

        info!(order_id = %order_id, "delivery signature requested");
        let mut order = snapshot.order;
        order.status = to;
        self.publish(order_id, to, order.total);
        self.notify(
            event_names::ORDER_DELIVERY_REQUESTED,
            order_id,
            json!({ "total": order.total.minor() }),
        );
        Ok(order)
    }

    pub async fn sign_delivery(
        &self,
        order_id: Uuid,
        capture: &SignatureCapture,
    ) -> Result<AuthorizationSignature, DeskError> {
        let snapshot = self.load(order_id).await?;
        let total = snapshot.order.total;
        let signature =
            self.signature(order_id, SignatureKind::Delivery, capture, DELIVERY_REASON, total)?;
        let to = machine(&snapshot).apply(&OrderEvent::DeliverySignatureRecorded {
            signature_id: signature.signature_id,
        })?;

        self.store
            .commit_delivery(&signature, total)
            .await
            .map_err(DeskError::from_store)?;

        info!(
            order_id = %order_id,
            signature_id = %signature.signature_id,
            total = total.minor(),
            "order delivered"
        );
        self.publish(order_id, to, total);
        self.notify(
            event_names::ORDER_DELIVERED,
            order_id,
            json!({ "signature_id": signature.signature_id, "total": total.minor() }),
        );
        Ok(signature)
    }

    pub async fn cancel_order(&self, order_id: Uuid, actor: &Actor) -> Result<Order, DeskError> {
        let snapshot = self.load(order_id).await?;
        let from = snapshot.order.status;
        let to = machine(&snapshot).apply(&OrderEvent::Cancel)?;
        self.store
            .commit_status(order_id, from, to)
            .await
            .map_err(DeskError::from_store)?;

        info!(order_id = %order_id, actor_id = %actor.id, from = from.as_str(), "order cancelled");
        let mut order = snapshot.order;
        order.status = to;
        self.publish(order_id, to, order.total);
        self.notify(
            event_names::ORDER_CANCELLED,
            order_id,
            json!({ "actor_id": actor.id, "from": from.as_str() }),
        );
        Ok(order)
    }

    /// Move the order to `to` without evaluating any guard. Supervisors only.
    /// No signature is created.
    pub async fn force_status(
        &self,
        order_id: Uuid,
        to: OrderStatus,
        actor: &Actor,
    ) -> Result<ForcedTransition, DeskError> {
        let snapshot = self.load(order_id).await?;
        let forced = machine(&snapshot).force(to, actor)?;
        self.store
            .commit_status(order_id, forced.from, forced.to)
            .await
            .map_err(DeskError::from_store)?;

        warn!(
            order_id = %order_id,
            actor_id = %actor.id,
            from = forced.from.as_str(),
            to = forced.to.as_str(),
            "order status forced"
        );
        self.publish(order_id, forced.to, snapshot.order.total);
        self.notify(
            event_names::ORDER_STATUS_FORCED,
            order_id,
            json!({
                "actor_id": actor.id,
                "from": forced.from.as_str(),
                "to": forced.to.as_str(),
            }),
        );
        Ok(forced)
    }

    // -----------------------------------------------------------------------
    // Amendments
    // -----------------------------------------------------------------------

    /// Append an amendment and its new lines. The order total moves to the
    /// amendment's `new_total` immediately.
    ///
    /// A proposal while another amendment is still pending is accepted.
    pub async fn propose_amendment(&self, req: &ProposalRequest) -> Result<Amendment, DeskError> {
        let snapshot = self.load(req.order_id).await?;
        let pending = snapshot.unresolved_amendments().count();
        if pending > 0 {
            warn!(
                order_id = %req.order_id,
                pending,
                "amendment proposed while another is unresolved"
            );
        }

        let plan = plan_proposal(
            &self.rules,
            self.catalog.as_ref(),
            &snapshot,
            req,
            Utc::now(),
        )?;
        self.store
            .commit_proposal(&plan)
            .await
            .map_err(DeskError::from_store)?;

        let a = &plan.amendment;
        info!(
            order_id = %a.order_id,
            amendment_id = %a.amendment_id,
            items = plan.new_items.len(),
            previous_total = plan.previous_total.minor(),
            new_total = plan.new_total.minor(),
            "amendment proposed"
        );
        self.publish(a.order_id, plan.status_after, plan.new_total);
        self.notify(
            event_names::AMENDMENT_PROPOSED,
            a.order_id,
            json!({
                "amendment_id": a.amendment_id,
                "previous_total": plan.previous_total.minor(),
                "new_total": plan.new_total.minor(),
                "items": plan.new_items.len(),
                "reason": a.reason,
                "author_id": a.author_id,
            }),
        );
        Ok(plan.amendment)
    }

    /// Client accepted the amendment: sign, freeze its lines, resume work.
    pub async fn approve_amendment(
        &self,
        order_id: Uuid,
        amendment_id: Uuid,
        capture: &SignatureCapture,
    ) -> Result<AuthorizationSignature, DeskError> {
        let snapshot = self.load(order_id).await?;
        let plan = plan_approval(
            &self.rules,
            &self.policy,
            &snapshot,
            amendment_id,
            capture,
            Utc::now(),
        )?;
        self.store
            .commit_approval(&plan)
            .await
            .map_err(DeskError::from_store)?;

        info!(
            order_id = %order_id,
            amendment_id = %amendment_id,
            signature_id = %plan.signature.signature_id,
            path = plan.path.as_str(),
            locked = plan.locked_items.len(),
            authorized = plan.signature.authorized_amount.minor(),
            "amendment approved"
        );
        self.publish(order_id, plan.status_after, plan.order_total);
        self.notify(
            event_names::AMENDMENT_APPROVED,
            order_id,
            json!({
                "amendment_id": amendment_id,
                "signature_id": plan.signature.signature_id,
                "authorized_amount": plan.signature.authorized_amount.minor(),
            }),
        );
        Ok(plan.signature)
    }

    /// Client declined the amendment: remove the rows it added, drop the
    /// ledger record and restore the total.
    ///
    /// Whatever could be matched confidently is committed. Anything else is
    /// reported as an inconsistency in the returned report and logged.
    pub async fn reject_amendment(
        &self,
        order_id: Uuid,
        amendment_id: Uuid,
    ) -> Result<RejectionReport, DeskError> {
        let snapshot = self.load(order_id).await?;
        let plan = plan_rejection(&self.rules, &self.policy, &snapshot, amendment_id)?;
        let commit = self
            .store
            .commit_rejection(&plan)
            .await
            .map_err(DeskError::from_store)?;

        let after = self.load(order_id).await?;
        let recomputed = self.live_total(&after.items);
        let report = verify_rejection(
            &plan,
            commit.deleted,
            commit.post_count,
            commit.restored_total,
            commit.total_after,
            recomputed,
        );

        for w in report.warnings() {
            warn!(
                order_id = %order_id,
                amendment_id = %amendment_id,
                warning = %w,
                "rejection inconsistency"
            );
        }
        if let Some(drift) = &report.total_drift {
            warn!(
                order_id = %order_id,
                amendment_id = %amendment_id,
                restored = drift.restored.minor(),
                recomputed = drift.recomputed.minor(),
                "restored total differs from live recomputation"
            );
        }
        if let Some(dev) = &report.previous_total_deviation {
            info!(
                order_id = %order_id,
                amendment_id = %amendment_id,
                previous_total = dev.previous_total.minor(),
                restored = dev.restored.minor(),
                "order total moved while amendment was pending"
            );
        }
        info!(
            order_id = %order_id,
            amendment_id = %amendment_id,
            path = report.path.as_str(),
            deleted = report.deleted,
            clean = report.is_clean(),
            total = commit.total_after.minor(),
            "amendment rejected"
        );

        self.publish(order_id, plan.status_after, commit.total_after);
        self.notify(
            event_names::AMENDMENT_REJECTED,
            order_id,
            json!({
                "amendment_id": amendment_id,
                "deleted": report.deleted,
                "clean": report.is_clean(),
                "restored_total": commit.total_after.minor(),
            }),
        );
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    pub async fn snapshot(&self, order_id: Uuid) -> Result<OrderSnapshot, DeskError> {
        self.load(order_id).await
    }

    /// Blocked on client consent: an unresolved amendment exists or the
    /// initial signature is missing. Computed from a fresh read.
    pub async fn is_awaiting_consent(&self, order_id: Uuid) -> Result<bool, DeskError> {
        Ok(self.load(order_id).await?.consent().is_awaiting_consent())
    }

    /// Displayed totals of every line, using live catalog values for
    /// unlocked lines.
    pub async fn price_order(&self, order_id: Uuid) -> Result<OrderPricing, DeskError> {
        let snapshot = self.load(order_id).await?;
        let lines = self.price_items(&snapshot.items);
        let total = lines
            .iter()
            .filter(|l| l.fulfillment != FulfillmentStatus::Cancelled)
            .map(|l| l.displayed.amount)
            .sum();
        Ok(OrderPricing {
            order_id,
            lines,
            total,
        })
    }
}
