//! In-memory [`OrderStore`].
//!
//! Commit semantics follow the Postgres store: each commit applies fully or
//! not at all, resolution commits fail with
//! `ResolutionError::AmendmentNotPending` once the amendment is resolved or
//! gone, status writes are compare-and-set, and rejection deletes a row only
//! while it is still unlocked and pending.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use uuid::Uuid;

use svo_ledger::ProposalPlan;
use svo_orders::OrderStatus;
use svo_pricing::Money;
use svo_reconcile::{ApprovalPlan, RejectionPlan, ResolutionError};
use svo_runtime::{OrderStore, RejectionCommit};
use svo_schemas::{
    Amendment, AmendmentResolution, AuthorizationSignature, FulfillmentStatus, Order, OrderItem,
    OrderSnapshot,
};

#[derive(Debug, Default)]
struct State {
    orders: BTreeMap<Uuid, Order>,
    items: Vec<OrderItem>,
    amendments: Vec<Amendment>,
    signatures: Vec<AuthorizationSignature>,
    /// Rows a delete silently leaves behind.
    stuck_rows: BTreeSet<Uuid>,
}

impl State {
    fn order_mut(&mut self, order_id: Uuid) -> Result<&mut Order> {
        self.orders
            .get_mut(&order_id)
            .ok_or_else(|| anyhow!("order not found: {order_id}"))
    }

    fn pending_amendment(&self, amendment_id: Uuid) -> Result<()> {
        let resolution = self
            .amendments
            .iter()
            .find(|a| a.amendment_id == amendment_id)
            .map(|a| a.resolution)
            .unwrap_or(AmendmentResolution::RejectedAndDeleted);
        if resolution != AmendmentResolution::Pending {
            return Err(anyhow::Error::new(ResolutionError::AmendmentNotPending {
                amendment_id,
                resolution,
            }));
        }
        Ok(())
    }

    fn write_item_locks(&mut self, locked: &[OrderItem]) {
        for l in locked {
            if let Some(item) = self.items.iter_mut().find(|i| i.item_id == l.item_id) {
                item.pricing.pricing_locked = l.pricing.pricing_locked;
                item.pricing.stored_total = l.pricing.stored_total;
            }
        }
    }

    fn count_items(&self, order_id: Uuid) -> usize {
        self.items.iter().filter(|i| i.order_id == order_id).count()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    state: Mutex<State>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("in-memory store poisoned"))
    }

    /// Drop the amendment link from every row `amendment_id` created, as on
    /// rows written before the link existed.
    pub fn strip_amendment_links(&self, amendment_id: Uuid) -> Result<usize> {
        let mut st = self.state()?;
        let mut n = 0;
        for item in st
            .items
            .iter_mut()
            .filter(|i| i.amendment_id == Some(amendment_id))
        {
            item.amendment_id = None;
            n += 1;
        }
        Ok(n)
    }

    /// Make deletes of `item_id` report success without removing the row.
    pub fn stick_row(&self, item_id: Uuid) -> Result<()> {
        self.state()?.stuck_rows.insert(item_id);
        Ok(())
    }

    pub fn signatures(&self, order_id: Uuid) -> Result<Vec<AuthorizationSignature>> {
        Ok(self
            .state()?
            .signatures
            .iter()
            .filter(|s| s.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> Result<()> {
        let mut st = self.state()?;
        if st.orders.contains_key(&order.order_id) {
            bail!("duplicate order: {}", order.order_id);
        }
        st.orders.insert(order.order_id, order.clone());
        st.items.extend_from_slice(items);
        Ok(())
    }

    async fn load_snapshot(&self, order_id: Uuid) -> Result<Option<OrderSnapshot>> {
        let st = self.state()?;
        let Some(order) = st.orders.get(&order_id).cloned() else {
            return Ok(None);
        };
        let mut items: Vec<OrderItem> = st
            .items
            .iter()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| (i.created_at_utc, i.item_id));
        let mut amendments: Vec<Amendment> = st
            .amendments
            .iter()
            .filter(|a| a.order_id == order_id)
            .cloned()
            .collect();
        amendments.sort_by_key(|a| (a.created_at_utc, a.amendment_id));
        let signatures = st
            .signatures
            .iter()
            .filter(|s| s.order_id == order_id)
            .cloned()
            .collect();
        Ok(Some(OrderSnapshot {
            order,
            items,
            amendments,
            signatures,
        }))
    }

    async fn commit_initial_authorization(
        &self,
        signature: &AuthorizationSignature,
        locked_items: &[OrderItem],
        total: Money,
    ) -> Result<()> {
        let mut st = self.state()?;
        let order = st.order_mut(signature.order_id)?;
        if order.status != OrderStatus::AwaitingInitialAuthorization {
            bail!(
                "order {} is {}, expected {}",
                order.order_id,
                order.status,
                OrderStatus::AwaitingInitialAuthorization
            );
        }
        order.status = OrderStatus::Active;
        order.total = total;
        st.signatures.push(signature.clone());
        st.write_item_locks(locked_items);
        Ok(())
    }

    async fn commit_proposal(&self, plan: &ProposalPlan) -> Result<()> {
        let mut st = self.state()?;
        let a = &plan.amendment;
        let order = st.order_mut(a.order_id)?;
        order.status = plan.status_after;
        order.total = plan.new_total;
        st.items.extend_from_slice(&plan.new_items);
        st.amendments.push(a.clone());
        Ok(())
    }

    async fn commit_approval(&self, plan: &ApprovalPlan) -> Result<()> {
        let mut st = self.state()?;
        st.pending_amendment(plan.amendment_id)?;
        let order = st.order_mut(plan.order_id)?;
        order.status = plan.status_after;
        order.total = plan.order_total;
        if let Some(a) = st
            .amendments
            .iter_mut()
            .find(|a| a.amendment_id == plan.amendment_id)
        {
            a.resolution = AmendmentResolution::Approved;
        }
        st.signatures.push(plan.signature.clone());
        st.write_item_locks(&plan.locked_items);
        Ok(())
    }

    async fn commit_rejection(&self, plan: &RejectionPlan) -> Result<RejectionCommit> {
        let mut st = self.state()?;
        st.pending_amendment(plan.amendment_id)?;
        st.order_mut(plan.order_id)?;

        let doomed: BTreeSet<Uuid> = plan.delete_item_ids.iter().copied().collect();
        let mut removed: Vec<Uuid> = Vec::new();
        let stuck = st.stuck_rows.clone();
        st.items.retain(|i| {
            let hit = i.order_id == plan.order_id
                && doomed.contains(&i.item_id)
                && !i.pricing.pricing_locked
                && i.fulfillment == FulfillmentStatus::Pending;
            if hit {
                removed.push(i.item_id);
            }
            !hit || stuck.contains(&i.item_id)
        });

        st.amendments.retain(|a| a.amendment_id != plan.amendment_id);

        let restored_total = plan.restore_total_after(&removed);
        let order = st.order_mut(plan.order_id)?;
        order.status = plan.status_after;
        order.total = restored_total;

        Ok(RejectionCommit {
            deleted: removed.len() as u64,
            post_count: st.count_items(plan.order_id),
            restored_total,
            total_after: restored_total,
        })
    }

    async fn commit_status(
        &self,
        order_id: Uuid,
        expected: OrderStatus,
        to: OrderStatus,
    ) -> Result<()> {
        let mut st = self.state()?;
        let order = st.order_mut(order_id)?;
        if order.status != expected {
            bail!("commit_status: order {order_id} is no longer {expected}");
        }
        order.status = to;
        Ok(())
    }

    async fn commit_delivery(&self, signature: &AuthorizationSignature, total: Money) -> Result<()> {
        let mut st = self.state()?;
        let order = st.order_mut(signature.order_id)?;
        if order.status != OrderStatus::AwaitingDeliverySignature {
            bail!(
                "order {} is {}, expected {}",
                order.order_id,
                order.status,
                OrderStatus::AwaitingDeliverySignature
            );
        }
        order.status = OrderStatus::Delivered;
        order.total = total;
        st.signatures.push(signature.clone());
        Ok(())
    }

    async fn commit_item_fulfillment(
        &self,
        order_id: Uuid,
        item_id: Uuid,
        status: FulfillmentStatus,
        order_total: Money,
    ) -> Result<()> {
        let mut st = self.state()?;
        st.order_mut(order_id)?;
        let item = st
            .items
            .iter_mut()
            .find(|i| i.order_id == order_id && i.item_id == item_id)
            .ok_or_else(|| anyhow!("order item not found: {item_id}"))?;
        item.fulfillment = status;
        st.order_mut(order_id)?.total = order_total;
        Ok(())
    }

    async fn commit_item_removal(
        &self,
        order_id: Uuid,
        item_id: Uuid,
        new_total: Money,
    ) -> Result<()> {
        let mut st = self.state()?;
        st.order_mut(order_id)?;
        let before = st.items.len();
        st.items.retain(|i| {
            !(i.order_id == order_id && i.item_id == item_id && !i.pricing.pricing_locked)
        });
        if st.items.len() + 1 != before {
            bail!("item {item_id} not removable");
        }
        st.order_mut(order_id)?.total = new_total;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn order(status: OrderStatus) -> Order {
        Order {
            order_id: Uuid::new_v4(),
            client_ref: "C-1".to_string(),
            status,
            total: Money::new(1_160),
            created_at_utc: Utc::now(),
        }
    }

    #[tokio::test]
    async fn status_write_is_compare_and_set() {
        let store = InMemoryOrderStore::new();
        let o = order(OrderStatus::Active);
        store.insert_order(&o, &[]).await.unwrap();

        store
            .commit_status(o.order_id, OrderStatus::Active, OrderStatus::Cancelled)
            .await
            .unwrap();
        let err = store
            .commit_status(o.order_id, OrderStatus::Active, OrderStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no longer ACTIVE"), "{err}");
    }

    #[tokio::test]
    async fn unknown_order_loads_as_none() {
        let store = InMemoryOrderStore::new();
        assert!(store.load_snapshot(Uuid::new_v4()).await.unwrap().is_none());
    }
}
