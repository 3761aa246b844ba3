use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use svo_ledger::ProposalPlan;
use svo_orders::OrderStatus;
use svo_pricing::Money;
use svo_reconcile::{ApprovalPlan, RejectionPlan};
use svo_schemas::{AuthorizationSignature, FulfillmentStatus, Order, OrderItem, OrderSnapshot};

pub use svo_db::RejectionCommit;

/// Persistence seam of the desk.
///
/// Every `commit_*` applies its effect atomically. Approval and rejection
/// commits fail with `svo_reconcile::ResolutionError::AmendmentNotPending`
/// (inside the `anyhow::Error`) when the amendment was resolved meanwhile.
#[async_trait::async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> Result<()>;

    async fn load_snapshot(&self, order_id: Uuid) -> Result<Option<OrderSnapshot>>;

    async fn commit_initial_authorization(
        &self,
        signature: &AuthorizationSignature,
        locked_items: &[OrderItem],
        total: Money,
    ) -> Result<()>;

    async fn commit_proposal(&self, plan: &ProposalPlan) -> Result<()>;

    async fn commit_approval(&self, plan: &ApprovalPlan) -> Result<()>;

    async fn commit_rejection(&self, plan: &RejectionPlan) -> Result<RejectionCommit>;

    /// Compare-and-set: fails unless the order is still in `expected`.
    async fn commit_status(&self, order_id: Uuid, expected: OrderStatus, to: OrderStatus)
        -> Result<()>;

    async fn commit_delivery(&self, signature: &AuthorizationSignature, total: Money) -> Result<()>;

    async fn commit_item_fulfillment(
        &self,
        order_id: Uuid,
        item_id: Uuid,
        status: FulfillmentStatus,
        order_total: Money,
    ) -> Result<()>;

    async fn commit_item_removal(&self, order_id: Uuid, item_id: Uuid, new_total: Money)
        -> Result<()>;
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect via `SVO_DATABASE_URL` and run migrations.
    pub async fn connect_from_env() -> Result<Self> {
        let pool = svo_db::connect_from_env().await?;
        svo_db::migrate(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl OrderStore for PgOrderStore {
    async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> Result<()> {
        svo_db::insert_order(&self.pool, order, items).await
    }

    async fn load_snapshot(&self, order_id: Uuid) -> Result<Option<OrderSnapshot>> {
        svo_db::load_snapshot(&self.pool, order_id).await
    }

    async fn commit_initial_authorization(
        &self,
        signature: &AuthorizationSignature,
        locked_items: &[OrderItem],
        total: Money,
    ) -> Result<()> {
        svo_db::commit_initial_authorization(&self.pool, signature, locked_items, total).await
    }

    async fn commit_proposal(&self, plan: &ProposalPlan) -> Result<()> {
        svo_db::commit_proposal(&self.pool, plan).await
    }

    async fn commit_approval(&self, plan: &ApprovalPlan) -> Result<()> {
        svo_db::commit_approval(&self.pool, plan).await
    }

    async fn commit_rejection(&self, plan: &RejectionPlan) -> Result<RejectionCommit> {
        svo_db::commit_rejection(&self.pool, plan).await
    }

    async fn commit_status(
        &self,
        order_id: Uuid,
        expected: OrderStatus,
        to: OrderStatus,
    ) -> Result<()> {
        svo_db::commit_status(&self.pool, order_id, expected, to).await
    }

    async fn commit_delivery(&self, signature: &AuthorizationSignature, total: Money) -> Result<()> {
        svo_db::commit_delivery(&self.pool, signature, total).await
    }

    async fn commit_item_fulfillment(
        &self,
        order_id: Uuid,
        item_id: Uuid,
        status: FulfillmentStatus,
        order_total: Money,
    ) -> Result<()> {
        svo_db::commit_item_fulfillment(&self.pool, order_id, item_id, status, order_total).await
    }

    async fn commit_item_removal(
        &self,
        order_id: Uuid,
        item_id: Uuid,
        new_total: Money,
    ) -> Result<()> {
        svo_db::commit_item_removal(&self.pool, order_id, item_id, new_total).await
    }
}
