//! svo-db
//!
//! PostgreSQL persistence for orders, items, the amendment ledger and
//! authorization signatures.
//!
//! Every multi-row effect (proposal, approval, rejection, signature plus
//! status) runs in one transaction. Approval and rejection lock the
//! amendment row first; the second of two racing resolutions finds it
//! resolved (or gone) and fails with
//! `ResolutionError::AmendmentNotPending`, wrapped in `anyhow::Error`.

use anyhow::{anyhow, bail, Context, Result};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use svo_ledger::ProposalPlan;
use svo_orders::OrderStatus;
use svo_pricing::{ItemKind, MarginPolicy, Money, PricingInputs};
use svo_reconcile::{ApprovalPlan, RejectionPlan, ResolutionError};
use svo_schemas::{
    Amendment, AmendmentItemSnapshot, AmendmentResolution, AuthorizationSignature,
    FulfillmentStatus, Order, OrderItem, OrderSnapshot, SignatureKind,
};

pub const ENV_DB_URL: &str = "SVO_DATABASE_URL";

/// Connect to Postgres using SVO_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Column conversions
// ---------------------------------------------------------------------------

fn opt_money(v: Option<i64>) -> Option<Money> {
    v.map(Money::new)
}

fn opt_bps_to_db(v: Option<u32>) -> Result<Option<i32>> {
    v.map(|b| i32::try_from(b).with_context(|| format!("vat_bps out of range: {b}")))
        .transpose()
}

fn opt_bps_from_db(v: Option<i32>) -> Result<Option<u32>> {
    v.map(|b| u32::try_from(b).with_context(|| format!("negative vat_bps in db: {b}")))
        .transpose()
}

fn parse_status(s: &str) -> Result<OrderStatus> {
    OrderStatus::parse(s).ok_or_else(|| anyhow!("invalid order status in db: {s}"))
}

fn row_to_order(row: &PgRow) -> Result<Order> {
    Ok(Order {
        order_id: row.try_get("order_id")?,
        client_ref: row.try_get("client_ref")?,
        status: parse_status(&row.try_get::<String, _>("status")?)?,
        total: Money::new(row.try_get("total_minor")?),
        created_at_utc: row.try_get("created_at_utc")?,
    })
}

fn row_to_item(row: &PgRow) -> Result<OrderItem> {
    let kind: String = row.try_get("kind")?;
    let fulfillment: String = row.try_get("fulfillment")?;
    let margin: Json<MarginPolicy> = row.try_get("margin")?;
    Ok(OrderItem {
        item_id: row.try_get("item_id")?,
        order_id: row.try_get("order_id")?,
        catalog_ref: row.try_get("catalog_ref")?,
        name: row.try_get("name")?,
        quantity: row.try_get("quantity")?,
        pricing: PricingInputs {
            kind: ItemKind::parse(&kind).ok_or_else(|| anyhow!("invalid item kind in db: {kind}"))?,
            cost_price: opt_money(row.try_get("cost_price")?),
            base_price: opt_money(row.try_get("base_price")?),
            vat_bps: opt_bps_from_db(row.try_get("vat_bps")?)?,
            margin: margin.0,
            pricing_locked: row.try_get("pricing_locked")?,
            stored_total: Money::new(row.try_get("stored_total")?),
        },
        fulfillment: FulfillmentStatus::parse(&fulfillment)
            .ok_or_else(|| anyhow!("invalid fulfillment status in db: {fulfillment}"))?,
        amendment_id: row.try_get("amendment_id")?,
        created_at_utc: row.try_get("created_at_utc")?,
    })
}

fn row_to_amendment(row: &PgRow) -> Result<Amendment> {
    let items: Json<Vec<AmendmentItemSnapshot>> = row.try_get("items")?;
    let resolution: String = row.try_get("resolution")?;
    Ok(Amendment {
        amendment_id: row.try_get("amendment_id")?,
        order_id: row.try_get("order_id")?,
        previous_total: Money::new(row.try_get("previous_total")?),
        new_total: Money::new(row.try_get("new_total")?),
        items: items.0,
        reason: row.try_get("reason")?,
        author_id: row.try_get("author_id")?,
        resolution: AmendmentResolution::parse(&resolution)
            .ok_or_else(|| anyhow!("invalid amendment resolution in db: {resolution}"))?,
        created_at_utc: row.try_get("created_at_utc")?,
    })
}

fn row_to_signature(row: &PgRow) -> Result<AuthorizationSignature> {
    let kind: String = row.try_get("kind")?;
    Ok(AuthorizationSignature {
        signature_id: row.try_get("signature_id")?,
        order_id: row.try_get("order_id")?,
        kind: SignatureKind::parse(&kind)
            .ok_or_else(|| anyhow!("invalid signature kind in db: {kind}"))?,
        signature_image: row.try_get("signature_image")?,
        signer_name: row.try_get("signer_name")?,
        signed_at_utc: row.try_get("signed_at_utc")?,
        reason: row.try_get("reason")?,
        authorized_amount: Money::new(row.try_get("authorized_amount")?),
        amendment_id: row.try_get("amendment_id")?,
    })
}

const ITEM_COLUMNS: &str = r#"
    item_id, order_id, catalog_ref, name, quantity, kind, cost_price, base_price,
    vat_bps, margin, pricing_locked, stored_total, fulfillment, amendment_id,
    created_at_utc
"#;

const AMENDMENT_COLUMNS: &str = r#"
    amendment_id, order_id, previous_total, new_total, items, reason, author_id,
    resolution, created_at_utc
"#;

const SIGNATURE_COLUMNS: &str = r#"
    signature_id, order_id, kind, signature_image, signer_name, signed_at_utc,
    reason, authorized_amount, amendment_id
"#;

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Insert an order with its initial items in one transaction.
pub async fn insert_order(pool: &PgPool, order: &Order, items: &[OrderItem]) -> Result<()> {
    let mut tx = pool.begin().await.context("insert_order begin failed")?;

    sqlx::query(
        r#"
        insert into orders (order_id, client_ref, status, total_minor, created_at_utc)
        values ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(order.order_id)
    .bind(&order.client_ref)
    .bind(order.status.as_str())
    .bind(order.total.minor())
    .bind(order.created_at_utc)
    .execute(&mut *tx)
    .await
    .context("insert_order failed")?;

    insert_items(&mut *tx, items).await?;

    tx.commit().await.context("insert_order commit failed")?;
    Ok(())
}

pub async fn fetch_order(pool: &PgPool, order_id: Uuid) -> Result<Option<Order>> {
    let row = sqlx::query(
        r#"
        select order_id, client_ref, status, total_minor, created_at_utc
        from orders
        where order_id = $1
        "#,
    )
    .bind(order_id)
    .fetch_optional(pool)
    .await
    .context("fetch_order failed")?;

    row.as_ref().map(row_to_order).transpose()
}

/// Lock the order row for the rest of the transaction.
async fn lock_order(conn: &mut PgConnection, order_id: Uuid) -> Result<Order> {
    let row = sqlx::query(
        r#"
        select order_id, client_ref, status, total_minor, created_at_utc
        from orders
        where order_id = $1
        for update
        "#,
    )
    .bind(order_id)
    .fetch_optional(conn)
    .await
    .context("lock_order failed")?;

    match row {
        Some(r) => row_to_order(&r),
        None => bail!("order not found: {order_id}"),
    }
}

async fn write_order_row(
    conn: &mut PgConnection,
    order_id: Uuid,
    status: OrderStatus,
    total: Money,
) -> Result<()> {
    sqlx::query(
        r#"
        update orders
           set status = $2,
               total_minor = $3
         where order_id = $1
        "#,
    )
    .bind(order_id)
    .bind(status.as_str())
    .bind(total.minor())
    .execute(conn)
    .await
    .context("update order row failed")?;
    Ok(())
}

/// Compare-and-set status change. Fails if the order is no longer in
/// `expected`.
pub async fn commit_status(
    pool: &PgPool,
    order_id: Uuid,
    expected: OrderStatus,
    to: OrderStatus,
) -> Result<()> {
    let res = sqlx::query(
        r#"
        update orders
           set status = $3
         where order_id = $1
           and status = $2
        "#,
    )
    .bind(order_id)
    .bind(expected.as_str())
    .bind(to.as_str())
    .execute(pool)
    .await
    .context("commit_status failed")?;

    if res.rows_affected() != 1 {
        bail!(
            "commit_status: order {order_id} is no longer {}",
            expected.as_str()
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// Insert item rows on an open connection or transaction.
pub async fn insert_items(conn: &mut PgConnection, items: &[OrderItem]) -> Result<()> {
    for item in items {
        sqlx::query(
            r#"
            insert into order_items (
              item_id, order_id, catalog_ref, name, quantity, kind, cost_price,
              base_price, vat_bps, margin, pricing_locked, stored_total, fulfillment,
              amendment_id, created_at_utc
            ) values (
              $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15
            )
            "#,
        )
        .bind(item.item_id)
        .bind(item.order_id)
        .bind(&item.catalog_ref)
        .bind(&item.name)
        .bind(item.quantity)
        .bind(item.pricing.kind.as_str())
        .bind(item.pricing.cost_price.map(Money::minor))
        .bind(item.pricing.base_price.map(Money::minor))
        .bind(opt_bps_to_db(item.pricing.vat_bps)?)
        .bind(Json(&item.pricing.margin))
        .bind(item.pricing.pricing_locked)
        .bind(item.pricing.stored_total.minor())
        .bind(item.fulfillment.as_str())
        .bind(item.amendment_id)
        .bind(item.created_at_utc)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("insert order item {} failed", item.item_id))?;
    }
    Ok(())
}

/// Items of an order, oldest first.
pub async fn fetch_items(pool: &PgPool, order_id: Uuid) -> Result<Vec<OrderItem>> {
    let rows = sqlx::query(&format!(
        "select {ITEM_COLUMNS} from order_items where order_id = $1 order by created_at_utc, item_id"
    ))
    .bind(order_id)
    .fetch_all(pool)
    .await
    .context("fetch_items failed")?;

    rows.iter().map(row_to_item).collect()
}

async fn count_items(conn: &mut PgConnection, order_id: Uuid) -> Result<usize> {
    let (n,): (i64,) =
        sqlx::query_as::<_, (i64,)>("select count(*)::bigint from order_items where order_id = $1")
            .bind(order_id)
            .fetch_one(conn)
            .await
            .context("count_items failed")?;
    usize::try_from(n).context("negative item count")
}

async fn write_item_locks(conn: &mut PgConnection, items: &[OrderItem]) -> Result<()> {
    for item in items {
        sqlx::query(
            r#"
            update order_items
               set pricing_locked = $2,
                   stored_total = $3
             where item_id = $1
            "#,
        )
        .bind(item.item_id)
        .bind(item.pricing.pricing_locked)
        .bind(item.pricing.stored_total.minor())
        .execute(&mut *conn)
        .await
        .with_context(|| format!("lock item {} failed", item.item_id))?;
    }
    Ok(())
}

/// Fulfillment change plus the order total it implies, atomically.
pub async fn commit_item_fulfillment(
    pool: &PgPool,
    order_id: Uuid,
    item_id: Uuid,
    status: FulfillmentStatus,
    order_total: Money,
) -> Result<()> {
    let mut tx = pool.begin().await.context("commit_item_fulfillment begin failed")?;
    let order = lock_order(&mut *tx, order_id).await?;

    let res = sqlx::query(
        r#"
        update order_items
           set fulfillment = $3
         where order_id = $1
           and item_id = $2
        "#,
    )
    .bind(order_id)
    .bind(item_id)
    .bind(status.as_str())
    .execute(&mut *tx)
    .await
    .context("update item fulfillment failed")?;
    if res.rows_affected() != 1 {
        bail!("order item not found: {item_id}");
    }

    write_order_row(&mut *tx, order_id, order.status, order_total).await?;
    tx.commit().await.context("commit_item_fulfillment commit failed")?;
    Ok(())
}

/// Delete one unlocked item and write the recomputed order total.
pub async fn commit_item_removal(
    pool: &PgPool,
    order_id: Uuid,
    item_id: Uuid,
    new_total: Money,
) -> Result<()> {
    let mut tx = pool.begin().await.context("commit_item_removal begin failed")?;
    let order = lock_order(&mut *tx, order_id).await?;

    let res = sqlx::query(
        "delete from order_items where order_id = $1 and item_id = $2 and not pricing_locked",
    )
    .bind(order_id)
    .bind(item_id)
    .execute(&mut *tx)
    .await
    .context("delete order item failed")?;
    if res.rows_affected() != 1 {
        bail!("item {item_id} not removable");
    }

    write_order_row(&mut *tx, order_id, order.status, new_total).await?;
    tx.commit().await.context("commit_item_removal commit failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Amendments
// ---------------------------------------------------------------------------

pub async fn fetch_amendment(pool: &PgPool, amendment_id: Uuid) -> Result<Option<Amendment>> {
    let row = sqlx::query(&format!(
        "select {AMENDMENT_COLUMNS} from amendments where amendment_id = $1"
    ))
    .bind(amendment_id)
    .fetch_optional(pool)
    .await
    .context("fetch_amendment failed")?;

    row.as_ref().map(row_to_amendment).transpose()
}

pub async fn fetch_amendments(pool: &PgPool, order_id: Uuid) -> Result<Vec<Amendment>> {
    let rows = sqlx::query(&format!(
        "select {AMENDMENT_COLUMNS} from amendments where order_id = $1 order by created_at_utc, amendment_id"
    ))
    .bind(order_id)
    .fetch_all(pool)
    .await
    .context("fetch_amendments failed")?;

    rows.iter().map(row_to_amendment).collect()
}

pub async fn list_unresolved_amendments(pool: &PgPool, order_id: Uuid) -> Result<Vec<Amendment>> {
    let rows = sqlx::query(&format!(
        "select {AMENDMENT_COLUMNS} from amendments where order_id = $1 and resolution = 'PENDING' order by created_at_utc, amendment_id"
    ))
    .bind(order_id)
    .fetch_all(pool)
    .await
    .context("list_unresolved_amendments failed")?;

    rows.iter().map(row_to_amendment).collect()
}

/// Lock a pending amendment row. A row that is gone or resolved is the
/// losing side of a race.
async fn lock_pending_amendment(conn: &mut PgConnection, amendment_id: Uuid) -> Result<()> {
    let row: Option<(String,)> = sqlx::query_as::<_, (String,)>(
        "select resolution from amendments where amendment_id = $1 for update",
    )
    .bind(amendment_id)
    .fetch_optional(conn)
    .await
    .context("lock amendment failed")?;

    let resolution = match row {
        None => AmendmentResolution::RejectedAndDeleted,
        Some((s,)) => AmendmentResolution::parse(&s)
            .ok_or_else(|| anyhow!("invalid amendment resolution in db: {s}"))?,
    };
    if resolution != AmendmentResolution::Pending {
        return Err(anyhow::Error::new(ResolutionError::AmendmentNotPending {
            amendment_id,
            resolution,
        }));
    }
    Ok(())
}

/// Items, ledger row and order row of a proposal, atomically.
pub async fn commit_proposal(pool: &PgPool, plan: &ProposalPlan) -> Result<()> {
    let a = &plan.amendment;
    let mut tx = pool.begin().await.context("commit_proposal begin failed")?;
    lock_order(&mut *tx, a.order_id).await?;

    insert_items(&mut *tx, &plan.new_items).await?;

    sqlx::query(
        r#"
        insert into amendments (
          amendment_id, order_id, previous_total, new_total, items, reason,
          author_id, resolution, created_at_utc
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9
        )
        "#,
    )
    .bind(a.amendment_id)
    .bind(a.order_id)
    .bind(a.previous_total.minor())
    .bind(a.new_total.minor())
    .bind(Json(&a.items))
    .bind(&a.reason)
    .bind(&a.author_id)
    .bind(a.resolution.as_str())
    .bind(a.created_at_utc)
    .execute(&mut *tx)
    .await
    .context("insert amendment failed")?;

    write_order_row(&mut *tx, a.order_id, plan.status_after, plan.new_total).await?;

    tx.commit().await.context("commit_proposal commit failed")?;
    debug!(amendment_id = %a.amendment_id, rows = plan.new_items.len(), "proposal committed");
    Ok(())
}

/// Resolution, signature, item locks and order status of an approval,
/// atomically.
pub async fn commit_approval(pool: &PgPool, plan: &ApprovalPlan) -> Result<()> {
    let mut tx = pool.begin().await.context("commit_approval begin failed")?;
    lock_pending_amendment(&mut *tx, plan.amendment_id).await?;
    lock_order(&mut *tx, plan.order_id).await?;

    sqlx::query("update amendments set resolution = 'APPROVED' where amendment_id = $1")
        .bind(plan.amendment_id)
        .execute(&mut *tx)
        .await
        .context("resolve amendment failed")?;

    insert_signature(&mut *tx, &plan.signature).await?;
    write_item_locks(&mut *tx, &plan.locked_items).await?;
    write_order_row(&mut *tx, plan.order_id, plan.status_after, plan.order_total).await?;

    tx.commit().await.context("commit_approval commit failed")?;
    Ok(())
}

/// What a committed rejection left behind, read inside the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectionCommit {
    pub deleted: u64,
    pub post_count: usize,
    /// Order total written by the commit.
    pub restored_total: Money,
    pub total_after: Money,
}

/// Delete claimed rows and the ledger row, restore total and status,
/// atomically. Counts and total are re-read before commit for verification.
///
/// Rows are deleted only while still unlocked and pending; a row locked or
/// started since planning stays, and its line stays in the restored total.
pub async fn commit_rejection(pool: &PgPool, plan: &RejectionPlan) -> Result<RejectionCommit> {
    let mut tx = pool.begin().await.context("commit_rejection begin failed")?;
    lock_pending_amendment(&mut *tx, plan.amendment_id).await?;
    lock_order(&mut *tx, plan.order_id).await?;

    let removed: Vec<Uuid> = sqlx::query_scalar(
        r#"
        delete from order_items
         where order_id = $1
           and item_id = any($2)
           and not pricing_locked
           and fulfillment = 'PENDING'
        returning item_id
        "#,
    )
    .bind(plan.order_id)
    .bind(&plan.delete_item_ids[..])
    .fetch_all(&mut *tx)
    .await
    .context("delete amendment items failed")?;

    sqlx::query("delete from amendments where amendment_id = $1")
        .bind(plan.amendment_id)
        .execute(&mut *tx)
        .await
        .context("delete amendment failed")?;

    let restored_total = plan.restore_total_after(&removed);
    write_order_row(&mut *tx, plan.order_id, plan.status_after, restored_total).await?;

    let post_count = count_items(&mut *tx, plan.order_id).await?;
    let total_after = lock_order(&mut *tx, plan.order_id).await?.total;

    tx.commit().await.context("commit_rejection commit failed")?;
    Ok(RejectionCommit {
        deleted: removed.len() as u64,
        post_count,
        restored_total,
        total_after,
    })
}

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

/// Append one signature on an open connection or transaction.
pub async fn insert_signature(conn: &mut PgConnection, sig: &AuthorizationSignature) -> Result<()> {
    sqlx::query(
        r#"
        insert into authorization_signatures (
          signature_id, order_id, kind, signature_image, signer_name, signed_at_utc,
          reason, authorized_amount, amendment_id
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9
        )
        "#,
    )
    .bind(sig.signature_id)
    .bind(sig.order_id)
    .bind(sig.kind.as_str())
    .bind(&sig.signature_image)
    .bind(&sig.signer_name)
    .bind(sig.signed_at_utc)
    .bind(&sig.reason)
    .bind(sig.authorized_amount.minor())
    .bind(sig.amendment_id)
    .execute(conn)
    .await
    .context("insert_signature failed")?;
    Ok(())
}

pub async fn list_signatures(pool: &PgPool, order_id: Uuid) -> Result<Vec<AuthorizationSignature>> {
    let rows = sqlx::query(&format!(
        "select {SIGNATURE_COLUMNS} from authorization_signatures where order_id = $1 order by signed_at_utc, signature_id"
    ))
    .bind(order_id)
    .fetch_all(pool)
    .await
    .context("list_signatures failed")?;

    rows.iter().map(row_to_signature).collect()
}

/// Signature plus status move (and item locks), atomically. The order must
/// still be in `expected`.
async fn commit_signed_transition(
    pool: &PgPool,
    sig: &AuthorizationSignature,
    locked_items: &[OrderItem],
    expected: OrderStatus,
    to: OrderStatus,
    total: Money,
) -> Result<()> {
    let mut tx = pool.begin().await.context("signed transition begin failed")?;
    let order = lock_order(&mut *tx, sig.order_id).await?;
    if order.status != expected {
        bail!(
            "order {} is {}, expected {}",
            sig.order_id,
            order.status.as_str(),
            expected.as_str()
        );
    }

    insert_signature(&mut *tx, sig).await?;
    write_item_locks(&mut *tx, locked_items).await?;
    write_order_row(&mut *tx, sig.order_id, to, total).await?;

    tx.commit().await.context("signed transition commit failed")?;
    Ok(())
}

pub async fn commit_initial_authorization(
    pool: &PgPool,
    sig: &AuthorizationSignature,
    locked_items: &[OrderItem],
    total: Money,
) -> Result<()> {
    commit_signed_transition(
        pool,
        sig,
        locked_items,
        OrderStatus::AwaitingInitialAuthorization,
        OrderStatus::Active,
        total,
    )
    .await
}

pub async fn commit_delivery(pool: &PgPool, sig: &AuthorizationSignature, total: Money) -> Result<()> {
    commit_signed_transition(
        pool,
        sig,
        &[],
        OrderStatus::AwaitingDeliverySignature,
        OrderStatus::Delivered,
        total,
    )
    .await
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// Order, items, ledger and signatures as of now. `None` if no such order.
pub async fn load_snapshot(pool: &PgPool, order_id: Uuid) -> Result<Option<OrderSnapshot>> {
    let Some(order) = fetch_order(pool, order_id).await? else {
        return Ok(None);
    };
    Ok(Some(OrderSnapshot {
        order,
        items: fetch_items(pool, order_id).await?,
        amendments: fetch_amendments(pool, order_id).await?,
        signatures: list_signatures(pool, order_id).await?,
    }))
}
