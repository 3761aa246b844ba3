//! Amendment proposal planning.
//!
//! A proposal is validated and turned into a [`ProposalPlan`] without any
//! I/O. The plan carries every row the store has to write in one
//! transaction: the new item rows, the ledger entry, and the order's new
//! status and total.
//!
//! Validation order: reason, item list, per-item quantity and catalog
//! reference, then order status. Nothing is written when any check fails.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use svo_orders::{transition, Actor, OrderEvent, OrderStatus, TransitionError};
use svo_pricing::{Catalog, Money, PricingRules};
use svo_schemas::{
    Amendment, AmendmentItemSnapshot, AmendmentResolution, ItemRequest, OrderItem, OrderSnapshot,
};

use crate::items::{build_items, ItemBuildError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalError {
    EmptyReason,
    NoItems,
    InvalidItem(ItemBuildError),
    NotAmendable(TransitionError),
    TotalOverflow,
}

impl fmt::Display for ProposalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProposalError::EmptyReason => write!(f, "an amendment needs a reason"),
            ProposalError::NoItems => write!(f, "an amendment needs at least one item"),
            ProposalError::InvalidItem(e) => write!(f, "invalid amendment item: {e}"),
            ProposalError::NotAmendable(e) => write!(f, "order cannot be amended: {e}"),
            ProposalError::TotalOverflow => write!(f, "amended total overflows"),
        }
    }
}

impl std::error::Error for ProposalError {}

impl From<ItemBuildError> for ProposalError {
    fn from(e: ItemBuildError) -> Self {
        ProposalError::InvalidItem(e)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalRequest {
    pub order_id: Uuid,
    pub items: Vec<ItemRequest>,
    pub reason: String,
    pub author: Actor,
}

/// Everything a proposal writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalPlan {
    pub amendment: Amendment,
    /// Rows to insert; each carries `amendment_id`.
    pub new_items: Vec<OrderItem>,
    pub previous_total: Money,
    pub new_total: Money,
    pub status_after: OrderStatus,
}

/// Validate `req` against the order and price the added lines.
///
/// `previous_total` is the order's current total as stored. `new_total`
/// adds the per-line rounded total of every new line to it.
pub fn plan_proposal(
    rules: &PricingRules,
    catalog: &dyn Catalog,
    snapshot: &OrderSnapshot,
    req: &ProposalRequest,
    now: DateTime<Utc>,
) -> Result<ProposalPlan, ProposalError> {
    let reason = req.reason.trim();
    if reason.is_empty() {
        return Err(ProposalError::EmptyReason);
    }
    if req.items.is_empty() {
        return Err(ProposalError::NoItems);
    }

    let order = &snapshot.order;
    let amendment_id = Uuid::new_v4();
    let new_items = build_items(
        rules,
        catalog,
        order.order_id,
        &req.items,
        Some(amendment_id),
        now,
    )?;

    let status_after = transition(order.status, &OrderEvent::AmendmentProposed { amendment_id })
        .map_err(ProposalError::NotAmendable)?;

    let previous_total = order.total;
    let mut new_total = previous_total;
    let mut snapshots = Vec::with_capacity(new_items.len());
    for item in &new_items {
        let line_total = item.displayed_total(rules);
        new_total = new_total
            .checked_add(line_total)
            .ok_or(ProposalError::TotalOverflow)?;
        snapshots.push(AmendmentItemSnapshot::of_item(item, line_total));
    }

    let amendment = Amendment {
        amendment_id,
        order_id: order.order_id,
        previous_total,
        new_total,
        items: snapshots,
        reason: reason.to_string(),
        author_id: req.author.id.clone(),
        resolution: AmendmentResolution::Pending,
        created_at_utc: now,
    };

    Ok(ProposalPlan {
        amendment,
        new_items,
        previous_total,
        new_total,
        status_after,
    })
}
