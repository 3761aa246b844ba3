//! Turning catalog selections into order lines.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use svo_pricing::{price_line, Catalog, CatalogEntry, CatalogError, PricingInputs, PricingRules};
use svo_schemas::{FulfillmentStatus, ItemRequest, OrderItem};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemBuildError {
    InvalidQuantity { catalog_ref: String, quantity: i64 },
    UnknownCatalogRef { catalog_ref: String },
    CatalogUnavailable { catalog_ref: String, message: String },
}

impl fmt::Display for ItemBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemBuildError::InvalidQuantity {
                catalog_ref,
                quantity,
            } => write!(f, "quantity must be positive for {catalog_ref}: got {quantity}"),
            ItemBuildError::UnknownCatalogRef { catalog_ref } => {
                write!(f, "unknown catalog reference: {catalog_ref}")
            }
            ItemBuildError::CatalogUnavailable {
                catalog_ref,
                message,
            } => write!(f, "catalog lookup failed for {catalog_ref}: {message}"),
        }
    }
}

impl std::error::Error for ItemBuildError {}

/// A new, unlocked, pending line priced from `entry`.
///
/// The stored total is seeded with the freshly computed displayed total so a
/// later fallback has a sensible number to show.
pub fn build_item(
    rules: &PricingRules,
    order_id: Uuid,
    entry: &CatalogEntry,
    quantity: i64,
    amendment_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> OrderItem {
    let mut pricing = PricingInputs {
        kind: entry.kind,
        cost_price: entry.cost_price,
        base_price: entry.base_price,
        vat_bps: entry.vat_bps,
        margin: entry.margin.clone(),
        pricing_locked: false,
        stored_total: svo_pricing::Money::ZERO,
    };
    pricing.stored_total = price_line(rules, &pricing, quantity).amount;

    OrderItem {
        item_id: Uuid::new_v4(),
        order_id,
        catalog_ref: entry.catalog_ref.clone(),
        name: entry.name.clone(),
        quantity,
        pricing,
        fulfillment: FulfillmentStatus::Pending,
        amendment_id,
        created_at_utc: now,
    }
}

/// Resolve every request against the catalog. All-or-nothing: the first
/// invalid request aborts with nothing built.
pub fn build_items(
    rules: &PricingRules,
    catalog: &dyn Catalog,
    order_id: Uuid,
    requests: &[ItemRequest],
    amendment_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<Vec<OrderItem>, ItemBuildError> {
    let mut out = Vec::with_capacity(requests.len());
    for req in requests {
        if req.quantity <= 0 {
            return Err(ItemBuildError::InvalidQuantity {
                catalog_ref: req.catalog_ref.clone(),
                quantity: req.quantity,
            });
        }
        let entry = catalog.lookup(&req.catalog_ref).map_err(|e| match e {
            CatalogError::NotFound(r) => ItemBuildError::UnknownCatalogRef { catalog_ref: r },
            CatalogError::Unavailable(message) => ItemBuildError::CatalogUnavailable {
                catalog_ref: req.catalog_ref.clone(),
                message,
            },
        })?;
        out.push(build_item(
            rules,
            order_id,
            &entry,
            req.quantity,
            amendment_id,
            now,
        ));
    }
    Ok(out)
}
