use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use svo_orders::{ConsentCheck, OrderStatus};
use svo_pricing::{price_line, ItemKind, Money, PricingInputs, PricingRules};

/// Event names handed to the dispatcher after successful transitions.
pub mod event_names {
    pub const ORDER_CREATED: &str = "order.created";
    pub const ORDER_AUTHORIZED: &str = "order.authorized";
    pub const AMENDMENT_PROPOSED: &str = "amendment.proposed";
    pub const AMENDMENT_APPROVED: &str = "amendment.approved";
    pub const AMENDMENT_REJECTED: &str = "amendment.rejected";
    pub const ORDER_STATUS_FORCED: &str = "order.status_forced";
    pub const ORDER_DELIVERY_REQUESTED: &str = "order.delivery_requested";
    pub const ORDER_DELIVERED: &str = "order.delivered";
    pub const ORDER_CANCELLED: &str = "order.cancelled";
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: Uuid,
    pub client_ref: String,
    pub status: OrderStatus,
    pub total: Money,
    pub created_at_utc: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// OrderItem
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Pending,
    InProgress,
    Completed,
    /// Removed from the scope of work; does not count towards the total.
    Cancelled,
}

impl FulfillmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStatus::Pending => "PENDING",
            FulfillmentStatus::InProgress => "IN_PROGRESS",
            FulfillmentStatus::Completed => "COMPLETED",
            FulfillmentStatus::Cancelled => "CANCELLED",
        }
    }

    /// Work moves forward only; anything not yet completed may be cancelled.
    pub fn can_move_to(&self, to: FulfillmentStatus) -> bool {
        use FulfillmentStatus::*;
        matches!(
            (self, to),
            (Pending, InProgress)
                | (Pending, Completed)
                | (InProgress, Completed)
                | (Pending, Cancelled)
                | (InProgress, Cancelled)
        )
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(FulfillmentStatus::Pending),
            "IN_PROGRESS" => Some(FulfillmentStatus::InProgress),
            "COMPLETED" => Some(FulfillmentStatus::Completed),
            "CANCELLED" => Some(FulfillmentStatus::Cancelled),
            _ => None,
        }
    }
}

/// One line of an order.
///
/// `amendment_id` links rows created by an amendment proposal. Rows written
/// before the link existed carry `None`; reverting those relies on content
/// matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub item_id: Uuid,
    pub order_id: Uuid,
    pub catalog_ref: String,
    pub name: String,
    pub quantity: i64,
    pub pricing: PricingInputs,
    pub fulfillment: FulfillmentStatus,
    pub amendment_id: Option<Uuid>,
    pub created_at_utc: DateTime<Utc>,
}

impl OrderItem {
    pub fn counts_toward_total(&self) -> bool {
        self.fulfillment != FulfillmentStatus::Cancelled
    }

    pub fn displayed_total(&self, rules: &PricingRules) -> Money {
        price_line(rules, &self.pricing, self.quantity).amount
    }

    /// Unit price that identifies the line: base price for services, cost
    /// price for articles.
    pub fn unit_price(&self) -> Option<Money> {
        match self.pricing.kind {
            ItemKind::Service => self.pricing.base_price,
            ItemKind::Article => self.pricing.cost_price,
        }
    }

    /// Freeze the line at its current displayed total.
    pub fn lock_pricing(&mut self, rules: &PricingRules) {
        if !self.pricing.pricing_locked {
            self.pricing.stored_total = self.displayed_total(rules);
            self.pricing.pricing_locked = true;
        }
    }
}

/// Order total: sum of per-line rounded totals of every non-cancelled item.
pub fn order_total(rules: &PricingRules, items: &[OrderItem]) -> Money {
    svo_pricing::order_total(
        rules,
        items
            .iter()
            .filter(|i| i.counts_toward_total())
            .map(|i| (&i.pricing, i.quantity)),
    )
}

/// A catalog selection to turn into an order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRequest {
    pub catalog_ref: String,
    pub quantity: i64,
}

impl ItemRequest {
    pub fn new(catalog_ref: impl Into<String>, quantity: i64) -> Self {
        Self {
            catalog_ref: catalog_ref.into(),
            quantity,
        }
    }
}

// ---------------------------------------------------------------------------
// Amendment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmendmentResolution {
    Pending,
    Approved,
    RejectedAndDeleted,
}

impl AmendmentResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            AmendmentResolution::Pending => "PENDING",
            AmendmentResolution::Approved => "APPROVED",
            AmendmentResolution::RejectedAndDeleted => "REJECTED_AND_DELETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(AmendmentResolution::Pending),
            "APPROVED" => Some(AmendmentResolution::Approved),
            "REJECTED_AND_DELETED" => Some(AmendmentResolution::RejectedAndDeleted),
            _ => None,
        }
    }
}

/// Attributes of one added line, captured when the amendment was proposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmendmentItemSnapshot {
    pub name: String,
    pub catalog_ref: String,
    pub kind: ItemKind,
    pub quantity: i64,
    pub unit_cost: Option<Money>,
    pub unit_base: Option<Money>,
    pub vat_bps: Option<u32>,
    pub computed_total: Money,
}

impl AmendmentItemSnapshot {
    pub fn of_item(item: &OrderItem, computed_total: Money) -> Self {
        Self {
            name: item.name.clone(),
            catalog_ref: item.catalog_ref.clone(),
            kind: item.pricing.kind,
            quantity: item.quantity,
            unit_cost: item.pricing.cost_price,
            unit_base: item.pricing.base_price,
            vat_bps: item.pricing.vat_bps,
            computed_total,
        }
    }

    pub fn unit_price(&self) -> Option<Money> {
        match self.kind {
            ItemKind::Service => self.unit_base,
            ItemKind::Article => self.unit_cost,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amendment {
    pub amendment_id: Uuid,
    pub order_id: Uuid,
    pub previous_total: Money,
    pub new_total: Money,
    pub items: Vec<AmendmentItemSnapshot>,
    pub reason: String,
    pub author_id: String,
    pub resolution: AmendmentResolution,
    pub created_at_utc: DateTime<Utc>,
}

impl Amendment {
    pub fn is_pending(&self) -> bool {
        self.resolution == AmendmentResolution::Pending
    }
}

// ---------------------------------------------------------------------------
// AuthorizationSignature
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureKind {
    Initial,
    Amendment,
    Delivery,
}

impl SignatureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureKind::Initial => "INITIAL",
            SignatureKind::Amendment => "AMENDMENT",
            SignatureKind::Delivery => "DELIVERY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INITIAL" => Some(SignatureKind::Initial),
            "AMENDMENT" => Some(SignatureKind::Amendment),
            "DELIVERY" => Some(SignatureKind::Delivery),
            _ => None,
        }
    }
}

/// Durable proof of client consent to `authorized_amount`. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationSignature {
    pub signature_id: Uuid,
    pub order_id: Uuid,
    pub kind: SignatureKind,
    /// Opaque image bytes; storage mechanics live elsewhere.
    pub signature_image: Vec<u8>,
    pub signer_name: String,
    pub signed_at_utc: DateTime<Utc>,
    pub reason: String,
    pub authorized_amount: Money,
    pub amendment_id: Option<Uuid>,
}

/// What the signing party hands over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureCapture {
    pub signer_name: String,
    pub signature_image: Vec<u8>,
}

impl SignatureCapture {
    pub fn new(signer_name: impl Into<String>, signature_image: Vec<u8>) -> Self {
        Self {
            signer_name: signer_name.into(),
            signature_image,
        }
    }
}

// ---------------------------------------------------------------------------
// Loaded aggregate
// ---------------------------------------------------------------------------

/// Everything known about one order at one moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSnapshot {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub amendments: Vec<Amendment>,
    pub signatures: Vec<AuthorizationSignature>,
}

impl OrderSnapshot {
    pub fn unresolved_amendments(&self) -> impl Iterator<Item = &Amendment> {
        self.amendments.iter().filter(|a| a.is_pending())
    }

    pub fn consent(&self) -> ConsentCheck {
        ConsentCheck::new(
            self.unresolved_amendments().count(),
            self.signatures
                .iter()
                .any(|s| s.kind == SignatureKind::Initial),
        )
    }
}

// ---------------------------------------------------------------------------
// Outbound payloads
// ---------------------------------------------------------------------------

/// Fire-and-forget notification handed to the event dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchEvent {
    pub name: String,
    pub order_id: Uuid,
    pub ts_utc: DateTime<Utc>,
    pub data: Value,
}

impl DispatchEvent {
    pub fn new(name: &str, order_id: Uuid, data: Value) -> Self {
        Self {
            name: name.to_string(),
            order_id,
            ts_utc: Utc::now(),
            data,
        }
    }
}

/// Order-row update published on the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderChange {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub total: Money,
    pub ts_utc: DateTime<Utc>,
}

impl OrderChange {
    pub fn of(order: &Order) -> Self {
        Self {
            order_id: order.order_id,
            status: order.status,
            total: order.total,
            ts_utc: Utc::now(),
        }
    }
}
