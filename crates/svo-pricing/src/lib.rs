//! svo-pricing
//!
//! Pricing Engine for service-order line items.
//!
//! - Every monetary value is a [`Money`] amount in minor currency units.
//! - Rates (VAT, margins) are integer basis points.
//! - The displayed total of a line is derived by [`price_line`]; locked or
//!   incomplete lines return their stored total verbatim.
//! - Fresh totals are ceiling-rounded per line; order totals are the sum of
//!   independently rounded lines.
//!
//! Deterministic, pure logic. No IO.

mod catalog;
mod engine;
mod margin;
mod money;

pub use catalog::{
    displayed_total_with_catalog, overlay_catalog, Catalog, CatalogEntry, CatalogError,
    StaticCatalog,
};
pub use engine::{
    compute_displayed_total, order_total, pre_rounding, price_line, DisplayedTotal, ItemKind,
    MissingPricingInput, PreRounding, PricedLine, PricingInputs, PricingRules, TotalSource,
};
pub use margin::{MarginPolicy, MarginTier};
pub use money::{Money, BPS_SCALE, DEFAULT_ROUNDING_INCREMENT, DEFAULT_VAT_BPS};
