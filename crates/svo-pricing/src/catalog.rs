//! Catalog seam.
//!
//! The catalog itself is an external collaborator; this module only defines
//! the lookup contract and how current catalog values are overlaid onto a
//! stored line before pricing.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::{price_line, DisplayedTotal, ItemKind, PricingInputs, PricingRules, TotalSource};
use crate::margin::MarginPolicy;
use crate::money::Money;

/// Current catalog values for one reference id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub catalog_ref: String,
    pub name: String,
    pub kind: ItemKind,
    pub cost_price: Option<Money>,
    pub base_price: Option<Money>,
    pub vat_bps: Option<u32>,
    #[serde(default)]
    pub margin: MarginPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// No entry exists for the reference.
    NotFound(String),
    /// The catalog could not be consulted.
    Unavailable(String),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::NotFound(r) => write!(f, "catalog entry not found: {r}"),
            CatalogError::Unavailable(msg) => write!(f, "catalog unavailable: {msg}"),
        }
    }
}

impl std::error::Error for CatalogError {}

/// Catalog lookup contract.
///
/// Object-safe and `Send + Sync` so the runtime can hold an
/// `Arc<dyn Catalog>`.
pub trait Catalog: Send + Sync {
    fn lookup(&self, catalog_ref: &str) -> Result<CatalogEntry, CatalogError>;
}

/// Fixed in-memory catalog.
#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: CatalogEntry) -> Option<CatalogEntry> {
        self.entries.insert(entry.catalog_ref.clone(), entry)
    }

    pub fn remove(&mut self, catalog_ref: &str) -> Option<CatalogEntry> {
        self.entries.remove(catalog_ref)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<CatalogEntry> for StaticCatalog {
    fn from_iter<T: IntoIterator<Item = CatalogEntry>>(iter: T) -> Self {
        let mut c = StaticCatalog::new();
        for e in iter {
            c.insert(e);
        }
        c
    }
}

impl Catalog for StaticCatalog {
    fn lookup(&self, catalog_ref: &str) -> Result<CatalogEntry, CatalogError> {
        self.entries
            .get(catalog_ref)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(catalog_ref.to_string()))
    }
}

/// Replace the price-bearing attributes of `inputs` with current catalog
/// values. Lock flag and stored total are kept.
pub fn overlay_catalog(inputs: &PricingInputs, entry: &CatalogEntry) -> PricingInputs {
    PricingInputs {
        kind: entry.kind,
        cost_price: entry.cost_price,
        base_price: entry.base_price,
        vat_bps: entry.vat_bps,
        margin: entry.margin.clone(),
        pricing_locked: inputs.pricing_locked,
        stored_total: inputs.stored_total,
    }
}

/// Displayed total using live catalog values for unlocked lines.
///
/// A failed lookup yields the stored total: a stale number is preferred over
/// no number.
pub fn displayed_total_with_catalog(
    rules: &PricingRules,
    catalog: &dyn Catalog,
    catalog_ref: &str,
    inputs: &PricingInputs,
    qty: i64,
) -> DisplayedTotal {
    if inputs.pricing_locked {
        return price_line(rules, inputs, qty);
    }
    match catalog.lookup(catalog_ref) {
        Ok(entry) => price_line(rules, &overlay_catalog(inputs, &entry), qty),
        Err(_) => DisplayedTotal {
            amount: inputs.stored_total,
            source: TotalSource::StoredFallback,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(base: i64) -> CatalogEntry {
        CatalogEntry {
            catalog_ref: "SVC-1".to_string(),
            name: "Diagnosis".to_string(),
            kind: ItemKind::Service,
            cost_price: None,
            base_price: Some(Money::new(base)),
            vat_bps: None,
            margin: MarginPolicy::none(),
        }
    }

    fn stored_line(locked: bool) -> PricingInputs {
        PricingInputs {
            kind: ItemKind::Service,
            cost_price: None,
            base_price: Some(Money::new(1_000)),
            vat_bps: None,
            margin: MarginPolicy::none(),
            pricing_locked: locked,
            stored_total: Money::new(1_160),
        }
    }

    #[test]
    fn unlocked_line_follows_catalog_drift() {
        let catalog: StaticCatalog = [entry(2_000)].into_iter().collect();
        let t = displayed_total_with_catalog(
            &PricingRules::default(),
            &catalog,
            "SVC-1",
            &stored_line(false),
            1,
        );
        assert_eq!(t.amount, Money::new(2_320));
        assert_eq!(t.source, TotalSource::Computed);
    }

    #[test]
    fn locked_line_ignores_catalog_drift() {
        let catalog: StaticCatalog = [entry(2_000)].into_iter().collect();
        let t = displayed_total_with_catalog(
            &PricingRules::default(),
            &catalog,
            "SVC-1",
            &stored_line(true),
            1,
        );
        assert_eq!(t.amount, Money::new(1_160));
        assert_eq!(t.source, TotalSource::Locked);
    }

    #[test]
    fn lookup_failure_falls_back_to_stored() {
        let catalog = StaticCatalog::new();
        let t = displayed_total_with_catalog(
            &PricingRules::default(),
            &catalog,
            "SVC-404",
            &stored_line(false),
            1,
        );
        assert_eq!(t.amount, Money::new(1_160));
        assert_eq!(t.source, TotalSource::StoredFallback);
    }

    #[test]
    fn catalog_error_display() {
        assert_eq!(
            CatalogError::NotFound("X".into()).to_string(),
            "catalog entry not found: X"
        );
    }
}
