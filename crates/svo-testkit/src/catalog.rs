//! Workshop catalog used by the scenarios.
//!
//! | ref          | kind    | price               | line total (qty 1) |
//! |--------------|---------|---------------------|--------------------|
//! | `LAB-DIAG`   | service | base 1000           | 1160               |
//! | `LAB-INSP`   | service | base 2500           | 2900               |
//! | `PART-BELT`  | article | cost 400, +7.75%    | 500                |
//! | `PART-HOSE`  | article | cost 800, +7.75%    | 1000               |

use std::sync::RwLock;

use svo_pricing::{
    Catalog, CatalogEntry, CatalogError, ItemKind, MarginPolicy, Money, StaticCatalog,
};

pub const DIAGNOSIS: &str = "LAB-DIAG";
pub const INSPECTION: &str = "LAB-INSP";
pub const BELT: &str = "PART-BELT";
pub const HOSE: &str = "PART-HOSE";

fn service(catalog_ref: &str, name: &str, base: i64) -> CatalogEntry {
    CatalogEntry {
        catalog_ref: catalog_ref.to_string(),
        name: name.to_string(),
        kind: ItemKind::Service,
        cost_price: None,
        base_price: Some(Money::new(base)),
        vat_bps: None,
        margin: MarginPolicy::none(),
    }
}

fn article(catalog_ref: &str, name: &str, cost: i64, margin_bps: u32) -> CatalogEntry {
    CatalogEntry {
        catalog_ref: catalog_ref.to_string(),
        name: name.to_string(),
        kind: ItemKind::Article,
        cost_price: Some(Money::new(cost)),
        base_price: None,
        vat_bps: None,
        margin: MarginPolicy::flat(margin_bps),
    }
}

pub fn workshop_catalog() -> StaticCatalog {
    [
        service(DIAGNOSIS, "Diagnosis", 1_000),
        service(INSPECTION, "Inspection", 2_500),
        article(BELT, "Drive belt", 400, 775),
        article(HOSE, "Coolant hose", 800, 775),
    ]
    .into_iter()
    .collect()
}

/// Catalog whose prices can drift, or which can go down, mid-scenario.
#[derive(Debug)]
pub struct SwitchableCatalog {
    inner: RwLock<StaticCatalog>,
    down: RwLock<bool>,
}

impl Default for SwitchableCatalog {
    fn default() -> Self {
        Self::new(workshop_catalog())
    }
}

impl SwitchableCatalog {
    pub fn new(catalog: StaticCatalog) -> Self {
        Self {
            inner: RwLock::new(catalog),
            down: RwLock::new(false),
        }
    }

    /// Replace one entry, e.g. to simulate a price change.
    pub fn upsert(&self, entry: CatalogEntry) {
        if let Ok(mut c) = self.inner.write() {
            c.insert(entry);
        }
    }

    pub fn set_down(&self, down: bool) {
        if let Ok(mut d) = self.down.write() {
            *d = down;
        }
    }
}

impl Catalog for SwitchableCatalog {
    fn lookup(&self, catalog_ref: &str) -> Result<CatalogEntry, CatalogError> {
        if self.down.read().map(|d| *d).unwrap_or(true) {
            return Err(CatalogError::Unavailable("catalog offline".to_string()));
        }
        self.inner
            .read()
            .map_err(|_| CatalogError::Unavailable("catalog lock poisoned".to_string()))?
            .lookup(catalog_ref)
    }
}

/// Convenience for drift scenarios: a copy of a workshop service at a new
/// base price.
pub fn repriced_service(catalog_ref: &str, name: &str, base: i64) -> CatalogEntry {
    service(catalog_ref, name, base)
}
