use serde::{Deserialize, Serialize};

/// A profit-margin tier that applies to an inclusive quantity range.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginTier {
    pub min_qty: i64,
    /// Inclusive upper bound; `None` means open-ended.
    pub max_qty: Option<i64>,
    pub margin_bps: u32,
}

impl MarginTier {
    pub fn new(min_qty: i64, max_qty: Option<i64>, margin_bps: u32) -> Self {
        Self {
            min_qty,
            max_qty,
            margin_bps,
        }
    }

    pub fn contains(&self, qty: i64) -> bool {
        qty >= self.min_qty && self.max_qty.map_or(true, |max| qty <= max)
    }
}

/// Profit margin of a cost-based line: quantity tiers, a flat rate, or both.
///
/// Tiers take precedence. When tiers exist but none contains the quantity the
/// flat rate applies; an unset flat rate means zero margin.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginPolicy {
    #[serde(default)]
    pub tiers: Vec<MarginTier>,
    #[serde(default)]
    pub flat_bps: Option<u32>,
}

impl MarginPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn flat(bps: u32) -> Self {
        Self {
            tiers: Vec::new(),
            flat_bps: Some(bps),
        }
    }

    pub fn tiered(tiers: Vec<MarginTier>) -> Self {
        Self {
            tiers,
            flat_bps: None,
        }
    }

    /// Margin in basis points for `qty` units.
    pub fn margin_for(&self, qty: i64) -> u32 {
        self.tiers
            .iter()
            .find(|t| t.contains(qty))
            .map(|t| t.margin_bps)
            .or(self.flat_bps)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiers() -> MarginPolicy {
        MarginPolicy::tiered(vec![
            MarginTier::new(1, Some(9), 3_000),
            MarginTier::new(10, Some(49), 2_000),
            MarginTier::new(50, None, 1_000),
        ])
    }

    #[test]
    fn tier_matching_quantity_range_wins() {
        let p = tiers();
        assert_eq!(p.margin_for(1), 3_000);
        assert_eq!(p.margin_for(9), 3_000);
        assert_eq!(p.margin_for(10), 2_000);
        assert_eq!(p.margin_for(49), 2_000);
        assert_eq!(p.margin_for(500), 1_000);
    }

    #[test]
    fn flat_rate_used_without_tiers() {
        assert_eq!(MarginPolicy::flat(2_500).margin_for(7), 2_500);
    }

    #[test]
    fn uncovered_quantity_falls_back_to_flat_then_zero() {
        let mut p = MarginPolicy::tiered(vec![MarginTier::new(10, Some(20), 1_500)]);
        assert_eq!(p.margin_for(3), 0);
        p.flat_bps = Some(4_000);
        assert_eq!(p.margin_for(3), 4_000);
        assert_eq!(p.margin_for(15), 1_500);
    }
}
