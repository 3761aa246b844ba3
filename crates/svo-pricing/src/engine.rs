//! Displayed-total computation.
//!
//! # Precedence
//!
//! 1. `pricing_locked` lines return their stored total verbatim.
//! 2. Lines missing a required input (service: positive base price;
//!    article: positive cost price), or with a non-positive quantity,
//!    return their stored total verbatim.
//! 3. Otherwise the total is computed fresh and rounded **up** to the next
//!    multiple of the rounding increment:
//!
//! ```text
//! article unit = cost * (1 + margin(qty))
//! service unit = base
//! pre          = unit * qty * (1 + vat)
//! displayed    = ceil(pre / increment) * increment
//! ```
//!
//! Rounding is applied per line. [`order_total`] sums already-rounded lines;
//! rounding a sum of unrounded lines gives a different (wrong) figure.
//!
//! The whole computation is exact rational integer arithmetic in `i128`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::margin::MarginPolicy;
use crate::money::{Money, BPS_SCALE, DEFAULT_ROUNDING_INCREMENT, DEFAULT_VAT_BPS};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Labour or service; priced from its base price.
    Service,
    /// Physical article; priced from cost plus margin.
    Article,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Service => "SERVICE",
            ItemKind::Article => "ARTICLE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SERVICE" => Some(ItemKind::Service),
            "ARTICLE" => Some(ItemKind::Article),
            _ => None,
        }
    }
}

/// The stored attributes of a line that feed the Pricing Engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingInputs {
    pub kind: ItemKind,
    pub cost_price: Option<Money>,
    pub base_price: Option<Money>,
    /// `None` means "use the default VAT rate".
    pub vat_bps: Option<u32>,
    pub margin: MarginPolicy,
    pub pricing_locked: bool,
    pub stored_total: Money,
}

/// Validated, kind-specific pricing shape.
///
/// Built once at the engine boundary by [`PricedLine::from_inputs`]; the
/// computation below never re-checks individual fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PricedLine<'a> {
    Service {
        base_price: Money,
    },
    Article {
        cost_price: Money,
        margin: &'a MarginPolicy,
    },
}

/// A line lacks the input its kind requires for fresh computation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MissingPricingInput {
    pub kind: ItemKind,
    pub field: &'static str,
}

impl fmt::Display for MissingPricingInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} line requires a positive {}",
            self.kind.as_str(),
            self.field
        )
    }
}

impl std::error::Error for MissingPricingInput {}

impl<'a> PricedLine<'a> {
    pub fn from_inputs(inputs: &'a PricingInputs) -> Result<Self, MissingPricingInput> {
        match inputs.kind {
            ItemKind::Service => match inputs.base_price {
                Some(p) if p.is_positive() => Ok(PricedLine::Service { base_price: p }),
                _ => Err(MissingPricingInput {
                    kind: ItemKind::Service,
                    field: "base_price",
                }),
            },
            ItemKind::Article => match inputs.cost_price {
                Some(c) if c.is_positive() => Ok(PricedLine::Article {
                    cost_price: c,
                    margin: &inputs.margin,
                }),
                _ => Err(MissingPricingInput {
                    kind: ItemKind::Article,
                    field: "cost_price",
                }),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Tunables of the engine. `Default` is 16% VAT and ceiling-to-10 rounding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRules {
    pub default_vat_bps: u32,
    pub rounding_increment: i64,
}

impl Default for PricingRules {
    fn default() -> Self {
        Self {
            default_vat_bps: DEFAULT_VAT_BPS,
            rounding_increment: DEFAULT_ROUNDING_INCREMENT,
        }
    }
}

// ---------------------------------------------------------------------------
// Exact pre-rounding value
// ---------------------------------------------------------------------------

/// The exact pre-rounding total as a fraction of minor units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PreRounding {
    pub numerator: i128,
    pub denominator: i128,
}

impl PreRounding {
    /// Round up to the next multiple of `increment` minor units.
    ///
    /// Returns `None` if `increment` is not positive or the result does not
    /// fit in `i64`.
    pub fn ceil_to(&self, increment: i64) -> Option<Money> {
        if increment <= 0 || self.numerator < 0 {
            return None;
        }
        let inc = i128::from(increment);
        let step = self.denominator.checked_mul(inc)?;
        let steps = self.numerator.checked_add(step - 1)? / step;
        let minor = steps.checked_mul(inc)?;
        i64::try_from(minor).ok().map(Money::new)
    }

    /// `true` when `amount` is greater than or equal to this exact value.
    pub fn is_covered_by(&self, amount: Money) -> bool {
        i128::from(amount.minor()) * self.denominator >= self.numerator
    }
}

/// Exact `unit * qty * (1 + vat)` for a validated line.
pub fn pre_rounding(line: &PricedLine<'_>, vat_bps: u32, qty: i64) -> Option<PreRounding> {
    let bps = i128::from(BPS_SCALE);
    let vat_factor = bps + i128::from(vat_bps);
    let units = i128::from(qty);

    match line {
        PricedLine::Service { base_price } => {
            let numerator = i128::from(base_price.minor())
                .checked_mul(units)?
                .checked_mul(vat_factor)?;
            Some(PreRounding {
                numerator,
                denominator: bps,
            })
        }
        PricedLine::Article { cost_price, margin } => {
            let margin_factor = bps + i128::from(margin.margin_for(qty));
            let numerator = i128::from(cost_price.minor())
                .checked_mul(margin_factor)?
                .checked_mul(units)?
                .checked_mul(vat_factor)?;
            Some(PreRounding {
                numerator,
                denominator: bps * bps,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Displayed total
// ---------------------------------------------------------------------------

/// Where a displayed total came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalSource {
    /// Line is pricing-locked; stored total returned verbatim.
    Locked,
    /// Inputs missing/non-positive (or overflow); stored total returned.
    StoredFallback,
    /// Freshly computed and rounded.
    Computed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplayedTotal {
    pub amount: Money,
    pub source: TotalSource,
}

impl DisplayedTotal {
    fn stored(inputs: &PricingInputs, source: TotalSource) -> Self {
        Self {
            amount: inputs.stored_total,
            source,
        }
    }
}

/// Authoritative displayed total of one line at `qty` units.
pub fn price_line(rules: &PricingRules, inputs: &PricingInputs, qty: i64) -> DisplayedTotal {
    if inputs.pricing_locked {
        return DisplayedTotal::stored(inputs, TotalSource::Locked);
    }
    if qty <= 0 {
        return DisplayedTotal::stored(inputs, TotalSource::StoredFallback);
    }
    let line = match PricedLine::from_inputs(inputs) {
        Ok(line) => line,
        Err(_) => return DisplayedTotal::stored(inputs, TotalSource::StoredFallback),
    };

    let vat = inputs.vat_bps.unwrap_or(rules.default_vat_bps);
    match pre_rounding(&line, vat, qty).and_then(|p| p.ceil_to(rules.rounding_increment)) {
        Some(amount) => DisplayedTotal {
            amount,
            source: TotalSource::Computed,
        },
        None => DisplayedTotal::stored(inputs, TotalSource::StoredFallback),
    }
}

/// [`price_line`] under default rules, returning only the amount.
pub fn compute_displayed_total(inputs: &PricingInputs, qty: i64) -> Money {
    price_line(&PricingRules::default(), inputs, qty).amount
}

/// Sum of independently rounded line totals.
///
/// Callers pass only lines that count towards the order (cancelled lines are
/// excluded upstream).
pub fn order_total<'a, I>(rules: &PricingRules, lines: I) -> Money
where
    I: IntoIterator<Item = (&'a PricingInputs, i64)>,
{
    lines
        .into_iter()
        .map(|(inputs, qty)| price_line(rules, inputs, qty).amount)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::margin::MarginTier;

    fn service(base: i64, vat: Option<u32>) -> PricingInputs {
        PricingInputs {
            kind: ItemKind::Service,
            cost_price: None,
            base_price: Some(Money::new(base)),
            vat_bps: vat,
            margin: MarginPolicy::none(),
            pricing_locked: false,
            stored_total: Money::ZERO,
        }
    }

    fn article(cost: i64, margin: MarginPolicy) -> PricingInputs {
        PricingInputs {
            kind: ItemKind::Article,
            cost_price: Some(Money::new(cost)),
            base_price: None,
            vat_bps: Some(1_600),
            margin,
            pricing_locked: false,
            stored_total: Money::ZERO,
        }
    }

    #[test]
    fn service_base_1000_default_vat_is_1160() {
        let line = service(1_000, None);
        let t = price_line(&PricingRules::default(), &line, 1);
        assert_eq!(t.amount, Money::new(1_160));
        assert_eq!(t.source, TotalSource::Computed);
    }

    #[test]
    fn fresh_total_rounds_up_not_nearest() {
        // 999 * 1.16 = 1158.84 -> 1160
        assert_eq!(compute_displayed_total(&service(999, None), 1), Money::new(1_160));
        // 1001 * 1.16 = 1161.16 -> 1170 (nearest would be 1160)
        assert_eq!(compute_displayed_total(&service(1_001, None), 1), Money::new(1_170));
    }

    #[test]
    fn article_applies_margin_to_cost() {
        // 1000 * 1.30 = 1300; * 2 = 2600; * 1.16 = 3016 -> 3020
        let line = article(1_000, MarginPolicy::flat(3_000));
        assert_eq!(compute_displayed_total(&line, 2), Money::new(3_020));
    }

    #[test]
    fn article_tier_follows_quantity() {
        let line = article(
            100,
            MarginPolicy::tiered(vec![
                MarginTier::new(1, Some(9), 5_000),
                MarginTier::new(10, None, 2_000),
            ]),
        );
        // 100 * 1.5 * 2 * 1.16 = 348 -> 350
        assert_eq!(compute_displayed_total(&line, 2), Money::new(350));
        // 100 * 1.2 * 10 * 1.16 = 1392 -> 1400
        assert_eq!(compute_displayed_total(&line, 10), Money::new(1_400));
    }

    #[test]
    fn explicit_zero_vat_is_respected() {
        assert_eq!(compute_displayed_total(&service(500, Some(0)), 1), Money::new(500));
    }

    #[test]
    fn locked_line_returns_stored_total() {
        let mut line = service(1_000, None);
        line.pricing_locked = true;
        line.stored_total = Money::new(987);
        let t = price_line(&PricingRules::default(), &line, 3);
        assert_eq!(t.amount, Money::new(987));
        assert_eq!(t.source, TotalSource::Locked);
    }

    #[test]
    fn service_without_positive_base_falls_back_to_stored() {
        let mut line = service(0, None);
        line.stored_total = Money::new(2_500);
        let t = price_line(&PricingRules::default(), &line, 1);
        assert_eq!(t.amount, Money::new(2_500));
        assert_eq!(t.source, TotalSource::StoredFallback);

        line.base_price = None;
        assert_eq!(compute_displayed_total(&line, 1), Money::new(2_500));
    }

    #[test]
    fn article_needs_cost_even_with_base_price() {
        let mut line = article(0, MarginPolicy::flat(1_000));
        line.base_price = Some(Money::new(5_000));
        line.stored_total = Money::new(42);
        assert_eq!(compute_displayed_total(&line, 1), Money::new(42));
    }

    #[test]
    fn non_positive_quantity_falls_back() {
        let mut line = service(1_000, None);
        line.stored_total = Money::new(70);
        assert_eq!(compute_displayed_total(&line, 0), Money::new(70));
    }

    #[test]
    fn overflow_falls_back_to_stored() {
        let mut line = service(i64::MAX, None);
        line.stored_total = Money::new(10);
        assert_eq!(compute_displayed_total(&line, i64::MAX), Money::new(10));
    }

    #[test]
    fn order_total_sums_rounded_lines() {
        let a = service(1_001, None);
        let b = service(1_001, None);
        let total = order_total(&PricingRules::default(), [(&a, 1), (&b, 1)]);
        // Each line rounds to 1170. Rounding the unrounded sum (2322.32)
        // once would give 2330.
        assert_eq!(total, Money::new(2_340));
    }

    #[test]
    fn custom_increment() {
        let rules = PricingRules {
            default_vat_bps: 0,
            rounding_increment: 100,
        };
        assert_eq!(price_line(&rules, &service(1_001, None), 1).amount, Money::new(1_100));
    }

    #[test]
    fn missing_input_display() {
        let err = PricedLine::from_inputs(&service(0, None)).unwrap_err();
        assert_eq!(err.to_string(), "SERVICE line requires a positive base_price");
    }
}
