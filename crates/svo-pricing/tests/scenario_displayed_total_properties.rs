//! Scenario: displayed-total properties
//!
//! # Invariants under test
//! - A pricing-locked line returns exactly its stored total, whatever its
//!   other attributes are.
//! - An unlocked service line without a positive base price never renders
//!   zero when a positive stored total exists.
//! - Every freshly computed total is a multiple of 10 minor units and is
//!   never below the exact pre-rounding value.
//!
//! Pure in-process; no DB or network required.

use proptest::prelude::*;
use svo_pricing::{
    pre_rounding, price_line, ItemKind, MarginPolicy, MarginTier, Money, PricedLine,
    PricingInputs, PricingRules, TotalSource,
};

prop_compose! {
    fn arbitrary_margin()
        (flat in proptest::option::of(0u32..10_000), split in 1i64..100, lo in 0u32..8_000, hi in 0u32..8_000)
        -> MarginPolicy
    {
        MarginPolicy {
            tiers: vec![
                MarginTier::new(1, Some(split), lo),
                MarginTier::new(split + 1, None, hi),
            ],
            flat_bps: flat,
        }
    }
}

prop_compose! {
    fn arbitrary_line()
        (is_service in any::<bool>(),
         cost in proptest::option::of(-1_000i64..5_000_000),
         base in proptest::option::of(-1_000i64..5_000_000),
         vat in proptest::option::of(0u32..5_000),
         margin in arbitrary_margin(),
         locked in any::<bool>(),
         stored in 0i64..10_000_000)
        -> PricingInputs
    {
        PricingInputs {
            kind: if is_service { ItemKind::Service } else { ItemKind::Article },
            cost_price: cost.map(Money::new),
            base_price: base.map(Money::new),
            vat_bps: vat,
            margin,
            pricing_locked: locked,
            stored_total: Money::new(stored),
        }
    }
}

proptest! {
    #[test]
    fn locked_lines_return_stored_total(mut line in arbitrary_line(), qty in -5i64..1_000) {
        line.pricing_locked = true;
        let t = price_line(&PricingRules::default(), &line, qty);
        prop_assert_eq!(t.amount, line.stored_total);
        prop_assert_eq!(t.source, TotalSource::Locked);
    }

    #[test]
    fn service_without_positive_base_uses_stored(
        base in proptest::option::of(-5_000i64..=0),
        stored in 1i64..10_000_000,
        qty in 1i64..1_000,
    ) {
        let line = PricingInputs {
            kind: ItemKind::Service,
            cost_price: Some(Money::new(100)),
            base_price: base.map(Money::new),
            vat_bps: None,
            margin: MarginPolicy::none(),
            pricing_locked: false,
            stored_total: Money::new(stored),
        };
        let t = price_line(&PricingRules::default(), &line, qty);
        prop_assert_eq!(t.amount, Money::new(stored));
        prop_assert!(t.amount.is_positive());
    }

    #[test]
    fn computed_totals_are_ceiling_multiples_of_ten(line in arbitrary_line(), qty in 1i64..1_000) {
        let rules = PricingRules::default();
        let t = price_line(&rules, &line, qty);
        if t.source == TotalSource::Computed {
            prop_assert!(t.amount.is_multiple_of(10));
            let priced = PricedLine::from_inputs(&line).unwrap();
            let vat = line.vat_bps.unwrap_or(rules.default_vat_bps);
            let exact = pre_rounding(&priced, vat, qty).unwrap();
            prop_assert!(exact.is_covered_by(t.amount));
            // Ceiling, not a larger step: one increment less is below the exact value.
            prop_assert!(!exact.is_covered_by(t.amount - Money::new(10)));
        }
    }
}

#[test]
fn service_base_1000_vat_16_qty_1_displays_1160() {
    let line = PricingInputs {
        kind: ItemKind::Service,
        cost_price: None,
        base_price: Some(Money::new(1_000)),
        vat_bps: Some(1_600),
        margin: MarginPolicy::none(),
        pricing_locked: false,
        stored_total: Money::ZERO,
    };
    assert_eq!(
        price_line(&PricingRules::default(), &line, 1).amount,
        Money::new(1_160)
    );
}
