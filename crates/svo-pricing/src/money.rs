//! Minor-unit money type.
//!
//! All monetary amounts in the order subsystem are integer counts of the
//! currency's minor unit (cents, centavos) stored as `i64`. Wrapping the raw
//! integer keeps quantities, basis points and ids from being mixed into money
//! arithmetic by accident.
//!
//! # Arithmetic
//!
//! - `Add`, `Sub`, `Neg`, `AddAssign`, `SubAssign` and `Sum` are closed over
//!   `Money` and follow Rust's standard integer overflow semantics.
//! - `checked_add` / `checked_mul_qty` return `None` on overflow; pricing
//!   code treats overflow as "cannot compute fresh" and falls back.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// 100% expressed in basis points.
pub const BPS_SCALE: i64 = 10_000;

/// VAT applied when a line carries no explicit rate (16%).
pub const DEFAULT_VAT_BPS: u32 = 1_600;

/// Fresh line totals are rounded up to a multiple of this many minor units.
pub const DEFAULT_ROUNDING_INCREMENT: i64 = 10;

/// A monetary amount in minor currency units.
///
/// There is intentionally no `From<i64>`; use [`Money::new`] so the call site
/// states that the integer is money.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    #[inline]
    pub const fn new(minor: i64) -> Self {
        Money(minor)
    }

    /// The raw minor-unit count.
    #[inline]
    pub const fn minor(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    #[inline]
    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }

    #[inline]
    pub fn saturating_add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }

    /// Multiply a per-unit amount by an integer quantity.
    #[inline]
    pub fn checked_mul_qty(self, qty: i64) -> Option<Money> {
        self.0.checked_mul(qty).map(Money)
    }

    /// `true` when the amount is an exact multiple of `increment` minor units.
    pub fn is_multiple_of(self, increment: i64) -> bool {
        increment > 0 && self.0 % increment == 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Money {
    type Output = Money;
    #[inline]
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;
    #[inline]
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;
    #[inline]
    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.copied().sum()
    }
}
