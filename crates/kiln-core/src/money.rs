//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Summing 1,000 BOM lines in floating point drifts:                      │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  An estimate that drifts cannot reconcile with the actual cost.         │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    Every line cost is rounded to the cent exactly once, then summed    │
//! │    with integer addition. Estimates are reproducible bit-for-bit.      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use kiln_core::money::Money;
//! use kiln_core::quantity::Quantity;
//!
//! let price = Money::from_cents(1099); // $10.99 per unit
//! let three = price * 3;                // $32.97
//! assert_eq!(three.cents(), 3297);
//!
//! // Cost of 0.5 units, rounded half away from zero
//! assert_eq!(price.cost_of(Quantity::from_milli(500)).cents(), 550);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::quantity::{Quantity, MILLI_PER_UNIT};

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for variances (under budget)
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Derives**: Full serde support, transparent SQLite INTEGER column
///
/// ## Where Money Flows
/// ```text
/// Material.purchase_price ──► PlanLine.unit_cost ──► PlanLine.line_cost
///                                                        │
///                                     Σ ─────────────────┘
///                                     ▼
///     ProductionOrder.materials_cost + Σ additional ──► total_cost
///                                                        │
///                  ActualCost ──► CostAnalysis.variance ◄┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    ///
    /// ## Example
    /// ```rust
    /// use kiln_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // Represents $10.99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents (smallest currency unit).
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit (dollars) portion.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit (cents) portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Addition that returns `None` instead of overflowing.
    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Money> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Cost of a fractional material quantity at this unit price.
    ///
    /// ## Rounding
    /// `price × milli / 1000`, rounded half away from zero to the cent.
    /// The multiplication happens in i128 so large stocks cannot overflow.
    ///
    /// ## Example
    /// ```rust
    /// use kiln_core::money::Money;
    /// use kiln_core::quantity::Quantity;
    ///
    /// // 0.333 kg at $1.00/kg = $0.333 → $0.33
    /// let cost = Money::from_cents(100).cost_of(Quantity::from_milli(333));
    /// assert_eq!(cost.cents(), 33);
    /// ```
    pub fn cost_of(&self, qty: Quantity) -> Money {
        let raw = self.0 as i128 * qty.milli() as i128;
        Money::from_cents(round_div(raw, MILLI_PER_UNIT as i128) as i64)
    }

    /// [`cost_of`](Self::cost_of) that returns `None` when the cost does
    /// not fit in cents.
    pub fn checked_cost_of(&self, qty: Quantity) -> Option<Money> {
        let raw = self.0 as i128 * qty.milli() as i128;
        i64::try_from(round_div(raw, MILLI_PER_UNIT as i128))
            .ok()
            .map(Money::from_cents)
    }

    /// Splits this amount evenly across `units`, rounded to the cent.
    ///
    /// Returns zero when `units` is not positive.
    ///
    /// ## Example
    /// ```rust
    /// use kiln_core::money::Money;
    ///
    /// // $10.00 of material over 3 finished units = $3.33 per unit
    /// assert_eq!(Money::from_cents(1000).per_unit(3).cents(), 333);
    /// ```
    pub fn per_unit(&self, units: i64) -> Money {
        if units <= 0 {
            return Money::zero();
        }
        Money::from_cents(round_div(self.0 as i128, units as i128) as i64)
    }

    /// Expresses this amount as basis points of `base` (5000 = 50.00%).
    ///
    /// Returns 0 when `base` is not positive, so a zero estimate never
    /// produces a division by zero.
    ///
    /// ## Example
    /// ```rust
    /// use kiln_core::money::Money;
    ///
    /// let over = Money::from_cents(5_000);
    /// assert_eq!(over.bps_of(Money::from_cents(10_000)), 5_000);
    /// assert_eq!(over.bps_of(Money::zero()), 0);
    /// ```
    pub fn bps_of(&self, base: Money) -> i64 {
        if base.0 <= 0 {
            return 0;
        }
        round_div(self.0 as i128 * 10_000, base.0 as i128) as i64
    }
}

/// Integer division rounding half away from zero.
///
/// `den` must be positive.
pub(crate) fn round_div(num: i128, den: i128) -> i128 {
    let half = den / 2;
    if num >= 0 {
        (num + half) / den
    } else {
        (num - half) / den
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Human-readable format for logs. The UI formats currency itself.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, self.dollars().abs(), self.cents_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
