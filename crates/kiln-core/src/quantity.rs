//! # Quantity Module
//!
//! Fixed-point material quantities.
//!
//! Raw materials are bought in kilograms, metres and litres, so a BOM line
//! like "0.25 kg of resin per unit" must be exact. `Quantity` stores
//! thousandths of a unit in an `i64`, the same way [`Money`](crate::Money)
//! stores cents.
//!
//! ```text
//!   "2.5"  ──parse──► Quantity(2_500) ──× 3 units──► Quantity(7_500) ──► "7.5"
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;

/// Number of stored steps per whole unit.
pub const MILLI_PER_UNIT: i64 = 1_000;

/// A material quantity in thousandths of its unit of measure.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Quantity(i64);

impl Quantity {
    /// Creates a quantity from thousandths of a unit.
    #[inline]
    pub const fn from_milli(milli: i64) -> Self {
        Quantity(milli)
    }

    /// Creates a quantity from whole units.
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Quantity(units * MILLI_PER_UNIT)
    }

    /// Zero quantity.
    #[inline]
    pub const fn zero() -> Self {
        Quantity(0)
    }

    /// Raw thousandths.
    #[inline]
    pub const fn milli(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Scales a per-unit quantity by a whole number of finished units.
    ///
    /// ## Example
    /// ```rust
    /// use kiln_core::quantity::Quantity;
    ///
    /// let per_unit = Quantity::from_milli(250); // 0.25 kg
    /// assert_eq!(per_unit.times(12), Quantity::from_units(3));
    /// ```
    #[inline]
    pub const fn times(&self, units: i64) -> Self {
        Quantity(self.0 * units)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        let whole = abs / MILLI_PER_UNIT;
        let frac = abs % MILLI_PER_UNIT;
        if frac == 0 {
            write!(f, "{}{}", sign, whole)
        } else {
            let digits = format!("{:03}", frac);
            write!(f, "{}{}.{}", sign, whole, digits.trim_end_matches('0'))
        }
    }
}

/// Parses decimal strings like `"2"`, `"0.25"` or `"-1.5"`.
///
/// More than three fractional digits is rejected rather than rounded.
impl FromStr for Quantity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "quantity".to_string(),
            reason: reason.to_string(),
        };

        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };

        if whole.is_empty() && frac.is_empty() {
            return Err(invalid("must be a decimal number"));
        }
        if frac.len() > 3 {
            return Err(invalid("at most 3 decimal places"));
        }
        if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid("must be a decimal number"));
        }

        let whole_val: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid("value too large"))?
        };
        let frac_val: i64 = if frac.is_empty() {
            0
        } else {
            format!("{:0<3}", frac)
                .parse()
                .map_err(|_| invalid("must be a decimal number"))?
        };

        let milli = whole_val
            .checked_mul(MILLI_PER_UNIT)
            .and_then(|w| w.checked_add(frac_val))
            .ok_or_else(|| invalid("value too large"))?;

        Ok(Quantity(if negative { -milli } else { milli }))
    }
}

impl Add for Quantity {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Quantity(self.0 + other.0)
    }
}

impl AddAssign for Quantity {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Quantity {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Quantity(self.0 - other.0)
    }
}

impl SubAssign for Quantity {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Self {
        iter.fold(Quantity::zero(), Add::add)
    }
}
