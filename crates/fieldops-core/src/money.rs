//! # Money Module
//!
//! Provides the `Money`, `Rate` and `Quantity` types for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  On a fiscal document every tax line is audited to the cent, so the    │
//! │  invoice total must be reproducible from the individual amounts.       │
//! │                                                                         │
//! │  OUR SOLUTION: Integer centavos + basis point rates                    │
//! │    R$ 1.000,00 × 0,65% = 100000 × 65 / 10000 = 650 centavos            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use fieldops_core::money::{Money, Rate};
//!
//! let gross = Money::from_cents(100_000); // R$ 1.000,00
//! let iss = gross.apply_rate(Rate::from_bps(500)); // 5%
//! assert_eq!(iss.cents(), 5_000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in centavos (the smallest BRL unit).
///
/// ## Design Decisions
/// - **i64 (signed)**: net amounts can go negative when withholdings exceed the base
/// - **Single field tuple struct**: Zero-cost abstraction over i64
///
/// ## Where Money is Used
/// ```text
/// BudgetLineItem.unit_price ──► line total ──► Request.budget_total
///                                                    │
///                                                    ▼
///                         Invoice.gross ──► tax engine ──► Invoice.net
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from centavos.
    ///
    /// ## Example
    /// ```rust
    /// use fieldops_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // R$ 10,99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from reais and centavos.
    ///
    /// For negative amounts only the major unit should be negative:
    /// `from_major_minor(-5, 50)` is -R$ 5,50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in centavos.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the reais portion.
    #[inline]
    pub const fn reais(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the centavos portion (always 0-99).
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

    /// Applies a rate and rounds half-up to the nearest centavo.
    ///
    /// ## Implementation
    /// Integer math: `(amount * bps + 5000) / 10000`. The +5000 is the
    /// half-up rounding term (5000/10000 = 0.5). i128 prevents overflow on
    /// large amounts.
    ///
    /// ## Example
    /// ```rust
    /// use fieldops_core::money::{Money, Rate};
    ///
    /// let base = Money::from_cents(100_000);
    /// // R$ 1.000,00 × 0,65% = R$ 6,50
    /// assert_eq!(base.apply_rate(Rate::from_bps(65)).cents(), 650);
    /// ```
    pub fn apply_rate(&self, rate: Rate) -> Money {
        let cents = (self.0 as i128 * rate.bps() as i128 + 5000) / 10000;
        Money::from_cents(cents as i64)
    }

    /// Price of `qty` units at this unit price, rounded half-up to the
    /// cent. `None` when the result does not fit in an i64.
    ///
    /// ## Example
    /// ```rust
    /// use fieldops_core::money::{Money, Quantity};
    ///
    /// // 2,5 m of copper tubing at R$ 45,00 the metre
    /// let unit_price = Money::from_cents(4_500);
    /// let qty = Quantity::from_milli(2_500);
    /// assert_eq!(unit_price.checked_times(qty), Some(Money::from_cents(11_250)));
    /// ```
    pub fn checked_times(&self, qty: Quantity) -> Option<Self> {
        let cents = (self.0 as i128 * qty.milli() as i128 + 500) / 1000;
        i64::try_from(cents).ok().map(Money)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display shows money the way it appears on Brazilian documents.
///
/// ## Note
/// Thousands separators are omitted; use frontend formatting for the UI.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}R$ {},{:02}",
            sign,
            self.reais().abs(),
            self.cents_part()
        )
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

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000.
/// Brazilian rates such as PIS 0,65% or the Simples ISS share 2,79% are
/// exact in bps (65 and 279) while they are not exact in binary floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Rate(u32);

impl Rate {
    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    /// Creates a rate from a percentage (for config files and display input).
    pub fn from_percentage(pct: f64) -> Self {
        Rate((pct * 100.0).round().max(0.0) as u32)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero rate.
    #[inline]
    pub const fn zero() -> Self {
        Rate(0)
    }

    /// Checks if the rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for Rate {
    fn default() -> Self {
        Rate::zero()
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

// =============================================================================
// Quantity
// =============================================================================

/// Budget quantity in thousandths of a unit.
///
/// Materials are sold by the metre or kilogram, so a line can carry 2,5 m of
/// tubing or 1,25 kg of gas. Three decimals cover every unit on the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Quantity(i64);

impl Quantity {
    pub const SCALE: i64 = 1000;

    #[inline]
    pub const fn from_milli(milli: i64) -> Self {
        Quantity(milli)
    }

    /// Whole units.
    #[inline]
    pub const fn units(units: i64) -> Self {
        Quantity(units * Self::SCALE)
    }

    #[inline]
    pub const fn milli(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

/// `3`, `2.5`, `0.125`: trailing zeros of the fraction are dropped.
impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / Self::SCALE as u64;
        let frac = abs % Self::SCALE as u64;
        if frac == 0 {
            return write!(f, "{sign}{whole}");
        }
        let digits = format!("{frac:03}");
        write!(f, "{sign}{whole}.{}", digits.trim_end_matches('0'))
    }
}

/// Parses `"3"`, `"2.5"` or `"1,25"`. More than three decimals is an error.
impl FromStr for Quantity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidFormat {
            field: "quantity".to_string(),
            reason: "expected a number with up to three decimals".to_string(),
        };

        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, frac) = match digits.split_once(|c: char| c == '.' || c == ',') {
            Some((whole, frac)) => (whole, frac),
            None => (digits, ""),
        };

        let numeric = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if whole.is_empty() || !numeric(whole) || !numeric(frac) || frac.len() > 3 {
            return Err(invalid());
        }

        let whole: i64 = whole.parse().map_err(|_| invalid())?;
        let frac: i64 = if frac.is_empty() {
            0
        } else {
            format!("{frac:0<3}").parse().map_err(|_| invalid())?
        };

        let milli = whole
            .checked_mul(Self::SCALE)
            .and_then(|m| m.checked_add(frac))
            .ok_or_else(invalid)?;
        Ok(Quantity(if negative { -milli } else { milli }))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.reais(), 10);
        assert_eq!(money.cents_part(), 99);
    }

    #[test]
    fn test_from_major_minor() {
        assert_eq!(Money::from_major_minor(10, 99).cents(), 1099);
        assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "R$ 10,99");
        assert_eq!(Money::from_cents(0).to_string(), "R$ 0,00");
        assert_eq!(Money::from_cents(-550).to_string(), "-R$ 5,50");
    }

    #[test]
    fn test_apply_rate_rounds_half_up() {
        // 1,00 × 2,5% = 0,025 → 0,03
        assert_eq!(Money::from_cents(100).apply_rate(Rate::from_bps(250)).cents(), 3);
        // 1,00 × 2,4% = 0,024 → 0,02
        assert_eq!(Money::from_cents(100).apply_rate(Rate::from_bps(240)).cents(), 2);
    }

    #[test]
    fn test_apply_rate_exact() {
        let base = Money::from_cents(100_000);
        assert_eq!(base.apply_rate(Rate::from_bps(500)).cents(), 5_000);
        assert_eq!(base.apply_rate(Rate::from_bps(1100)).cents(), 11_000);
        assert_eq!(base.apply_rate(Rate::zero()).cents(), 0);
    }

    #[test]
    fn test_sum() {
        let total: Money = [100, 250, 650].into_iter().map(Money::from_cents).sum();
        assert_eq!(total.cents(), 1_000);
    }

    #[test]
    fn test_checked_times() {
        assert_eq!(
            Money::from_cents(299).checked_times(Quantity::units(3)),
            Some(Money::from_cents(897))
        );
        // 1,5 kg × R$ 200,00
        assert_eq!(
            Money::from_cents(20_000).checked_times(Quantity::from_milli(1_500)),
            Some(Money::from_cents(30_000))
        );
        // 0,333 × R$ 0,05 = 0,01665 → 0,02
        assert_eq!(
            Money::from_cents(5).checked_times(Quantity::from_milli(333)),
            Some(Money::from_cents(2))
        );
        assert!(Money::from_cents(i64::MAX).checked_times(Quantity::units(2)).is_none());
    }

    #[test]
    fn test_quantity_display() {
        assert_eq!(Quantity::units(3).to_string(), "3");
        assert_eq!(Quantity::from_milli(2_500).to_string(), "2.5");
        assert_eq!(Quantity::from_milli(125).to_string(), "0.125");
    }

    #[test]
    fn test_quantity_parse() {
        assert_eq!("3".parse::<Quantity>().unwrap(), Quantity::units(3));
        assert_eq!("2.5".parse::<Quantity>().unwrap(), Quantity::from_milli(2_500));
        assert_eq!("1,25".parse::<Quantity>().unwrap(), Quantity::from_milli(1_250));
        assert!("1.2345".parse::<Quantity>().is_err());
        assert!("abc".parse::<Quantity>().is_err());
        assert!(".5".parse::<Quantity>().is_err());
    }

    #[test]
    fn test_rate_from_percentage() {
        assert_eq!(Rate::from_percentage(0.65).bps(), 65);
        assert_eq!(Rate::from_percentage(2.79).bps(), 279);
        assert_eq!(Rate::from_percentage(33.0).bps(), 3300);
    }

    #[test]
    fn test_rate_display() {
        assert_eq!(Rate::from_bps(65).to_string(), "0.65%");
        assert_eq!(Rate::from_bps(1120).to_string(), "11.20%");
    }
}
