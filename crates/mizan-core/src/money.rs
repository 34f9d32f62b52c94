//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Halalas?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  With floats, 115 / 1.15 = 99.99999999999999                            │
//! │  and the invoice hash of "100.00" vs "99.99" differs forever.           │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Halalas (1 SAR = 100 halalas)                    │
//! │    11500 halalas incl. 15% VAT                                          │
//! │      net = (11500 × 10000 + 5750) / 11500 = 10000                       │
//! │      vat = 11500 - 10000 = 1500                                         │
//! │    Every amount that reaches a hash, a QR code or an XML                │
//! │    document is rendered from the same integer.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use mizan_core::money::Money;
//! use mizan_core::types::TaxRate;
//!
//! let gross = Money::from_halalas(11500); // 115.00 SAR incl. VAT
//! let (net, vat) = gross.split_inclusive(TaxRate::standard());
//!
//! assert_eq!(net.to_string(), "100.00");
//! assert_eq!(vat.to_string(), "15.00");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::types::TaxRate;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in halalas (1/100 SAR).
///
/// ## Where Money is Used
/// ```text
/// Sale.selling_price × quantity ──► total_with_vat ──► split_inclusive
///                                                        │
///                                         net_amount ◄───┴───► vat_amount
///                                              │                   │
///                                              ▼                   ▼
///                              Invoice totals ──► hash payload, TLV tags 4/5,
///                                                 UBL amounts ("115.00")
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from halalas (the smallest currency unit).
    ///
    /// ## Example
    /// ```rust
    /// use mizan_core::money::Money;
    ///
    /// let price = Money::from_halalas(1099); // 10.99 SAR
    /// assert_eq!(price.halalas(), 1099);
    /// ```
    #[inline]
    pub const fn from_halalas(halalas: i64) -> Self {
        Money(halalas)
    }

    /// Creates a Money value from riyals and halalas.
    ///
    /// For negative amounts only the riyal part should be negative:
    /// `from_riyals_halalas(-5, 50)` is -5.50.
    #[inline]
    pub const fn from_riyals_halalas(riyals: i64, halalas: i64) -> Self {
        if riyals < 0 {
            Money(riyals * 100 - halalas)
        } else {
            Money(riyals * 100 + halalas)
        }
    }

    /// Returns the value in halalas.
    #[inline]
    pub const fn halalas(&self) -> i64 {
        self.0
    }

    /// Returns the whole-riyal portion.
    #[inline]
    pub const fn riyals(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the halala portion (always 0-99).
    #[inline]
    pub const fn halalas_part(&self) -> i64 {
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

    /// Calculates VAT on a net (VAT-exclusive) amount, rounding half up.
    ///
    /// ## Implementation
    /// Integer math: `(amount * bps + 5000) / 10000`
    ///
    /// ## Example
    /// ```rust
    /// use mizan_core::money::Money;
    /// use mizan_core::types::TaxRate;
    ///
    /// let net = Money::from_halalas(1003);
    /// // 10.03 × 15% = 1.5045 → 1.50
    /// assert_eq!(net.calculate_tax(TaxRate::standard()).halalas(), 150);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        let tax = (self.0 as i128 * rate.bps() as i128 + 5000) / 10000;
        Money::from_halalas(tax as i64)
    }

    /// Splits a VAT-inclusive amount into `(net, vat)`.
    ///
    /// ## Rounding
    /// ```text
    /// net = round_half_up(gross / (1 + rate))
    ///     = (gross × 10000 + (10000 + bps) / 2) / (10000 + bps)
    /// vat = gross - net
    /// ```
    /// `net + vat == gross` always holds, so invoice totals never drift by
    /// a halala between the sale rows and the rendered documents.
    pub fn split_inclusive(&self, rate: TaxRate) -> (Money, Money) {
        let divisor = 10000i128 + rate.bps() as i128;
        let gross = self.0 as i128;
        let scaled = gross * 10000;
        let net = if gross >= 0 {
            (scaled + divisor / 2) / divisor
        } else {
            (scaled - divisor / 2) / divisor
        };
        let net = Money::from_halalas(net as i64);
        (net, *self - net)
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Divides by a positive quantity, rounding half up.
    ///
    /// Returns `None` for a zero or negative divisor.
    ///
    /// ## Example
    /// ```rust
    /// use mizan_core::money::Money;
    ///
    /// // 10.00 / 3 = 3.333... → 3.33
    /// assert_eq!(Money::from_halalas(1000).divide_rounded(3), Some(Money::from_halalas(333)));
    /// // 0.05 / 2 = 0.025 → 0.03
    /// assert_eq!(Money::from_halalas(5).divide_rounded(2), Some(Money::from_halalas(3)));
    /// ```
    pub fn divide_rounded(&self, divisor: i64) -> Option<Money> {
        if divisor <= 0 {
            return None;
        }
        let value = self.0 as i128 * 2;
        let divisor = divisor as i128 * 2;
        let half = divisor / 2;
        let quotient = if value >= 0 {
            (value + half) / divisor
        } else {
            (value - half) / divisor
        };
        Some(Money::from_halalas(quotient as i64))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Renders the amount with exactly two decimals and no currency symbol.
///
/// This is the wire format used in the chain hash payload, TLV tags 4 and 5
/// and every UBL amount element.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.riyals().abs(), self.halalas_part())
    }
}

/// Parses `"115"`, `"115.5"` or `"115.00"` into halalas.
impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: reason.to_string(),
        };

        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let (whole, fraction) = match digits.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (digits, ""),
        };

        if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("expected digits before the decimal point"));
        }
        if fraction.len() > 2 || !fraction.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("at most two decimal digits are allowed"));
        }

        let riyals: i64 = whole
            .parse()
            .map_err(|_| invalid("amount is out of range"))?;
        let halalas: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| invalid("bad fraction"))? * 10,
            _ => fraction.parse().map_err(|_| invalid("bad fraction"))?,
        };

        let total = riyals
            .checked_mul(100)
            .and_then(|v| v.checked_add(halalas))
            .ok_or_else(|| invalid("amount is out of range"))?;

        Ok(Money(if negative { -total } else { total }))
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

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_halalas() {
        let money = Money::from_halalas(1099);
        assert_eq!(money.halalas(), 1099);
        assert_eq!(money.riyals(), 10);
        assert_eq!(money.halalas_part(), 99);
    }

    #[test]
    fn test_from_riyals_halalas() {
        assert_eq!(Money::from_riyals_halalas(10, 99).halalas(), 1099);
        assert_eq!(Money::from_riyals_halalas(-5, 50).halalas(), -550);
    }

    #[test]
    fn test_display_is_two_decimals() {
        assert_eq!(Money::from_halalas(11500).to_string(), "115.00");
        assert_eq!(Money::from_halalas(5).to_string(), "0.05");
        assert_eq!(Money::from_halalas(-550).to_string(), "-5.50");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_parse() {
        assert_eq!("115.00".parse::<Money>().unwrap(), Money::from_halalas(11500));
        assert_eq!("115".parse::<Money>().unwrap(), Money::from_halalas(11500));
        assert_eq!("0.5".parse::<Money>().unwrap(), Money::from_halalas(50));
        assert_eq!("-5.50".parse::<Money>().unwrap(), Money::from_halalas(-550));

        assert!("".parse::<Money>().is_err());
        assert!("1.234".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert!(".50".parse::<Money>().is_err());
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_halalas(1000);
        let b = Money::from_halalas(500);

        assert_eq!((a + b).halalas(), 1500);
        assert_eq!((a - b).halalas(), 500);
        assert_eq!((a * 3).halalas(), 3000);

        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.halalas(), 2000);
    }

    #[test]
    fn test_split_inclusive_standard_rate() {
        let (net, vat) = Money::from_halalas(11500).split_inclusive(TaxRate::standard());
        assert_eq!(net.halalas(), 10000);
        assert_eq!(vat.halalas(), 1500);
    }

    #[test]
    fn test_split_inclusive_rounds_half_up() {
        // 10.00 / 1.15 = 8.6956... → 8.70
        let (net, vat) = Money::from_halalas(1000).split_inclusive(TaxRate::standard());
        assert_eq!(net.halalas(), 870);
        assert_eq!(vat.halalas(), 130);
    }

    #[test]
    fn test_split_inclusive_always_sums_back() {
        for gross in 0..5000 {
            let amount = Money::from_halalas(gross);
            let (net, vat) = amount.split_inclusive(TaxRate::standard());
            assert_eq!(net + vat, amount);
            // VAT stays within one halala of 15% of net
            let expected = net.calculate_tax(TaxRate::standard());
            assert!((vat.halalas() - expected.halalas()).abs() <= 1, "gross {gross}");
        }
    }

    #[test]
    fn test_divide_rounded() {
        assert_eq!(Money::from_halalas(1000).divide_rounded(3), Some(Money::from_halalas(333)));
        assert_eq!(Money::from_halalas(2000).divide_rounded(3), Some(Money::from_halalas(667)));
        assert_eq!(Money::from_halalas(1000).divide_rounded(0), None);
    }

    #[test]
    fn test_zero_and_checks() {
        let zero = Money::zero();
        assert!(zero.is_zero());
        assert!(!zero.is_positive());
        assert!(!zero.is_negative());

        assert!(Money::from_halalas(100).is_positive());
        assert!(Money::from_halalas(-100).is_negative());
        assert_eq!(Money::from_halalas(-100).abs().halalas(), 100);
    }
}
