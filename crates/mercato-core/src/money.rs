//! # Money Module
//!
//! Provides the `Money` and `Currency` types for handling monetary values.
//!
//! ## Why Decimal Money With a Currency Attached?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  TWO PROBLEMS, TWO GUARDS                                               │
//! │                                                                         │
//! │  1. Floating point:                                                     │
//! │       0.1 + 0.2 = 0.30000000000000004  ❌                               │
//! │     → amounts are rust_decimal::Decimal (exact base-10)                 │
//! │                                                                         │
//! │  2. Mixed currencies:                                                   │
//! │       19.99 EUR + 5.00 USD = 24.99 ???  ❌                              │
//! │     → every Money carries its Currency; combining two Money values      │
//! │       with different codes is a CoreError::CurrencyMismatch            │
//! │                                                                         │
//! │  Tax math (price × 1.19, price ÷ 1.19) is Money × Decimal, which keeps  │
//! │  the currency of the left-hand side.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use mercato_core::money::{Currency, Money};
//! use rust_decimal::Decimal;
//!
//! let eur = Currency::new("EUR");
//! let price = eur.as_money(Decimal::new(1999, 2), true); // 19.99 EUR
//! let gross = price.clone() * Decimal::new(119, 2);       // × 1.19
//! assert_eq!(eur.round(gross.amount()), Decimal::new(2379, 2));
//! ```

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Div, Mul};

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Currency
// =============================================================================

/// Currency metadata.
///
/// `rate` is the exchange rate relative to the primary exchange currency
/// (the primary exchange currency itself has rate 1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub id: i64,

    /// ISO 4217 code ("EUR", "USD").
    pub code: String,

    pub name: String,

    /// Exchange rate relative to the primary exchange currency.
    pub rate: Decimal,

    /// Number of decimal places used when rounding is enabled.
    pub rounding_decimals: u32,

    /// Whether amounts expressed in this currency are rounded.
    pub rounding_enabled: bool,

    pub published: bool,

    pub display_order: i32,
}

impl Currency {
    /// Creates a published currency with rate 1 and 2-digit rounding.
    pub fn new(code: impl Into<String>) -> Self {
        let code = code.into();
        Currency {
            id: 0,
            name: code.clone(),
            code,
            rate: Decimal::ONE,
            rounding_decimals: 2,
            rounding_enabled: true,
            published: true,
            display_order: 0,
        }
    }

    /// Sets the exchange rate.
    pub fn with_rate(mut self, rate: Decimal) -> Self {
        self.rate = rate;
        self
    }

    /// Sets the id.
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    /// Rounds an amount to this currency's decimals (half away from zero).
    ///
    /// Returns the amount unchanged when rounding is disabled.
    pub fn round(&self, amount: Decimal) -> Decimal {
        if self.rounding_enabled {
            amount.round_dp_with_strategy(self.rounding_decimals, RoundingStrategy::MidpointAwayFromZero)
        } else {
            amount
        }
    }

    /// Wraps an amount as money in this currency.
    ///
    /// ## Arguments
    /// * `round` - apply [`Currency::round`] first
    pub fn as_money(&self, amount: Decimal, round: bool) -> Money {
        let amount = if round { self.round(amount) } else { amount };
        Money::new(amount, self.clone())
    }
}

// =============================================================================
// Money
// =============================================================================

/// An immutable amount in a specific currency.
///
/// ## Where Money is Used
/// ```text
/// Product.price ──► TaxService::get_product_price ──► (Money, rate)
///                          │
///                          ├── percent = 0      → unchanged
///                          ├── add tax          → price × (1 + rate/100)
///                          └── remove tax       → price ÷ (1 + rate/100)
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,

    /// Display format with a `{0}` placeholder, e.g. `"{0} incl. tax"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    post_format: Option<String>,
}

impl Money {
    /// Creates money from an amount and a currency.
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Money {
            amount,
            currency,
            post_format: None,
        }
    }

    /// Zero in the given currency.
    pub fn zero(currency: Currency) -> Self {
        Money::new(Decimal::ZERO, currency)
    }

    #[inline]
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    #[inline]
    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    #[inline]
    pub fn post_format(&self) -> Option<&str> {
        self.post_format.as_deref()
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Returns a copy carrying a display post-format.
    pub fn with_post_format(mut self, format: impl Into<String>) -> Self {
        self.post_format = Some(format.into());
        self
    }

    /// Rounds the amount according to the currency settings.
    pub fn rounded(&self) -> Money {
        Money::new(self.currency.round(self.amount), self.currency.clone())
    }

    /// Adds two amounts of the same currency.
    ///
    /// ## Errors
    /// [`CoreError::CurrencyMismatch`] if the currency codes differ.
    pub fn checked_add(&self, other: &Money) -> CoreResult<Money> {
        self.ensure_same_currency(other)?;
        Ok(Money::new(self.amount + other.amount, self.currency.clone()))
    }

    /// Subtracts two amounts of the same currency.
    pub fn checked_sub(&self, other: &Money) -> CoreResult<Money> {
        self.ensure_same_currency(other)?;
        Ok(Money::new(self.amount - other.amount, self.currency.clone()))
    }

    /// Converts this amount into `target`.
    ///
    /// ## Conversion Path
    /// ```text
    /// source ──(÷ source.rate)──► primary exchange ──(× target.rate)──► target
    /// ```
    /// The first leg is skipped when the source already is the primary
    /// exchange currency; the second when the target is.
    pub fn exchange_to(&self, target: &Currency, primary_exchange: &Currency) -> Money {
        if self.currency.code == target.code {
            return self.clone();
        }

        let mut amount = self.amount;

        if self.currency.code != primary_exchange.code && !self.currency.rate.is_zero() {
            amount /= self.currency.rate;
        }

        if target.code != primary_exchange.code {
            amount *= target.rate;
        }

        Money::new(amount, target.clone())
    }

    fn ensure_same_currency(&self, other: &Money) -> CoreResult<()> {
        if self.currency.code != other.currency.code {
            return Err(CoreError::CurrencyMismatch {
                left: self.currency.code.clone(),
                right: other.currency.code.clone(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.amount == other.amount && self.currency.code == other.currency.code
    }
}

/// Scaling by a factor keeps the currency.
impl Mul<Decimal> for Money {
    type Output = Money;

    fn mul(self, factor: Decimal) -> Money {
        Money::new(self.amount * factor, self.currency)
    }
}

/// Division by a factor keeps the currency.
///
/// ## Panics
/// Division by zero panics, as it does for `Decimal`. Callers divide by
/// `1 + rate/100` where the rate is never negative.
impl Div<Decimal> for Money {
    type Output = Money;

    fn div(self, factor: Decimal) -> Money {
        Money::new(self.amount / factor, self.currency)
    }
}

/// Display implementation, for logs and mail bodies.
///
/// Applies the post-format when present: `"{0} incl. tax"` → `"19.99 EUR incl. tax"`.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dp = self.currency.rounding_decimals as usize;
        let plain = format!("{:.*} {}", dp, self.amount, self.currency.code);
        match &self.post_format {
            Some(format) => write!(f, "{}", format.replace("{0}", &plain)),
            None => write!(f, "{}", plain),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn eur() -> Currency {
        Currency::new("EUR")
    }

    fn usd() -> Currency {
        Currency::new("USD").with_rate(Decimal::new(108, 2))
    }

    #[test]
    fn test_round_half_away_from_zero() {
        let c = eur();
        assert_eq!(c.round(Decimal::new(12345, 3)), Decimal::new(1235, 2));
        assert_eq!(c.round(Decimal::new(-12345, 3)), Decimal::new(-1235, 2));
    }

    #[test]
    fn test_rounding_disabled() {
        let mut c = eur();
        c.rounding_enabled = false;
        assert_eq!(c.round(Decimal::new(12345, 3)), Decimal::new(12345, 3));
    }

    #[test]
    fn test_checked_add_same_currency() {
        let a = eur().as_money(Decimal::new(1000, 2), false);
        let b = eur().as_money(Decimal::new(550, 2), false);
        let sum = a.checked_add(&b).unwrap();
        assert_eq!(sum.amount(), Decimal::new(1550, 2));
        assert_eq!(sum.currency().code, "EUR");
    }

    #[test]
    fn test_checked_add_rejects_mixed_currencies() {
        let a = eur().as_money(Decimal::ONE, false);
        let b = usd().as_money(Decimal::ONE, false);
        assert!(matches!(
            a.checked_add(&b),
            Err(CoreError::CurrencyMismatch { .. })
        ));
        assert!(a.checked_sub(&b).is_err());
    }

    #[test]
    fn test_mul_div_keep_currency() {
        let price = usd().as_money(Decimal::new(100, 0), false);
        let up = price.clone() * Decimal::new(119, 2);
        assert_eq!(up.amount(), Decimal::new(119, 0));
        assert_eq!(up.currency().code, "USD");

        let down = up / Decimal::new(119, 2);
        assert_eq!(down.amount(), Decimal::new(100, 0));
    }

    #[test]
    fn test_exchange_between_currencies() {
        let primary = eur();
        let target = usd();

        let price = primary.as_money(Decimal::new(100, 0), false);
        let converted = price.exchange_to(&target, &primary);
        assert_eq!(converted.amount(), Decimal::new(108, 0));
        assert_eq!(converted.currency().code, "USD");

        let back = converted.exchange_to(&primary, &primary);
        assert_eq!(back.amount(), Decimal::new(100, 0));
    }

    #[test]
    fn test_exchange_same_currency_is_identity() {
        let price = eur().as_money(Decimal::new(4299, 2), false);
        assert_eq!(price.exchange_to(&eur(), &usd()), price);
    }

    #[test]
    fn test_display_with_post_format() {
        let price = eur().as_money(Decimal::new(1999, 2), false);
        assert_eq!(price.to_string(), "19.99 EUR");
        let formatted = price.with_post_format("{0} incl. tax");
        assert_eq!(formatted.to_string(), "19.99 EUR incl. tax");
    }
}
