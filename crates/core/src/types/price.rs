//! Type-safe price representation using decimal arithmetic.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    #[serde(default)]
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// A zero amount in the given currency.
    #[must_use]
    pub const fn zero(currency_code: CurrencyCode) -> Self {
        Self::new(Decimal::ZERO, currency_code)
    }

    /// The price of `quantity` units, or `None` on overflow.
    #[must_use]
    pub fn times(self, quantity: u32) -> Option<Self> {
        self.amount
            .checked_mul(Decimal::from(quantity))
            .map(|amount| Self::new(amount, self.currency_code))
    }

    /// Add two prices, or `None` if the currencies differ or the sum overflows.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        if self.currency_code != other.currency_code {
            return None;
        }
        self.amount
            .checked_add(other.amount)
            .map(|amount| Self::new(amount, self.currency_code))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{:.2}",
            self.currency_code.symbol(),
            self.amount.round_dp(2)
        )
    }
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
    PLN,
}

impl CurrencyCode {
    /// Display symbol for the currency.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::USD | Self::CAD | Self::AUD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
            Self::PLN => "zł ",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_times() {
        let price = Price::new(Decimal::new(1250, 2), CurrencyCode::USD);
        assert_eq!(price.times(3).unwrap().amount, Decimal::new(3750, 2));
    }

    #[test]
    fn test_times_overflow_is_none() {
        let price = Price::new(Decimal::MAX, CurrencyCode::USD);
        assert_eq!(price.times(1), Some(price));
        assert!(price.times(2).is_none());
    }

    #[test]
    fn test_checked_add_overflow_is_none() {
        let max = Price::new(Decimal::MAX, CurrencyCode::USD);
        assert!(max.checked_add(Price::new(Decimal::ONE, CurrencyCode::USD)).is_none());
    }

    #[test]
    fn test_display() {
        let price = Price::new(Decimal::new(1250, 2), CurrencyCode::USD);
        assert_eq!(price.to_string(), "$12.50");
    }

    #[test]
    fn test_checked_add_same_currency() {
        let a = Price::new(Decimal::new(100, 2), CurrencyCode::EUR);
        let b = Price::new(Decimal::new(250, 2), CurrencyCode::EUR);
        assert_eq!(a.checked_add(b).unwrap().amount, Decimal::new(350, 2));
    }

    #[test]
    fn test_checked_add_mixed_currency() {
        let a = Price::new(Decimal::ONE, CurrencyCode::EUR);
        let b = Price::new(Decimal::ONE, CurrencyCode::USD);
        assert!(a.checked_add(b).is_none());
    }

    #[test]
    fn test_deserialize_amount_as_string() {
        let price: Price = serde_json::from_str(r#"{"amount":"19.99"}"#).unwrap();
        assert_eq!(price.amount, Decimal::new(1999, 2));
        assert_eq!(price.currency_code, CurrencyCode::USD);
    }
}
