//! Type-safe price representation using decimal arithmetic.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when constructing a [`Price`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The amount is below zero.
    #[error("price cannot be negative (got {0})")]
    Negative(Decimal),
    /// The amount is above [`Price::MAX_AMOUNT`].
    #[error("price {0} is above the maximum of 1000000.00")]
    TooLarge(Decimal),
}

/// A non-negative price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPrice", rename_all = "camelCase")]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., euros, not cents).
    amount: Decimal,
    /// ISO 4217 currency code.
    currency_code: CurrencyCode,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPrice {
    amount: Decimal,
    #[serde(default)]
    currency_code: CurrencyCode,
}

impl TryFrom<RawPrice> for Price {
    type Error = PriceError;

    fn try_from(raw: RawPrice) -> Result<Self, Self::Error> {
        Self::new(raw.amount, raw.currency_code)
    }
}

impl Price {
    /// Largest accepted unit price: 1 000 000.00.
    ///
    /// Together with [`Quantity::MAX`](crate::Quantity::MAX) this keeps line
    /// totals and cart subtotals far inside `Decimal`'s range.
    pub const MAX_AMOUNT: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 2);

    /// Create a new price.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Negative` if `amount` is below zero and
    /// `PriceError::TooLarge` if it is above [`Price::MAX_AMOUNT`].
    pub fn new(amount: Decimal, currency_code: CurrencyCode) -> Result<Self, PriceError> {
        if amount < Decimal::ZERO {
            return Err(PriceError::Negative(amount));
        }
        if amount > Self::MAX_AMOUNT {
            return Err(PriceError::TooLarge(amount));
        }
        Ok(Self {
            amount,
            currency_code,
        })
    }

    /// Create a price in euros, the store's default currency.
    ///
    /// # Errors
    ///
    /// Returns `PriceError` if `amount` is out of range.
    pub fn eur(amount: Decimal) -> Result<Self, PriceError> {
        Self::new(amount, CurrencyCode::EUR)
    }

    /// A zero price in the given currency.
    #[must_use]
    pub const fn zero(currency_code: CurrencyCode) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency_code,
        }
    }

    /// The decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.amount
    }

    /// The currency code.
    #[must_use]
    pub const fn currency_code(&self) -> CurrencyCode {
        self.currency_code
    }

    /// Sum of two prices, `None` if their currencies differ.
    ///
    /// Sums are not bounded by [`Price::MAX_AMOUNT`].
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        (self.currency_code == other.currency_code).then(|| Self {
            amount: self.amount.saturating_add(other.amount),
            currency_code: self.currency_code,
        })
    }

    /// Price multiplied by a line quantity.
    #[must_use]
    pub fn times(&self, quantity: u32) -> Self {
        Self {
            amount: self.amount.saturating_mul(Decimal::from(quantity)),
            currency_code: self.currency_code,
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let amount = self.amount.round_dp(2);
        match self.currency_code {
            CurrencyCode::EUR => write!(f, "{amount:.2} €"),
            code => write!(f, "{}{amount:.2}", code.symbol()),
        }
    }
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    EUR,
    USD,
    GBP,
    CHF,
}

impl CurrencyCode {
    /// Display symbol for the currency.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::EUR => "€",
            Self::USD => "$",
            Self::GBP => "£",
            Self::CHF => "CHF ",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_price_rejected() {
        let result = Price::eur(Decimal::new(-1, 2));
        assert!(matches!(result, Err(PriceError::Negative(_))));
    }

    #[test]
    fn test_zero_price_allowed() {
        assert!(Price::eur(Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_display_eur_suffix() {
        let price = Price::eur(Decimal::new(999, 2)).unwrap();
        assert_eq!(price.to_string(), "9.99 €");
    }

    #[test]
    fn test_display_usd_prefix() {
        let price = Price::new(Decimal::new(45, 1), CurrencyCode::USD).unwrap();
        assert_eq!(price.to_string(), "$4.50");
    }

    #[test]
    fn test_amount_above_maximum_rejected() {
        assert!(Price::eur(Price::MAX_AMOUNT).is_ok());
        assert!(matches!(
            Price::eur(Decimal::MAX),
            Err(PriceError::TooLarge(_))
        ));
        let json = r#"{"amount":"79228162514264337593543950335"}"#;
        assert!(serde_json::from_str::<Price>(json).is_err());
    }

    #[test]
    fn test_times_at_maximum() {
        let price = Price::eur(Price::MAX_AMOUNT).unwrap();
        assert_eq!(
            price.times(9999).amount(),
            Decimal::new(999_900_000_000, 2)
        );
    }

    #[test]
    fn test_checked_add_requires_same_currency() {
        let eur = Price::eur(Decimal::new(450, 2)).unwrap();
        let usd = Price::new(Decimal::new(450, 2), CurrencyCode::USD).unwrap();
        assert_eq!(eur.checked_add(eur).unwrap().amount(), Decimal::new(900, 2));
        assert_eq!(eur.checked_add(usd), None);
    }

    #[test]
    fn test_times() {
        let price = Price::eur(Decimal::new(450, 2)).unwrap();
        assert_eq!(price.times(3).amount(), Decimal::new(1350, 2));
    }

    #[test]
    fn test_deserialize_rejects_negative() {
        let json = r#"{"amount":"-2.00","currencyCode":"EUR"}"#;
        assert!(serde_json::from_str::<Price>(json).is_err());
    }

    #[test]
    fn test_deserialize_defaults_currency() {
        let price: Price = serde_json::from_str(r#"{"amount":"4.50"}"#).unwrap();
        assert_eq!(price.currency_code(), CurrencyCode::EUR);
        assert_eq!(price.amount(), Decimal::new(450, 2));
    }
}
