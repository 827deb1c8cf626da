//! Monetary amounts.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when converting a decimal value into [`Money`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MoneyError {
    /// The value was NaN or infinite.
    #[error("amount must be a finite number, got {0}")]
    NotFinite(f64),

    /// The value does not fit in the cent range.
    #[error("amount {0} is out of range")]
    OutOfRange(f64),
}

/// Money amount represented in cents to avoid floating point issues.
///
/// On the wire the amount is a plain JSON decimal (`19.99`), which is what
/// the payment service and the purchase endpoint exchange. Decimals are
/// rounded to the nearest cent on the way in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Money {
    /// Amount in cents (e.g., 1999 = $19.99)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates a Money amount from a decimal value, rounding to the nearest cent.
    pub fn from_decimal(value: f64) -> Result<Self, MoneyError> {
        if !value.is_finite() {
            return Err(MoneyError::NotFinite(value));
        }
        let cents = (value * 100.0).round();
        if cents > i64::MAX as f64 || cents < i64::MIN as f64 {
            return Err(MoneyError::OutOfRange(value));
        }
        Ok(Self {
            cents: cents as i64,
        })
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the amount as a decimal value.
    pub fn as_decimal(&self) -> f64 {
        self.cents as f64 / 100.0
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl TryFrom<f64> for Money {
    type Error = MoneyError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::from_decimal(value)
    }
}

impl From<Money> for f64 {
    fn from(money: Money) -> Self {
        money.as_decimal()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.unsigned_abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_decimal_rounds_to_cents() {
        assert_eq!(Money::from_decimal(19.99).unwrap().cents(), 1999);
        assert_eq!(Money::from_decimal(0.994).unwrap().cents(), 99);
        assert_eq!(Money::from_decimal(10.0).unwrap().cents(), 1000);
    }

    #[test]
    fn test_from_decimal_rejects_non_finite() {
        assert!(matches!(
            Money::from_decimal(f64::NAN),
            Err(MoneyError::NotFinite(_))
        ));
        assert!(matches!(
            Money::from_decimal(f64::INFINITY),
            Err(MoneyError::NotFinite(_))
        ));
    }

    #[test]
    fn test_is_positive() {
        assert!(Money::from_cents(1).is_positive());
        assert!(!Money::zero().is_positive());
        assert!(!Money::from_cents(-5).is_positive());
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1999).to_string(), "$19.99");
        assert_eq!(Money::from_cents(5).to_string(), "$0.05");
        assert_eq!(Money::from_cents(-250).to_string(), "-$2.50");
    }

    #[test]
    fn test_json_is_a_plain_decimal() {
        let money: Money = serde_json::from_str("19.99").unwrap();
        assert_eq!(money.cents(), 1999);
        assert_eq!(serde_json::to_string(&money).unwrap(), "19.99");
    }

    #[test]
    fn test_json_integer_amount() {
        let money: Money = serde_json::from_str("20").unwrap();
        assert_eq!(money, Money::from_cents(2000));
    }
}
