use crate::domain::errors::ValidationError;
use serde::{Deserialize, Serialize};

/// Non-negative, finite market price
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Price(f64);

impl Price {
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::MustBeFinite);
        }
        if value < 0.0 {
            return Err(ValidationError::InvalidPrice(format!(
                "price must be non-negative, got {}",
                value
            )));
        }
        Ok(Price(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Signed percentage move from `self` to `other`, or 0 for a zero base
    pub fn pct_change_to(&self, other: Price) -> f64 {
        if self.0 == 0.0 {
            return 0.0;
        }
        (other.0 - self.0) / self.0 * 100.0
    }

    pub fn multiply(&self, factor: f64) -> Result<Price, ValidationError> {
        if !factor.is_finite() {
            return Err(ValidationError::MustBeFinite);
        }
        Price::new(self.0 * factor)
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_new_valid() {
        let price = Price::new(100.0);
        assert!(price.is_ok());
        assert_eq!(price.unwrap().value(), 100.0);
    }

    #[test]
    fn test_price_new_negative() {
        let price = Price::new(-10.0);
        assert!(matches!(price, Err(ValidationError::InvalidPrice(_))));
    }

    #[test]
    fn test_price_new_nan() {
        assert_eq!(Price::new(f64::NAN), Err(ValidationError::MustBeFinite));
    }

    #[test]
    fn test_price_pct_change() {
        let entry = Price::new(100.0).unwrap();
        let exit = Price::new(94.0).unwrap();
        assert!((entry.pct_change_to(exit) + 6.0).abs() < 1e-9);
        assert_eq!(Price::new(0.0).unwrap().pct_change_to(exit), 0.0);
    }

    #[test]
    fn test_price_multiply_negative_factor() {
        let price = Price::new(10.0).unwrap();
        assert!(price.multiply(-2.0).is_err());
    }
}
