use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures reported by an exchange gateway.
///
/// Every variant is recoverable from the caller's point of view: a failed
/// market-data read skips the cycle, a failed order is retried or aborted by
/// the position lifecycle.
#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum ExchangeError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Market data unavailable for {symbol}: {reason}")]
    MarketDataUnavailable { symbol: String, reason: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Balance query failed: {0}")]
    BalanceQueryFailed(String),

    #[error("Request timed out")]
    Timeout,
}

impl ExchangeError {
    /// Short error code for logs and compliance payloads
    pub fn code(&self) -> &'static str {
        match self {
            ExchangeError::Network(_) => "NETWORK",
            ExchangeError::OrderRejected(_) => "ORDER_REJECTED",
            ExchangeError::MarketDataUnavailable { .. } => "MARKET_DATA",
            ExchangeError::InvalidResponse(_) => "INVALID_RESPONSE",
            ExchangeError::BalanceQueryFailed(_) => "BALANCE",
            ExchangeError::Timeout => "TIMEOUT",
        }
    }
}

/// Failures of the compliance log sink. Never fatal to trading.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ComplianceError {
    #[error("Compliance upload rejected: {0}")]
    Rejected(String),

    #[error("Compliance transport error: {0}")]
    Transport(String),

    #[error("Compliance payload could not be serialized: {0}")]
    Serialization(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Value must be non-negative")]
    MustBeNonNegative,

    #[error("Value must be finite")]
    MustBeFinite,
}

impl From<ValidationError> for String {
    fn from(error: ValidationError) -> Self {
        error.to_string()
    }
}

/// Inconsistent configuration detected at startup
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("No symbols configured")]
    NoSymbols,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_error_display() {
        let error = ExchangeError::OrderRejected("insufficient margin".to_string());
        assert_eq!(error.to_string(), "Order rejected: insufficient margin");
        assert_eq!(error.code(), "ORDER_REJECTED");
    }

    #[test]
    fn test_exchange_error_serializes_tagged() {
        let error = ExchangeError::Network("connection reset".to_string());
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["type"], "Network");
        assert_eq!(json["message"], "connection reset");
    }

    #[test]
    fn test_validation_error_into_string() {
        let message: String = ValidationError::MustBeFinite.into();
        assert_eq!(message, "Value must be finite");
    }

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::InvalidValue {
            field: "max_leverage",
            reason: "must be at least 1".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for max_leverage: must be at least 1"
        );
    }
}
