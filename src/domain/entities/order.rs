use crate::domain::entities::position::PositionSide;
use crate::domain::value_objects::{price::Price, quantity::Quantity};
use serde::{Deserialize, Serialize};

/// Futures order intent as understood by the exchange gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderDirection {
    OpenLong,
    OpenShort,
    CloseLong,
    CloseShort,
}

impl OrderDirection {
    pub fn open(side: PositionSide) -> Self {
        match side {
            PositionSide::Long => OrderDirection::OpenLong,
            PositionSide::Short => OrderDirection::OpenShort,
        }
    }

    pub fn close(side: PositionSide) -> Self {
        match side {
            PositionSide::Long => OrderDirection::CloseLong,
            PositionSide::Short => OrderDirection::CloseShort,
        }
    }

    pub fn is_close(&self) -> bool {
        matches!(self, OrderDirection::CloseLong | OrderDirection::CloseShort)
    }
}

impl std::fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderDirection::OpenLong => write!(f, "OPEN_LONG"),
            OrderDirection::OpenShort => write!(f, "OPEN_SHORT"),
            OrderDirection::CloseLong => write!(f, "CLOSE_LONG"),
            OrderDirection::CloseShort => write!(f, "CLOSE_SHORT"),
        }
    }
}

/// Market order submitted to the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub direction: OrderDirection,
    pub size: Quantity,
    pub leverage: u32,
}

impl OrderRequest {
    pub fn market(symbol: &str, direction: OrderDirection, size: Quantity, leverage: u32) -> Self {
        OrderRequest {
            symbol: symbol.to_string(),
            direction,
            size,
            leverage,
        }
    }
}

/// Acknowledgement of an accepted order, decoded once at the gateway boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    /// Average fill price when the exchange reports it
    pub fill_price: Option<Price>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_close_directions_mirror_side() {
        assert_eq!(OrderDirection::open(PositionSide::Long), OrderDirection::OpenLong);
        assert_eq!(OrderDirection::open(PositionSide::Short), OrderDirection::OpenShort);
        assert_eq!(OrderDirection::close(PositionSide::Long), OrderDirection::CloseLong);
        assert_eq!(OrderDirection::close(PositionSide::Short), OrderDirection::CloseShort);
        assert!(OrderDirection::CloseShort.is_close());
        assert!(!OrderDirection::OpenLong.is_close());
    }

    #[test]
    fn test_order_direction_display() {
        assert_eq!(OrderDirection::CloseLong.to_string(), "CLOSE_LONG");
        assert_eq!(
            serde_json::to_value(OrderDirection::OpenShort).unwrap(),
            serde_json::json!("OPEN_SHORT")
        );
    }

    #[test]
    fn test_market_order_request() {
        let order = OrderRequest::market(
            "cmt_btcusdt",
            OrderDirection::OpenLong,
            Quantity::new(0.001).unwrap(),
            10,
        );
        assert_eq!(order.symbol, "cmt_btcusdt");
        assert_eq!(order.size.value(), 0.001);
        assert_eq!(order.leverage, 10);
    }
}
