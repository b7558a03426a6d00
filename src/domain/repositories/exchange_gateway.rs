//! Exchange Gateway Trait
//!
//! This module defines the `ExchangeGateway` trait, the only way the trading
//! core talks to a futures exchange. Implementations decode the exchange's
//! wire format into the typed results below, so nothing past this boundary
//! ever inspects raw payloads.

use crate::domain::entities::order::{OrderAck, OrderDirection, OrderRequest};
use crate::domain::entities::order_book::OrderBookSnapshot;
use crate::domain::entities::position::PositionSide;
use crate::domain::errors::ExchangeError;
use crate::domain::services::indicators::Candle;
use crate::domain::value_objects::{price::Price, quantity::Quantity};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Common result type for exchange operations
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Account balance information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub currency: String,
    pub available: f64,
    /// Equity including unrealized P&L
    pub total: f64,
}

#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Get the name of this exchange
    fn name(&self) -> &str;

    /// Most recent `limit` candles, oldest first
    async fn get_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> ExchangeResult<Vec<Candle>>;

    async fn get_order_book(&self, symbol: &str, depth: usize) -> ExchangeResult<OrderBookSnapshot>;

    /// Last traded price
    async fn get_ticker(&self, symbol: &str) -> ExchangeResult<Price>;

    async fn place_order(&self, order: &OrderRequest) -> ExchangeResult<OrderAck>;

    /// Close `size` of an open position on `side` at market
    async fn close_order(
        &self,
        symbol: &str,
        side: PositionSide,
        size: Quantity,
        leverage: u32,
    ) -> ExchangeResult<OrderAck> {
        let order = OrderRequest::market(symbol, OrderDirection::close(side), size, leverage);
        self.place_order(&order).await
    }

    async fn get_balance(&self) -> ExchangeResult<Balance>;

    /// Check if the exchange is reachable
    async fn is_healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingGateway {
        orders: Mutex<Vec<OrderRequest>>,
    }

    #[async_trait]
    impl ExchangeGateway for RecordingGateway {
        fn name(&self) -> &str {
            "recording"
        }

        async fn get_candles(&self, _: &str, _: &str, _: usize) -> ExchangeResult<Vec<Candle>> {
            Ok(vec![])
        }

        async fn get_order_book(&self, symbol: &str, _: usize) -> ExchangeResult<OrderBookSnapshot> {
            Ok(OrderBookSnapshot::empty(symbol))
        }

        async fn get_ticker(&self, _: &str) -> ExchangeResult<Price> {
            Ok(Price::new(100.0).unwrap())
        }

        async fn place_order(&self, order: &OrderRequest) -> ExchangeResult<OrderAck> {
            self.orders.lock().unwrap().push(order.clone());
            Ok(OrderAck {
                order_id: "1".to_string(),
                fill_price: None,
            })
        }

        async fn get_balance(&self) -> ExchangeResult<Balance> {
            Ok(Balance {
                currency: "USDT".to_string(),
                available: 1000.0,
                total: 1000.0,
            })
        }
    }

    #[tokio::test]
    async fn test_default_close_order_places_opposite_direction() {
        let gateway = RecordingGateway {
            orders: Mutex::new(vec![]),
        };
        gateway
            .close_order("BTC", PositionSide::Short, Quantity::new(2.0).unwrap(), 5)
            .await
            .unwrap();

        let orders = gateway.orders.lock().unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].direction, OrderDirection::CloseShort);
        assert_eq!(orders[0].size.value(), 2.0);
        assert!(gateway.is_healthy().await);
    }
}
