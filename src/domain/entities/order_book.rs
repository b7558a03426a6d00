use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: f64,
    pub quantity: f64,
}

impl OrderBookLevel {
    pub fn new(price: f64, quantity: f64) -> Self {
        OrderBookLevel { price, quantity }
    }
}

/// Point-in-time depth snapshot; bids descending, asks ascending
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
}

impl OrderBookSnapshot {
    pub fn new(symbol: &str, bids: Vec<OrderBookLevel>, asks: Vec<OrderBookLevel>) -> Self {
        OrderBookSnapshot {
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            bids,
            asks,
        }
    }

    pub fn empty(symbol: &str) -> Self {
        Self::new(symbol, Vec::new(), Vec::new())
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|level| level.price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|level| level.price)
    }

    pub fn total_bid_quantity(&self) -> f64 {
        self.bids.iter().map(|level| level.quantity).sum()
    }

    pub fn total_ask_quantity(&self) -> f64 {
        self.asks.iter().map(|level| level.quantity).sum()
    }

    /// Bid-ask spread as a percentage of the mid price, 0 if a side is empty
    pub fn spread_pct(&self) -> f64 {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => {
                let mid = (bid + ask) / 2.0;
                if mid > 0.0 {
                    (ask - bid) / mid * 100.0
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }
}
