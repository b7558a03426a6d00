//! In-memory futures exchange for dry runs
//!
//! Prices follow a seeded random walk that advances on every ticker read.
//! Orders fill immediately at the current price and margin is tracked so
//! `get_balance` reports realistic equity.

use crate::domain::entities::order::{OrderAck, OrderDirection, OrderRequest};
use crate::domain::entities::order_book::{OrderBookLevel, OrderBookSnapshot};
use crate::domain::entities::position::PositionSide;
use crate::domain::errors::ExchangeError;
use crate::domain::repositories::exchange_gateway::{Balance, ExchangeGateway, ExchangeResult};
use crate::domain::services::indicators::Candle;
use crate::domain::value_objects::price::Price;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct PaperExchangeConfig {
    pub starting_balance: f64,
    /// Typical one-minute move, in percent
    pub volatility_pct: f64,
    pub spread_pct: f64,
    pub fee_pct: f64,
    pub initial_prices: HashMap<String, f64>,
    pub seed: u64,
}

impl Default for PaperExchangeConfig {
    fn default() -> Self {
        let initial_prices = [
            ("cmt_btcusdt", 65_000.0),
            ("cmt_ethusdt", 3_200.0),
            ("cmt_solusdt", 150.0),
        ]
        .into_iter()
        .map(|(symbol, price)| (symbol.to_string(), price))
        .collect();

        Self {
            starting_balance: 1_000.0,
            volatility_pct: 0.15,
            spread_pct: 0.02,
            fee_pct: 0.06,
            initial_prices,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
struct PaperPosition {
    side: PositionSide,
    size: f64,
    entry_price: f64,
    margin: f64,
}

#[derive(Debug)]
struct PaperState {
    rng: StdRng,
    prices: HashMap<String, f64>,
    cash: f64,
    positions: HashMap<String, PaperPosition>,
    next_order_id: u64,
}

impl PaperState {
    fn price_of(&mut self, symbol: &str) -> ExchangeResult<f64> {
        self.prices
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::MarketDataUnavailable {
                symbol: symbol.to_string(),
                reason: "unknown symbol".to_string(),
            })
    }

    fn step(&mut self, symbol: &str, volatility_pct: f64) -> ExchangeResult<f64> {
        let price = self.price_of(symbol)?;
        let change = self.rng.gen_range(-1.0..1.0) * volatility_pct / 100.0;
        let next = (price * (1.0 + change)).max(f64::EPSILON);
        self.prices.insert(symbol.to_string(), next);
        Ok(next)
    }

    fn order_id(&mut self) -> String {
        self.next_order_id += 1;
        format!("paper-{}", self.next_order_id)
    }

    fn equity(&self) -> f64 {
        let open: f64 = self
            .positions
            .iter()
            .map(|(symbol, position)| {
                let mark = self.prices.get(symbol).copied().unwrap_or(position.entry_price);
                let sign = match position.side {
                    PositionSide::Long => 1.0,
                    PositionSide::Short => -1.0,
                };
                position.margin + (mark - position.entry_price) * position.size * sign
            })
            .sum();
        self.cash + open
    }
}

/// Minutes per candle for intervals like "1m", "15m", "1h"
fn interval_minutes(interval: &str) -> f64 {
    let (value, unit) = interval.split_at(interval.len().saturating_sub(1));
    let value: f64 = value.parse().unwrap_or(1.0);
    match unit {
        "h" => value * 60.0,
        "d" => value * 1_440.0,
        _ => value,
    }
}

pub struct PaperExchange {
    config: PaperExchangeConfig,
    state: Mutex<PaperState>,
}

impl PaperExchange {
    pub fn new(config: PaperExchangeConfig) -> Self {
        let state = PaperState {
            rng: StdRng::seed_from_u64(config.seed),
            prices: config.initial_prices.clone(),
            cash: config.starting_balance,
            positions: HashMap::new(),
            next_order_id: 0,
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    /// Add or move a market, mainly for tests and demos
    pub async fn set_price(&self, symbol: &str, price: f64) {
        self.state.lock().await.prices.insert(symbol.to_string(), price);
    }

    pub async fn open_positions(&self) -> usize {
        self.state.lock().await.positions.len()
    }
}

#[async_trait]
impl ExchangeGateway for PaperExchange {
    fn name(&self) -> &str {
        "Paper"
    }

    async fn get_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> ExchangeResult<Vec<Candle>> {
        let mut state = self.state.lock().await;
        let last_close = state.price_of(symbol)?;
        let minutes = interval_minutes(interval);
        let step_pct = self.config.volatility_pct * minutes.sqrt();

        // walk backwards from the live price so the series ends on it
        let mut closes = Vec::with_capacity(limit);
        let mut close = last_close;
        for _ in 0..limit {
            closes.push(close);
            let change = state.rng.gen_range(-1.0..1.0) * step_pct / 100.0;
            close = (close / (1.0 + change)).max(f64::EPSILON);
        }
        closes.reverse();

        let now = Utc::now();
        let mut candles = Vec::with_capacity(limit);
        let mut open = closes.first().copied().unwrap_or(last_close);
        for (i, &close) in closes.iter().enumerate() {
            let wick = state.rng.gen_range(0.0..=step_pct / 200.0);
            let high = open.max(close) * (1.0 + wick);
            let low = open.min(close) * (1.0 - wick);
            let volume = state.rng.gen_range(50.0..150.0);
            let age = ((limit - i) as f64 * minutes) as i64;
            let candle = Candle::new(open, high, low, close, volume)
                .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?
                .with_timestamp(now - ChronoDuration::minutes(age));
            candles.push(candle);
            open = close;
        }
        Ok(candles)
    }

    async fn get_order_book(&self, symbol: &str, depth: usize) -> ExchangeResult<OrderBookSnapshot> {
        let mut state = self.state.lock().await;
        let mid = state.price_of(symbol)?;
        let half_spread = mid * self.config.spread_pct / 200.0;
        let tick = mid * 0.0001;

        let mut bids = Vec::with_capacity(depth);
        let mut asks = Vec::with_capacity(depth);
        for level in 0..depth {
            let offset = half_spread + tick * level as f64;
            bids.push(OrderBookLevel::new(mid - offset, state.rng.gen_range(0.5..5.0)));
            asks.push(OrderBookLevel::new(mid + offset, state.rng.gen_range(0.5..5.0)));
        }
        Ok(OrderBookSnapshot::new(symbol, bids, asks))
    }

    async fn get_ticker(&self, symbol: &str) -> ExchangeResult<Price> {
        let mut state = self.state.lock().await;
        let price = state.step(symbol, self.config.volatility_pct)?;
        Price::new(price).map_err(|e| ExchangeError::InvalidResponse(e.to_string()))
    }

    async fn place_order(&self, order: &OrderRequest) -> ExchangeResult<OrderAck> {
        let mut state = self.state.lock().await;
        let price = state.price_of(&order.symbol)?;
        let size = order.size.value();
        let leverage = order.leverage.max(1) as f64;
        let fee = size * price * self.config.fee_pct / 100.0;

        match order.direction {
            OrderDirection::OpenLong | OrderDirection::OpenShort => {
                if state.positions.contains_key(&order.symbol) {
                    return Err(ExchangeError::OrderRejected(format!(
                        "position already open on {}",
                        order.symbol
                    )));
                }
                let margin = size * price / leverage;
                if margin + fee > state.cash {
                    return Err(ExchangeError::OrderRejected(format!(
                        "insufficient margin: need {:.2}, have {:.2}",
                        margin + fee,
                        state.cash
                    )));
                }
                let side = if order.direction == OrderDirection::OpenLong {
                    PositionSide::Long
                } else {
                    PositionSide::Short
                };
                state.cash -= margin + fee;
                state.positions.insert(
                    order.symbol.clone(),
                    PaperPosition {
                        side,
                        size,
                        entry_price: price,
                        margin,
                    },
                );
            }
            OrderDirection::CloseLong | OrderDirection::CloseShort => {
                let side = if order.direction == OrderDirection::CloseLong {
                    PositionSide::Long
                } else {
                    PositionSide::Short
                };
                let position = match state.positions.get(&order.symbol) {
                    Some(position) if position.side == side => position.clone(),
                    _ => {
                        return Err(ExchangeError::OrderRejected(format!(
                            "no {} position on {}",
                            side, order.symbol
                        )))
                    }
                };
                state.positions.remove(&order.symbol);
                let sign = match side {
                    PositionSide::Long => 1.0,
                    PositionSide::Short => -1.0,
                };
                let pnl = (price - position.entry_price) * position.size * sign;
                state.cash += position.margin + pnl - fee;
                info!(symbol = %order.symbol, pnl, cash = state.cash, "Paper position closed");
            }
        }

        let order_id = state.order_id();
        debug!(order_id = %order_id, direction = %order.direction, price, "Paper fill");
        Ok(OrderAck {
            order_id,
            fill_price: Some(Price::new(price).map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?),
        })
    }

    async fn get_balance(&self) -> ExchangeResult<Balance> {
        let state = self.state.lock().await;
        Ok(Balance {
            currency: "USDT".to_string(),
            available: state.cash,
            total: state.equity(),
        })
    }
}
