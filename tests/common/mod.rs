#![allow(dead_code)]

use async_trait::async_trait;
use consensus_trader::domain::entities::order::{OrderAck, OrderRequest};
use consensus_trader::domain::entities::order_book::{OrderBookLevel, OrderBookSnapshot};
use consensus_trader::domain::errors::{ComplianceError, ExchangeError};
use consensus_trader::domain::repositories::compliance_logger::{
    ComplianceEntry, ComplianceLogger, ComplianceStage,
};
use consensus_trader::domain::repositories::exchange_gateway::{
    Balance, ExchangeGateway, ExchangeResult,
};
use consensus_trader::domain::services::indicators::Candle;
use consensus_trader::domain::value_objects::price::Price;
use std::collections::HashMap;
use std::sync::Mutex;

/// How strongly a scripted market leans short
#[derive(Debug, Clone, Copy)]
pub struct MarketScript {
    pub volume_spike: bool,
    pub ask_heavy_book: bool,
}

/// Falling zigzag: RSI stays neutral while MACD, momentum and trend lean short
pub fn bearish_candles(start: f64, count: usize, volume_spike: bool) -> Vec<Candle> {
    let mut candles = Vec::with_capacity(count);
    let mut close = start;
    for i in 1..=count {
        let open = close;
        close = if i % 2 == 1 { close - 2.4 } else { close + 2.0 };
        let volume = if volume_spike && i == count { 200.0 } else { 100.0 };
        candles.push(
            Candle::new(open, open.max(close) + 0.5, open.min(close) - 0.5, close, volume)
                .expect("valid candle"),
        );
    }
    candles
}

pub fn book_around(symbol: &str, mid: f64, ask_heavy: bool) -> OrderBookSnapshot {
    let ask_qty = if ask_heavy { 3.0 } else { 1.0 };
    let bids = (0..5)
        .map(|i| OrderBookLevel::new(mid - 0.01 - i as f64 * 0.01, 1.0))
        .collect();
    let asks = (0..5)
        .map(|i| OrderBookLevel::new(mid + 0.01 + i as f64 * 0.01, ask_qty))
        .collect();
    OrderBookSnapshot::new(symbol, bids, asks)
}

/// Gateway serving scripted bearish markets at a constant price
pub struct MockGateway {
    markets: HashMap<String, MarketScript>,
    pub balance: Mutex<f64>,
    pub orders: Mutex<Vec<OrderRequest>>,
    pub candle_requests: Mutex<u32>,
}

impl MockGateway {
    pub fn new(markets: &[(&str, MarketScript)]) -> Self {
        Self {
            markets: markets
                .iter()
                .map(|(symbol, script)| (symbol.to_string(), *script))
                .collect(),
            balance: Mutex::new(1_000.0),
            orders: Mutex::new(Vec::new()),
            candle_requests: Mutex::new(0),
        }
    }

    pub fn set_balance(&self, balance: f64) {
        *self.balance.lock().unwrap() = balance;
    }

    pub fn entry_orders(&self) -> Vec<OrderRequest> {
        self.orders
            .lock()
            .unwrap()
            .iter()
            .filter(|order| !order.direction.is_close())
            .cloned()
            .collect()
    }

    fn script(&self, symbol: &str) -> ExchangeResult<MarketScript> {
        self.markets
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::MarketDataUnavailable {
                symbol: symbol.to_string(),
                reason: "not scripted".to_string(),
            })
    }

    fn last_price(&self, symbol: &str) -> ExchangeResult<f64> {
        self.script(symbol)?;
        Ok(bearish_candles(300.0, 100, false)
            .last()
            .map(|candle| candle.close.value())
            .unwrap_or(300.0))
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get_candles(&self, symbol: &str, _: &str, limit: usize) -> ExchangeResult<Vec<Candle>> {
        *self.candle_requests.lock().unwrap() += 1;
        let script = self.script(symbol)?;
        Ok(bearish_candles(300.0, limit, script.volume_spike))
    }

    async fn get_order_book(&self, symbol: &str, _: usize) -> ExchangeResult<OrderBookSnapshot> {
        let script = self.script(symbol)?;
        Ok(book_around(symbol, self.last_price(symbol)?, script.ask_heavy_book))
    }

    async fn get_ticker(&self, symbol: &str) -> ExchangeResult<Price> {
        Price::new(self.last_price(symbol)?).map_err(|e| ExchangeError::InvalidResponse(e.to_string()))
    }

    async fn place_order(&self, order: &OrderRequest) -> ExchangeResult<OrderAck> {
        let mut orders = self.orders.lock().unwrap();
        orders.push(order.clone());
        Ok(OrderAck {
            order_id: format!("mock-{}", orders.len()),
            fill_price: None,
        })
    }

    async fn get_balance(&self) -> ExchangeResult<Balance> {
        let total = *self.balance.lock().unwrap();
        Ok(Balance {
            currency: "USDT".to_string(),
            available: total,
            total,
        })
    }
}

#[derive(Default)]
pub struct RecordingLogger {
    pub entries: Mutex<Vec<ComplianceEntry>>,
}

impl RecordingLogger {
    pub fn stages(&self) -> Vec<ComplianceStage> {
        self.entries.lock().unwrap().iter().map(|e| e.stage).collect()
    }
}

#[async_trait]
impl ComplianceLogger for RecordingLogger {
    async fn upload(&self, entry: ComplianceEntry) -> Result<(), ComplianceError> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}
