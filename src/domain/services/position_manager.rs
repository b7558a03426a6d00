//! PositionManager service - drives one position from entry to close
//!
//! Each approved decision gets its own task running `PositionManager::run`.
//! The task owns its `Position` exclusively and only touches shared state
//! through `PortfolioState` and the symbol reservation it was handed.

use crate::domain::entities::debate::DebateRecord;
use crate::domain::entities::order::{OrderDirection, OrderRequest};
use crate::domain::entities::position::{Position, PositionSide, PositionState};
use crate::domain::entities::trade_decision::TradeDecision;
use crate::domain::repositories::compliance_logger::{
    ComplianceEntry, ComplianceLogger, ComplianceStage,
};
use crate::domain::repositories::exchange_gateway::ExchangeGateway;
use crate::domain::services::portfolio_state::{PortfolioState, SymbolReservation};
use crate::domain::value_objects::{pnl::PnL, price::Price, quantity::Quantity};
use crate::retry::{retry_with_backoff, RetryPolicy};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailingStop {
    /// Leveraged P&L % at which trailing starts
    pub activation_pct: f64,
    /// Allowed give-back from the peak, in leveraged P&L %
    pub distance_pct: f64,
}

/// Exit rules for an open position. Percentages are leveraged P&L.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitPolicy {
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub trailing: Option<TrailingStop>,
    pub max_hold: Duration,
}

impl Default for ExitPolicy {
    fn default() -> Self {
        Self {
            take_profit_pct: 4.0,
            stop_loss_pct: 2.0,
            trailing: Some(TrailingStop {
                activation_pct: 3.0,
                distance_pct: 1.5,
            }),
            max_hold: Duration::from_secs(180),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TrailingStop,
    MaxHoldTime,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::TakeProfit => write!(f, "TAKE_PROFIT"),
            ExitReason::StopLoss => write!(f, "STOP_LOSS"),
            ExitReason::TrailingStop => write!(f, "TRAILING_STOP"),
            ExitReason::MaxHoldTime => write!(f, "MAX_HOLD_TIME"),
        }
    }
}

impl ExitPolicy {
    /// Same trailing and hold rules with the decision's TP/SL
    pub fn with_targets(&self, decision: &TradeDecision) -> Self {
        Self {
            take_profit_pct: decision.take_profit_pct,
            stop_loss_pct: decision.stop_loss_pct,
            ..self.clone()
        }
    }

    /// Mark the position at `price` and return the first exit that fires.
    ///
    /// Order: take-profit, stop-loss, trailing stop, max hold.
    pub fn evaluate(
        &self,
        position: &mut Position,
        price: Price,
        held_for: Duration,
    ) -> Option<ExitReason> {
        let leveraged = position.leveraged_pnl_pct(price);
        position.record_mark(leveraged);

        if let Some(trailing) = self.trailing {
            if !position.trailing_active && leveraged >= trailing.activation_pct {
                position.trailing_active = true;
                debug!(
                    symbol = %position.symbol,
                    pnl = leveraged,
                    "Trailing stop activated"
                );
            }
        }

        if leveraged >= self.take_profit_pct {
            return Some(ExitReason::TakeProfit);
        }
        if leveraged <= -self.stop_loss_pct {
            return Some(ExitReason::StopLoss);
        }
        if let Some(trailing) = self.trailing {
            if position.trailing_active
                && position.highest_leveraged_pnl_seen - leveraged > trailing.distance_pct
            {
                return Some(ExitReason::TrailingStop);
            }
        }
        if held_for >= self.max_hold {
            return Some(ExitReason::MaxHoldTime);
        }
        None
    }
}

#[derive(Debug, Clone)]
pub struct PositionConfig {
    pub poll_interval: Duration,
    pub close_retry: RetryPolicy,
    pub exit_policy: ExitPolicy,
    /// Model name reported in compliance records
    pub model_name: String,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            close_retry: RetryPolicy::default(),
            exit_policy: ExitPolicy::default(),
            model_name: "consensus-debate-v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClosedTrade {
    pub position_id: String,
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    pub leverage: u32,
    pub pnl: PnL,
    pub leveraged_pnl: PnL,
    /// Realized P&L in quote currency
    pub realized_pnl: f64,
    pub exit_reason: ExitReason,
    /// Exit price fell back to the entry price
    pub degraded_estimate: bool,
    pub held_secs: u64,
    pub entry_order_id: String,
    pub close_order_id: String,
}

#[derive(Debug, Clone)]
pub enum PositionOutcome {
    EntryFailed {
        symbol: String,
        reason: String,
    },
    Closed(ClosedTrade),
    /// Close retries exhausted; the position is presumed open on the exchange
    CloseFailed {
        symbol: String,
        position_id: String,
        attempts: u32,
        last_error: String,
    },
}

impl PositionOutcome {
    pub fn state(&self) -> PositionState {
        match self {
            PositionOutcome::EntryFailed { .. } => PositionState::EntryFailed,
            PositionOutcome::Closed(_) => PositionState::Closed,
            PositionOutcome::CloseFailed { .. } => PositionState::Exiting,
        }
    }
}

pub struct PositionManager {
    gateway: Arc<dyn ExchangeGateway>,
    compliance: Arc<dyn ComplianceLogger>,
    portfolio: Arc<PortfolioState>,
    config: PositionConfig,
}

impl PositionManager {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        compliance: Arc<dyn ComplianceLogger>,
        portfolio: Arc<PortfolioState>,
        config: PositionConfig,
    ) -> Self {
        Self {
            gateway,
            compliance,
            portfolio,
            config,
        }
    }

    pub fn config(&self) -> &PositionConfig {
        &self.config
    }

    /// Upload the Bull / Bear / Risk Manager transcript behind an approved
    /// decision as a DECISION_MAKING record.
    pub async fn record_decision(&self, record: &DebateRecord, decision: &TradeDecision) {
        self.upload(ComplianceEntry::new(
            ComplianceStage::DecisionMaking,
            &self.config.model_name,
            serde_json::to_value(record).unwrap_or_default(),
            serde_json::to_value(decision).unwrap_or_default(),
            &record.transcript(),
            None,
        ))
        .await;
    }

    /// Run the whole lifecycle for one approved decision
    pub async fn run(
        &self,
        decision: TradeDecision,
        mut reservation: SymbolReservation,
        balance: f64,
    ) -> PositionOutcome {
        let mut position = match self.enter(&decision, balance, &mut reservation).await {
            Ok(position) => position,
            Err(reason) => {
                warn!(
                    symbol = %decision.symbol,
                    state = %PositionState::EntryFailed,
                    reason = %reason,
                    "Entry failed, releasing reservation"
                );
                reservation.release();
                return PositionOutcome::EntryFailed {
                    symbol: decision.symbol,
                    reason,
                };
            }
        };

        self.upload(ComplianceEntry::new(
            ComplianceStage::OrderExecution,
            &self.config.model_name,
            serde_json::to_value(&decision).unwrap_or_default(),
            json!({
                "order_id": position.entry_order_id,
                "direction": OrderDirection::open(position.side),
                "entry_price": position.entry_price.value(),
                "size": position.size.value(),
                "leverage": position.leverage,
            }),
            &decision.reasoning,
            Some(position.entry_order_id.clone()),
        ))
        .await;

        let policy = self.config.exit_policy.with_targets(&decision);
        let opened = Instant::now();
        let reason = self.monitor(&mut position, &policy, opened).await;
        self.exit(position, reason, opened, reservation).await
    }

    async fn enter(
        &self,
        decision: &TradeDecision,
        balance: f64,
        reservation: &mut SymbolReservation,
    ) -> Result<Position, String> {
        let symbol = decision.symbol.as_str();
        info!(
            symbol,
            side = %decision.direction,
            leverage = decision.leverage,
            size_pct = decision.size_pct,
            state = %PositionState::Entering,
            "Opening position"
        );

        let ticker = self
            .gateway
            .get_ticker(symbol)
            .await
            .map_err(|e| format!("ticker unavailable: {}", e))?;
        let size = Quantity::new(decision.quantity_at(balance, ticker.value()))
            .map_err(|e| format!("invalid order size: {}", e))?;

        let order = OrderRequest::market(
            symbol,
            OrderDirection::open(decision.direction),
            size,
            decision.leverage,
        );
        let ack = self
            .gateway
            .place_order(&order)
            .await
            .map_err(|e| format!("entry order failed: {}", e))?;

        let entry_price = ack.fill_price.unwrap_or(ticker);
        let trades = reservation.confirm_entry();
        let position = Position::open(
            symbol,
            decision.direction,
            entry_price,
            size,
            decision.leverage,
            ack.order_id,
        );

        info!(
            symbol,
            position_id = %position.id,
            order_id = %position.entry_order_id,
            entry_price = %position.entry_price,
            size = %position.size,
            trades_today = trades,
            state = %PositionState::Open,
            "Position opened"
        );
        Ok(position)
    }

    async fn monitor(
        &self,
        position: &mut Position,
        policy: &ExitPolicy,
        opened: Instant,
    ) -> ExitReason {
        loop {
            sleep(self.config.poll_interval).await;

            match self.gateway.get_ticker(&position.symbol).await {
                Ok(price) => {
                    if let Some(reason) = policy.evaluate(position, price, opened.elapsed()) {
                        info!(
                            symbol = %position.symbol,
                            price = %price,
                            pnl = position.leveraged_pnl_pct(price),
                            reason = %reason,
                            "Exit triggered"
                        );
                        return reason;
                    }
                    debug!(
                        symbol = %position.symbol,
                        price = %price,
                        peak = position.highest_leveraged_pnl_seen,
                        "Position marked"
                    );
                }
                Err(e) => {
                    warn!(symbol = %position.symbol, error = %e, "Price poll failed, skipping");
                    if opened.elapsed() >= policy.max_hold {
                        return ExitReason::MaxHoldTime;
                    }
                }
            }
        }
    }

    async fn exit(
        &self,
        position: Position,
        reason: ExitReason,
        opened: Instant,
        reservation: SymbolReservation,
    ) -> PositionOutcome {
        info!(
            symbol = %position.symbol,
            position_id = %position.id,
            reason = %reason,
            state = %PositionState::Exiting,
            "Closing position"
        );

        let gateway = &self.gateway;
        let symbol = position.symbol.as_str();
        let (side, size, leverage) = (position.side, position.size, position.leverage);
        let closed = retry_with_backoff("close position", &self.config.close_retry, move |_| {
            gateway.close_order(symbol, side, size, leverage)
        })
        .await;

        let ack = match closed {
            Ok(ack) => ack,
            Err(e) => {
                error!(
                    target: "alert",
                    symbol,
                    position_id = %position.id,
                    attempts = e.attempts,
                    error = %e.last_error,
                    "CRITICAL: close failed after all retries, position presumed still open"
                );
                reservation.strand();
                return PositionOutcome::CloseFailed {
                    symbol: position.symbol.clone(),
                    position_id: position.id.clone(),
                    attempts: e.attempts,
                    last_error: e.last_error.to_string(),
                };
            }
        };

        let (exit_price, degraded_estimate) = match ack.fill_price {
            Some(price) => (price, false),
            None => match self.gateway.get_ticker(symbol).await {
                Ok(price) => (price, false),
                Err(e) => {
                    warn!(symbol, error = %e, "No exit price available, using entry price");
                    (position.entry_price, true)
                }
            },
        };

        let pnl_pct = position.pnl_pct(exit_price);
        let leveraged_pct = position.leveraged_pnl_pct(exit_price);
        let margin = position.size.value() * position.entry_price.value() / position.leverage as f64;
        let realized_pnl = margin * leveraged_pct / 100.0;
        self.portfolio.record_close(realized_pnl);

        let trade = ClosedTrade {
            position_id: position.id.clone(),
            symbol: position.symbol.clone(),
            side,
            entry_price: position.entry_price.value(),
            exit_price: exit_price.value(),
            size: size.value(),
            leverage,
            pnl: PnL::new(pnl_pct).unwrap_or_else(|_| PnL::zero()),
            leveraged_pnl: PnL::new(leveraged_pct).unwrap_or_else(|_| PnL::zero()),
            realized_pnl,
            exit_reason: reason,
            degraded_estimate,
            held_secs: opened.elapsed().as_secs(),
            entry_order_id: position.entry_order_id.clone(),
            close_order_id: ack.order_id.clone(),
        };

        info!(
            symbol,
            position_id = %trade.position_id,
            exit_price = trade.exit_price,
            pnl = %trade.leveraged_pnl,
            realized = realized_pnl,
            reason = %reason,
            degraded = degraded_estimate,
            state = %PositionState::Closed,
            "Position closed"
        );

        self.upload(ComplianceEntry::new(
            ComplianceStage::PositionClose,
            &self.config.model_name,
            json!({
                "symbol": trade.symbol,
                "side": trade.side,
                "entry_price": trade.entry_price,
                "exit_reason": reason,
            }),
            serde_json::to_value(&trade).unwrap_or_default(),
            &format!(
                "Closed {} {} on {}: exit {:.4}, P&L {} ({:+.2} quote){}",
                trade.side,
                trade.symbol,
                reason,
                trade.exit_price,
                trade.leveraged_pnl,
                realized_pnl,
                if degraded_estimate { ", estimated" } else { "" }
            ),
            Some(ack.order_id),
        ))
        .await;

        reservation.release();
        PositionOutcome::Closed(trade)
    }

    async fn upload(&self, entry: ComplianceEntry) {
        let stage = entry.stage;
        if let Err(e) = self.compliance.upload(entry).await {
            warn!(target: "compliance", stage = %stage, error = %e, "Compliance upload failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::debate::{DebateAction, DebateEntry, DebateRole, RiskDecision};
    use crate::domain::entities::order::OrderAck;
    use crate::domain::entities::order_book::OrderBookSnapshot;
    use crate::domain::errors::{ComplianceError, ExchangeError};
    use crate::domain::repositories::exchange_gateway::{Balance, ExchangeResult};
    use crate::domain::services::indicators::Candle;
    use crate::retry::Backoff;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    fn position(side: PositionSide, leverage: u32) -> Position {
        Position::open(
            "BTC",
            side,
            Price::new(100.0).unwrap(),
            Quantity::new(1.0).unwrap(),
            leverage,
            "o-1".to_string(),
        )
    }

    fn price(value: f64) -> Price {
        Price::new(value).unwrap()
    }

    fn policy(trailing: Option<TrailingStop>) -> ExitPolicy {
        ExitPolicy {
            take_profit_pct: 20.0,
            stop_loss_pct: 5.0,
            trailing,
            max_hold: Duration::from_secs(600),
        }
    }

    #[test]
    fn test_stop_loss_scenario() {
        let policy = policy(None);
        let mut position = position(PositionSide::Long, 1);
        let t = Duration::from_secs(1);
        assert_eq!(policy.evaluate(&mut position, price(100.0), t), None);
        assert_eq!(policy.evaluate(&mut position, price(103.0), t), None);
        assert_eq!(policy.evaluate(&mut position, price(98.0), t), None);
        assert_eq!(
            policy.evaluate(&mut position, price(94.0), t),
            Some(ExitReason::StopLoss)
        );
    }

    #[test]
    fn test_take_profit_uses_leveraged_pnl() {
        let policy = policy(None);
        let mut position = position(PositionSide::Short, 10);
        // 2% favorable move at 10x
        assert_eq!(
            policy.evaluate(&mut position, price(98.0), Duration::ZERO),
            Some(ExitReason::TakeProfit)
        );
    }

    #[test]
    fn test_trailing_never_fires_before_activation() {
        let policy = policy(Some(TrailingStop {
            activation_pct: 10.0,
            distance_pct: 1.0,
        }));
        let mut position = position(PositionSide::Long, 1);
        let t = Duration::ZERO;
        assert_eq!(policy.evaluate(&mut position, price(104.0), t), None);
        // 3 below the 4 peak, but trailing never armed
        assert_eq!(policy.evaluate(&mut position, price(101.0), t), None);
        assert!(!position.trailing_active);
    }

    #[test]
    fn test_trailing_fires_after_pullback() {
        let policy = policy(Some(TrailingStop {
            activation_pct: 3.0,
            distance_pct: 1.5,
        }));
        let mut position = position(PositionSide::Long, 2);
        let t = Duration::ZERO;
        assert_eq!(policy.evaluate(&mut position, price(102.0), t), None);
        assert!(position.trailing_active);
        assert_eq!(policy.evaluate(&mut position, price(103.0), t), None);
        // peak 6, now 4.6: give-back 1.4
        assert_eq!(policy.evaluate(&mut position, price(102.3), t), None);
        // now 4.0: give-back 2.0
        assert_eq!(
            policy.evaluate(&mut position, price(102.0), t),
            Some(ExitReason::TrailingStop)
        );
    }

    #[test]
    fn test_max_hold() {
        let policy = policy(None);
        let mut position = position(PositionSide::Long, 1);
        assert_eq!(
            policy.evaluate(&mut position, price(100.5), Duration::from_secs(600)),
            Some(ExitReason::MaxHoldTime)
        );
    }

    #[test]
    fn test_take_profit_wins_over_max_hold() {
        let policy = policy(None);
        let mut position = position(PositionSide::Long, 5);
        assert_eq!(
            policy.evaluate(&mut position, price(105.0), Duration::from_secs(900)),
            Some(ExitReason::TakeProfit)
        );
    }

    struct ScriptedGateway {
        tickers: Mutex<VecDeque<f64>>,
        last: Mutex<f64>,
        fail_entry: bool,
        close_failures: Mutex<u32>,
        orders: Mutex<Vec<OrderRequest>>,
    }

    impl ScriptedGateway {
        fn new(tickers: &[f64]) -> Self {
            Self {
                tickers: Mutex::new(tickers.iter().copied().collect()),
                last: Mutex::new(tickers[0]),
                fail_entry: false,
                close_failures: Mutex::new(0),
                orders: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl ExchangeGateway for ScriptedGateway {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn get_candles(&self, _: &str, _: &str, _: usize) -> ExchangeResult<Vec<Candle>> {
            Ok(vec![])
        }

        async fn get_order_book(&self, symbol: &str, _: usize) -> ExchangeResult<OrderBookSnapshot> {
            Ok(OrderBookSnapshot::empty(symbol))
        }

        async fn get_ticker(&self, _: &str) -> ExchangeResult<Price> {
            let mut last = self.last.lock().unwrap();
            if let Some(next) = self.tickers.lock().unwrap().pop_front() {
                *last = next;
            }
            Price::new(*last).map_err(|e| ExchangeError::InvalidResponse(e.to_string()))
        }

        async fn place_order(&self, order: &OrderRequest) -> ExchangeResult<OrderAck> {
            self.orders.lock().unwrap().push(order.clone());
            if !order.direction.is_close() && self.fail_entry {
                return Err(ExchangeError::OrderRejected("margin".to_string()));
            }
            if order.direction.is_close() {
                let mut failures = self.close_failures.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(ExchangeError::Network("reset".to_string()));
                }
            }
            Ok(OrderAck {
                order_id: format!("o-{}", self.orders.lock().unwrap().len()),
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

    /// Counts events on the `alert` target
    struct AlertCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for AlertCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if event.metadata().target() == "alert" {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    struct CountingLogger {
        stages: Mutex<Vec<ComplianceStage>>,
        explanations: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl ComplianceLogger for CountingLogger {
        async fn upload(&self, entry: ComplianceEntry) -> Result<(), ComplianceError> {
            self.stages.lock().unwrap().push(entry.stage);
            self.explanations.lock().unwrap().push(entry.explanation);
            if self.fail {
                return Err(ComplianceError::Transport("offline".to_string()));
            }
            Ok(())
        }
    }

    fn decision() -> TradeDecision {
        TradeDecision {
            approved: true,
            symbol: "BTC".to_string(),
            direction: PositionSide::Long,
            leverage: 1,
            size_pct: 10.0,
            stop_loss_pct: 5.0,
            take_profit_pct: 20.0,
            confidence: 0.7,
            decision: RiskDecision::Approve,
            reasoning: "test".to_string(),
        }
    }

    fn config() -> PositionConfig {
        PositionConfig {
            poll_interval: Duration::from_secs(1),
            close_retry: RetryPolicy {
                max_attempts: 3,
                backoff: Backoff::Fixed(Duration::from_secs(1)),
            },
            exit_policy: ExitPolicy {
                trailing: None,
                ..ExitPolicy::default()
            },
            model_name: "test".to_string(),
        }
    }

    fn manager(
        gateway: Arc<ScriptedGateway>,
        logger: Arc<CountingLogger>,
        portfolio: Arc<PortfolioState>,
    ) -> PositionManager {
        PositionManager::new(gateway, logger, portfolio, config())
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_stop_loss() {
        let gateway = Arc::new(ScriptedGateway::new(&[100.0, 103.0, 98.0, 94.0]));
        let logger = Arc::new(CountingLogger {
            stages: Mutex::new(vec![]),
            explanations: Mutex::new(vec![]),
            fail: false,
        });
        let portfolio = Arc::new(PortfolioState::new());
        let reservation = portfolio.try_reserve("BTC", 10.0, 1).unwrap();

        let outcome = manager(gateway.clone(), logger.clone(), portfolio.clone())
            .run(decision(), reservation, 1000.0)
            .await;

        let trade = match outcome {
            PositionOutcome::Closed(trade) => trade,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        assert_eq!(trade.exit_price, 94.0);
        assert!((trade.pnl.value() + 6.0).abs() < 1e-9);
        // 1 contract worth 100 at 1x, down 6%
        assert!((trade.realized_pnl + 6.0).abs() < 1e-9);

        let orders = gateway.orders.lock().unwrap();
        assert_eq!(orders[0].direction, OrderDirection::OpenLong);
        assert_eq!(orders[1].direction, OrderDirection::CloseLong);
        assert_eq!(
            *logger.stages.lock().unwrap(),
            vec![ComplianceStage::OrderExecution, ComplianceStage::PositionClose]
        );
        assert!(!portfolio.is_reserved("BTC"));
        assert_eq!(portfolio.trade_count(), 1);
        assert_eq!(portfolio.consecutive_losses(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_failure_releases_reservation() {
        let mut gateway = ScriptedGateway::new(&[100.0]);
        gateway.fail_entry = true;
        let gateway = Arc::new(gateway);
        let logger = Arc::new(CountingLogger {
            stages: Mutex::new(vec![]),
            explanations: Mutex::new(vec![]),
            fail: false,
        });
        let portfolio = Arc::new(PortfolioState::new());
        let reservation = portfolio.try_reserve("BTC", 10.0, 1).unwrap();

        let outcome = manager(gateway, logger.clone(), portfolio.clone())
            .run(decision(), reservation, 1000.0)
            .await;

        assert_eq!(outcome.state(), PositionState::EntryFailed);
        assert!(!portfolio.is_reserved("BTC"));
        assert_eq!(portfolio.trade_count(), 0);
        assert!(logger.stages.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_retries_then_strands() {
        let gateway = ScriptedGateway::new(&[100.0, 80.0]);
        *gateway.close_failures.lock().unwrap() = 10;
        let gateway = Arc::new(gateway);
        let logger = Arc::new(CountingLogger {
            stages: Mutex::new(vec![]),
            explanations: Mutex::new(vec![]),
            fail: false,
        });
        let portfolio = Arc::new(PortfolioState::new());
        let reservation = portfolio.try_reserve("BTC", 10.0, 1).unwrap();

        let alerts = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(AlertCounter(Arc::clone(&alerts)));
        let _guard = tracing::subscriber::set_default(subscriber);

        let outcome = manager(gateway.clone(), logger, portfolio.clone())
            .run(decision(), reservation, 1000.0)
            .await;

        match outcome {
            PositionOutcome::CloseFailed { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(alerts.load(Ordering::SeqCst), 1);
        let closes = gateway
            .orders
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.direction.is_close())
            .count();
        assert_eq!(closes, 3);
        assert!(portfolio.is_stranded("BTC"));
        assert_eq!(portfolio.open_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decision_record_carries_debate_transcript() {
        let gateway = Arc::new(ScriptedGateway::new(&[100.0]));
        let logger = Arc::new(CountingLogger {
            stages: Mutex::new(vec![]),
            explanations: Mutex::new(vec![]),
            fail: false,
        });
        let record = DebateRecord {
            symbol: "BTC".to_string(),
            entries: vec![
                DebateEntry::new(DebateRole::Bull, DebateAction::ProposeLong, 0.7, "breakout".to_string()),
                DebateEntry::new(DebateRole::Bear, DebateAction::Agree, 0.5, "no objections".to_string()),
                DebateEntry::new(DebateRole::RiskManager, DebateAction::Approve, 0.75, "within limits".to_string()),
            ],
            decision: Some(RiskDecision::Approve),
        };

        manager(gateway, logger.clone(), Arc::new(PortfolioState::new()))
            .record_decision(&record, &decision())
            .await;

        assert_eq!(
            *logger.stages.lock().unwrap(),
            vec![ComplianceStage::DecisionMaking]
        );
        let explanation = logger.explanations.lock().unwrap()[0].clone();
        assert!(explanation.contains("breakout"));
        assert!(explanation.contains("no objections"));
        assert!(explanation.contains("within limits"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_compliance_failure_does_not_block() {
        let gateway = Arc::new(ScriptedGateway::new(&[100.0, 130.0]));
        let logger = Arc::new(CountingLogger {
            stages: Mutex::new(vec![]),
            explanations: Mutex::new(vec![]),
            fail: true,
        });
        let portfolio = Arc::new(PortfolioState::new());
        let reservation = portfolio.try_reserve("BTC", 10.0, 1).unwrap();

        let outcome = manager(gateway, logger.clone(), portfolio)
            .run(decision(), reservation, 1000.0)
            .await;

        match outcome {
            PositionOutcome::Closed(trade) => assert_eq!(trade.exit_reason, ExitReason::TakeProfit),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(logger.stages.lock().unwrap().len(), 2);
    }
}
