use crate::domain::entities::debate::DebateRecord;
use crate::domain::entities::trade_decision::TradeDecision;
use crate::domain::repositories::exchange_gateway::ExchangeGateway;
use crate::domain::services::debate::{DebateArbitrator, DebateStats};
use crate::domain::services::indicators::IndicatorEngine;
use crate::domain::services::portfolio_state::{PortfolioSnapshot, PortfolioState};
use crate::domain::services::position_manager::{ClosedTrade, PositionManager, PositionOutcome};
use crate::domain::services::risk_metrics::{ExposureRisk, RiskLevel, RiskReport};
use crate::domain::services::signal_scorer::SignalScorer;
use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

/// What happens once session P&L falls below the drawdown limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawdownPolicy {
    /// Stop opening positions for the rest of the session
    Halt,
    /// Stop for `cooldown`, then resume measured from the balance at resume
    PauseAndResume { cooldown: Duration },
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub symbols: Vec<String>,
    pub candle_interval: String,
    /// Higher timeframe used for the macro-trend filter
    pub reference_interval: Option<String>,
    pub candle_limit: usize,
    pub order_book_depth: usize,
    pub max_concurrent_positions: usize,
    pub scan_interval: Duration,
    pub max_drawdown_pct: f64,
    pub drawdown_policy: DrawdownPolicy,
    pub max_daily_trades: u32,
    pub max_consecutive_losses: Option<u32>,
    pub loss_streak_cooldown: Duration,
    /// Baseline for session P&L; the first balance read when None
    pub starting_balance: Option<f64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            symbols: vec![
                "cmt_btcusdt".to_string(),
                "cmt_ethusdt".to_string(),
                "cmt_solusdt".to_string(),
            ],
            candle_interval: "1m".to_string(),
            reference_interval: Some("15m".to_string()),
            candle_limit: 100,
            order_book_depth: 20,
            max_concurrent_positions: 3,
            scan_interval: Duration::from_secs(10),
            max_drawdown_pct: 10.0,
            drawdown_policy: DrawdownPolicy::Halt,
            max_daily_trades: 50,
            max_consecutive_losses: None,
            loss_streak_cooldown: Duration::from_secs(300),
            starting_balance: None,
        }
    }
}

/// Why a cycle opened no new positions
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryBlock {
    BalanceUnavailable,
    DrawdownHalt,
    Paused,
    TradeCap,
    NoFreeSlots,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub blocked: Option<EntryBlock>,
    pub balance: Option<f64>,
    pub scanned: usize,
    pub approved: usize,
    pub dispatched: Vec<String>,
    /// Exposure risk after dispatch
    pub risk: Option<ExposureRisk>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSummary {
    pub cycles: u64,
    pub dispatched: u64,
    pub closed: u64,
    pub entry_failed: u64,
    pub close_failed: u64,
    pub realized_pnl: f64,
    pub portfolio: Option<PortfolioSnapshot>,
    pub debates: Option<DebateStats>,
    pub risk: Option<RiskReport>,
}

pub struct PortfolioScheduler {
    gateway: Arc<dyn ExchangeGateway>,
    engine: IndicatorEngine,
    scorer: SignalScorer,
    arbitrator: Arc<DebateArbitrator>,
    positions: Arc<PositionManager>,
    portfolio: Arc<PortfolioState>,
    config: SchedulerConfig,
    slots: Arc<Semaphore>,
    tasks: JoinSet<PositionOutcome>,
    starting_balance: Option<f64>,
    /// Balance the session opened with, kept across drawdown re-baselines
    opening_balance: Option<f64>,
    closed_trades: Vec<ClosedTrade>,
    halted: bool,
    paused_until: Option<Instant>,
    summary: SessionSummary,
}

impl PortfolioScheduler {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        engine: IndicatorEngine,
        scorer: SignalScorer,
        arbitrator: Arc<DebateArbitrator>,
        positions: Arc<PositionManager>,
        portfolio: Arc<PortfolioState>,
        config: SchedulerConfig,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent_positions));
        let starting_balance = config.starting_balance;
        Self {
            gateway,
            engine,
            scorer,
            arbitrator,
            positions,
            portfolio,
            config,
            slots,
            tasks: JoinSet::new(),
            starting_balance,
            opening_balance: starting_balance,
            closed_trades: Vec::new(),
            halted: false,
            paused_until: None,
            summary: SessionSummary::default(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Scan until `shutdown` flips to true, then wait for every open
    /// position to finish.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> SessionSummary {
        info!(
            symbols = self.config.symbols.len(),
            max_positions = self.config.max_concurrent_positions,
            "Portfolio scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let report = self.run_cycle().await;
            debug!(?report, "Cycle finished");

            tokio::select! {
                _ = sleep(self.config.scan_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(in_flight = self.tasks.len(), "Shutdown requested, waiting for open positions");
        self.drain().await
    }

    /// Wait for all in-flight positions and return the session summary
    pub async fn drain(&mut self) -> SessionSummary {
        while let Some(result) = self.tasks.join_next().await {
            self.record_outcome(result);
        }

        self.summary.portfolio = Some(self.portfolio.snapshot());
        self.summary.debates = Some(self.arbitrator.stats());
        let risk = RiskReport::from_trades(self.opening_balance.unwrap_or(0.0), &self.closed_trades);
        info!(
            trades = risk.trades,
            win_rate = risk.win_rate,
            max_drawdown_pct = risk.max_drawdown_pct,
            sharpe = ?risk.sharpe_ratio,
            var_95 = ?risk.value_at_risk_95,
            "Session risk"
        );
        self.summary.risk = Some(risk);
        info!(
            cycles = self.summary.cycles,
            dispatched = self.summary.dispatched,
            closed = self.summary.closed,
            entry_failed = self.summary.entry_failed,
            close_failed = self.summary.close_failed,
            realized_pnl = self.summary.realized_pnl,
            "Session summary"
        );
        self.summary.clone()
    }

    fn record_outcome(&mut self, result: Result<PositionOutcome, JoinError>) {
        match result {
            Ok(PositionOutcome::Closed(trade)) => {
                self.summary.closed += 1;
                self.summary.realized_pnl += trade.realized_pnl;
                self.closed_trades.push(trade);
            }
            Ok(PositionOutcome::EntryFailed { .. }) => self.summary.entry_failed += 1,
            Ok(PositionOutcome::CloseFailed { .. }) => self.summary.close_failed += 1,
            Err(e) => error!(error = %e, "Position task aborted"),
        }
    }

    /// One scan-rank-dispatch pass
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.summary.cycles += 1;
        let mut report = CycleReport::default();

        if self.portfolio.maybe_roll_day(Utc::now().date_naive()) {
            self.arbitrator.reset_violations();
        }
        while let Some(result) = self.tasks.try_join_next() {
            self.record_outcome(result);
        }

        let balance = match self.gateway.get_balance().await {
            Ok(balance) => balance.total,
            Err(e) => {
                warn!(error = %e, "Balance refresh failed, skipping cycle");
                report.blocked = Some(EntryBlock::BalanceUnavailable);
                return report;
            }
        };
        report.balance = Some(balance);
        self.opening_balance.get_or_insert(balance);

        if let Some(block) = self.entry_block(balance) {
            report.blocked = Some(block);
            return report;
        }

        let free_slots = self.slots.available_permits();
        if free_slots == 0 {
            debug!("All position slots busy");
            report.blocked = Some(EntryBlock::NoFreeSlots);
            return report;
        }

        let candidates: Vec<String> = self
            .config
            .symbols
            .iter()
            .filter(|symbol| self.portfolio.is_available(symbol))
            .cloned()
            .collect();
        report.scanned = candidates.len();

        let exposure = self.portfolio.current_exposure_pct();
        let mut approved: Vec<(TradeDecision, DebateRecord)> = join_all(
            candidates
                .iter()
                .map(|symbol| self.evaluate_symbol(symbol, exposure)),
        )
        .await
        .into_iter()
        .flatten()
        .collect();
        report.approved = approved.len();

        // sort_by is stable, so equal confidences keep symbol order
        approved.sort_by(|(a, _), (b, _)| b.confidence.total_cmp(&a.confidence));

        let max_exposure = self.arbitrator.config().max_exposure_pct;
        for (decision, record) in approved {
            if report.dispatched.len() >= free_slots {
                break;
            }
            if self.portfolio.current_exposure_pct() + decision.size_pct > max_exposure {
                info!(symbol = %decision.symbol, "Exposure ceiling reached, skipping");
                continue;
            }
            let Some(mut reservation) =
                self.portfolio
                    .try_reserve(&decision.symbol, decision.size_pct, decision.leverage)
            else {
                continue;
            };
            if !reservation.claim_trade(self.config.max_daily_trades) {
                debug!(
                    symbol = %decision.symbol,
                    cap = self.config.max_daily_trades,
                    "Trade cap taken by pending entries"
                );
                break;
            }
            let Ok(permit) = Arc::clone(&self.slots).try_acquire_owned() else {
                break;
            };

            info!(
                symbol = %decision.symbol,
                side = %decision.direction,
                confidence = decision.confidence,
                leverage = decision.leverage,
                size_pct = decision.size_pct,
                "Dispatching position"
            );
            report.dispatched.push(decision.symbol.clone());
            self.summary.dispatched += 1;

            let positions = Arc::clone(&self.positions);
            self.tasks.spawn(async move {
                let _permit = permit;
                positions.record_decision(&record, &decision).await;
                positions.run(decision, reservation, balance).await
            });
        }

        let risk = self.portfolio.exposure_risk();
        if risk.level >= RiskLevel::High {
            warn!(
                level = %risk.level,
                exposure_pct = risk.exposure_pct,
                weighted_leverage = risk.weighted_leverage,
                "Portfolio risk elevated"
            );
        }
        report.risk = Some(risk);
        report
    }

    fn entry_block(&mut self, balance: f64) -> Option<EntryBlock> {
        if self.halted {
            return Some(EntryBlock::DrawdownHalt);
        }

        if let Some(until) = self.paused_until {
            if Instant::now() < until {
                return Some(EntryBlock::Paused);
            }
            info!(balance, "Pause elapsed, resuming entries");
            self.paused_until = None;
            self.starting_balance = Some(balance);
        }

        let start = *self.starting_balance.get_or_insert(balance);
        let session_pnl_pct = if start > 0.0 {
            (balance - start) / start * 100.0
        } else {
            0.0
        };
        if session_pnl_pct < -self.config.max_drawdown_pct {
            match self.config.drawdown_policy {
                DrawdownPolicy::Halt => {
                    error!(
                        session_pnl_pct,
                        limit = self.config.max_drawdown_pct,
                        "Max drawdown breached, halting new entries"
                    );
                    self.halted = true;
                    return Some(EntryBlock::DrawdownHalt);
                }
                DrawdownPolicy::PauseAndResume { cooldown } => {
                    warn!(
                        session_pnl_pct,
                        limit = self.config.max_drawdown_pct,
                        cooldown_secs = cooldown.as_secs(),
                        "Max drawdown breached, pausing new entries"
                    );
                    self.paused_until = Some(Instant::now() + cooldown);
                    return Some(EntryBlock::Paused);
                }
            }
        }

        let trades = self.portfolio.committed_trades();
        if trades >= self.config.max_daily_trades {
            debug!(trades, cap = self.config.max_daily_trades, "Trade cap reached");
            return Some(EntryBlock::TradeCap);
        }

        if let Some(max_losses) = self.config.max_consecutive_losses {
            let losses = self.portfolio.consecutive_losses();
            if losses >= max_losses {
                warn!(
                    losses,
                    cooldown_secs = self.config.loss_streak_cooldown.as_secs(),
                    "Losing streak, pausing new entries"
                );
                self.portfolio.reset_loss_streak();
                self.paused_until = Some(Instant::now() + self.config.loss_streak_cooldown);
                return Some(EntryBlock::Paused);
            }
        }

        None
    }

    /// Indicators, verdict and debate for one symbol. Market-data errors
    /// drop the symbol for this cycle only.
    async fn evaluate_symbol(
        &self,
        symbol: &str,
        exposure_pct: f64,
    ) -> Option<(TradeDecision, DebateRecord)> {
        let candles = match self
            .gateway
            .get_candles(symbol, &self.config.candle_interval, self.config.candle_limit)
            .await
        {
            Ok(candles) => candles,
            Err(e) => {
                warn!(symbol, error = %e, "Candles unavailable, skipping symbol");
                return None;
            }
        };
        let book = match self
            .gateway
            .get_order_book(symbol, self.config.order_book_depth)
            .await
        {
            Ok(book) => book,
            Err(e) => {
                warn!(symbol, error = %e, "Order book unavailable, skipping symbol");
                return None;
            }
        };
        let reference_trend = match &self.config.reference_interval {
            Some(interval) => match self
                .gateway
                .get_candles(symbol, interval, self.config.candle_limit)
                .await
            {
                Ok(candles) => Some(self.engine.trend_of(&candles)),
                Err(e) => {
                    warn!(symbol, error = %e, "Reference candles unavailable, skipping symbol");
                    return None;
                }
            },
            None => None,
        };

        let indicators = self.engine.analyze(&candles, Some(&book));
        let verdict = self.scorer.score(symbol, &indicators, reference_trend);
        debug!(verdict = %verdict.summary(), "Scored");

        let outcome = self.arbitrator.debate(&verdict, exposure_pct);
        outcome.decision.map(|decision| (decision, outcome.record))
    }
}
