//! Bull / Bear / Risk Manager arbitration
//!
//! A LONG verdict is proposed by the Bull and reviewed by the Bear, a SHORT
//! verdict the other way round. The Risk Manager then applies the hard
//! limits and produces the terminal APPROVE / MODIFY / REJECT decision.

use crate::domain::entities::debate::{
    DebateAction, DebateEntry, DebateRecord, DebateRole, RiskDecision,
};
use crate::domain::entities::position::PositionSide;
use crate::domain::entities::signal::{Direction, SignalVerdict};
use crate::domain::entities::trade_decision::TradeDecision;
use crate::domain::services::indicators::Trend;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct DebateConfig {
    pub max_leverage: u32,
    pub max_position_size_pct: f64,
    pub max_exposure_pct: f64,
    pub min_confidence: f64,
    /// Requested leverage is `round(confidence * leverage_aggression)`
    pub leverage_aggression: f64,
    pub proposal_size_pct: f64,
    /// Stop distance in ATRs, converted to leveraged percent
    pub atr_stop_multiplier: f64,
    pub atr_target_multiplier: f64,
    pub default_stop_loss_pct: f64,
    pub default_take_profit_pct: f64,
    pub max_spread_pct: f64,
    pub imbalance_threshold: f64,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub stochastic_overbought: f64,
    pub stochastic_oversold: f64,
    /// ATR% above which leverage is held to `high_volatility_max_leverage`
    pub high_volatility_pct: f64,
    pub high_volatility_max_leverage: u32,
    /// Opposing score from which a reviewer may counter-propose
    pub counter_score_threshold: f64,
    pub history_capacity: usize,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            max_leverage: 20,
            max_position_size_pct: 25.0,
            max_exposure_pct: 80.0,
            min_confidence: 0.55,
            leverage_aggression: 20.0,
            proposal_size_pct: 10.0,
            atr_stop_multiplier: 1.5,
            atr_target_multiplier: 3.0,
            default_stop_loss_pct: 2.0,
            default_take_profit_pct: 4.0,
            max_spread_pct: 0.1,
            imbalance_threshold: 0.2,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            stochastic_overbought: 80.0,
            stochastic_oversold: 20.0,
            high_volatility_pct: 5.0,
            high_volatility_max_leverage: 5,
            counter_score_threshold: 2.0,
            history_capacity: 100,
        }
    }
}

/// Opening position request from the Bull or the Bear
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub role: DebateRole,
    pub side: PositionSide,
    pub leverage: u32,
    pub size_pct: f64,
    pub stop_loss_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,
    /// ATR as a percent of price
    pub volatility_pct: f64,
    pub confidence: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Challenge {
    pub role: DebateRole,
    pub action: DebateAction,
    pub confidence: f64,
    pub concerns: Vec<String>,
}

impl Challenge {
    /// How strongly the challenger's confidence weighs on the proposal.
    /// Negative for AGREE, which slightly reinforces it.
    fn weight(&self) -> f64 {
        match self.action {
            DebateAction::Agree => -0.1,
            DebateAction::CounterPropose => 0.4,
            _ => 0.2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DebateOutcome {
    pub record: DebateRecord,
    /// Present only for APPROVE and MODIFY
    pub decision: Option<TradeDecision>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DebateStats {
    pub debates: u64,
    pub holds: u64,
    pub approved: u64,
    pub modified: u64,
    pub rejected: u64,
    pub violations: HashMap<DebateRole, u32>,
}

#[derive(Debug, Default)]
struct ArbitratorState {
    history: VecDeque<DebateRecord>,
    stats: DebateStats,
}

pub struct DebateArbitrator {
    config: DebateConfig,
    state: Mutex<ArbitratorState>,
}

fn proposer_for(side: PositionSide) -> DebateRole {
    match side {
        PositionSide::Long => DebateRole::Bull,
        PositionSide::Short => DebateRole::Bear,
    }
}

fn reviewer_for(side: PositionSide) -> DebateRole {
    proposer_for(side.opposite())
}

impl DebateArbitrator {
    pub fn new(config: DebateConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ArbitratorState::default()),
        }
    }

    pub fn config(&self) -> &DebateConfig {
        &self.config
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ArbitratorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run the full debate for one verdict
    pub fn debate(&self, verdict: &SignalVerdict, current_exposure_pct: f64) -> DebateOutcome {
        let side = match verdict.direction {
            Direction::Long => PositionSide::Long,
            Direction::Short => PositionSide::Short,
            Direction::Hold => return self.record_hold(verdict),
        };

        let proposal = self.propose(verdict, side);
        let challenge = self.challenge(verdict, &proposal);
        let (decision, net_confidence, reasoning, trade) =
            self.arbitrate(&verdict.symbol, &proposal, &challenge, current_exposure_pct);

        let proposal_action = match side {
            PositionSide::Long => DebateAction::ProposeLong,
            PositionSide::Short => DebateAction::ProposeShort,
        };
        let record = DebateRecord {
            symbol: verdict.symbol.clone(),
            entries: vec![
                DebateEntry::new(
                    proposal.role,
                    proposal_action,
                    proposal.confidence,
                    proposal.reasoning.clone(),
                ),
                DebateEntry::new(
                    challenge.role,
                    challenge.action,
                    challenge.confidence,
                    if challenge.concerns.is_empty() {
                        "no objections".to_string()
                    } else {
                        challenge.concerns.join("; ")
                    },
                ),
                DebateEntry::new(
                    DebateRole::RiskManager,
                    decision.as_action(),
                    net_confidence,
                    reasoning,
                ),
            ],
            decision: Some(decision),
        };

        info!(
            symbol = %verdict.symbol,
            side = %side,
            challenge = %challenge.action,
            decision = %decision,
            confidence = net_confidence,
            "Debate concluded"
        );

        self.push_record(record.clone(), Some(decision));
        DebateOutcome {
            record,
            decision: trade,
        }
    }

    fn record_hold(&self, verdict: &SignalVerdict) -> DebateOutcome {
        let record = DebateRecord {
            symbol: verdict.symbol.clone(),
            entries: vec![DebateEntry::new(
                DebateRole::Bull,
                DebateAction::Hold,
                verdict.confidence,
                "no directional edge".to_string(),
            )],
            decision: None,
        };
        debug!(symbol = %verdict.symbol, "Verdict is HOLD, debate skipped");
        self.push_record(record.clone(), None);
        DebateOutcome {
            record,
            decision: None,
        }
    }

    fn push_record(&self, record: DebateRecord, decision: Option<RiskDecision>) {
        let mut state = self.lock();
        state.stats.debates += 1;
        match decision {
            None => state.stats.holds += 1,
            Some(RiskDecision::Approve) => state.stats.approved += 1,
            Some(RiskDecision::Modify) => state.stats.modified += 1,
            Some(RiskDecision::Reject) => state.stats.rejected += 1,
        }
        if self.config.history_capacity == 0 {
            return;
        }
        while state.history.len() >= self.config.history_capacity {
            state.history.pop_front();
        }
        state.history.push_back(record);
    }

    /// PROPOSAL stage
    pub fn propose(&self, verdict: &SignalVerdict, side: PositionSide) -> Proposal {
        let c = &self.config;
        let leverage = ((verdict.confidence * c.leverage_aggression).round() as u32).max(1);
        let atr_pct = verdict.indicators.atr_pct();
        let (stop_loss_pct, take_profit_pct) = if atr_pct > 0.0 {
            (
                Some(atr_pct * c.atr_stop_multiplier * leverage as f64),
                Some(atr_pct * c.atr_target_multiplier * leverage as f64),
            )
        } else {
            (None, None)
        };

        let mut reasoning = format!(
            "{} {} at {}x, {:.1}% of balance",
            side, verdict.symbol, leverage, c.proposal_size_pct
        );
        if !verdict.reasons.is_empty() {
            reasoning.push_str(": ");
            reasoning.push_str(&verdict.reasons.join(", "));
        }

        Proposal {
            role: proposer_for(side),
            side,
            leverage,
            size_pct: c.proposal_size_pct,
            stop_loss_pct,
            take_profit_pct,
            volatility_pct: atr_pct,
            confidence: verdict.confidence,
            reasoning,
        }
    }

    /// CHALLENGE stage, answered by the opposing role
    pub fn challenge(&self, verdict: &SignalVerdict, proposal: &Proposal) -> Challenge {
        let c = &self.config;
        let ind = &verdict.indicators;
        let mut concerns = Vec::new();

        if ind.spread_pct > c.max_spread_pct {
            concerns.push(format!("wide spread {:.3}%", ind.spread_pct));
        }

        let obi_against = match proposal.side {
            PositionSide::Long => ind.order_book_imbalance < -c.imbalance_threshold,
            PositionSide::Short => ind.order_book_imbalance > c.imbalance_threshold,
        };
        if obi_against {
            concerns.push(format!("order book leans against ({:+.2})", ind.order_book_imbalance));
        }

        let trend_against = matches!(
            (proposal.side, ind.trend),
            (PositionSide::Long, Trend::Downtrend) | (PositionSide::Short, Trend::Uptrend)
        );
        if trend_against {
            concerns.push(format!("trend is {}", ind.trend));
        }

        let rsi_against = match proposal.side {
            PositionSide::Long => ind.rsi > c.rsi_overbought,
            PositionSide::Short => ind.rsi < c.rsi_oversold,
        };
        if rsi_against {
            concerns.push(format!("RSI {:.1} stretched against the trade", ind.rsi));
        }

        let band_position = ind.bollinger_position();
        let band_against = match proposal.side {
            PositionSide::Long => band_position >= 1.0,
            PositionSide::Short => band_position <= 0.0,
        };
        if band_against {
            concerns.push(format!("price outside the Bollinger band ({:.2})", band_position));
        }

        let stochastic_against = match proposal.side {
            PositionSide::Long => ind.stochastic.k > c.stochastic_overbought,
            PositionSide::Short => ind.stochastic.k < c.stochastic_oversold,
        };
        if stochastic_against {
            concerns.push(format!("stochastic %K {:.1} stretched", ind.stochastic.k));
        }

        let opposing_score = verdict.breakdown.score_for(proposal.side.opposite());
        if opposing_score > 0.0 {
            concerns.push(format!("opposing indicators score {:.1}", opposing_score));
        }

        let action = if opposing_score >= c.counter_score_threshold && concerns.len() >= 2 {
            DebateAction::CounterPropose
        } else if !concerns.is_empty() {
            DebateAction::Challenge
        } else {
            DebateAction::Agree
        };
        let confidence = (0.5 + 0.1 * concerns.len() as f64).min(0.9);

        Challenge {
            role: reviewer_for(proposal.side),
            action,
            confidence,
            concerns,
        }
    }

    fn record_violation(&self, role: DebateRole) {
        let mut state = self.lock();
        *state.stats.violations.entry(role).or_insert(0) += 1;
    }

    /// ARBITRATION stage. Returns the decision, net confidence, reasoning
    /// and the trade when approved.
    pub fn arbitrate(
        &self,
        symbol: &str,
        proposal: &Proposal,
        challenge: &Challenge,
        current_exposure_pct: f64,
    ) -> (RiskDecision, f64, String, Option<TradeDecision>) {
        let c = &self.config;
        let mut notes = Vec::new();
        let mut modified = false;

        let mut leverage = proposal.leverage.max(1);
        if leverage > c.max_leverage {
            warn!(
                symbol,
                role = %proposal.role,
                requested = leverage,
                cap = c.max_leverage,
                "Leverage above cap"
            );
            self.record_violation(proposal.role);
            notes.push(format!("leverage {}x clamped to {}x", leverage, c.max_leverage));
            leverage = c.max_leverage;
            modified = true;
        }

        if proposal.volatility_pct > c.high_volatility_pct
            && leverage > c.high_volatility_max_leverage
        {
            warn!(
                symbol,
                volatility_pct = proposal.volatility_pct,
                leverage,
                cap = c.high_volatility_max_leverage,
                "High volatility at high leverage"
            );
            notes.push(format!(
                "volatility {:.1}% limits leverage {}x to {}x",
                proposal.volatility_pct, leverage, c.high_volatility_max_leverage
            ));
            leverage = c.high_volatility_max_leverage.max(1);
            modified = true;
        }

        let mut size_pct = if proposal.size_pct.is_finite() {
            proposal.size_pct.max(0.0)
        } else {
            0.0
        };
        if size_pct > c.max_position_size_pct {
            warn!(
                symbol,
                role = %proposal.role,
                requested = size_pct,
                cap = c.max_position_size_pct,
                "Position size above cap"
            );
            self.record_violation(proposal.role);
            notes.push(format!(
                "size {:.1}% clamped to {:.1}%",
                size_pct, c.max_position_size_pct
            ));
            size_pct = c.max_position_size_pct;
            modified = true;
        }

        let net_confidence =
            (proposal.confidence - challenge.weight() * challenge.confidence).clamp(0.0, 1.0);

        let reject = |reason: String| (RiskDecision::Reject, net_confidence, reason, None);

        if net_confidence < c.min_confidence {
            return reject(format!(
                "net confidence {:.2} below minimum {:.2}",
                net_confidence, c.min_confidence
            ));
        }
        if challenge.action == DebateAction::CounterPropose
            && challenge.confidence > proposal.confidence
        {
            return reject(format!(
                "{} counter-proposal ({:.2}) outweighs proposal ({:.2})",
                challenge.role, challenge.confidence, proposal.confidence
            ));
        }

        if matches!(
            challenge.action,
            DebateAction::Challenge | DebateAction::CounterPropose
        ) && proposal.confidence > 0.0
        {
            let ratio = (net_confidence / proposal.confidence).min(1.0);
            let scaled_leverage = ((leverage as f64 * ratio).round() as u32).max(1);
            let scaled_size = size_pct * ratio;
            if scaled_leverage != leverage || scaled_size < size_pct {
                notes.push(format!(
                    "challenge scales position to {}x / {:.1}%",
                    scaled_leverage, scaled_size
                ));
                leverage = scaled_leverage;
                size_pct = scaled_size;
                modified = true;
            }
        }

        if current_exposure_pct + size_pct > c.max_exposure_pct {
            return reject(format!(
                "exposure {:.1}% + {:.1}% exceeds ceiling {:.1}%",
                current_exposure_pct, size_pct, c.max_exposure_pct
            ));
        }

        // proposed stops are leveraged at the proposed leverage
        let rescale = leverage as f64 / proposal.leverage.max(1) as f64;
        let stop_loss_pct = proposal
            .stop_loss_pct
            .filter(|v| v.is_finite() && *v > 0.0)
            .map(|v| v * rescale)
            .unwrap_or(c.default_stop_loss_pct);
        let take_profit_pct = proposal
            .take_profit_pct
            .filter(|v| v.is_finite() && *v > 0.0)
            .map(|v| v * rescale)
            .unwrap_or(c.default_take_profit_pct);

        let decision = if modified {
            RiskDecision::Modify
        } else {
            RiskDecision::Approve
        };
        let reasoning = if notes.is_empty() {
            format!("within limits, SL {:.2}% / TP {:.2}%", stop_loss_pct, take_profit_pct)
        } else {
            format!(
                "{}; SL {:.2}% / TP {:.2}%",
                notes.join("; "),
                stop_loss_pct,
                take_profit_pct
            )
        };

        let trade = TradeDecision {
            approved: true,
            symbol: symbol.to_string(),
            direction: proposal.side,
            leverage,
            size_pct,
            stop_loss_pct,
            take_profit_pct,
            confidence: net_confidence,
            decision,
            reasoning: reasoning.clone(),
        };
        (decision, net_confidence, reasoning, Some(trade))
    }

    pub fn history(&self) -> Vec<DebateRecord> {
        self.lock().history.iter().cloned().collect()
    }

    pub fn stats(&self) -> DebateStats {
        self.lock().stats.clone()
    }

    pub fn violations(&self, role: DebateRole) -> u32 {
        self.lock().stats.violations.get(&role).copied().unwrap_or(0)
    }

    pub fn reset_violations(&self) {
        self.lock().stats.violations.clear();
    }
}

impl Default for DebateArbitrator {
    fn default() -> Self {
        Self::new(DebateConfig::default())
    }
}
