//! Session risk metrics
//!
//! Historical VaR, max drawdown and Sharpe over closed trades, plus a
//! coarse risk level for the exposure currently committed.

use crate::domain::services::position_manager::ClosedTrade;
use serde::Serialize;

/// Fewer returns than this give no VaR or Sharpe figure
pub const MIN_RETURN_SAMPLES: usize = 10;

/// Percentile with linear interpolation between the closest ranks
fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64))
}

/// Historical value at risk: the loss not exceeded with `confidence`,
/// scaled by the square root of `horizon` periods. Same unit as `returns`.
pub fn value_at_risk(returns: &[f64], confidence: f64, horizon: u32) -> Option<f64> {
    if returns.len() < MIN_RETURN_SAMPLES {
        return None;
    }
    let cutoff = percentile(returns, (1.0 - confidence) * 100.0)?;
    Some((-cutoff).max(0.0) * (horizon.max(1) as f64).sqrt())
}

/// Largest peak-to-trough fall of the equity curve, in percent of the peak
pub fn max_drawdown_pct(equity: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst: f64 = 0.0;
    for &value in equity {
        peak = peak.max(value);
        if peak > 0.0 {
            worst = worst.max((peak - value) / peak * 100.0);
        }
    }
    worst
}

/// Mean excess return over its population standard deviation, per period
pub fn sharpe_ratio(returns: &[f64], risk_free: f64) -> Option<f64> {
    if returns.len() < MIN_RETURN_SAMPLES {
        return None;
    }
    let n = returns.len() as f64;
    let excess: Vec<f64> = returns.iter().map(|r| r - risk_free).collect();
    let mean = excess.iter().sum::<f64>() / n;
    let std = (excess.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt();
    if std <= f64::EPSILON {
        return Some(0.0);
    }
    Some(mean / std)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExposureRisk {
    /// Committed margin, percent of balance
    pub exposure_pct: f64,
    /// Leverage weighted by committed margin
    pub weighted_leverage: f64,
    pub level: RiskLevel,
}

impl ExposureRisk {
    /// `commitments` holds `(size_pct, leverage)` per open or stranded position
    pub fn assess(commitments: &[(f64, u32)]) -> Self {
        let exposure_pct: f64 = commitments.iter().map(|(size, _)| size).sum();
        let weighted_leverage = if exposure_pct > 0.0 {
            commitments
                .iter()
                .map(|(size, leverage)| size * *leverage as f64)
                .sum::<f64>()
                / exposure_pct
        } else {
            0.0
        };

        let level = if exposure_pct > 80.0 || weighted_leverage > 15.0 {
            RiskLevel::Critical
        } else if exposure_pct > 50.0 || weighted_leverage > 10.0 {
            RiskLevel::High
        } else if exposure_pct > 30.0 || weighted_leverage > 5.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        Self {
            exposure_pct,
            weighted_leverage,
            level,
        }
    }
}

/// Closed-trade statistics for one session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RiskReport {
    pub trades: usize,
    pub win_rate: f64,
    /// Drawdown of realized equity from the session's opening balance
    pub max_drawdown_pct: f64,
    /// Per-trade Sharpe on leveraged returns
    pub sharpe_ratio: Option<f64>,
    /// 95% one-trade VaR, in leveraged percent of margin
    pub value_at_risk_95: Option<f64>,
}

impl RiskReport {
    pub fn from_trades(opening_balance: f64, trades: &[ClosedTrade]) -> Self {
        if trades.is_empty() {
            return Self::default();
        }

        let returns: Vec<f64> = trades.iter().map(|t| t.leveraged_pnl.value()).collect();
        let mut equity = Vec::with_capacity(trades.len() + 1);
        equity.push(opening_balance);
        let mut balance = opening_balance;
        for trade in trades {
            balance += trade.realized_pnl;
            equity.push(balance);
        }
        let wins = trades.iter().filter(|t| t.realized_pnl >= 0.0).count();

        Self {
            trades: trades.len(),
            win_rate: wins as f64 / trades.len() as f64,
            max_drawdown_pct: max_drawdown_pct(&equity),
            sharpe_ratio: sharpe_ratio(&returns, 0.0),
            value_at_risk_95: value_at_risk(&returns, 0.95, 1),
        }
    }
}
