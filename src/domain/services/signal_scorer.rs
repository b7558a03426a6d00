use crate::domain::entities::signal::{Direction, ScoreBreakdown, SignalVerdict};
use crate::domain::services::indicators::{Indicators, Trend};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Rule table for the additive long/short score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub rsi_extreme_low: f64,
    pub rsi_zone_low: f64,
    pub rsi_zone_high: f64,
    pub rsi_extreme_high: f64,
    pub rsi_extreme_points: f64,
    pub rsi_zone_points: f64,

    pub macd_points: f64,
    pub macd_alignment_points: f64,

    pub momentum_threshold_pct: f64,
    pub momentum_points: f64,

    pub volume_ratio_threshold: f64,
    pub volume_points: f64,

    pub imbalance_threshold: f64,
    pub imbalance_points: f64,

    /// Subtracted from the side aligned with a local trend that fights the
    /// higher-timeframe trend
    pub trend_penalty: f64,

    pub min_signal_score: f64,
    pub confidence_base: f64,
    pub confidence_range: f64,
    pub confidence_ceiling: f64,
    pub hold_confidence: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self::aggressive()
    }
}

impl ScoringWeights {
    /// Wide RSI zones and a low entry bar
    pub fn aggressive() -> Self {
        Self {
            rsi_extreme_low: 25.0,
            rsi_zone_low: 45.0,
            rsi_zone_high: 60.0,
            rsi_extreme_high: 80.0,
            rsi_extreme_points: 3.0,
            rsi_zone_points: 2.0,
            macd_points: 1.0,
            macd_alignment_points: 1.0,
            momentum_threshold_pct: 0.5,
            momentum_points: 1.0,
            volume_ratio_threshold: 1.2,
            volume_points: 1.0,
            imbalance_threshold: 0.2,
            imbalance_points: 1.0,
            trend_penalty: 2.0,
            min_signal_score: 2.0,
            confidence_base: 0.55,
            confidence_range: 0.35,
            confidence_ceiling: 0.90,
            hold_confidence: 0.40,
        }
    }

    /// Classic 30/70 RSI bands and a stricter entry bar
    pub fn conservative() -> Self {
        Self {
            rsi_extreme_low: 30.0,
            rsi_zone_low: 40.0,
            rsi_zone_high: 60.0,
            rsi_extreme_high: 70.0,
            rsi_extreme_points: 2.0,
            rsi_zone_points: 1.0,
            macd_points: 1.0,
            macd_alignment_points: 1.0,
            momentum_threshold_pct: 0.3,
            momentum_points: 1.0,
            volume_ratio_threshold: 1.5,
            volume_points: 1.0,
            imbalance_threshold: 0.2,
            imbalance_points: 1.0,
            trend_penalty: 2.0,
            min_signal_score: 3.0,
            confidence_base: 0.50,
            confidence_range: 0.40,
            confidence_ceiling: 0.85,
            hold_confidence: 0.40,
        }
    }

    /// Best score a single side can collect
    pub fn max_possible_score(&self) -> f64 {
        self.rsi_extreme_points.max(self.rsi_zone_points)
            + self.macd_points
            + self.macd_alignment_points
            + self.momentum_points
            + self.volume_points
            + self.imbalance_points
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringProfile {
    Aggressive,
    Conservative,
}

impl ScoringProfile {
    pub fn weights(&self) -> ScoringWeights {
        match self {
            ScoringProfile::Aggressive => ScoringWeights::aggressive(),
            ScoringProfile::Conservative => ScoringWeights::conservative(),
        }
    }
}

impl FromStr for ScoringProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "aggressive" => Ok(ScoringProfile::Aggressive),
            "conservative" => Ok(ScoringProfile::Conservative),
            other => Err(format!("unknown scoring profile '{}'", other)),
        }
    }
}

/// Turns an indicator snapshot into a directional verdict
#[derive(Debug, Clone, Default)]
pub struct SignalScorer {
    weights: ScoringWeights,
}

impl SignalScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn score(
        &self,
        symbol: &str,
        indicators: &Indicators,
        reference_trend: Option<Trend>,
    ) -> SignalVerdict {
        let w = &self.weights;
        let mut long = 0.0;
        let mut short = 0.0;
        let mut reasons = Vec::new();

        let rsi = indicators.rsi;
        if rsi < w.rsi_extreme_low {
            long += w.rsi_extreme_points;
            reasons.push(format!("RSI {:.1} deeply oversold", rsi));
        } else if rsi < w.rsi_zone_low {
            long += w.rsi_zone_points;
            reasons.push(format!("RSI {:.1} in buy zone", rsi));
        } else if rsi > w.rsi_extreme_high {
            short += w.rsi_extreme_points;
            reasons.push(format!("RSI {:.1} deeply overbought", rsi));
        } else if rsi > w.rsi_zone_high {
            short += w.rsi_zone_points;
            reasons.push(format!("RSI {:.1} in sell zone", rsi));
        }

        let hist = indicators.macd_histogram;
        let line = indicators.macd_line;
        if hist > 0.0 {
            long += w.macd_points;
            reasons.push("MACD histogram positive".to_string());
            if line > 0.0 {
                long += w.macd_alignment_points;
                reasons.push("MACD line confirms".to_string());
            }
        } else if hist < 0.0 {
            short += w.macd_points;
            reasons.push("MACD histogram negative".to_string());
            if line < 0.0 {
                short += w.macd_alignment_points;
                reasons.push("MACD line confirms".to_string());
            }
        }

        let momentum = indicators.momentum_pct;
        if momentum > w.momentum_threshold_pct {
            long += w.momentum_points;
            reasons.push(format!("momentum {:+.2}%", momentum));
        } else if momentum < -w.momentum_threshold_pct {
            short += w.momentum_points;
            reasons.push(format!("momentum {:+.2}%", momentum));
        }

        // Volume only confirms whichever side already leads
        if indicators.volume_ratio > w.volume_ratio_threshold {
            if long > short {
                long += w.volume_points;
                reasons.push(format!("volume {:.2}x confirms long", indicators.volume_ratio));
            } else if short > long {
                short += w.volume_points;
                reasons.push(format!("volume {:.2}x confirms short", indicators.volume_ratio));
            }
        }

        let obi = indicators.order_book_imbalance;
        if obi > w.imbalance_threshold {
            long += w.imbalance_points;
            reasons.push(format!("bid-heavy book ({:+.2})", obi));
        } else if obi < -w.imbalance_threshold {
            short += w.imbalance_points;
            reasons.push(format!("ask-heavy book ({:+.2})", obi));
        }

        if let Some(reference) = reference_trend {
            match (indicators.trend, reference) {
                (Trend::Uptrend, Trend::Downtrend) => {
                    long = (long - w.trend_penalty).max(0.0);
                    reasons.push("local uptrend against higher-timeframe downtrend".to_string());
                }
                (Trend::Downtrend, Trend::Uptrend) => {
                    short = (short - w.trend_penalty).max(0.0);
                    reasons.push("local downtrend against higher-timeframe uptrend".to_string());
                }
                _ => {}
            }
        }

        let max_possible = w.max_possible_score();
        let (direction, winning) = if long > short && long >= w.min_signal_score {
            (Direction::Long, long)
        } else if short > long && short >= w.min_signal_score {
            (Direction::Short, short)
        } else {
            (Direction::Hold, 0.0)
        };

        let confidence = match direction {
            Direction::Hold => w.hold_confidence,
            _ if max_possible > 0.0 => (w.confidence_base + winning / max_possible * w.confidence_range)
                .min(w.confidence_ceiling),
            _ => w.confidence_base.min(w.confidence_ceiling),
        }
        .clamp(0.0, 1.0);

        SignalVerdict {
            symbol: symbol.to_string(),
            direction,
            confidence,
            breakdown: ScoreBreakdown {
                long_score: long,
                short_score: short,
                max_possible,
            },
            reasons,
            indicators: indicators.clone(),
        }
    }
}
