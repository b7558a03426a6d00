use crate::domain::entities::position::PositionSide;
use crate::domain::services::indicators::Indicators;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
    Hold,
}

impl Direction {
    /// Position side to open, None for HOLD
    pub fn side(&self) -> Option<PositionSide> {
        match self {
            Direction::Long => Some(PositionSide::Long),
            Direction::Short => Some(PositionSide::Short),
            Direction::Hold => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
            Direction::Hold => write!(f, "HOLD"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub long_score: f64,
    pub short_score: f64,
    pub max_possible: f64,
}

impl ScoreBreakdown {
    /// Score of the given side
    pub fn score_for(&self, side: PositionSide) -> f64 {
        match side {
            PositionSide::Long => self.long_score,
            PositionSide::Short => self.short_score,
        }
    }
}

/// Scored direction for one symbol in one scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalVerdict {
    pub symbol: String,
    pub direction: Direction,
    pub confidence: f64,
    pub breakdown: ScoreBreakdown,
    pub reasons: Vec<String>,
    pub indicators: Indicators,
}

impl SignalVerdict {
    pub fn is_actionable(&self) -> bool {
        self.direction != Direction::Hold
    }

    pub fn summary(&self) -> String {
        format!(
            "{} {} conf={:.2} (long {:.1} / short {:.1} of {:.1})",
            self.symbol,
            self.direction,
            self.confidence,
            self.breakdown.long_score,
            self.breakdown.short_score,
            self.breakdown.max_possible
        )
    }
}
