use crate::domain::value_objects::{price::Price, quantity::Quantity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// +1 for long, -1 for short
    pub fn sign(&self) -> f64 {
        match self {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }

    pub fn opposite(&self) -> PositionSide {
        match self {
            PositionSide::Long => PositionSide::Short,
            PositionSide::Short => PositionSide::Long,
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionSide::Long => write!(f, "LONG"),
            PositionSide::Short => write!(f, "SHORT"),
        }
    }
}

/// Lifecycle stage of a managed position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionState {
    Entering,
    Open,
    Exiting,
    Closed,
    EntryFailed,
}

impl std::fmt::Display for PositionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionState::Entering => write!(f, "ENTERING"),
            PositionState::Open => write!(f, "OPEN"),
            PositionState::Exiting => write!(f, "EXITING"),
            PositionState::Closed => write!(f, "CLOSED"),
            PositionState::EntryFailed => write!(f, "ENTRY_FAILED"),
        }
    }
}

/// An open futures position.
///
/// Owned by exactly one position task for its whole life; nothing else
/// mutates it once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: Price,
    pub size: Quantity,
    pub leverage: u32,
    pub opened_at: DateTime<Utc>,
    pub entry_order_id: String,
    pub highest_leveraged_pnl_seen: f64,
    pub trailing_active: bool,
}

impl Position {
    pub fn open(
        symbol: &str,
        side: PositionSide,
        entry_price: Price,
        size: Quantity,
        leverage: u32,
        entry_order_id: String,
    ) -> Self {
        let opened_at = Utc::now();
        Position {
            id: format!("pos_{}_{}", symbol, opened_at.timestamp_millis()),
            symbol: symbol.to_string(),
            side,
            entry_price,
            size,
            leverage: leverage.max(1),
            opened_at,
            entry_order_id,
            highest_leveraged_pnl_seen: 0.0,
            trailing_active: false,
        }
    }

    /// Unrealized P&L in percent of entry, signed by direction
    pub fn pnl_pct(&self, price: Price) -> f64 {
        self.entry_price.pct_change_to(price) * self.side.sign()
    }

    /// P&L in percent of posted margin
    pub fn leveraged_pnl_pct(&self, price: Price) -> f64 {
        self.pnl_pct(price) * self.leverage as f64
    }

    /// Tracks the best leveraged P&L observed since entry
    pub fn record_mark(&mut self, leveraged_pnl: f64) {
        if leveraged_pnl > self.highest_leveraged_pnl_seen {
            self.highest_leveraged_pnl_seen = leveraged_pnl;
        }
    }
}
