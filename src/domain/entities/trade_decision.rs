use crate::domain::entities::debate::RiskDecision;
use crate::domain::entities::position::PositionSide;
use serde::{Deserialize, Serialize};

/// Risk-bounded trade produced by an APPROVE or MODIFY arbitration.
///
/// Leverage and size are already clamped to the hard caps, and the
/// stop-loss / take-profit are always populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeDecision {
    pub approved: bool,
    pub symbol: String,
    pub direction: PositionSide,
    pub leverage: u32,
    pub size_pct: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    /// Net confidence after the challenge, used for ranking
    pub confidence: f64,
    pub decision: RiskDecision,
    pub reasoning: String,
}

impl TradeDecision {
    /// Margin to commit for a given account balance
    pub fn margin_for(&self, balance: f64) -> f64 {
        balance * self.size_pct / 100.0
    }

    /// Contract quantity for this decision at the given entry price
    pub fn quantity_at(&self, balance: f64, price: f64) -> f64 {
        if price <= 0.0 {
            return 0.0;
        }
        self.margin_for(balance) * self.leverage as f64 / price
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision() -> TradeDecision {
        TradeDecision {
            approved: true,
            symbol: "cmt_solusdt".to_string(),
            direction: PositionSide::Long,
            leverage: 10,
            size_pct: 20.0,
            stop_loss_pct: 2.0,
            take_profit_pct: 4.0,
            confidence: 0.75,
            decision: RiskDecision::Approve,
            reasoning: String::new(),
        }
    }

    #[test]
    fn test_margin_and_quantity() {
        let decision = decision();
        assert_eq!(decision.margin_for(1000.0), 200.0);
        assert_eq!(decision.quantity_at(1000.0, 50.0), 40.0);
        assert_eq!(decision.quantity_at(1000.0, 0.0), 0.0);
    }
}
