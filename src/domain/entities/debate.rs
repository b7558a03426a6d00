use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebateRole {
    Bull,
    Bear,
    RiskManager,
}

impl std::fmt::Display for DebateRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DebateRole::Bull => write!(f, "BULL"),
            DebateRole::Bear => write!(f, "BEAR"),
            DebateRole::RiskManager => write!(f, "RISK_MANAGER"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebateAction {
    ProposeLong,
    ProposeShort,
    Hold,
    Challenge,
    Agree,
    CounterPropose,
    Approve,
    Modify,
    Reject,
}

impl std::fmt::Display for DebateAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DebateAction::ProposeLong => "PROPOSE_LONG",
            DebateAction::ProposeShort => "PROPOSE_SHORT",
            DebateAction::Hold => "HOLD",
            DebateAction::Challenge => "CHALLENGE",
            DebateAction::Agree => "AGREE",
            DebateAction::CounterPropose => "COUNTER_PROPOSE",
            DebateAction::Approve => "APPROVE",
            DebateAction::Modify => "MODIFY",
            DebateAction::Reject => "REJECT",
        };
        write!(f, "{}", name)
    }
}

/// Terminal verdict of the risk manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskDecision {
    Approve,
    Modify,
    Reject,
}

impl RiskDecision {
    pub fn is_approved(&self) -> bool {
        !matches!(self, RiskDecision::Reject)
    }

    pub fn as_action(&self) -> DebateAction {
        match self {
            RiskDecision::Approve => DebateAction::Approve,
            RiskDecision::Modify => DebateAction::Modify,
            RiskDecision::Reject => DebateAction::Reject,
        }
    }
}

impl std::fmt::Display for RiskDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_action().fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateEntry {
    pub role: DebateRole,
    pub action: DebateAction,
    pub confidence: f64,
    pub reasoning: String,
    pub timestamp: DateTime<Utc>,
}

impl DebateEntry {
    pub fn new(role: DebateRole, action: DebateAction, confidence: f64, reasoning: String) -> Self {
        DebateEntry {
            role,
            action,
            confidence: confidence.clamp(0.0, 1.0),
            reasoning,
            timestamp: Utc::now(),
        }
    }
}

/// Transcript of one debate. `decision` is None when the verdict was HOLD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateRecord {
    pub symbol: String,
    pub entries: Vec<DebateEntry>,
    pub decision: Option<RiskDecision>,
}

impl DebateRecord {
    pub fn entry_for(&self, role: DebateRole) -> Option<&DebateEntry> {
        self.entries.iter().find(|entry| entry.role == role)
    }

    /// One line per entry, used as the compliance explanation
    pub fn transcript(&self) -> String {
        self.entries
            .iter()
            .map(|entry| {
                format!(
                    "[{}] {} ({:.2}): {}",
                    entry.role, entry.action, entry.confidence, entry.reasoning
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
