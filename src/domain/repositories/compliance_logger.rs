//! Compliance log sink
//!
//! Every entry and every close produces one record describing the reasoning
//! behind the order. Upload failures never block trading; callers log them
//! as warnings and carry on.

use crate::domain::errors::ComplianceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MAX_EXPLANATION_CHARS: usize = 1000;

/// Trading stage a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComplianceStage {
    #[serde(rename = "Decision Making")]
    DecisionMaking,
    #[serde(rename = "Order Execution")]
    OrderExecution,
    #[serde(rename = "Position Close")]
    PositionClose,
}

impl std::fmt::Display for ComplianceStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComplianceStage::DecisionMaking => write!(f, "Decision Making"),
            ComplianceStage::OrderExecution => write!(f, "Order Execution"),
            ComplianceStage::PositionClose => write!(f, "Position Close"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceEntry {
    pub stage: ComplianceStage,
    pub model: String,
    pub input: Value,
    pub output: Value,
    pub explanation: String,
    pub order_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ComplianceEntry {
    pub fn new(
        stage: ComplianceStage,
        model: &str,
        input: Value,
        output: Value,
        explanation: &str,
        order_id: Option<String>,
    ) -> Self {
        Self {
            stage,
            model: model.to_string(),
            input,
            output,
            explanation: truncate_explanation(explanation),
            order_id,
            timestamp: Utc::now(),
        }
    }
}

/// Cap an explanation at 1000 characters, marking the cut with "..."
pub fn truncate_explanation(explanation: &str) -> String {
    if explanation.chars().count() <= MAX_EXPLANATION_CHARS {
        return explanation.to_string();
    }
    let mut truncated: String = explanation.chars().take(MAX_EXPLANATION_CHARS - 3).collect();
    truncated.push_str("...");
    truncated
}

#[async_trait]
pub trait ComplianceLogger: Send + Sync {
    async fn upload(&self, entry: ComplianceEntry) -> Result<(), ComplianceError>;
}
