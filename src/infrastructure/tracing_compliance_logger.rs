use crate::domain::errors::ComplianceError;
use crate::domain::repositories::compliance_logger::{ComplianceEntry, ComplianceLogger};
use async_trait::async_trait;
use tracing::info;

/// Writes compliance records as JSON on the `compliance` tracing target.
///
/// Used when no remote audit endpoint is configured; route the target to a
/// file with the subscriber filter to keep an audit trail.
#[derive(Debug, Default, Clone)]
pub struct TracingComplianceLogger;

impl TracingComplianceLogger {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ComplianceLogger for TracingComplianceLogger {
    async fn upload(&self, entry: ComplianceEntry) -> Result<(), ComplianceError> {
        let record = serde_json::to_string(&entry)
            .map_err(|e| ComplianceError::Serialization(e.to_string()))?;
        info!(
            target: "compliance",
            stage = %entry.stage,
            order_id = entry.order_id.as_deref().unwrap_or("-"),
            record = %record,
            "Compliance record"
        );
        Ok(())
    }
}
