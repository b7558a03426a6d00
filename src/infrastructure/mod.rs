pub mod paper_exchange;
pub mod tracing_compliance_logger;
