pub mod compliance_logger;
pub mod exchange_gateway;
