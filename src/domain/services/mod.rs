pub mod debate;
pub mod indicators;
pub mod portfolio_state;
pub mod position_manager;
pub mod risk_metrics;
pub mod signal_scorer;
