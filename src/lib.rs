//! Consensus Trader Library
//!
//! Core components of the consensus futures trader: indicators, signal
//! scoring, the bull/bear/risk-manager debate, per-position lifecycle tasks
//! and the portfolio scheduler that ties them together.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod rate_limit;
pub mod retry;
