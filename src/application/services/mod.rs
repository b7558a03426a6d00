pub mod portfolio_scheduler;
