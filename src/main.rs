use consensus_trader::application::services::portfolio_scheduler::PortfolioScheduler;
use consensus_trader::config::TradingConfig;
use consensus_trader::domain::repositories::compliance_logger::ComplianceLogger;
use consensus_trader::domain::repositories::exchange_gateway::ExchangeGateway;
use consensus_trader::domain::services::debate::DebateArbitrator;
use consensus_trader::domain::services::indicators::IndicatorEngine;
use consensus_trader::domain::services::portfolio_state::PortfolioState;
use consensus_trader::domain::services::position_manager::PositionManager;
use consensus_trader::domain::services::signal_scorer::SignalScorer;
use consensus_trader::infrastructure::paper_exchange::{PaperExchange, PaperExchangeConfig};
use consensus_trader::infrastructure::tracing_compliance_logger::TracingComplianceLogger;
use consensus_trader::rate_limit::{create_rate_limiter, RateLimitedGateway};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "consensus_trader=info,compliance=info,alert=error".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = TradingConfig::from_env();
    config.validate()?;
    info!(
        symbols = ?config.symbols,
        profile = ?config.scoring_profile,
        max_leverage = config.max_leverage,
        max_positions = config.max_concurrent_positions,
        "Consensus trader starting"
    );

    let paper = PaperExchange::new(PaperExchangeConfig {
        starting_balance: config.paper_starting_balance,
        seed: config.paper_seed,
        ..PaperExchangeConfig::default()
    });
    for symbol in &config.symbols {
        if !PaperExchangeConfig::default().initial_prices.contains_key(symbol) {
            paper.set_price(symbol, 100.0).await;
        }
    }
    let limiter = create_rate_limiter(&config.rate_limiter_config())?;
    let gateway: Arc<dyn ExchangeGateway> = Arc::new(RateLimitedGateway::new(Arc::new(paper), limiter));
    let compliance: Arc<dyn ComplianceLogger> = Arc::new(TracingComplianceLogger::new());
    info!(exchange = gateway.name(), "Exchange gateway ready");

    let portfolio = Arc::new(PortfolioState::new());
    let arbitrator = Arc::new(DebateArbitrator::new(config.debate_config()));
    let positions = Arc::new(PositionManager::new(
        Arc::clone(&gateway),
        compliance,
        Arc::clone(&portfolio),
        config.position_config(),
    ));
    let mut scheduler = PortfolioScheduler::new(
        gateway,
        IndicatorEngine::default(),
        SignalScorer::new(config.scoring_weights()),
        arbitrator,
        positions,
        portfolio,
        config.scheduler_config(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Stopping new entries, open positions will run to completion");
        if shutdown_tx.send(true).is_err() {
            error!("Scheduler already stopped");
        }
    });

    let summary = scheduler.run(shutdown_rx).await;
    match serde_json::to_string_pretty(&summary) {
        Ok(json) => info!("Final session summary:\n{}", json),
        Err(e) => error!("Failed to serialize session summary: {}", e),
    }

    info!("Consensus trader stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C signal"),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
