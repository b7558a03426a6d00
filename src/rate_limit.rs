use crate::domain::entities::order::{OrderAck, OrderRequest};
use crate::domain::entities::order_book::OrderBookSnapshot;
use crate::domain::errors::ConfigError;
use crate::domain::repositories::exchange_gateway::{Balance, ExchangeGateway, ExchangeResult};
use crate::domain::services::indicators::Candle;
use crate::domain::value_objects::price::Price;
use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum exchange requests per minute
    pub requests_per_minute: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 100,
        }
    }
}

/// Process-wide limiter shared by every gateway call
pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

pub fn create_rate_limiter(config: &RateLimiterConfig) -> Result<GlobalRateLimiter, ConfigError> {
    let per_minute =
        NonZeroU32::new(config.requests_per_minute).ok_or_else(|| ConfigError::InvalidValue {
            field: "RATE_LIMIT_PER_MINUTE",
            reason: "must be non-zero".to_string(),
        })?;
    Ok(Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))))
}

/// Gateway decorator that waits for a permit before each exchange call
pub struct RateLimitedGateway {
    inner: Arc<dyn ExchangeGateway>,
    limiter: GlobalRateLimiter,
}

impl RateLimitedGateway {
    pub fn new(inner: Arc<dyn ExchangeGateway>, limiter: GlobalRateLimiter) -> Self {
        Self { inner, limiter }
    }

    async fn permit(&self) {
        if self.limiter.check().is_err() {
            tracing::debug!(exchange = self.inner.name(), "Rate limit reached, waiting");
            self.limiter.until_ready().await;
        }
    }
}

#[async_trait]
impl ExchangeGateway for RateLimitedGateway {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> ExchangeResult<Vec<Candle>> {
        self.permit().await;
        self.inner.get_candles(symbol, interval, limit).await
    }

    async fn get_order_book(&self, symbol: &str, depth: usize) -> ExchangeResult<OrderBookSnapshot> {
        self.permit().await;
        self.inner.get_order_book(symbol, depth).await
    }

    async fn get_ticker(&self, symbol: &str) -> ExchangeResult<Price> {
        self.permit().await;
        self.inner.get_ticker(symbol).await
    }

    async fn place_order(&self, order: &OrderRequest) -> ExchangeResult<OrderAck> {
        self.permit().await;
        self.inner.place_order(order).await
    }

    async fn get_balance(&self) -> ExchangeResult<Balance> {
        self.permit().await;
        self.inner.get_balance().await
    }

    async fn is_healthy(&self) -> bool {
        self.inner.is_healthy().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::paper_exchange::{PaperExchange, PaperExchangeConfig};

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = create_rate_limiter(&RateLimiterConfig {
            requests_per_minute: 50,
        })
        .unwrap();
        assert!(limiter.check().is_ok());
    }

    #[test]
    fn test_zero_rate_is_config_error() {
        let result = create_rate_limiter(&RateLimiterConfig {
            requests_per_minute: 0,
        });
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "RATE_LIMIT_PER_MINUTE", .. })
        ));
    }

    #[test]
    fn test_default_config() {
        assert_eq!(RateLimiterConfig::default().requests_per_minute, 100);
    }

    #[tokio::test]
    async fn test_decorator_forwards_calls() {
        let paper: Arc<dyn ExchangeGateway> =
            Arc::new(PaperExchange::new(PaperExchangeConfig::default()));
        let limiter = create_rate_limiter(&RateLimiterConfig::default()).unwrap();
        let gateway = RateLimitedGateway::new(paper, limiter);

        assert_eq!(gateway.name(), "Paper");
        let balance = gateway.get_balance().await.unwrap();
        assert_eq!(balance.total, 1_000.0);
        let candles = gateway.get_candles("cmt_btcusdt", "1m", 20).await.unwrap();
        assert_eq!(candles.len(), 20);
    }
}
