//! Guarded marketplace client
//!
//! Wraps any [`MarketApi`] implementation with the rate limiter and the
//! circuit breaker. Every call follows the same shape: check the breaker,
//! win a limiter slot (sleeping out retry-after signals), perform the call,
//! then report the outcome back to the breaker. A 429 from the API is a
//! quota signal, not an API health failure, so it never trips the breaker.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::alert::{Alert, Notifier};
use crate::common::errors::{EngineError, Result};
use crate::common::traits::MarketApi;
use crate::common::types::{
    BuyOutcome, EditOutcome, InventoryItem, ListOutcome, ListRequest, Listing, PriceUpdate, Sale,
};
use crate::guard::circuit::CircuitBreaker;
use crate::guard::rate::{Admission, RateLimiter};

/// Rate-limited, circuit-broken facade over the raw API client
pub struct GuardedClient {
    inner: Arc<dyn MarketApi>,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    notifier: Arc<dyn Notifier>,
}

impl GuardedClient {
    pub fn new(
        inner: Arc<dyn MarketApi>,
        limiter: Arc<RateLimiter>,
        breaker: Arc<CircuitBreaker>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            inner,
            limiter,
            breaker,
            notifier,
        }
    }

    /// Clear the breaker and win a limiter slot before a request.
    ///
    /// The limiter only signals how long to wait; sleeping is this caller's
    /// job, which keeps the limiter itself non-blocking.
    async fn admit(&self) -> Result<()> {
        self.breaker.check()?;
        loop {
            match self.limiter.try_acquire() {
                Admission::Granted { delay } => {
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                    return Ok(());
                }
                Admission::Exhausted { retry_after } => {
                    debug!(?retry_after, "request quota exhausted, waiting");
                    sleep(retry_after).await;
                }
            }
        }
    }

    /// Report a call outcome to the breaker and emit alerts
    async fn settle<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(EngineError::RateLimited { retry_after }) => {
                warn!(operation, ?retry_after, "API rate limited the request");
            }
            Err(error) => {
                self.notifier
                    .notify(&Alert::ApiError {
                        operation: operation.to_string(),
                        message: error.to_string(),
                    })
                    .await;
                if self.breaker.record_failure() {
                    self.notifier
                        .notify(&Alert::CircuitOpen {
                            failure_count: self.breaker.failure_count(),
                            opened_at: self.breaker.opened_at().unwrap_or_else(Utc::now),
                        })
                        .await;
                }
            }
        }
        result
    }
}

#[async_trait]
impl MarketApi for GuardedClient {
    async fn get_balance(&self) -> Result<Decimal> {
        self.admit().await?;
        let result = self.inner.get_balance().await;
        self.settle("get_balance", result).await
    }

    async fn search(&self, item_name: &str) -> Result<Vec<Listing>> {
        self.admit().await?;
        let result = self.inner.search(item_name).await;
        self.settle("search", result).await
    }

    async fn buy_items(&self, listing_ids: &[String]) -> Result<BuyOutcome> {
        self.admit().await?;
        let result = self.inner.buy_items(listing_ids).await;
        self.settle("buy_items", result).await
    }

    async fn list_items(&self, requests: &[ListRequest]) -> Result<ListOutcome> {
        self.admit().await?;
        let result = self.inner.list_items(requests).await;
        self.settle("list_items", result).await
    }

    async fn edit_price(&self, updates: &[PriceUpdate]) -> Result<EditOutcome> {
        self.admit().await?;
        let result = self.inner.edit_price(updates).await;
        self.settle("edit_price", result).await
    }

    async fn get_inventory(&self) -> Result<Vec<InventoryItem>> {
        self.admit().await?;
        let result = self.inner.get_inventory().await;
        self.settle("get_inventory", result).await
    }

    async fn get_sales_history(&self, item_name: &str) -> Result<Vec<Sale>> {
        self.admit().await?;
        let result = self.inner.get_sales_history(item_name).await;
        self.settle("get_sales_history", result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::LogNotifier;
    use crate::common::traits::MockMarketApi;
    use crate::config::types::{CircuitConfig, RateLimitConfig};
    use crate::guard::circuit::CircuitState;
    use rust_decimal_macros::dec;

    fn guarded(api: MockMarketApi, breaker: Arc<CircuitBreaker>) -> GuardedClient {
        GuardedClient::new(
            Arc::new(api),
            Arc::new(RateLimiter::new(RateLimitConfig {
                window_seconds: 60,
                max_requests: 1000,
                min_interval_ms: 0,
            })),
            breaker,
            Arc::new(LogNotifier),
        )
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let mut api = MockMarketApi::new();
        api.expect_get_balance().returning(|| Ok(dec!(250.00)));
        let breaker = Arc::new(CircuitBreaker::with_defaults());
        let client = guarded(api, Arc::clone(&breaker));

        assert_eq!(client.get_balance().await.unwrap(), dec!(250.00));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_failures_trip_the_breaker_and_block_calls() {
        let mut api = MockMarketApi::new();
        api.expect_get_balance().returning(|| {
            Err(EngineError::Api {
                status: 502,
                message: "bad gateway".to_string(),
            })
        });
        let breaker = Arc::new(CircuitBreaker::new(CircuitConfig {
            failure_threshold: 3,
            recovery_timeout_seconds: 300,
        }));
        let client = guarded(api, Arc::clone(&breaker));

        for _ in 0..3 {
            assert!(client.get_balance().await.is_err());
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        // The next call is rejected without reaching the API
        let err = client.get_balance().await.unwrap_err();
        assert!(matches!(err, EngineError::CircuitOpen { .. }));
    }

    #[tokio::test]
    async fn test_rate_limited_response_does_not_trip_breaker() {
        let mut api = MockMarketApi::new();
        api.expect_get_balance().returning(|| {
            Err(EngineError::RateLimited {
                retry_after: Some(std::time::Duration::from_secs(3)),
            })
        });
        let breaker = Arc::new(CircuitBreaker::new(CircuitConfig {
            failure_threshold: 1,
            recovery_timeout_seconds: 300,
        }));
        let client = guarded(api, Arc::clone(&breaker));

        assert!(client.get_balance().await.is_err());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
