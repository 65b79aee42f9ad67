//! Sell executor
//!
//! Drives one accepted sell opportunity: list a holding or move an existing
//! listing to a new price, then persist the position transition. Listings do
//! not change the balance, so no transaction record is written here; the
//! sale itself is settled by position reconciliation.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::common::errors::Result;
use crate::common::traits::{MarketApi, TradeStore};
use crate::common::types::{ListRequest, PriceUpdate};
use crate::engine::types::{SellAction, SellOpportunity};

/// Executes accepted sell opportunities
pub struct SellExecutor {
    api: Arc<dyn MarketApi>,
    store: Arc<dyn TradeStore>,
}

impl SellExecutor {
    pub fn new(api: Arc<dyn MarketApi>, store: Arc<dyn TradeStore>) -> Self {
        Self { api, store }
    }

    /// Execute one sell opportunity.
    ///
    /// API errors are returned for the worker to classify; a response that
    /// does not confirm our sale id is logged and dropped, since repeating
    /// the same request will not change the answer.
    #[instrument(skip(self, opportunity), fields(item = %opportunity.item_name, sale_id = %opportunity.sale_id))]
    pub async fn execute(&self, opportunity: &SellOpportunity) -> Result<()> {
        match &opportunity.action {
            SellAction::List { price } => {
                let requests = vec![ListRequest {
                    sale_id: opportunity.sale_id.clone(),
                    price: *price,
                }];
                let outcome = self.api.list_items(&requests).await?;
                if outcome.listed_ids.contains(&opportunity.sale_id) {
                    self.store.mark_listed(&opportunity.sale_id, *price).await?;
                    info!(price = %price, reason = %opportunity.reason, "listed");
                } else {
                    warn!("listing was not confirmed by the API, dropping");
                }
            }
            SellAction::Adjust { price } => {
                let updates = vec![PriceUpdate {
                    sale_id: opportunity.sale_id.clone(),
                    new_price: *price,
                }];
                let outcome = self.api.edit_price(&updates).await?;
                if outcome.updated_ids.contains(&opportunity.sale_id) {
                    self.store
                        .update_listed_price(&opportunity.sale_id, *price)
                        .await?;
                    info!(price = %price, reason = %opportunity.reason, "repriced");
                } else {
                    warn!("price edit was not confirmed by the API, dropping");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::errors::EngineError;
    use crate::common::traits::{MockMarketApi, MockTradeStore};
    use crate::common::types::{EditOutcome, ListOutcome};
    use rust_decimal_macros::dec;

    fn list_opportunity() -> SellOpportunity {
        SellOpportunity {
            sale_id: "sale-1".to_string(),
            item_name: "chrome falchion".to_string(),
            action: SellAction::List { price: dec!(12.49) },
            reason: "undercutting for 6.2% profit".to_string(),
        }
    }

    fn adjust_opportunity() -> SellOpportunity {
        SellOpportunity {
            sale_id: "sale-1".to_string(),
            item_name: "chrome falchion".to_string(),
            action: SellAction::Adjust { price: dec!(12.29) },
            reason: "competitive undercut to 12.29".to_string(),
        }
    }

    #[tokio::test]
    async fn test_listing_marks_position() {
        let mut api = MockMarketApi::new();
        api.expect_list_items().returning(|requests| {
            Ok(ListOutcome {
                listed_ids: requests.iter().map(|r| r.sale_id.clone()).collect(),
            })
        });

        let mut store = MockTradeStore::new();
        store
            .expect_mark_listed()
            .withf(|sale_id, price| sale_id == "sale-1" && *price == dec!(12.49))
            .returning(|_, _| Ok(()));

        let executor = SellExecutor::new(Arc::new(api), Arc::new(store));
        executor.execute(&list_opportunity()).await.unwrap();
    }

    #[tokio::test]
    async fn test_adjust_updates_price() {
        let mut api = MockMarketApi::new();
        api.expect_edit_price().returning(|updates| {
            Ok(EditOutcome {
                updated_ids: updates.iter().map(|u| u.sale_id.clone()).collect(),
            })
        });

        let mut store = MockTradeStore::new();
        store
            .expect_update_listed_price()
            .withf(|sale_id, price| sale_id == "sale-1" && *price == dec!(12.29))
            .returning(|_, _| Ok(()));

        let executor = SellExecutor::new(Arc::new(api), Arc::new(store));
        executor.execute(&adjust_opportunity()).await.unwrap();
    }

    #[tokio::test]
    async fn test_unconfirmed_listing_is_dropped() {
        let mut api = MockMarketApi::new();
        api.expect_list_items()
            .returning(|_| Ok(ListOutcome { listed_ids: vec![] }));

        // No mark_listed expectation: the store must not be touched
        let store = MockTradeStore::new();
        let executor = SellExecutor::new(Arc::new(api), Arc::new(store));
        executor.execute(&list_opportunity()).await.unwrap();
    }

    #[tokio::test]
    async fn test_api_error_propagates_for_retry() {
        let mut api = MockMarketApi::new();
        api.expect_list_items().returning(|_| {
            Err(EngineError::Api {
                status: 503,
                message: "unavailable".to_string(),
            })
        });

        let store = MockTradeStore::new();
        let executor = SellExecutor::new(Arc::new(api), Arc::new(store));
        let err = executor.execute(&list_opportunity()).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
