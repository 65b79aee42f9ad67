//! Buy executor
//!
//! Drives one accepted buy opportunity: reserve budget, call the purchase
//! API, commit the ledger and persist the position and audit record. The
//! reservation is created before the external call and released exactly
//! once on every path.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::common::errors::{EngineError, Result};
use crate::common::traits::{MarketApi, TradeStore};
use crate::common::types::{Position, Transaction};
use crate::engine::ledger::BudgetLedger;
use crate::engine::types::BuyOpportunity;

/// Executes accepted buy opportunities
pub struct BuyExecutor {
    api: Arc<dyn MarketApi>,
    store: Arc<dyn TradeStore>,
    ledger: Arc<BudgetLedger>,
}

impl BuyExecutor {
    pub fn new(
        api: Arc<dyn MarketApi>,
        store: Arc<dyn TradeStore>,
        ledger: Arc<BudgetLedger>,
    ) -> Self {
        Self { api, store, ledger }
    }

    /// Execute one buy opportunity.
    ///
    /// Budget rejections and duplicate reservations resolve to `Ok` after
    /// logging: neither will improve on redelivery. Errors bubbling out of
    /// the API call are returned for the worker to classify.
    #[instrument(skip(self, opportunity), fields(item = %opportunity.item_name, sale_id = %opportunity.sale_id))]
    pub async fn execute(&self, opportunity: &BuyOpportunity) -> Result<()> {
        // Check-then-reserve runs as one atomic unit; conditions may have
        // changed since the scan accepted this opportunity.
        match self
            .ledger
            .reserve_checked(&opportunity.sale_id, opportunity.price)
        {
            Ok(()) => {}
            Err(EngineError::InsufficientBudget(reason)) => {
                warn!(%reason, "budget no longer allows this purchase, dropping");
                return Ok(());
            }
            Err(EngineError::DuplicateReservation(id)) => {
                error!(%id, "duplicate reservation, aborting this delivery");
                return Ok(());
            }
            Err(other) => return Err(other),
        }

        let balance_before = self.ledger.balance();
        let listing_ids = vec![opportunity.sale_id.clone()];
        let outcome = self.api.buy_items(&listing_ids).await;

        // Release on every path; success commits the purchase instead
        self.ledger.release(&opportunity.sale_id);

        match outcome {
            Ok(result) if result.purchased_ids.contains(&opportunity.sale_id) => {
                let now = Utc::now();
                self.ledger.commit_purchase(opportunity.price);
                let position = Position::new(
                    &opportunity.sale_id,
                    &opportunity.item_name,
                    opportunity.price,
                    opportunity.target_sell_price,
                    opportunity.risk_score,
                    now,
                );
                self.store.insert_position(&position).await?;
                self.store
                    .insert_transaction(&Transaction::buy_success(
                        &opportunity.item_name,
                        &opportunity.sale_id,
                        opportunity.price,
                        balance_before,
                        now,
                    ))
                    .await?;
                info!(
                    price = %opportunity.price,
                    target = %opportunity.target_sell_price,
                    expected_profit = %opportunity.expected_profit,
                    "purchase complete"
                );
                Ok(())
            }
            Ok(_) => {
                // The API succeeded but our listing was not in the result;
                // someone else bought it first. Nothing to retry.
                let now = Utc::now();
                self.store
                    .insert_transaction(&Transaction::buy_failure(
                        &opportunity.item_name,
                        &opportunity.sale_id,
                        opportunity.price,
                        balance_before,
                        "listing no longer available",
                        now,
                    ))
                    .await?;
                warn!("listing no longer available, dropping");
                Ok(())
            }
            Err(EngineError::CircuitOpen { failure_count }) => {
                // Never reached the API, so no transaction is recorded
                Err(EngineError::CircuitOpen { failure_count })
            }
            Err(error) => {
                self.store
                    .insert_transaction(&Transaction::buy_failure(
                        &opportunity.item_name,
                        &opportunity.sale_id,
                        opportunity.price,
                        balance_before,
                        error.to_string(),
                        Utc::now(),
                    ))
                    .await?;
                Err(error)
            }
        }
    }
}
