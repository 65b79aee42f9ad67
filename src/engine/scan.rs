//! Periodic scan passes
//!
//! Each pass runs once per schedule tick and exits quickly: buy scans
//! evaluate fresh listings, sell scans evaluate open positions, the stats
//! refresh rebuilds snapshots from sales history, and reconciliation detects
//! listings that sold out from under us. Accepted opportunities go to the
//! queue; execution happens in the worker pool.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::alert::{Alert, Notifier};
use crate::common::errors::Result;
use crate::common::money;
use crate::common::traits::{MarketApi, TradeStore};
use crate::common::types::{PositionStatus, Transaction};
use crate::engine::buy::BuyDecisionPipeline;
use crate::engine::ledger::BudgetLedger;
use crate::engine::sell::SellDecisionPipeline;
use crate::engine::stats;
use crate::engine::types::{BuyEvaluation, Opportunity, SellEvaluation};
use crate::queue::OpportunityQueue;

/// Counters for one scan pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub evaluated: u32,
    pub accepted: u32,
    pub rejected: u32,
}

/// Drives the periodic evaluation passes
pub struct Scanner {
    api: Arc<dyn MarketApi>,
    store: Arc<dyn TradeStore>,
    ledger: Arc<BudgetLedger>,
    queue: Arc<dyn OpportunityQueue>,
    notifier: Arc<dyn Notifier>,
    buy_pipeline: BuyDecisionPipeline,
    dry_run: bool,
}

impl Scanner {
    pub fn new(
        api: Arc<dyn MarketApi>,
        store: Arc<dyn TradeStore>,
        ledger: Arc<BudgetLedger>,
        queue: Arc<dyn OpportunityQueue>,
        notifier: Arc<dyn Notifier>,
        dry_run: bool,
    ) -> Self {
        let buy_pipeline = BuyDecisionPipeline::new(Arc::clone(&store), Arc::clone(&ledger));
        Self {
            api,
            store,
            ledger,
            queue,
            notifier,
            buy_pipeline,
            dry_run,
        }
    }

    /// Evaluate current listings for every active whitelist entry
    #[instrument(skip(self))]
    pub async fn scan_buys(&self) -> Result<ScanSummary> {
        let mut summary = ScanSummary::default();

        let trading_state = self.ledger.trading_state();
        if !trading_state.allows_buys() {
            info!(state = %trading_state, "skipping buy scan, buys are halted");
            return Ok(summary);
        }

        for entry in self.store.active_whitelist().await? {
            let mut listings = match self.api.search(&entry.item_name).await {
                Ok(listings) => listings,
                Err(e) => {
                    warn!(item = %entry.item_name, error = %e, "search failed, skipping item");
                    continue;
                }
            };
            listings.sort_by(|a, b| a.price.cmp(&b.price));

            for index in 0..listings.len() {
                let listing = &listings[index];
                let next_cheapest = listings.get(index + 1).map(|next| next.price);
                summary.evaluated += 1;

                match self.buy_pipeline.evaluate(listing, next_cheapest).await? {
                    BuyEvaluation::Accepted(opportunity) => {
                        summary.accepted += 1;
                        self.notifier
                            .notify(&Alert::ProfitableTrade {
                                item_name: opportunity.item_name.clone(),
                                price: opportunity.price,
                                expected_profit: opportunity.expected_profit,
                                risk_score: opportunity.risk_score,
                            })
                            .await;
                        if self.dry_run {
                            info!(
                                item = %opportunity.item_name,
                                price = %opportunity.price,
                                expected_profit = %opportunity.expected_profit,
                                "dry run: would queue buy"
                            );
                        } else {
                            self.queue.publish(Opportunity::Buy(opportunity)).await?;
                        }
                    }
                    BuyEvaluation::Rejected(rejection) => {
                        summary.rejected += 1;
                        debug!(
                            item = %listing.item_name,
                            listing = %listing.listing_id,
                            gate = %rejection.gate,
                            reason = %rejection.reason,
                            "buy rejected"
                        );
                    }
                }
            }
        }

        info!(
            evaluated = summary.evaluated,
            accepted = summary.accepted,
            rejected = summary.rejected,
            "buy scan complete"
        );
        Ok(summary)
    }

    /// Evaluate every open position against current competing listings
    #[instrument(skip(self))]
    pub async fn scan_sells(&self) -> Result<ScanSummary> {
        let mut summary = ScanSummary::default();
        let now = Utc::now();

        for position in self.store.open_positions().await? {
            let listings = match self.api.search(&position.item_name).await {
                Ok(listings) => listings,
                Err(e) => {
                    warn!(item = %position.item_name, error = %e, "search failed, skipping position");
                    continue;
                }
            };
            let stats = self.store.market_stats(&position.item_name).await?;
            summary.evaluated += 1;

            match SellDecisionPipeline::evaluate(&position, &listings, stats.as_ref(), now) {
                SellEvaluation::Act(opportunity) => {
                    summary.accepted += 1;
                    if self.dry_run {
                        info!(
                            item = %opportunity.item_name,
                            sale_id = %opportunity.sale_id,
                            reason = %opportunity.reason,
                            "dry run: would queue sell"
                        );
                    } else {
                        self.queue.publish(Opportunity::Sell(opportunity)).await?;
                    }
                }
                SellEvaluation::Hold { reason } => {
                    summary.rejected += 1;
                    debug!(item = %position.item_name, sale_id = %position.sale_id, %reason, "holding");
                }
            }
        }

        info!(
            evaluated = summary.evaluated,
            listed_or_adjusted = summary.accepted,
            held = summary.rejected,
            "sell scan complete"
        );
        Ok(summary)
    }

    /// Rebuild stats snapshots from fresh sales history
    #[instrument(skip(self))]
    pub async fn refresh_stats(&self) -> Result<u32> {
        let mut refreshed = 0;
        for entry in self.store.active_whitelist().await? {
            let sales = match self.api.get_sales_history(&entry.item_name).await {
                Ok(sales) => sales,
                Err(e) => {
                    warn!(item = %entry.item_name, error = %e, "sales history fetch failed");
                    continue;
                }
            };
            self.store.record_sales(&sales).await?;
            if let Some(snapshot) = stats::compute(&entry.item_name, &sales, Utc::now()) {
                self.store.upsert_market_stats(&snapshot).await?;
                refreshed += 1;
            }
        }
        info!(refreshed, "stats refresh complete");
        Ok(refreshed)
    }

    /// Detect listed positions that sold and settle their economics.
    ///
    /// A listed position missing from the inventory has been sold by the
    /// marketplace; we settle it at the listed price with the standard fee.
    #[instrument(skip(self))]
    pub async fn reconcile_positions(&self) -> Result<u32> {
        let inventory = self.api.get_inventory().await?;
        let inventory_ids: HashSet<&str> = inventory
            .iter()
            .map(|item| item.sale_id.as_str())
            .collect();

        let mut settled = 0;
        for position in self.store.open_positions().await? {
            if position.status != PositionStatus::Listed {
                continue;
            }
            if inventory_ids.contains(position.sale_id.as_str()) {
                continue;
            }
            let price = match position.listed_price {
                Some(price) => price,
                None => {
                    warn!(sale_id = %position.sale_id, "listed position has no price, skipping");
                    continue;
                }
            };

            let now = Utc::now();
            let fee = money::sale_fee(price);
            let net = money::net_proceeds(price);
            let net_profit = net - position.purchase_price;
            let balance_before = self.ledger.balance();

            self.store
                .mark_sold(&position.sale_id, price, fee, net_profit, now)
                .await?;
            self.ledger.commit_sale(position.purchase_price, net);
            self.store
                .insert_transaction(&Transaction::sale_success(
                    &position.item_name,
                    &position.sale_id,
                    price,
                    balance_before,
                    now,
                ))
                .await?;

            info!(
                item = %position.item_name,
                sale_id = %position.sale_id,
                price = %price,
                net_profit = %net_profit,
                "position sold"
            );
            settled += 1;
        }
        Ok(settled)
    }

    /// Refresh the ledger from the API and alert on state degradation
    pub async fn refresh_budget(&self, soft_floor: rust_decimal::Decimal) -> Result<()> {
        let previous_state = self.ledger.trading_state();
        let snapshot = self
            .ledger
            .refresh_balance(self.api.as_ref(), self.store.as_ref())
            .await?;

        if snapshot.state != previous_state && !snapshot.state.allows_buys() {
            self.notifier
                .notify(&Alert::BalanceFloor {
                    state: snapshot.state,
                    balance: snapshot.balance,
                    floor: soft_floor,
                })
                .await;
        }
        Ok(())
    }
}
