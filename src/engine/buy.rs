//! Buy decision pipeline
//!
//! Evaluates one market listing through ordered gates, short-circuiting on
//! the first failure. Rejections are typed outcomes carrying the failing
//! gate, so a dry run can audit every decision.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::instrument;

use crate::common::errors::{EngineError, Result};
use crate::common::money;
use crate::common::traits::TradeStore;
use crate::common::types::{Listing, TradingState};
use crate::engine::ledger::BudgetLedger;
use crate::engine::risk::RiskScorer;
use crate::engine::types::{BuyEvaluation, BuyGate, BuyOpportunity, BuyRejection};

/// Sales at or above the target price required in the last 30 days
const MIN_VIABLE_SALES: u32 = 3;

/// Lookback window for the historical viability gate
const HISTORY_WINDOW_DAYS: i64 = 30;

/// Extra profit margin demanded while the budget is in conservative state
const CONSERVATIVE_PROFIT_BONUS_PCT: Decimal = dec!(5);

/// Ordered-gate evaluation of buy candidates
pub struct BuyDecisionPipeline {
    store: Arc<dyn TradeStore>,
    ledger: Arc<BudgetLedger>,
}

impl BuyDecisionPipeline {
    pub fn new(store: Arc<dyn TradeStore>, ledger: Arc<BudgetLedger>) -> Self {
        Self { store, ledger }
    }

    /// Evaluate a single listing.
    ///
    /// `next_cheapest` is the price of the next-cheapest competing listing
    /// when known; without it the spread gate is skipped rather than failed,
    /// because spread data may require an extra fetch.
    #[instrument(skip(self, listing), fields(item = %listing.item_name, price = %listing.price))]
    pub async fn evaluate(
        &self,
        listing: &Listing,
        next_cheapest: Option<Decimal>,
    ) -> Result<BuyEvaluation> {
        if listing.price <= Decimal::ZERO {
            return Err(EngineError::Validation(format!(
                "listing {} has non-positive price {}",
                listing.listing_id, listing.price
            )));
        }

        let trading_state = self.ledger.trading_state();
        if !trading_state.allows_buys() {
            return Ok(reject(
                BuyGate::TradingHalted,
                format!("trading state is {}", trading_state),
            ));
        }
        let conservative = trading_state == TradingState::Conservative;

        // Gate 1: item must be whitelisted and active
        let entry = match self.store.whitelist_entry(&listing.item_name).await? {
            Some(entry) if entry.active => entry,
            Some(_) => {
                return Ok(reject(BuyGate::Whitelist, "whitelist entry is inactive"));
            }
            None => return Ok(reject(BuyGate::Whitelist, "item is not whitelisted")),
        };

        // Gate 2: discount from the 7-day average
        let stats = match self.store.market_stats(&listing.item_name).await? {
            Some(stats) => stats,
            None => return Ok(reject(BuyGate::Discount, "no market stats for item")),
        };
        if stats.avg_price_7d <= Decimal::ZERO {
            return Ok(reject(BuyGate::Discount, "no 7-day average price"));
        }
        let discount = money::discount_pct(stats.avg_price_7d, listing.price);
        if discount < entry.min_discount_pct {
            return Ok(reject(
                BuyGate::Discount,
                format!(
                    "discount {:.1}% below required {}%",
                    discount, entry.min_discount_pct
                ),
            ));
        }

        // Gate 3: spread to the next-cheapest listing, best effort
        let spread = next_cheapest.map(|next| money::spread_pct(next, listing.price));
        if let Some(spread) = spread {
            if spread < entry.min_spread_pct {
                return Ok(reject(
                    BuyGate::Spread,
                    format!("spread {:.1}% below required {}%", spread, entry.min_spread_pct),
                ));
            }
        }

        // Gate 4: budget gates, plus the halved sizing cap in conservative
        if let Err(rejection) = self.ledger.can_afford(listing.price) {
            return Ok(reject(BuyGate::Budget, rejection.to_string()));
        }
        let per_trade_cap = self.ledger.per_trade_cap(trading_state);
        if listing.price > per_trade_cap {
            return Ok(reject(
                BuyGate::Budget,
                format!(
                    "price {} exceeds conservative per-trade cap {}",
                    listing.price, per_trade_cap
                ),
            ));
        }

        // Gate 5: portfolio concentration limit
        let holdings = self.store.holdings_count(&listing.item_name).await?;
        if holdings >= entry.max_holdings {
            return Ok(reject(
                BuyGate::Portfolio,
                format!("already holding {} of max {}", holdings, entry.max_holdings),
            ));
        }

        // Gate 6: fee-aware target sell price, fixed at purchase time
        let profit_pct = if conservative {
            entry.target_profit_pct + CONSERVATIVE_PROFIT_BONUS_PCT
        } else {
            entry.target_profit_pct
        };
        let target_sell_price = money::target_sell_price(listing.price, profit_pct);

        // Gate 7: the target must have actually traded recently
        let since = Utc::now() - Duration::days(HISTORY_WINDOW_DAYS);
        let viable_sales = self
            .store
            .sales_at_or_above(&listing.item_name, target_sell_price, since)
            .await?;
        if viable_sales < MIN_VIABLE_SALES {
            return Ok(reject(
                BuyGate::History,
                format!(
                    "only {} sales at or above target {} in the last {} days",
                    viable_sales, target_sell_price, HISTORY_WINDOW_DAYS
                ),
            ));
        }

        // Gate 8: risk score
        let risk_score = RiskScorer::score(Some(&stats), listing.price, holdings);
        if !RiskScorer::is_acceptable(risk_score) {
            return Ok(reject(
                BuyGate::Risk,
                format!("risk score {:.1} above threshold", risk_score),
            ));
        }

        // Gate 9: expected profit after fee
        let expected_profit = money::net_proceeds(target_sell_price) - listing.price;

        Ok(BuyEvaluation::Accepted(BuyOpportunity {
            sale_id: listing.listing_id.clone(),
            item_name: listing.item_name.clone(),
            price: listing.price,
            target_sell_price,
            expected_profit,
            risk_score,
            tier: entry.tier,
            discount_pct: money::round_cents(discount),
            spread_pct: spread.map(money::round_cents),
        }))
    }
}

fn reject(gate: BuyGate, reason: impl Into<String>) -> BuyEvaluation {
    BuyEvaluation::Rejected(BuyRejection::new(gate, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::traits::MockTradeStore;
    use crate::common::types::{MarketStats, Tier, WhitelistEntry};
    use crate::config::types::BudgetConfig;
    use pretty_assertions::assert_eq;

    fn entry() -> WhitelistEntry {
        WhitelistEntry {
            item_name: "chrome falchion".to_string(),
            tier: Tier::One,
            min_discount_pct: dec!(20),
            min_spread_pct: dec!(5),
            target_profit_pct: dec!(10),
            max_holdings: 3,
            active: true,
        }
    }

    fn stats() -> MarketStats {
        MarketStats {
            item_name: "chrome falchion".to_string(),
            avg_price_7d: dec!(35.50),
            avg_price_30d: dec!(34.00),
            median_price_30d: dec!(34.50),
            min_price_30d: dec!(25.00),
            max_price_30d: dec!(42.00),
            std_dev_30d: 1.2,
            sales_count_7d: 25,
            sales_count_30d: 90,
            sales_per_day: 3.0,
            last_sale_price: Some(dec!(34.00)),
            last_sale_at: Some(Utc::now()),
            updated_at: Utc::now(),
        }
    }

    fn listing(price: Decimal) -> Listing {
        Listing::new("sale-1", "chrome falchion", price)
    }

    fn ledger(balance: Decimal) -> Arc<BudgetLedger> {
        let ledger = BudgetLedger::new(BudgetConfig {
            hard_floor: dec!(50),
            soft_floor: dec!(100),
            max_risk_per_trade: dec!(0.20),
            max_total_exposure: dec!(0.90),
            min_reserve_pct: dec!(0.10),
        });
        ledger.set_balance(balance);
        Arc::new(ledger)
    }

    fn store_for_happy_path() -> MockTradeStore {
        let mut store = MockTradeStore::new();
        store
            .expect_whitelist_entry()
            .returning(|_| Ok(Some(entry())));
        store.expect_market_stats().returning(|_| Ok(Some(stats())));
        store.expect_holdings_count().returning(|_| Ok(0));
        store.expect_sales_at_or_above().returning(|_, _, _| Ok(8));
        store
    }

    fn pipeline(store: MockTradeStore, ledger: Arc<BudgetLedger>) -> BuyDecisionPipeline {
        BuyDecisionPipeline::new(Arc::new(store), ledger)
    }

    #[tokio::test]
    async fn test_accepts_discounted_listing() {
        let pipeline = pipeline(store_for_happy_path(), ledger(dec!(1000)));
        // 28.00 against a 35.50 average is a 21.1% discount
        let result = pipeline.evaluate(&listing(dec!(28.00)), None).await.unwrap();

        match result {
            BuyEvaluation::Accepted(op) => {
                assert_eq!(op.sale_id, "sale-1");
                assert_eq!(op.target_sell_price, dec!(36.24));
                assert_eq!(op.expected_profit, money::net_proceeds(dec!(36.24)) - dec!(28.00));
                assert_eq!(op.discount_pct, dec!(21.13));
                assert_eq!(op.spread_pct, None, "spread gate skipped without data");
                assert_eq!(op.tier, Tier::One);
            }
            BuyEvaluation::Rejected(rejection) => panic!("unexpected rejection: {}", rejection),
        }
    }

    #[tokio::test]
    async fn test_non_positive_price_is_validation_error() {
        let pipeline = pipeline(MockTradeStore::new(), ledger(dec!(1000)));
        let err = pipeline
            .evaluate(&listing(Decimal::ZERO), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_lockdown_halts_buys() {
        let pipeline = pipeline(MockTradeStore::new(), ledger(dec!(40)));
        let result = pipeline.evaluate(&listing(dec!(5)), None).await.unwrap();
        assert_gate(result, BuyGate::TradingHalted);
    }

    #[tokio::test]
    async fn test_emergency_halts_buys() {
        let pipeline = pipeline(MockTradeStore::new(), ledger(dec!(90)));
        let result = pipeline.evaluate(&listing(dec!(5)), None).await.unwrap();
        assert_gate(result, BuyGate::TradingHalted);
    }

    #[tokio::test]
    async fn test_unknown_item_rejected_at_whitelist() {
        let mut store = MockTradeStore::new();
        store.expect_whitelist_entry().returning(|_| Ok(None));
        let pipeline = pipeline(store, ledger(dec!(1000)));
        let result = pipeline.evaluate(&listing(dec!(28)), None).await.unwrap();
        assert_gate(result, BuyGate::Whitelist);
    }

    #[tokio::test]
    async fn test_inactive_entry_rejected_at_whitelist() {
        let mut store = MockTradeStore::new();
        store.expect_whitelist_entry().returning(|_| {
            let mut e = entry();
            e.active = false;
            Ok(Some(e))
        });
        let pipeline = pipeline(store, ledger(dec!(1000)));
        let result = pipeline.evaluate(&listing(dec!(28)), None).await.unwrap();
        assert_gate(result, BuyGate::Whitelist);
    }

    #[tokio::test]
    async fn test_missing_stats_rejected_at_discount() {
        let mut store = MockTradeStore::new();
        store
            .expect_whitelist_entry()
            .returning(|_| Ok(Some(entry())));
        store.expect_market_stats().returning(|_| Ok(None));
        let pipeline = pipeline(store, ledger(dec!(1000)));
        let result = pipeline.evaluate(&listing(dec!(28)), None).await.unwrap();
        assert_gate(result, BuyGate::Discount);
    }

    #[tokio::test]
    async fn test_small_discount_rejected() {
        // 30.00 against 35.50 is only 15.5%, below the 20% minimum
        let pipeline = pipeline(store_for_happy_path(), ledger(dec!(1000)));
        let result = pipeline.evaluate(&listing(dec!(30.00)), None).await.unwrap();
        assert_gate(result, BuyGate::Discount);
    }

    #[tokio::test]
    async fn test_thin_spread_rejected() {
        let pipeline = pipeline(store_for_happy_path(), ledger(dec!(1000)));
        // Next listing at 28.50 is only 1.8% above
        let result = pipeline
            .evaluate(&listing(dec!(28.00)), Some(dec!(28.50)))
            .await
            .unwrap();
        assert_gate(result, BuyGate::Spread);
    }

    #[tokio::test]
    async fn test_wide_spread_accepted_and_recorded() {
        let pipeline = pipeline(store_for_happy_path(), ledger(dec!(1000)));
        let result = pipeline
            .evaluate(&listing(dec!(28.00)), Some(dec!(31.00)))
            .await
            .unwrap();
        match result {
            BuyEvaluation::Accepted(op) => {
                assert_eq!(op.spread_pct, Some(dec!(10.71)));
            }
            BuyEvaluation::Rejected(rejection) => panic!("unexpected rejection: {}", rejection),
        }
    }

    #[tokio::test]
    async fn test_budget_gate_rejects_floor_breach() {
        let mut store = MockTradeStore::new();
        store
            .expect_whitelist_entry()
            .returning(|_| Ok(Some(entry())));
        store.expect_market_stats().returning(|_| {
            let mut s = stats();
            s.avg_price_7d = dec!(200);
            Ok(Some(s))
        });
        // Balance 150: conservative is off (soft 100 * 1.2 = 120 < 150), and
        // 110 would land at 40, below the 50 hard floor
        let pipeline = pipeline(store, ledger(dec!(150)));
        let result = pipeline.evaluate(&listing(dec!(110)), None).await.unwrap();
        assert_gate(result, BuyGate::Budget);
    }

    #[tokio::test]
    async fn test_portfolio_limit_rejected() {
        let mut store = MockTradeStore::new();
        store
            .expect_whitelist_entry()
            .returning(|_| Ok(Some(entry())));
        store.expect_market_stats().returning(|_| Ok(Some(stats())));
        store.expect_holdings_count().returning(|_| Ok(3));
        let pipeline = pipeline(store, ledger(dec!(1000)));
        let result = pipeline.evaluate(&listing(dec!(28)), None).await.unwrap();
        assert_gate(result, BuyGate::Portfolio);
    }

    #[tokio::test]
    async fn test_unviable_target_rejected_at_history() {
        let mut store = MockTradeStore::new();
        store
            .expect_whitelist_entry()
            .returning(|_| Ok(Some(entry())));
        store.expect_market_stats().returning(|_| Ok(Some(stats())));
        store.expect_holdings_count().returning(|_| Ok(0));
        store.expect_sales_at_or_above().returning(|_, _, _| Ok(2));
        let pipeline = pipeline(store, ledger(dec!(1000)));
        let result = pipeline.evaluate(&listing(dec!(28)), None).await.unwrap();
        assert_gate(result, BuyGate::History);
    }

    #[tokio::test]
    async fn test_risky_item_rejected() {
        let mut store = MockTradeStore::new();
        store
            .expect_whitelist_entry()
            .returning(|_| Ok(Some(entry())));
        store.expect_market_stats().returning(|_| {
            let mut s = stats();
            // Volatile and thin: 6.0 + 2.0 = 8.0, above the 7.0 threshold
            s.std_dev_30d = 9.0;
            s.sales_count_30d = 5;
            Ok(Some(s))
        });
        store.expect_holdings_count().returning(|_| Ok(0));
        store.expect_sales_at_or_above().returning(|_, _, _| Ok(8));
        let pipeline = pipeline(store, ledger(dec!(1000)));
        let result = pipeline.evaluate(&listing(dec!(28)), None).await.unwrap();
        assert_gate(result, BuyGate::Risk);
    }

    #[tokio::test]
    async fn test_conservative_state_raises_margin_and_halves_cap() {
        // Balance 110 sits between soft floor and soft floor * 1.2
        let ledger = ledger(dec!(110));
        assert_eq!(ledger.trading_state(), TradingState::Conservative);

        let mut store = MockTradeStore::new();
        store.expect_whitelist_entry().returning(|_| {
            let mut e = entry();
            e.min_discount_pct = dec!(10);
            Ok(Some(e))
        });
        store.expect_market_stats().returning(|_| {
            let mut s = stats();
            s.avg_price_7d = dec!(12.00);
            Ok(Some(s))
        });
        store.expect_holdings_count().returning(|_| Ok(0));
        store.expect_sales_at_or_above().returning(|_, _, _| Ok(8));
        let first_pipeline = pipeline(store, Arc::clone(&ledger));

        // Cap is halved: 110 * 0.20 / 2 = 11, so a 10.00 listing fits
        let result = first_pipeline.evaluate(&listing(dec!(10.00)), None).await.unwrap();
        match result {
            BuyEvaluation::Accepted(op) => {
                // Margin raised from 10% to 15%: 10.00 * 1.15 / 0.85 = 13.53
                assert_eq!(op.target_sell_price, dec!(13.53));
            }
            BuyEvaluation::Rejected(rejection) => panic!("unexpected rejection: {}", rejection),
        }

        // Above the halved cap gets rejected at the budget gate
        let mut store = MockTradeStore::new();
        store.expect_whitelist_entry().returning(|_| {
            let mut e = entry();
            e.min_discount_pct = dec!(10);
            Ok(Some(e))
        });
        store.expect_market_stats().returning(|_| {
            let mut s = stats();
            s.avg_price_7d = dec!(16.00);
            Ok(Some(s))
        });
        let pipeline = pipeline(store, ledger);
        let result = pipeline.evaluate(&listing(dec!(12.00)), None).await.unwrap();
        assert_gate(result, BuyGate::Budget);
    }

    fn assert_gate(result: BuyEvaluation, gate: BuyGate) {
        match result {
            BuyEvaluation::Rejected(rejection) => assert_eq!(rejection.gate, gate),
            BuyEvaluation::Accepted(op) => panic!("expected {} rejection, accepted {:?}", gate, op),
        }
    }
}
