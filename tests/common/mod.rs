//! Common test utilities and fixtures

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use tradeguard::common::errors::Result;
use tradeguard::common::traits::TradeStore;
use tradeguard::common::types::{
    MarketStats, Position, PositionStatus, Sale, Tier, Transaction, WhitelistEntry,
};

/// A whitelist entry matching the sample market data below
pub fn sample_entry() -> WhitelistEntry {
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

/// Calm, liquid market stats for the sample item
pub fn sample_stats() -> MarketStats {
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

/// In-memory trade store for integration tests
///
/// Backs every trait method with plain maps so tests can assert on the
/// resulting state directly.
#[derive(Default)]
pub struct FakeStore {
    pub whitelist: Mutex<Vec<WhitelistEntry>>,
    pub stats: Mutex<HashMap<String, MarketStats>>,
    pub positions: Mutex<HashMap<String, Position>>,
    pub sales: Mutex<Vec<Sale>>,
    pub transactions: Mutex<Vec<Transaction>>,
    pub dead_letters: Mutex<Vec<(String, String, u32)>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_whitelist(&self, entry: WhitelistEntry) {
        self.whitelist.lock().unwrap().push(entry);
    }

    pub fn set_stats(&self, stats: MarketStats) {
        self.stats
            .lock()
            .unwrap()
            .insert(stats.item_name.clone(), stats);
    }

    pub fn add_position(&self, position: Position) {
        self.positions
            .lock()
            .unwrap()
            .insert(position.sale_id.clone(), position);
    }

    pub fn add_sales(&self, sales: Vec<Sale>) {
        self.sales.lock().unwrap().extend(sales);
    }

    pub fn position(&self, sale_id: &str) -> Option<Position> {
        self.positions.lock().unwrap().get(sale_id).cloned()
    }
}

#[async_trait]
impl TradeStore for FakeStore {
    async fn active_whitelist(&self) -> Result<Vec<WhitelistEntry>> {
        Ok(self
            .whitelist
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.active)
            .cloned()
            .collect())
    }

    async fn whitelist_entry(&self, item_name: &str) -> Result<Option<WhitelistEntry>> {
        Ok(self
            .whitelist
            .lock()
            .unwrap()
            .iter()
            .find(|entry| entry.item_name == item_name)
            .cloned())
    }

    async fn market_stats(&self, item_name: &str) -> Result<Option<MarketStats>> {
        Ok(self.stats.lock().unwrap().get(item_name).cloned())
    }

    async fn upsert_market_stats(&self, stats: &MarketStats) -> Result<()> {
        self.stats
            .lock()
            .unwrap()
            .insert(stats.item_name.clone(), stats.clone());
        Ok(())
    }

    async fn open_positions(&self) -> Result<Vec<Position>> {
        Ok(self
            .positions
            .lock()
            .unwrap()
            .values()
            .filter(|position| position.is_open())
            .cloned()
            .collect())
    }

    async fn holdings_count(&self, item_name: &str) -> Result<u32> {
        Ok(self
            .positions
            .lock()
            .unwrap()
            .values()
            .filter(|position| position.item_name == item_name && position.is_open())
            .count() as u32)
    }

    async fn insert_position(&self, position: &Position) -> Result<()> {
        self.positions
            .lock()
            .unwrap()
            .insert(position.sale_id.clone(), position.clone());
        Ok(())
    }

    async fn mark_listed(&self, sale_id: &str, price: Decimal) -> Result<()> {
        if let Some(position) = self.positions.lock().unwrap().get_mut(sale_id) {
            position.status = PositionStatus::Listed;
            position.listed_price = Some(price);
        }
        Ok(())
    }

    async fn update_listed_price(&self, sale_id: &str, price: Decimal) -> Result<()> {
        if let Some(position) = self.positions.lock().unwrap().get_mut(sale_id) {
            position.listed_price = Some(price);
        }
        Ok(())
    }

    async fn mark_sold(
        &self,
        sale_id: &str,
        price: Decimal,
        fee: Decimal,
        net_profit: Decimal,
        sold_at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(position) = self.positions.lock().unwrap().get_mut(sale_id) {
            position.status = PositionStatus::Sold;
            position.sold_price = Some(price);
            position.sale_fee = Some(fee);
            position.net_profit = Some(net_profit);
            position.sold_at = Some(sold_at);
        }
        Ok(())
    }

    async fn mark_failed(&self, sale_id: &str) -> Result<()> {
        if let Some(position) = self.positions.lock().unwrap().get_mut(sale_id) {
            position.status = PositionStatus::Failed;
        }
        Ok(())
    }

    async fn record_sales(&self, sales: &[Sale]) -> Result<()> {
        self.sales.lock().unwrap().extend_from_slice(sales);
        Ok(())
    }

    async fn sales_at_or_above(
        &self,
        item_name: &str,
        price: Decimal,
        since: DateTime<Utc>,
    ) -> Result<u32> {
        Ok(self
            .sales
            .lock()
            .unwrap()
            .iter()
            .filter(|sale| {
                sale.item_name == item_name && sale.price >= price && sale.sold_at >= since
            })
            .count() as u32)
    }

    async fn invested_total(&self) -> Result<Decimal> {
        Ok(self
            .positions
            .lock()
            .unwrap()
            .values()
            .filter(|position| position.is_open())
            .map(|position| position.purchase_price)
            .sum())
    }

    async fn realized_profit(&self) -> Result<Decimal> {
        Ok(self
            .positions
            .lock()
            .unwrap()
            .values()
            .filter(|position| position.status == PositionStatus::Sold)
            .filter_map(|position| position.net_profit)
            .sum())
    }

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<()> {
        self.transactions.lock().unwrap().push(transaction.clone());
        Ok(())
    }

    async fn insert_dead_letter(&self, payload: &str, error: &str, attempts: u32) -> Result<()> {
        self.dead_letters
            .lock()
            .unwrap()
            .push((payload.to_string(), error.to_string(), attempts));
        Ok(())
    }
}

/// Sample API responses for wiremock-backed tests
pub mod api_responses {
    /// Account balance
    pub const BALANCE: &str = r#"{"balance": "1000.00"}"#;

    /// Search listings for the sample item, cheapest first
    pub const SEARCH: &str = r#"{
        "listings": [
            {"id": "sale-1", "item_name": "chrome falchion", "price": "28.00"},
            {"id": "sale-2", "item_name": "chrome falchion", "price": "34.00"}
        ]
    }"#;

    /// Successful purchase of the cheap listing
    pub const BUY: &str = r#"{"purchased": ["sale-1"], "total_price": "28.00"}"#;

    /// Successful listing confirmation
    pub const LIST: &str = r#"{"listed": ["pos-1"]}"#;

    /// Sales history with plenty of volume above the target price
    pub const SALES: &str = r#"{
        "sales": [
            {"item_name": "chrome falchion", "price": "37.00", "sold_at": 1754000000},
            {"item_name": "chrome falchion", "price": "36.50", "sold_at": 1754100000},
            {"item_name": "chrome falchion", "price": "38.00", "sold_at": 1754200000}
        ]
    }"#;
}
