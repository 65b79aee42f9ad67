//! Trait definitions for the engine's external collaborators
//!
//! The engine reaches the marketplace and the database only through these
//! narrow seams, which keeps the decision pipelines testable with mocks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::errors::Result;
use super::types::{
    BuyOutcome, EditOutcome, InventoryItem, ListOutcome, ListRequest, MarketStats, Position,
    PriceUpdate, Sale, Transaction, WhitelistEntry,
};

/// Marketplace API surface the engine depends on
///
/// All calls are fallible with a distinguishable rate-limited vs API error
/// vs transport error outcome (see `EngineError`).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketApi: Send + Sync {
    /// Authoritative account balance
    async fn get_balance(&self) -> Result<Decimal>;

    /// Current listings for an item, cheapest first
    async fn search(&self, item_name: &str) -> Result<Vec<crate::common::types::Listing>>;

    /// Purchase the given listings
    async fn buy_items(&self, listing_ids: &[String]) -> Result<BuyOutcome>;

    /// Put owned items up for sale
    async fn list_items(&self, requests: &[ListRequest]) -> Result<ListOutcome>;

    /// Change the price of existing listings
    async fn edit_price(&self, updates: &[PriceUpdate]) -> Result<EditOutcome>;

    /// Current inventory, including active listings
    async fn get_inventory(&self) -> Result<Vec<InventoryItem>>;

    /// Recent sales history for an item
    async fn get_sales_history(&self, item_name: &str) -> Result<Vec<Sale>>;
}

/// Persistence surface for whitelist, stats, positions and the audit trail
///
/// Treated as a synchronous row store with simple CRUD and aggregate
/// queries; the Postgres implementation lives in `store::postgres`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// All whitelist entries with the active flag set
    async fn active_whitelist(&self) -> Result<Vec<WhitelistEntry>>;

    /// Whitelist entry for an item, active or not
    async fn whitelist_entry(&self, item_name: &str) -> Result<Option<WhitelistEntry>>;

    /// Latest stats snapshot for an item
    async fn market_stats(&self, item_name: &str) -> Result<Option<MarketStats>>;

    /// Replace the stats snapshot for an item
    async fn upsert_market_stats(&self, stats: &MarketStats) -> Result<()>;

    /// Positions in holding or listed status
    async fn open_positions(&self) -> Result<Vec<Position>>;

    /// Number of open positions for an item
    async fn holdings_count(&self, item_name: &str) -> Result<u32>;

    async fn insert_position(&self, position: &Position) -> Result<()>;

    /// Transition holding -> listed with the listing price
    async fn mark_listed(&self, sale_id: &str, price: Decimal) -> Result<()>;

    /// Update the price of an already-listed position
    async fn update_listed_price(&self, sale_id: &str, price: Decimal) -> Result<()>;

    /// Transition listed -> sold with final sale economics
    async fn mark_sold(
        &self,
        sale_id: &str,
        price: Decimal,
        fee: Decimal,
        net_profit: Decimal,
        sold_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Transition holding/listed -> failed
    async fn mark_failed(&self, sale_id: &str) -> Result<()>;

    /// Record fetched sales history, ignoring duplicates
    async fn record_sales(&self, sales: &[Sale]) -> Result<()>;

    /// Sales of an item at or above `price` since `since`
    async fn sales_at_or_above(
        &self,
        item_name: &str,
        price: Decimal,
        since: DateTime<Utc>,
    ) -> Result<u32>;

    /// Sum of purchase prices of open positions
    async fn invested_total(&self) -> Result<Decimal>;

    /// Sum of net profit over sold positions
    async fn realized_profit(&self) -> Result<Decimal>;

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<()>;

    /// Park an opportunity that exhausted its retries for manual inspection
    async fn insert_dead_letter(&self, payload: &str, error: &str, attempts: u32) -> Result<()>;
}
