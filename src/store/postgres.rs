//! Postgres implementation of the trade store
//!
//! Plain `sqlx::query` with explicit row mapping; every query here is simple
//! CRUD or an aggregate the engine consumes as a snapshot. The engine itself
//! never builds SQL.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{info, warn};

use crate::common::errors::{EngineError, Result};
use crate::common::traits::TradeStore;
use crate::common::types::{
    MarketStats, Position, PositionStatus, Sale, Tier, Transaction, WhitelistEntry,
};
use crate::config::types::DatabaseConfig;

/// Postgres-backed trade store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a pool and make sure the schema exists
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .connect(&config.url)
            .await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        info!("database connected");
        Ok(store)
    }

    /// Wrap an existing pool (used by tests)
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_schema(&self) -> Result<()> {
        let statements = [
            r#"CREATE TABLE IF NOT EXISTS whitelist (
                item_name TEXT PRIMARY KEY,
                tier SMALLINT NOT NULL,
                min_discount_pct NUMERIC NOT NULL,
                min_spread_pct NUMERIC NOT NULL,
                target_profit_pct NUMERIC NOT NULL,
                max_holdings INTEGER NOT NULL,
                active BOOLEAN NOT NULL DEFAULT TRUE
            )"#,
            r#"CREATE TABLE IF NOT EXISTS market_stats (
                item_name TEXT PRIMARY KEY,
                avg_price_7d NUMERIC NOT NULL,
                avg_price_30d NUMERIC NOT NULL,
                median_price_30d NUMERIC NOT NULL,
                min_price_30d NUMERIC NOT NULL,
                max_price_30d NUMERIC NOT NULL,
                std_dev_30d DOUBLE PRECISION NOT NULL,
                sales_count_7d INTEGER NOT NULL,
                sales_count_30d INTEGER NOT NULL,
                sales_per_day DOUBLE PRECISION NOT NULL,
                last_sale_price NUMERIC,
                last_sale_at TIMESTAMPTZ,
                updated_at TIMESTAMPTZ NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS positions (
                sale_id TEXT PRIMARY KEY,
                item_name TEXT NOT NULL,
                purchase_price NUMERIC NOT NULL,
                purchased_at TIMESTAMPTZ NOT NULL,
                target_sell_price NUMERIC NOT NULL,
                status TEXT NOT NULL,
                listed_price NUMERIC,
                sold_price NUMERIC,
                sold_at TIMESTAMPTZ,
                sale_fee NUMERIC,
                net_profit NUMERIC,
                risk_score DOUBLE PRECISION NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS sales (
                id BIGSERIAL PRIMARY KEY,
                item_name TEXT NOT NULL,
                price NUMERIC NOT NULL,
                sold_at TIMESTAMPTZ NOT NULL,
                UNIQUE (item_name, price, sold_at)
            )"#,
            r#"CREATE INDEX IF NOT EXISTS sales_item_price_idx
                ON sales (item_name, price, sold_at)"#,
            r#"CREATE TABLE IF NOT EXISTS transactions (
                id BIGSERIAL PRIMARY KEY,
                kind TEXT NOT NULL,
                item_name TEXT NOT NULL,
                sale_id TEXT NOT NULL,
                amount NUMERIC NOT NULL,
                balance_before NUMERIC NOT NULL,
                balance_after NUMERIC NOT NULL,
                success BOOLEAN NOT NULL,
                error TEXT,
                created_at TIMESTAMPTZ NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS dead_letters (
                id BIGSERIAL PRIMARY KEY,
                payload TEXT NOT NULL,
                error TEXT NOT NULL,
                attempts INTEGER NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"#,
        ];
        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn whitelist_from_row(row: &PgRow) -> Result<WhitelistEntry> {
    let tier: i16 = row.try_get("tier")?;
    let max_holdings: i32 = row.try_get("max_holdings")?;
    Ok(WhitelistEntry {
        item_name: row.try_get("item_name")?,
        tier: Tier::try_from(tier).map_err(EngineError::Internal)?,
        min_discount_pct: row.try_get("min_discount_pct")?,
        min_spread_pct: row.try_get("min_spread_pct")?,
        target_profit_pct: row.try_get("target_profit_pct")?,
        max_holdings: max_holdings.max(0) as u32,
        active: row.try_get("active")?,
    })
}

fn stats_from_row(row: &PgRow) -> Result<MarketStats> {
    let sales_count_7d: i32 = row.try_get("sales_count_7d")?;
    let sales_count_30d: i32 = row.try_get("sales_count_30d")?;
    Ok(MarketStats {
        item_name: row.try_get("item_name")?,
        avg_price_7d: row.try_get("avg_price_7d")?,
        avg_price_30d: row.try_get("avg_price_30d")?,
        median_price_30d: row.try_get("median_price_30d")?,
        min_price_30d: row.try_get("min_price_30d")?,
        max_price_30d: row.try_get("max_price_30d")?,
        std_dev_30d: row.try_get("std_dev_30d")?,
        sales_count_7d: sales_count_7d.max(0) as u32,
        sales_count_30d: sales_count_30d.max(0) as u32,
        sales_per_day: row.try_get("sales_per_day")?,
        last_sale_price: row.try_get("last_sale_price")?,
        last_sale_at: row.try_get("last_sale_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn position_from_row(row: &PgRow) -> Result<Position> {
    let status: String = row.try_get("status")?;
    Ok(Position {
        sale_id: row.try_get("sale_id")?,
        item_name: row.try_get("item_name")?,
        purchase_price: row.try_get("purchase_price")?,
        purchased_at: row.try_get("purchased_at")?,
        target_sell_price: row.try_get("target_sell_price")?,
        status: PositionStatus::from_str(&status).map_err(EngineError::Internal)?,
        listed_price: row.try_get("listed_price")?,
        sold_price: row.try_get("sold_price")?,
        sold_at: row.try_get("sold_at")?,
        sale_fee: row.try_get("sale_fee")?,
        net_profit: row.try_get("net_profit")?,
        risk_score: row.try_get("risk_score")?,
    })
}

#[async_trait]
impl TradeStore for PgStore {
    async fn active_whitelist(&self) -> Result<Vec<WhitelistEntry>> {
        let rows = sqlx::query("SELECT * FROM whitelist WHERE active ORDER BY item_name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(whitelist_from_row).collect()
    }

    async fn whitelist_entry(&self, item_name: &str) -> Result<Option<WhitelistEntry>> {
        let row = sqlx::query("SELECT * FROM whitelist WHERE item_name = $1")
            .bind(item_name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(whitelist_from_row).transpose()
    }

    async fn market_stats(&self, item_name: &str) -> Result<Option<MarketStats>> {
        let row = sqlx::query("SELECT * FROM market_stats WHERE item_name = $1")
            .bind(item_name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(stats_from_row).transpose()
    }

    async fn upsert_market_stats(&self, stats: &MarketStats) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO market_stats (
                item_name, avg_price_7d, avg_price_30d, median_price_30d,
                min_price_30d, max_price_30d, std_dev_30d, sales_count_7d,
                sales_count_30d, sales_per_day, last_sale_price, last_sale_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (item_name) DO UPDATE SET
                avg_price_7d = EXCLUDED.avg_price_7d,
                avg_price_30d = EXCLUDED.avg_price_30d,
                median_price_30d = EXCLUDED.median_price_30d,
                min_price_30d = EXCLUDED.min_price_30d,
                max_price_30d = EXCLUDED.max_price_30d,
                std_dev_30d = EXCLUDED.std_dev_30d,
                sales_count_7d = EXCLUDED.sales_count_7d,
                sales_count_30d = EXCLUDED.sales_count_30d,
                sales_per_day = EXCLUDED.sales_per_day,
                last_sale_price = EXCLUDED.last_sale_price,
                last_sale_at = EXCLUDED.last_sale_at,
                updated_at = EXCLUDED.updated_at"#,
        )
        .bind(&stats.item_name)
        .bind(stats.avg_price_7d)
        .bind(stats.avg_price_30d)
        .bind(stats.median_price_30d)
        .bind(stats.min_price_30d)
        .bind(stats.max_price_30d)
        .bind(stats.std_dev_30d)
        .bind(stats.sales_count_7d as i32)
        .bind(stats.sales_count_30d as i32)
        .bind(stats.sales_per_day)
        .bind(stats.last_sale_price)
        .bind(stats.last_sale_at)
        .bind(stats.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn open_positions(&self) -> Result<Vec<Position>> {
        let rows = sqlx::query(
            "SELECT * FROM positions WHERE status IN ('holding', 'listed') ORDER BY purchased_at",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(position_from_row).collect()
    }

    async fn holdings_count(&self, item_name: &str) -> Result<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM positions
             WHERE item_name = $1 AND status IN ('holding', 'listed')",
        )
        .bind(item_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u32)
    }

    async fn insert_position(&self, position: &Position) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO positions (
                sale_id, item_name, purchase_price, purchased_at,
                target_sell_price, status, listed_price, sold_price, sold_at,
                sale_fee, net_profit, risk_score
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"#,
        )
        .bind(&position.sale_id)
        .bind(&position.item_name)
        .bind(position.purchase_price)
        .bind(position.purchased_at)
        .bind(position.target_sell_price)
        .bind(position.status.as_str())
        .bind(position.listed_price)
        .bind(position.sold_price)
        .bind(position.sold_at)
        .bind(position.sale_fee)
        .bind(position.net_profit)
        .bind(position.risk_score)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_listed(&self, sale_id: &str, price: Decimal) -> Result<()> {
        let result = sqlx::query(
            "UPDATE positions SET status = 'listed', listed_price = $2
             WHERE sale_id = $1 AND status = 'holding'",
        )
        .bind(sale_id)
        .bind(price)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            warn!(sale_id, "mark_listed matched no holding position");
        }
        Ok(())
    }

    async fn update_listed_price(&self, sale_id: &str, price: Decimal) -> Result<()> {
        let result = sqlx::query(
            "UPDATE positions SET listed_price = $2
             WHERE sale_id = $1 AND status = 'listed'",
        )
        .bind(sale_id)
        .bind(price)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            warn!(sale_id, "update_listed_price matched no listed position");
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
        let result = sqlx::query(
            "UPDATE positions SET status = 'sold', sold_price = $2,
                 sale_fee = $3, net_profit = $4, sold_at = $5
             WHERE sale_id = $1 AND status = 'listed'",
        )
        .bind(sale_id)
        .bind(price)
        .bind(fee)
        .bind(net_profit)
        .bind(sold_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            warn!(sale_id, "mark_sold matched no listed position");
        }
        Ok(())
    }

    async fn mark_failed(&self, sale_id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE positions SET status = 'failed'
             WHERE sale_id = $1 AND status IN ('holding', 'listed')",
        )
        .bind(sale_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            warn!(sale_id, "mark_failed matched no open position");
        }
        Ok(())
    }

    async fn record_sales(&self, sales: &[Sale]) -> Result<()> {
        for sale in sales {
            sqlx::query(
                "INSERT INTO sales (item_name, price, sold_at) VALUES ($1, $2, $3)
                 ON CONFLICT (item_name, price, sold_at) DO NOTHING",
            )
            .bind(&sale.item_name)
            .bind(sale.price)
            .bind(sale.sold_at)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn sales_at_or_above(
        &self,
        item_name: &str,
        price: Decimal,
        since: DateTime<Utc>,
    ) -> Result<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sales
             WHERE item_name = $1 AND price >= $2 AND sold_at >= $3",
        )
        .bind(item_name)
        .bind(price)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u32)
    }

    async fn invested_total(&self) -> Result<Decimal> {
        let total: Option<Decimal> = sqlx::query_scalar(
            "SELECT SUM(purchase_price) FROM positions
             WHERE status IN ('holding', 'listed')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(total.unwrap_or(Decimal::ZERO))
    }

    async fn realized_profit(&self) -> Result<Decimal> {
        let total: Option<Decimal> =
            sqlx::query_scalar("SELECT SUM(net_profit) FROM positions WHERE status = 'sold'")
                .fetch_one(&self.pool)
                .await?;
        Ok(total.unwrap_or(Decimal::ZERO))
    }

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO transactions (
                kind, item_name, sale_id, amount, balance_before,
                balance_after, success, error, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(transaction.kind.as_str())
        .bind(&transaction.item_name)
        .bind(&transaction.sale_id)
        .bind(transaction.amount)
        .bind(transaction.balance_before)
        .bind(transaction.balance_after)
        .bind(transaction.success)
        .bind(&transaction.error)
        .bind(transaction.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_dead_letter(&self, payload: &str, error: &str, attempts: u32) -> Result<()> {
        sqlx::query(
            "INSERT INTO dead_letters (payload, error, attempts, created_at)
             VALUES ($1, $2, $3, NOW())",
        )
        .bind(payload)
        .bind(error)
        .bind(attempts as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
