//! Market statistics aggregation
//!
//! Computes the rolling per-item stats snapshot from raw sales history. Runs
//! periodically from the stats refresh pass so the decision pipelines only
//! ever read pre-computed snapshots.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::common::money;
use crate::common::types::{MarketStats, Sale};

const SHORT_WINDOW_DAYS: i64 = 7;
const LONG_WINDOW_DAYS: i64 = 30;

/// Compute a stats snapshot for one item from its sales history.
///
/// Returns `None` when there are no sales within the 30-day window; the
/// risk scorer treats the absence of stats as worst-case risk.
pub fn compute(item_name: &str, sales: &[Sale], now: DateTime<Utc>) -> Option<MarketStats> {
    let long_cutoff = now - Duration::days(LONG_WINDOW_DAYS);
    let short_cutoff = now - Duration::days(SHORT_WINDOW_DAYS);

    let mut long_window: Vec<&Sale> = sales
        .iter()
        .filter(|sale| sale.sold_at >= long_cutoff && sale.sold_at <= now)
        .collect();
    if long_window.is_empty() {
        return None;
    }
    long_window.sort_by(|a, b| a.price.cmp(&b.price));

    let short_window: Vec<&Sale> = long_window
        .iter()
        .copied()
        .filter(|sale| sale.sold_at >= short_cutoff)
        .collect();

    let long_prices: Vec<Decimal> = long_window.iter().map(|sale| sale.price).collect();
    let avg_30d = average(&long_prices);
    let avg_7d = if short_window.is_empty() {
        avg_30d
    } else {
        average(&short_window.iter().map(|sale| sale.price).collect::<Vec<_>>())
    };

    let last_sale = sales
        .iter()
        .filter(|sale| sale.sold_at <= now)
        .max_by_key(|sale| sale.sold_at);

    Some(MarketStats {
        item_name: item_name.to_string(),
        avg_price_7d: money::round_cents(avg_7d),
        avg_price_30d: money::round_cents(avg_30d),
        median_price_30d: median(&long_prices),
        min_price_30d: long_prices[0],
        max_price_30d: long_prices[long_prices.len() - 1],
        std_dev_30d: std_dev(&long_prices),
        sales_count_7d: short_window.len() as u32,
        sales_count_30d: long_window.len() as u32,
        sales_per_day: long_window.len() as f64 / LONG_WINDOW_DAYS as f64,
        last_sale_price: last_sale.map(|sale| sale.price),
        last_sale_at: last_sale.map(|sale| sale.sold_at),
        updated_at: now,
    })
}

fn average(prices: &[Decimal]) -> Decimal {
    let total: Decimal = prices.iter().copied().sum();
    total / Decimal::from(prices.len() as u64)
}

/// Median over prices already sorted ascending
fn median(sorted: &[Decimal]) -> Decimal {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        money::round_cents((sorted[mid - 1] + sorted[mid]) / Decimal::from(2))
    }
}

/// Population standard deviation of prices
fn std_dev(prices: &[Decimal]) -> f64 {
    let values: Vec<f64> = prices
        .iter()
        .filter_map(|price| price.to_f64())
        .collect();
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / values.len() as f64;
    variance.sqrt()
}
