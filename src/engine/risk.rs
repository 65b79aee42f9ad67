//! Risk scoring for buy candidates
//!
//! Scores an item 0 to 10 from volatility, price-floor proximity, liquidity,
//! portfolio concentration and data sufficiency. Missing market stats are
//! treated as worst-case risk, not as a skip.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::common::types::MarketStats;

/// Highest possible score; also the score for items with no stats
pub const MAX_RISK_SCORE: f64 = 10.0;

/// Scores at or below this are acceptable, independent of tier
pub const DEFAULT_RISK_THRESHOLD: f64 = 7.0;

/// Additive risk scorer over a stats snapshot
pub struct RiskScorer;

impl RiskScorer {
    /// Score a candidate purchase.
    ///
    /// Returns a value in `[0, 10]` rounded to one decimal. Absence of stats
    /// returns the maximum score.
    pub fn score(
        stats: Option<&MarketStats>,
        current_price: Decimal,
        current_holdings: u32,
    ) -> f64 {
        let stats = match stats {
            Some(stats) => stats,
            None => return MAX_RISK_SCORE,
        };

        let mut score = 0.0;
        score += Self::volatility_factor(stats.std_dev_30d);
        score += Self::near_low_factor(current_price, stats.min_price_30d);
        score += Self::liquidity_factor(stats.sales_per_day);
        score += Self::concentration_factor(current_holdings);
        score += Self::data_factor(stats.sales_count_30d);

        round_one_decimal(score.min(MAX_RISK_SCORE))
    }

    /// Whether a score clears the fixed acceptance threshold
    pub fn is_acceptable(score: f64) -> bool {
        score <= DEFAULT_RISK_THRESHOLD
    }

    /// High volatility scales with the deviation, capped at 6
    fn volatility_factor(std_dev: f64) -> f64 {
        if std_dev >= 2.0 {
            (3.0 * (std_dev / 2.0)).min(6.0)
        } else {
            0.0
        }
    }

    /// Prices within 5% of the 30-day low risk catching a falling knife
    fn near_low_factor(current_price: Decimal, min_30d: Decimal) -> f64 {
        if min_30d <= Decimal::ZERO {
            return 0.0;
        }
        let distance_pct = ((current_price - min_30d) / min_30d * Decimal::from(100))
            .to_f64()
            .unwrap_or(f64::MAX);
        if distance_pct <= 5.0 {
            2.0
        } else {
            0.0
        }
    }

    /// Slow-moving items are harder to exit; unknown velocity is worst case
    fn liquidity_factor(sales_per_day: f64) -> f64 {
        if sales_per_day <= 0.0 {
            2.0
        } else if sales_per_day < 2.0 {
            (2.0 * (2.0 / sales_per_day)).min(4.0)
        } else {
            0.0
        }
    }

    /// Each unit already held concentrates exposure on one item
    fn concentration_factor(current_holdings: u32) -> f64 {
        1.5 * f64::from(current_holdings)
    }

    /// Thin sales histories make every other factor unreliable
    fn data_factor(sales_count_30d: u32) -> f64 {
        if sales_count_30d < 10 {
            2.0
        } else {
            0.0
        }
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
