//! Alerts emitted by the engine
//!
//! A small closed set of alert variants with type-specific payloads. The
//! engine only emits the data; formatting and delivery (webhook, email) live
//! outside this crate behind the [`Notifier`] trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::common::types::TradingState;

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// Engine alert variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Alert {
    /// The balance crossed into a more restrictive trading state
    BalanceFloor {
        state: TradingState,
        balance: Decimal,
        floor: Decimal,
    },
    /// A buy opportunity cleared every gate
    ProfitableTrade {
        item_name: String,
        price: Decimal,
        expected_profit: Decimal,
        risk_score: f64,
    },
    /// A marketplace call failed
    ApiError { operation: String, message: String },
    /// The circuit breaker opened and outbound calls are suspended
    CircuitOpen {
        failure_count: u32,
        opened_at: DateTime<Utc>,
    },
}

impl Alert {
    pub fn severity(&self) -> AlertSeverity {
        match self {
            Alert::ProfitableTrade { .. } => AlertSeverity::Info,
            Alert::ApiError { .. } => AlertSeverity::Warning,
            Alert::BalanceFloor { state, .. } => match state {
                TradingState::Lockdown | TradingState::Emergency => AlertSeverity::Critical,
                _ => AlertSeverity::Warning,
            },
            Alert::CircuitOpen { .. } => AlertSeverity::Critical,
        }
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        match self {
            Alert::BalanceFloor {
                state,
                balance,
                floor,
            } => format!("balance {} near floor {} (state {})", balance, floor, state),
            Alert::ProfitableTrade {
                item_name,
                price,
                expected_profit,
                risk_score,
            } => format!(
                "{} at {} for expected profit {} (risk {:.1})",
                item_name, price, expected_profit, risk_score
            ),
            Alert::ApiError { operation, message } => {
                format!("API {} failed: {}", operation, message)
            }
            Alert::CircuitOpen {
                failure_count,
                opened_at,
            } => format!(
                "circuit opened at {} after {} failures",
                opened_at, failure_count
            ),
        }
    }
}

/// Consumer of engine alerts
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one alert; delivery is best effort and must not fail the
    /// trading path
    async fn notify(&self, alert: &Alert);
}

/// Notifier that writes alerts to the tracing log
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, alert: &Alert) {
        let summary = alert.summary();
        match alert.severity() {
            AlertSeverity::Info => info!(alert = ?alert, "{}", summary),
            AlertSeverity::Warning => warn!(alert = ?alert, "{}", summary),
            AlertSeverity::Critical => error!(alert = ?alert, "{}", summary),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_severity_mapping() {
        let trade = Alert::ProfitableTrade {
            item_name: "chrome falchion".to_string(),
            price: dec!(28.00),
            expected_profit: dec!(2.80),
            risk_score: 2.5,
        };
        assert_eq!(trade.severity(), AlertSeverity::Info);

        let floor = Alert::BalanceFloor {
            state: TradingState::Lockdown,
            balance: dec!(49.00),
            floor: dec!(50.00),
        };
        assert_eq!(floor.severity(), AlertSeverity::Critical);

        let conservative = Alert::BalanceFloor {
            state: TradingState::Conservative,
            balance: dec!(115.00),
            floor: dec!(100.00),
        };
        assert_eq!(conservative.severity(), AlertSeverity::Warning);
    }

    #[test]
    fn test_summary_contains_payload() {
        let alert = Alert::ApiError {
            operation: "buy_items".to_string(),
            message: "status 502".to_string(),
        };
        assert!(alert.summary().contains("buy_items"));
        assert!(alert.summary().contains("502"));
    }
}
