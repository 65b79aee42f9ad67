//! Configuration types

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::common::errors::{EngineError, Result};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Marketplace API configuration
    pub marketplace: MarketplaceConfig,
    /// Budget floors and exposure limits
    pub budget: BudgetConfig,
    /// Scan cadence and trading behavior
    #[serde(default)]
    pub trading: TradingConfig,
    /// Outbound request rate limiting
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Circuit breaker thresholds
    #[serde(default)]
    pub circuit: CircuitConfig,
    /// Worker pool draining the opportunity queue
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

impl AppConfig {
    /// Validate cross-field invariants that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.budget.hard_floor < Decimal::ZERO {
            return Err(EngineError::Configuration(
                "hard_floor must be non-negative".to_string(),
            ));
        }
        if self.budget.soft_floor <= self.budget.hard_floor {
            return Err(EngineError::Configuration(format!(
                "soft_floor ({}) must be above hard_floor ({})",
                self.budget.soft_floor, self.budget.hard_floor
            )));
        }
        for (name, value) in [
            ("max_risk_per_trade", self.budget.max_risk_per_trade),
            ("max_total_exposure", self.budget.max_total_exposure),
            ("min_reserve_pct", self.budget.min_reserve_pct),
        ] {
            if value <= Decimal::ZERO || value > Decimal::ONE {
                return Err(EngineError::Configuration(format!(
                    "{} must be a fraction in (0, 1], got {}",
                    name, value
                )));
            }
        }
        url::Url::parse(&self.marketplace.base_url)
            .map_err(|e| EngineError::Configuration(format!("invalid base_url: {}", e)))?;
        if self.worker.concurrency == 0 {
            return Err(EngineError::Configuration(
                "worker concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Marketplace platform configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceConfig {
    /// API key for authenticated requests
    #[serde(default)]
    pub api_key: Option<String>,
    /// API secret for signing requests (base64 encoded)
    #[serde(default)]
    pub api_secret: Option<String>,
    /// Base URL for the marketplace REST API
    #[serde(default = "default_marketplace_url")]
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_secret: None,
            base_url: default_marketplace_url(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_marketplace_url() -> String {
    "https://api.marketplace.example".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

/// Budget floors and exposure limits
///
/// `hard_floor` halts all trading when touched; `soft_floor` triggers the
/// emergency state; fractions are of the current balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub hard_floor: Decimal,
    pub soft_floor: Decimal,
    /// Maximum single-trade spend as a fraction of balance
    #[serde(default = "default_max_risk_per_trade")]
    pub max_risk_per_trade: Decimal,
    /// Maximum invested total as a fraction of balance
    #[serde(default = "default_max_total_exposure")]
    pub max_total_exposure: Decimal,
    /// Fraction of balance always kept unspendable
    #[serde(default = "default_min_reserve_pct")]
    pub min_reserve_pct: Decimal,
}

fn default_max_risk_per_trade() -> Decimal {
    dec!(0.05)
}

fn default_max_total_exposure() -> Decimal {
    dec!(0.60)
}

fn default_min_reserve_pct() -> Decimal {
    dec!(0.10)
}

/// Scan cadence and trading behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Interval between buy scans in seconds
    #[serde(default = "default_buy_scan_interval")]
    pub buy_scan_interval_seconds: u64,
    /// Interval between sell scans in seconds
    #[serde(default = "default_sell_scan_interval")]
    pub sell_scan_interval_seconds: u64,
    /// Interval between balance refreshes in seconds
    #[serde(default = "default_balance_refresh_interval")]
    pub balance_refresh_interval_seconds: u64,
    /// Interval between market stats refreshes in seconds
    #[serde(default = "default_stats_refresh_interval")]
    pub stats_refresh_interval_seconds: u64,
    /// Evaluate and log decisions without publishing opportunities
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            buy_scan_interval_seconds: default_buy_scan_interval(),
            sell_scan_interval_seconds: default_sell_scan_interval(),
            balance_refresh_interval_seconds: default_balance_refresh_interval(),
            stats_refresh_interval_seconds: default_stats_refresh_interval(),
            dry_run: false,
        }
    }
}

fn default_buy_scan_interval() -> u64 {
    120
}

fn default_sell_scan_interval() -> u64 {
    300
}

fn default_balance_refresh_interval() -> u64 {
    60
}

fn default_stats_refresh_interval() -> u64 {
    3600
}

/// Outbound request rate limiting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Fixed window length in seconds
    #[serde(default = "default_rate_window")]
    pub window_seconds: u64,
    /// Maximum requests per window
    #[serde(default = "default_rate_max_requests")]
    pub max_requests: u32,
    /// Flat delay between consecutive requests in milliseconds
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_rate_window(),
            max_requests: default_rate_max_requests(),
            min_interval_ms: default_min_interval_ms(),
        }
    }
}

fn default_rate_window() -> u64 {
    60
}

fn default_rate_max_requests() -> u32 {
    30
}

fn default_min_interval_ms() -> u64 {
    100
}

/// Circuit breaker thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitConfig {
    /// Consecutive failures before the circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Seconds the circuit stays open before allowing a probe
    #[serde(default = "default_recovery_timeout")]
    pub recovery_timeout_seconds: u64,
}

impl CircuitConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_seconds)
    }
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_seconds: default_recovery_timeout(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    10
}

fn default_recovery_timeout() -> u64 {
    300
}

/// Worker pool draining the opportunity queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent workers
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    /// Maximum delivery attempts before dead-lettering
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Opportunity queue buffer size
    #[serde(default = "default_queue_size")]
    pub queue_size: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            queue_size: default_queue_size(),
        }
    }
}

fn default_concurrency() -> u32 {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_queue_size() -> u32 {
    1000
}

/// Database configuration for the decision engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_connection_timeout() -> u64 {
    30
}

/// API credentials for authenticated requests
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl ApiCredentials {
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self {
            api_key,
            api_secret,
        }
    }

    /// Build credentials when both halves are configured
    pub fn from_config(config: &MarketplaceConfig) -> Option<Self> {
        match (&config.api_key, &config.api_secret) {
            (Some(key), Some(secret)) => Some(Self::new(key.clone(), secret.clone())),
            _ => None,
        }
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
