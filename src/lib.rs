//! Tradeguard Library
//!
//! An automated marketplace trading bot built around a strict
//! capital-preservation core: budget ledger, risk scoring, gated buy/sell
//! decision pipelines and guarded execution against the marketplace API.

pub mod alert;
pub mod common;
pub mod config;
pub mod engine;
pub mod executor;
pub mod guard;
pub mod marketplace;
pub mod queue;
pub mod store;

// Re-export commonly used types
pub use common::errors::{EngineError, Result};
pub use common::traits::{MarketApi, TradeStore};
pub use common::types::{
    BudgetState, InventoryItem, Listing, MarketStats, Position, PositionStatus, Sale, Tier,
    TradingState, Transaction, TransactionKind, WhitelistEntry,
};
pub use config::types::AppConfig;
pub use engine::{
    BudgetLedger, BuyDecisionPipeline, BuyEvaluation, BuyGate, BuyOpportunity, Opportunity,
    RiskScorer, Scanner, SellAction, SellDecisionPipeline, SellEvaluation, SellOpportunity,
};
pub use executor::{BuyExecutor, SellExecutor, WorkerPool};
pub use guard::{CircuitBreaker, RateLimiter};
pub use marketplace::{GuardedClient, MarketplaceRestClient};
pub use queue::{Delivery, InMemoryQueue, OpportunityQueue};
pub use store::PgStore;
