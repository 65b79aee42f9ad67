//! Core data model shared across the engine

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::money;

/// Liquidity/risk classification of a tradable item
///
/// Tier 1 items are liquid staples, tier 2 items need larger discounts
/// before the engine will touch them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    One,
    Two,
}

impl Tier {
    pub fn as_i16(&self) -> i16 {
        match self {
            Tier::One => 1,
            Tier::Two => 2,
        }
    }
}

impl TryFrom<i16> for Tier {
    type Error = String;

    fn try_from(value: i16) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Tier::One),
            2 => Ok(Tier::Two),
            other => Err(format!("invalid tier: {}", other)),
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_i16())
    }
}

/// Operator-curated definition of a tradable item
///
/// Immutable during a scan; the engine only reads these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub item_name: String,
    pub tier: Tier,
    /// Minimum discount from the 7-day average, in percent
    pub min_discount_pct: Decimal,
    /// Minimum gap to the next-cheapest listing, in percent
    pub min_spread_pct: Decimal,
    /// Profit target applied when computing the sell price, in percent
    pub target_profit_pct: Decimal,
    /// Maximum concurrent holdings of this item
    pub max_holdings: u32,
    pub active: bool,
}

/// Rolling per-item market statistics
///
/// All fields derive from the sales-history aggregate for a single item.
/// Updated periodically by the stats refresh pass; the decision pipelines
/// only ever read a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStats {
    pub item_name: String,
    pub avg_price_7d: Decimal,
    pub avg_price_30d: Decimal,
    pub median_price_30d: Decimal,
    pub min_price_30d: Decimal,
    pub max_price_30d: Decimal,
    /// Standard deviation of 30-day sale prices
    pub std_dev_30d: f64,
    pub sales_count_7d: u32,
    pub sales_count_30d: u32,
    /// Sales velocity over the 30-day window; zero when unknown
    pub sales_per_day: f64,
    pub last_sale_price: Option<Decimal>,
    pub last_sale_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle status of an owned position
///
/// Transitions are strictly forward: holding to listed to sold, or
/// holding/listed to failed. No backward transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Holding,
    Listed,
    Sold,
    Failed,
}

impl PositionStatus {
    /// Whether a transition from `self` to `next` is allowed
    pub fn can_transition_to(&self, next: PositionStatus) -> bool {
        use PositionStatus::*;
        matches!(
            (self, next),
            (Holding, Listed) | (Holding, Failed) | (Listed, Sold) | (Listed, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Holding => "holding",
            PositionStatus::Listed => "listed",
            PositionStatus::Sold => "sold",
            PositionStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for PositionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "holding" => Ok(PositionStatus::Holding),
            "listed" => Ok(PositionStatus::Listed),
            "sold" => Ok(PositionStatus::Sold),
            "failed" => Ok(PositionStatus::Failed),
            other => Err(format!("invalid position status: {}", other)),
        }
    }
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An owned unit of inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// External sale id assigned by the marketplace
    pub sale_id: String,
    pub item_name: String,
    pub purchase_price: Decimal,
    pub purchased_at: DateTime<Utc>,
    /// Computed exactly once at purchase time and never recalculated
    pub target_sell_price: Decimal,
    pub status: PositionStatus,
    pub listed_price: Option<Decimal>,
    pub sold_price: Option<Decimal>,
    pub sold_at: Option<DateTime<Utc>>,
    pub sale_fee: Option<Decimal>,
    pub net_profit: Option<Decimal>,
    /// Risk score at the moment of purchase
    pub risk_score: f64,
}

impl Position {
    /// Create a fresh holding from an executed purchase
    pub fn new(
        sale_id: impl Into<String>,
        item_name: impl Into<String>,
        purchase_price: Decimal,
        target_sell_price: Decimal,
        risk_score: f64,
        purchased_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sale_id: sale_id.into(),
            item_name: item_name.into(),
            purchase_price,
            purchased_at,
            target_sell_price,
            status: PositionStatus::Holding,
            listed_price: None,
            sold_price: None,
            sold_at: None,
            sale_fee: None,
            net_profit: None,
            risk_score,
        }
    }

    /// Whole days this position has been held
    pub fn hold_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.purchased_at).num_days()
    }

    /// Whether this position still counts toward exposure
    pub fn is_open(&self) -> bool {
        matches!(self.status, PositionStatus::Holding | PositionStatus::Listed)
    }
}

/// Derived trading state from the balance floors
///
/// Boundary values belong to the more restrictive state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingState {
    Normal,
    Conservative,
    Emergency,
    Lockdown,
}

impl TradingState {
    /// Whether any buying is allowed in this state
    pub fn allows_buys(&self) -> bool {
        matches!(self, TradingState::Normal | TradingState::Conservative)
    }
}

impl std::fmt::Display for TradingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingState::Normal => write!(f, "normal"),
            TradingState::Conservative => write!(f, "conservative"),
            TradingState::Emergency => write!(f, "emergency"),
            TradingState::Lockdown => write!(f, "lockdown"),
        }
    }
}

/// Immutable snapshot of the budget ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetState {
    pub balance: Decimal,
    /// Sum of live reservations
    pub reserved: Decimal,
    /// Sum of purchase prices of non-sold positions
    pub invested: Decimal,
    pub realized_profit: Decimal,
    /// Spendable amount after reservations and the minimum reserve
    pub available: Decimal,
    pub state: TradingState,
    pub refreshed_at: DateTime<Utc>,
}

/// One external market listing, as fetched from a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Listing id, also usable as the sale id once purchased
    pub listing_id: String,
    pub item_name: String,
    pub price: Decimal,
}

impl Listing {
    pub fn new(listing_id: impl Into<String>, item_name: impl Into<String>, price: Decimal) -> Self {
        Self {
            listing_id: listing_id.into(),
            item_name: item_name.into(),
            price,
        }
    }
}

/// One historical sale of an item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub item_name: String,
    pub price: Decimal,
    pub sold_at: DateTime<Utc>,
}

/// One item in our marketplace inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub sale_id: String,
    pub item_name: String,
    pub listed: bool,
    pub listed_price: Option<Decimal>,
}

/// Request to list an owned item for sale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRequest {
    pub sale_id: String,
    pub price: Decimal,
}

/// Request to change the price of an existing listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub sale_id: String,
    pub new_price: Decimal,
}

/// Result of a buy call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyOutcome {
    pub purchased_ids: Vec<String>,
    pub total_price: Decimal,
}

/// Result of a list call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListOutcome {
    pub listed_ids: Vec<String>,
}

/// Result of a price-edit call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditOutcome {
    pub updated_ids: Vec<String>,
}

/// Kind of balance-changing event recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Buy,
    Sale,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Buy => "buy",
            TransactionKind::Sale => "sale",
        }
    }
}

impl std::str::FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "buy" => Ok(TransactionKind::Buy),
            "sale" => Ok(TransactionKind::Sale),
            other => Err(format!("invalid transaction kind: {}", other)),
        }
    }
}

/// Audit record of one executed trade attempt
///
/// Written for every attempt, success or failure; failures carry the error
/// message and leave the balance unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub kind: TransactionKind,
    pub item_name: String,
    pub sale_id: String,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub success: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Build the record for a successful purchase
    pub fn buy_success(
        item_name: impl Into<String>,
        sale_id: impl Into<String>,
        price: Decimal,
        balance_before: Decimal,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: TransactionKind::Buy,
            item_name: item_name.into(),
            sale_id: sale_id.into(),
            amount: price,
            balance_before,
            balance_after: balance_before - price,
            success: true,
            error: None,
            created_at: at,
        }
    }

    /// Build the record for a failed purchase attempt
    pub fn buy_failure(
        item_name: impl Into<String>,
        sale_id: impl Into<String>,
        price: Decimal,
        balance_before: Decimal,
        error: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: TransactionKind::Buy,
            item_name: item_name.into(),
            sale_id: sale_id.into(),
            amount: price,
            balance_before,
            balance_after: balance_before,
            success: false,
            error: Some(error.into()),
            created_at: at,
        }
    }

    /// Build the record for a completed sale at `price`
    pub fn sale_success(
        item_name: impl Into<String>,
        sale_id: impl Into<String>,
        price: Decimal,
        balance_before: Decimal,
        at: DateTime<Utc>,
    ) -> Self {
        let net = money::net_proceeds(price);
        Self {
            kind: TransactionKind::Sale,
            item_name: item_name.into(),
            sale_id: sale_id.into(),
            amount: price,
            balance_before,
            balance_after: balance_before + net,
            success: true,
            error: None,
            created_at: at,
        }
    }
}
