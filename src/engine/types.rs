//! Decision pipeline outcome types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::types::Tier;

/// An accepted buy decision, ready for execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyOpportunity {
    /// External listing id; becomes the sale id of the resulting position
    pub sale_id: String,
    pub item_name: String,
    pub price: Decimal,
    /// Fixed at decision time; never recalculated after purchase
    pub target_sell_price: Decimal,
    pub expected_profit: Decimal,
    pub risk_score: f64,
    pub tier: Tier,
    pub discount_pct: Decimal,
    /// None when no next-cheapest listing was known and the spread gate was
    /// skipped
    pub spread_pct: Option<Decimal>,
}

/// What the sell executor should do with a position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SellAction {
    /// Put a holding up for sale at the given price
    List { price: Decimal },
    /// Move an existing listing to the given price
    Adjust { price: Decimal },
}

/// An accepted sell decision, ready for execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellOpportunity {
    pub sale_id: String,
    pub item_name: String,
    pub action: SellAction,
    pub reason: String,
}

/// Queued unit of work for the executor pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Opportunity {
    Buy(BuyOpportunity),
    Sell(SellOpportunity),
}

impl Opportunity {
    /// The external id this opportunity acts on
    pub fn sale_id(&self) -> &str {
        match self {
            Opportunity::Buy(op) => &op.sale_id,
            Opportunity::Sell(op) => &op.sale_id,
        }
    }

    pub fn item_name(&self) -> &str {
        match self {
            Opportunity::Buy(op) => &op.item_name,
            Opportunity::Sell(op) => &op.item_name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Opportunity::Buy(_) => "buy",
            Opportunity::Sell(_) => "sell",
        }
    }
}

/// The gate that rejected a buy candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuyGate {
    TradingHalted,
    Whitelist,
    Discount,
    Spread,
    Budget,
    Portfolio,
    History,
    Risk,
}

impl std::fmt::Display for BuyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BuyGate::TradingHalted => "trading_halted",
            BuyGate::Whitelist => "whitelist",
            BuyGate::Discount => "discount",
            BuyGate::Spread => "spread",
            BuyGate::Budget => "budget",
            BuyGate::Portfolio => "portfolio",
            BuyGate::History => "history",
            BuyGate::Risk => "risk",
        };
        write!(f, "{}", name)
    }
}

/// A rejected buy candidate
///
/// Rejections are normal pipeline results, not errors; the gate name and
/// reason feed dry-run auditing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyRejection {
    pub gate: BuyGate,
    pub reason: String,
}

impl BuyRejection {
    pub fn new(gate: BuyGate, reason: impl Into<String>) -> Self {
        Self {
            gate,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for BuyRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.gate, self.reason)
    }
}

/// Outcome of evaluating one listing through the buy pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum BuyEvaluation {
    Accepted(BuyOpportunity),
    Rejected(BuyRejection),
}

impl BuyEvaluation {
    pub fn is_accepted(&self) -> bool {
        matches!(self, BuyEvaluation::Accepted(_))
    }
}

/// Outcome of evaluating one position through the sell pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum SellEvaluation {
    Act(SellOpportunity),
    Hold { reason: String },
}

impl SellEvaluation {
    pub fn is_hold(&self) -> bool {
        matches!(self, SellEvaluation::Hold { .. })
    }
}
