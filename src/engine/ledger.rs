//! Budget ledger - single source of truth for balance and reservations
//!
//! All spend authorization flows through here. The ledger state sits behind
//! one mutex so that check-then-reserve is a single critical section; no
//! lock is ever held across an API call. Workers in this process share one
//! ledger instance, which makes reservations globally visible to every
//! concurrent evaluator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info, warn};

use crate::common::errors::{EngineError, Result};
use crate::common::traits::{MarketApi, TradeStore};
use crate::common::types::{BudgetState, TradingState};
use crate::config::types::BudgetConfig;

/// An ephemeral claim on budget for a pending purchase
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub id: String,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// The budget gate that rejected a spend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetGate {
    HardFloor,
    RiskPerTrade,
    TotalExposure,
    Available,
}

impl std::fmt::Display for BudgetGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BudgetGate::HardFloor => "hard_floor",
            BudgetGate::RiskPerTrade => "risk_per_trade",
            BudgetGate::TotalExposure => "total_exposure",
            BudgetGate::Available => "available",
        };
        write!(f, "{}", name)
    }
}

/// Why a spend was rejected; the first failing gate is reported
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetRejection {
    pub gate: BudgetGate,
    pub reason: String,
}

impl std::fmt::Display for BudgetRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.gate, self.reason)
    }
}

#[derive(Debug)]
struct LedgerState {
    balance: Decimal,
    invested: Decimal,
    realized_profit: Decimal,
    reservations: HashMap<String, Reservation>,
}

impl LedgerState {
    fn reserved_total(&self) -> Decimal {
        self.reservations.values().map(|r| r.amount).sum()
    }
}

/// Thread-safe budget accounting with floor-derived trading states
pub struct BudgetLedger {
    config: BudgetConfig,
    state: Mutex<LedgerState>,
}

impl BudgetLedger {
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LedgerState {
                balance: Decimal::ZERO,
                invested: Decimal::ZERO,
                realized_profit: Decimal::ZERO,
                reservations: HashMap::new(),
            }),
        }
    }

    /// Evaluate the four spend gates against the last-known balance.
    ///
    /// All gates are independent; the first failing one is reported for
    /// diagnostics. Passing here does not hold a claim; use
    /// [`reserve_checked`](Self::reserve_checked) before an actual purchase.
    pub fn can_afford(&self, price: Decimal) -> std::result::Result<(), BudgetRejection> {
        let state = self.state.lock().expect("ledger lock poisoned");
        self.check_gates(&state, price)
    }

    /// Add a reservation without re-checking the budget gates
    pub fn reserve(&self, id: &str, amount: Decimal) -> Result<()> {
        let mut state = self.state.lock().expect("ledger lock poisoned");
        self.insert_reservation(&mut state, id, amount)
    }

    /// Check affordability and reserve in one atomic critical section.
    ///
    /// This is what executors call before a purchase; evaluating the gates
    /// and inserting the reservation under one lock closes the race where
    /// two concurrent evaluations both see sufficient available balance.
    pub fn reserve_checked(&self, id: &str, amount: Decimal) -> Result<()> {
        let mut state = self.state.lock().expect("ledger lock poisoned");
        if state.reservations.contains_key(id) {
            return Err(EngineError::DuplicateReservation(id.to_string()));
        }
        self.check_gates(&state, amount)
            .map_err(|rejection| EngineError::InsufficientBudget(rejection.to_string()))?;
        self.insert_reservation(&mut state, id, amount)
    }

    /// Release a reservation; releasing an unknown id is a logged no-op.
    ///
    /// Returns whether a reservation was actually removed.
    pub fn release(&self, id: &str) -> bool {
        let mut state = self.state.lock().expect("ledger lock poisoned");
        match state.reservations.remove(id) {
            Some(reservation) => {
                debug!(id, amount = %reservation.amount, "released reservation");
                true
            }
            None => {
                warn!(id, "release of unknown reservation ignored");
                false
            }
        }
    }

    /// Trading state derived from the last-known balance
    pub fn trading_state(&self) -> TradingState {
        let state = self.state.lock().expect("ledger lock poisoned");
        self.state_for_balance(state.balance)
    }

    /// Maximum single-trade spend for the given trading state.
    ///
    /// Conservative mode halves position sizing; the other states use the
    /// configured fraction unchanged.
    pub fn per_trade_cap(&self, trading_state: TradingState) -> Decimal {
        let state = self.state.lock().expect("ledger lock poisoned");
        let cap = state.balance * self.config.max_risk_per_trade;
        match trading_state {
            TradingState::Conservative => cap / dec!(2),
            _ => cap,
        }
    }

    /// Last-known balance
    pub fn balance(&self) -> Decimal {
        self.state.lock().expect("ledger lock poisoned").balance
    }

    /// Sum of live reservations
    pub fn reserved_total(&self) -> Decimal {
        self.state
            .lock()
            .expect("ledger lock poisoned")
            .reserved_total()
    }

    /// Immutable snapshot of the current ledger state
    pub fn snapshot(&self) -> BudgetState {
        let state = self.state.lock().expect("ledger lock poisoned");
        self.snapshot_locked(&state)
    }

    /// Apply a completed purchase to the last-known balance
    pub fn commit_purchase(&self, price: Decimal) {
        let mut state = self.state.lock().expect("ledger lock poisoned");
        state.balance -= price;
        state.invested += price;
    }

    /// Apply a completed sale to the last-known balance
    pub fn commit_sale(&self, purchase_price: Decimal, net_proceeds: Decimal) {
        let mut state = self.state.lock().expect("ledger lock poisoned");
        state.balance += net_proceeds;
        state.invested -= purchase_price;
        state.realized_profit += net_proceeds - purchase_price;
    }

    /// Pull the authoritative balance from the API and recompute aggregates.
    ///
    /// The only ledger operation allowed to call external collaborators; all
    /// I/O happens before the lock is taken. Every other operation works off
    /// the last-known balance.
    pub async fn refresh_balance(
        &self,
        api: &dyn MarketApi,
        store: &dyn TradeStore,
    ) -> Result<BudgetState> {
        let balance = api.get_balance().await?;
        let invested = store.invested_total().await?;
        let realized_profit = store.realized_profit().await?;

        let mut state = self.state.lock().expect("ledger lock poisoned");
        state.balance = balance;
        state.invested = invested;
        state.realized_profit = realized_profit;
        let snapshot = self.snapshot_locked(&state);
        drop(state);

        info!(
            balance = %snapshot.balance,
            reserved = %snapshot.reserved,
            invested = %snapshot.invested,
            state = %snapshot.state,
            "refreshed budget"
        );
        Ok(snapshot)
    }

    #[cfg(test)]
    pub(crate) fn set_balance(&self, balance: Decimal) {
        self.state.lock().expect("ledger lock poisoned").balance = balance;
    }

    fn snapshot_locked(&self, state: &LedgerState) -> BudgetState {
        let reserved = state.reserved_total();
        BudgetState {
            balance: state.balance,
            reserved,
            invested: state.invested,
            realized_profit: state.realized_profit,
            available: self.available(state.balance, reserved),
            state: self.state_for_balance(state.balance),
            refreshed_at: Utc::now(),
        }
    }

    fn available(&self, balance: Decimal, reserved: Decimal) -> Decimal {
        balance - reserved - balance * self.config.min_reserve_pct
    }

    fn state_for_balance(&self, balance: Decimal) -> TradingState {
        if balance <= self.config.hard_floor {
            TradingState::Lockdown
        } else if balance <= self.config.soft_floor {
            TradingState::Emergency
        } else if balance <= self.config.soft_floor * dec!(1.2) {
            TradingState::Conservative
        } else {
            TradingState::Normal
        }
    }

    fn check_gates(
        &self,
        state: &LedgerState,
        price: Decimal,
    ) -> std::result::Result<(), BudgetRejection> {
        if state.balance - price <= self.config.hard_floor {
            return Err(BudgetRejection {
                gate: BudgetGate::HardFloor,
                reason: format!(
                    "spending {} would leave {} at or below the hard floor {}",
                    price,
                    state.balance - price,
                    self.config.hard_floor
                ),
            });
        }

        let per_trade_cap = state.balance * self.config.max_risk_per_trade;
        if price > per_trade_cap {
            return Err(BudgetRejection {
                gate: BudgetGate::RiskPerTrade,
                reason: format!("price {} exceeds per-trade cap {}", price, per_trade_cap),
            });
        }

        let exposure_cap = state.balance * self.config.max_total_exposure;
        if state.invested + price > exposure_cap {
            return Err(BudgetRejection {
                gate: BudgetGate::TotalExposure,
                reason: format!(
                    "invested {} plus price {} exceeds exposure cap {}",
                    state.invested, price, exposure_cap
                ),
            });
        }

        let available = self.available(state.balance, state.reserved_total());
        if price > available {
            return Err(BudgetRejection {
                gate: BudgetGate::Available,
                reason: format!("price {} exceeds available {}", price, available),
            });
        }

        Ok(())
    }

    fn insert_reservation(&self, state: &mut LedgerState, id: &str, amount: Decimal) -> Result<()> {
        if state.reservations.contains_key(id) {
            return Err(EngineError::DuplicateReservation(id.to_string()));
        }
        state.reservations.insert(
            id.to_string(),
            Reservation {
                id: id.to_string(),
                amount,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }
}

/// Shared ledger handle for use across worker tasks
pub type SharedLedger = Arc<BudgetLedger>;
