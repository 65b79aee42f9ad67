//! Executor module - side-effect layer for accepted opportunities
//!
//! Executors are the only components that mutate ledger reservations and
//! call the purchase/listing API actions. Each opportunity is driven through
//! its executor exactly once per delivery; the worker pool owns redelivery
//! and dead-lettering.

pub mod buy;
pub mod sell;
pub mod worker;

pub use buy::BuyExecutor;
pub use sell::SellExecutor;
pub use worker::WorkerPool;
