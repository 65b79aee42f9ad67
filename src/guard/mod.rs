//! Guard module - outbound API protection
//!
//! The circuit breaker suspends calls after sustained failure and the rate
//! limiter bounds request volume. Both sit between the executors and the
//! marketplace client (see `marketplace::guard`).

pub mod circuit;
pub mod rate;

pub use circuit::{CircuitBreaker, CircuitState};
pub use rate::{Admission, RateLimiter};
