//! Circuit breaker guarding the marketplace API
//!
//! Opens after sustained consecutive failures and rejects all calls without
//! contacting the API. Recovery is probed lazily: once the timeout elapses,
//! the next `check` moves the breaker to half-open and admits exactly one
//! probe request. The probe's outcome decides between closing and reopening.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::common::errors::{EngineError, Result};
use crate::config::types::CircuitConfig;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation, calls allowed
    Closed,
    /// Suspended, calls rejected immediately
    Open,
    /// Testing recovery with a single probe
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Lock-free circuit breaker
///
/// Callers must invoke [`check`](CircuitBreaker::check) before attempting a
/// request and report the outcome with `record_success`/`record_failure`.
pub struct CircuitBreaker {
    config: CircuitConfig,
    /// True while open or half-open
    open: AtomicBool,
    /// True while a recovery probe may run
    half_open: AtomicBool,
    /// Set once the single half-open probe has been handed out
    probe_claimed: AtomicBool,
    /// Consecutive failures within the closed state
    failures: AtomicU32,
    /// Failure count at the moment the circuit last opened
    opened_with_failures: AtomicU32,
    /// Timestamp when the circuit opened (millis since epoch)
    opened_at_ms: AtomicI64,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &self.state())
            .field("failures", &self.failures.load(Ordering::Relaxed))
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            config,
            open: AtomicBool::new(false),
            half_open: AtomicBool::new(false),
            probe_claimed: AtomicBool::new(false),
            failures: AtomicU32::new(0),
            opened_with_failures: AtomicU32::new(0),
            opened_at_ms: AtomicI64::new(0),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CircuitConfig::default())
    }

    /// Gate a request attempt.
    ///
    /// Returns `Ok` while closed. While open, returns `CircuitOpen` until the
    /// recovery timeout elapses, at which point the breaker moves to
    /// half-open and exactly one caller is admitted as the probe; everyone
    /// else keeps getting `CircuitOpen` until the probe reports back.
    pub fn check(&self) -> Result<()> {
        if !self.open.load(Ordering::Acquire) {
            return Ok(());
        }

        let opened_at = self.opened_at_ms.load(Ordering::Acquire);
        let elapsed_ms = Utc::now().timestamp_millis() - opened_at;
        if elapsed_ms < self.config.recovery_timeout().as_millis() as i64 {
            return Err(self.rejection());
        }

        // Recovery timeout elapsed; transition happens here rather than on a
        // timer. Only the winner of the probe claim may proceed.
        self.half_open.store(true, Ordering::Release);
        if self
            .probe_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Ok(())
        } else {
            Err(self.rejection())
        }
    }

    /// Report a successful request.
    ///
    /// Resets the consecutive failure counter; a successful half-open probe
    /// closes the circuit.
    pub fn record_success(&self) {
        if self.half_open.swap(false, Ordering::AcqRel) {
            self.open.store(false, Ordering::Release);
            self.probe_claimed.store(false, Ordering::Release);
        }
        self.failures.store(0, Ordering::Release);
    }

    /// Report a failed request.
    ///
    /// Returns true if this failure opened (or reopened) the circuit.
    pub fn record_failure(&self) -> bool {
        if self.half_open.swap(false, Ordering::AcqRel) {
            // Probe failed, go straight back to open with a fresh timeout
            self.probe_claimed.store(false, Ordering::Release);
            self.opened_at_ms
                .store(Utc::now().timestamp_millis(), Ordering::Release);
            return true;
        }

        if self.open.load(Ordering::Acquire) {
            // Late report from a request that was in flight when we opened
            return false;
        }

        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= self.config.failure_threshold && !self.open.swap(true, Ordering::AcqRel) {
            self.opened_with_failures.store(failures, Ordering::Relaxed);
            self.opened_at_ms
                .store(Utc::now().timestamp_millis(), Ordering::Release);
            return true;
        }
        false
    }

    /// Current state as last observed
    ///
    /// A breaker past its recovery timeout still reports `Open` until a
    /// `check` call performs the transition.
    pub fn state(&self) -> CircuitState {
        if self.open.load(Ordering::Acquire) {
            if self.half_open.load(Ordering::Acquire) {
                CircuitState::HalfOpen
            } else {
                CircuitState::Open
            }
        } else {
            CircuitState::Closed
        }
    }

    /// Consecutive failure count within the closed state
    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }

    /// Timestamp the circuit last opened, if it ever has
    pub fn opened_at(&self) -> Option<chrono::DateTime<Utc>> {
        let ms = self.opened_at_ms.load(Ordering::Acquire);
        if ms == 0 {
            None
        } else {
            chrono::DateTime::from_timestamp_millis(ms)
        }
    }

    fn rejection(&self) -> EngineError {
        EngineError::CircuitOpen {
            failure_count: self.opened_with_failures.load(Ordering::Relaxed),
        }
    }

    #[cfg(test)]
    fn backdate_open(&self, by_ms: i64) {
        self.opened_at_ms.fetch_sub(by_ms, Ordering::AcqRel);
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: u32, recovery_secs: u64) -> CircuitConfig {
        CircuitConfig {
            failure_threshold: threshold,
            recovery_timeout_seconds: recovery_secs,
        }
    }

    #[test]
    fn test_starts_closed() {
        let cb = CircuitBreaker::with_defaults();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.check().is_ok());
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn test_opens_after_threshold_failures() {
        let cb = CircuitBreaker::new(config(10, 300));
        for _ in 0..9 {
            assert!(!cb.record_failure());
            assert!(cb.check().is_ok());
        }
        assert!(cb.record_failure());
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(
            cb.check(),
            Err(EngineError::CircuitOpen { failure_count: 10 })
        ));
    }

    #[test]
    fn test_success_resets_failure_counter() {
        let cb = CircuitBreaker::new(config(10, 300));
        for _ in 0..9 {
            cb.record_failure();
        }
        cb.record_success();
        assert_eq!(cb.failure_count(), 0);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_open_rejects_until_recovery_elapses() {
        let cb = CircuitBreaker::new(config(1, 300));
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.check().is_err());

        cb.backdate_open(301_000);
        assert!(cb.check().is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_allows_exactly_one_probe() {
        let cb = CircuitBreaker::new(config(1, 0));
        cb.record_failure();

        assert!(cb.check().is_ok(), "first check after recovery is the probe");
        assert!(cb.check().is_err(), "second check must wait for the probe");
        assert!(cb.check().is_err());
    }

    #[test]
    fn test_probe_success_closes_and_resets() {
        let cb = CircuitBreaker::new(config(1, 0));
        cb.record_failure();
        assert!(cb.check().is_ok());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
        assert!(cb.check().is_ok());
    }

    #[test]
    fn test_probe_failure_reopens() {
        let cb = CircuitBreaker::new(config(1, 300));
        cb.record_failure();
        cb.backdate_open(301_000);
        assert!(cb.check().is_ok());

        assert!(cb.record_failure());
        assert_eq!(cb.state(), CircuitState::Open);
        // Fresh timeout, still rejecting
        assert!(cb.check().is_err());
    }

    #[test]
    fn test_late_failure_report_while_open_is_ignored() {
        let cb = CircuitBreaker::new(config(1, 300));
        cb.record_failure();
        assert!(!cb.record_failure());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_concurrent_probe_claim() {
        use std::sync::Arc;
        use std::thread;

        let cb = Arc::new(CircuitBreaker::new(config(1, 0)));
        cb.record_failure();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cb = Arc::clone(&cb);
                thread::spawn(move || cb.check().is_ok())
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 1);
    }
}
