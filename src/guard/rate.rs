//! Fixed-window rate limiter for outbound marketplace calls
//!
//! Bounds request volume to a per-window quota plus a flat inter-request
//! delay. The limiter never sleeps; on exhaustion it hands the caller a
//! retry-after duration and the guarded client decides how to wait.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::types::RateLimitConfig;

/// Outcome of asking the limiter for a request slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Slot granted; apply `delay` before sending to honor request spacing
    Granted { delay: Duration },
    /// Window quota exhausted; retry once `retry_after` has passed
    Exhausted { retry_after: Duration },
}

#[derive(Debug)]
struct Window {
    window_start: Instant,
    count: u32,
    last_request: Option<Instant>,
}

/// Fixed-window request counter
///
/// The window resets on expiry rather than sliding; mid-window exhaustion
/// reports the time remaining until the reset.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    window: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            window: Mutex::new(Window {
                window_start: Instant::now(),
                count: 0,
                last_request: None,
            }),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RateLimitConfig::default())
    }

    /// Ask for a request slot
    pub fn try_acquire(&self) -> Admission {
        let mut window = self.window.lock().expect("rate limiter lock poisoned");
        let now = Instant::now();

        if now.duration_since(window.window_start) >= self.config.window() {
            window.window_start = now;
            window.count = 0;
        }

        if window.count >= self.config.max_requests {
            let elapsed = now.duration_since(window.window_start);
            let retry_after = self.config.window().saturating_sub(elapsed);
            return Admission::Exhausted { retry_after };
        }

        window.count += 1;
        let delay = match window.last_request {
            Some(last) => self
                .config
                .min_interval()
                .saturating_sub(now.duration_since(last)),
            None => Duration::ZERO,
        };
        window.last_request = Some(now + delay);
        Admission::Granted { delay }
    }

    /// Requests already spent in the current window
    pub fn current_count(&self) -> u32 {
        self.window.lock().expect("rate limiter lock poisoned").count
    }

    #[cfg(test)]
    fn backdate_window(&self, by: Duration) {
        let mut window = self.window.lock().unwrap();
        window.window_start -= by;
    }
}
