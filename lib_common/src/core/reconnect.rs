//! # Reconnect Policies
//!
//! The session never reconnects on its own. When the transport drops a
//! connection it asks the injected policy whether, and after how long, a new
//! activation should follow.

use std::time::Duration;

/// Decides whether a dropped connection is re-activated.
pub trait ReconnectPolicy: Send + Sync {
    /// Delay before re-activation number `attempt` (zero-based, reset whenever a
    /// connection opens), or `None` to stay closed.
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

/// Stays closed. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReconnect;

impl ReconnectPolicy for NoReconnect {
    fn next_delay(&self, _attempt: u32) -> Option<Duration> {
        None
    }
}

/// Doubles the delay after every failed attempt, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    max_attempts: u32,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self { base, max, max_attempts }
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = 2_u32.saturating_pow(attempt);
        Some(self.base.saturating_mul(factor).min(self.max))
    }
}
