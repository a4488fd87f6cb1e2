//! Reconnection bookkeeping
//!
//! The control channel is retried at a fixed interval while auto-reconnect
//! is enabled. Transport errors seen during an outage are reported once per
//! distinct message so a dead device does not flood observers.

use std::fmt::Display;
use std::time::Duration;

/// Fixed-interval reconnect policy
#[derive(Debug, Clone)]
pub struct ReconnectState {
    /// Whether a closed or failed connection should be retried
    enabled: bool,
    /// Delay between attempts; zero means never retry
    interval: Duration,
}

impl ReconnectState {
    /// Create a disabled policy with the given interval
    pub fn new(interval: Duration) -> Self {
        Self {
            enabled: false,
            interval,
        }
    }

    /// Enable retries (no effect when the interval is zero)
    pub fn enable(&mut self) {
        self.enabled = !self.interval.is_zero();
    }

    /// Disable retries
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Delay before the next attempt, if one should be made
    pub fn next_delay(&self) -> Option<Duration> {
        self.enabled.then_some(self.interval)
    }
}

/// Suppresses consecutive transport errors with the same message
#[derive(Debug, Default)]
pub struct ErrorDedup {
    last: Option<String>,
}

impl ErrorDedup {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `error`; returns whether it differs from the previous one
    pub fn should_report(&mut self, error: &impl Display) -> bool {
        let message = error.to_string();
        if self.last.as_deref() == Some(message.as_str()) {
            return false;
        }
        self.last = Some(message);
        true
    }

    /// Forget the previous error (after a successful connect)
    pub fn clear(&mut self) {
        self.last = None;
    }
}
