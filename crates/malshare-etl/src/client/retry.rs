//! Retry-with-backoff policy
//!
//! Pure arithmetic: given the attempt number and why it failed, decide whether
//! to try again and how long to wait. The client applies it; nothing here
//! sleeps or performs I/O.

use crate::error::TransientCause;
use std::time::Duration;

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first one
    pub max_attempts: u32,
    /// Wait after the first failed attempt
    pub base_delay: Duration,
    /// Growth factor between consecutive waits
    pub multiplier: f64,
    /// Upper bound on any single wait
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `attempt` (1-based) failed
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Backoff after failed attempt `attempt` (1-based):
    /// `base_delay * multiplier^(attempt - 1)`, capped at `max_backoff`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let secs = self.base_delay.as_secs_f64() * factor;

        if !secs.is_finite() || secs >= self.max_backoff.as_secs_f64() {
            return self.max_backoff;
        }
        Duration::from_secs_f64(secs)
    }

    /// Wait before retrying after `cause`; a server-provided `Retry-After`
    /// can lengthen the wait but never past `max_backoff`
    pub fn wait_for(&self, attempt: u32, cause: &TransientCause) -> Duration {
        let backoff = self.backoff(attempt);
        match cause {
            TransientCause::RateLimited {
                retry_after: Some(hint),
            } => backoff.max(*hint).min(self.max_backoff),
            _ => backoff,
        }
    }
}
