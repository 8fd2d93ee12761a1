//! Reconnect delay policy shared by both channels.
//!
//! Deterministic exponential backoff: 1s, 2s, 4s, ... capped at 30s.  Pure
//! arithmetic so tests can assert exact values.

use std::time::Duration;

/// Delay schedule parameters.
///
/// `Default` is the production policy (1s base, 30s cap); integration tests
/// shrink the base to keep wall-clock time down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            cap: Duration::from_millis(30_000),
        }
    }
}

impl BackoffPolicy {
    /// Delay before reconnect attempt `attempt` (1-based).
    ///
    /// `min(base * 2^(attempt - 1), cap)`; attempt 0 means an initial dial
    /// and gets no delay.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        // Shifts past 31 are far beyond any sane cap; clamp to avoid overflow.
        let factor = 1u32 << (attempt - 1).min(31);
        self.cap.min(self.base.saturating_mul(factor))
    }
}
