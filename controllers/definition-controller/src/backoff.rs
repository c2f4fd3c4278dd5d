//! # Exponential Backoff
//!
//! Per-key retry delays for failed reconciles. Each consecutive failure
//! doubles the delay, starting at the base and capped at the maximum:
//! 5s, 10s, 20s, 40s, 80s, 160s, 300s (max). A successful reconcile resets it.

use std::time::Duration;

/// Exponential backoff calculator
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Delay returned by the next call, in seconds
    current_seconds: u64,
    /// Upper bound, in seconds
    max_seconds: u64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(5, 300)
    }
}

impl ExponentialBackoff {
    /// Create a backoff starting at `base_seconds` and capped at `max_seconds`
    #[must_use]
    pub fn new(base_seconds: u64, max_seconds: u64) -> Self {
        Self {
            current_seconds: base_seconds,
            max_seconds,
        }
    }

    /// Get the next delay and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current_seconds;
        self.current_seconds = self.current_seconds.saturating_mul(2).min(self.max_seconds);
        Duration::from_secs(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_sequence() {
        let mut backoff = ExponentialBackoff::default();

        assert_eq!(backoff.next_backoff(), Duration::from_secs(5));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(10));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(20));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(40));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(80));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(160));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(300)); // max
        assert_eq!(backoff.next_backoff(), Duration::from_secs(300));
    }
}
