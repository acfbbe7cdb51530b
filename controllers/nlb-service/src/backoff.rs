//! # Exponential Backoff
//!
//! Capped exponential backoff used to requeue Services whose reconcile failed.
//! Sequence with the defaults: 5s, 10s, 20s, 40s, ... up to 5m.

use crate::store::ServiceKey;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Exponential backoff calculator
///
/// Each call doubles the delay until `max_seconds` is reached.
/// `reset()` returns to `min_seconds` after a successful reconcile.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    min_seconds: u64,
    current_seconds: u64,
    max_seconds: u64,
}

impl ExponentialBackoff {
    /// Create a backoff starting at `min_seconds` and capped at `max_seconds`.
    #[must_use]
    pub fn new(min_seconds: u64, max_seconds: u64) -> Self {
        Self {
            min_seconds,
            current_seconds: min_seconds,
            max_seconds,
        }
    }

    /// Get the next backoff duration in seconds and advance the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result = self.current_seconds;
        self.current_seconds = self.current_seconds.saturating_mul(2).min(self.max_seconds);
        result
    }

    /// Get the next backoff duration as a `Duration` and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.current_seconds = self.min_seconds;
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(5, 300)
    }
}

/// One [`ExponentialBackoff`] per Service, plus the resync period used after
/// a successful reconcile.
#[derive(Debug)]
pub struct KeyedBackoff {
    template: ExponentialBackoff,
    resync: Duration,
    state: Mutex<HashMap<ServiceKey, ExponentialBackoff>>,
}

impl KeyedBackoff {
    #[must_use]
    pub fn new(template: ExponentialBackoff, resync: Duration) -> Self {
        Self {
            template,
            resync,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Delay before retrying `key` after a failure.
    pub fn on_failure(&self, key: &ServiceKey) -> Duration {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state
            .entry(key.clone())
            .or_insert_with(|| self.template.clone())
            .next_backoff()
    }

    /// Forget the failures of `key` and return the resync period.
    pub fn on_success(&self, key: &ServiceKey) -> Duration {
        self.forget(key);
        self.resync
    }

    pub fn forget(&self, key: &ServiceKey) {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_sequence() {
        let mut backoff = ExponentialBackoff::new(5, 300);

        assert_eq!(backoff.next_backoff_seconds(), 5);
        assert_eq!(backoff.next_backoff_seconds(), 10);
        assert_eq!(backoff.next_backoff_seconds(), 20);
        assert_eq!(backoff.next_backoff_seconds(), 40);
        assert_eq!(backoff.next_backoff_seconds(), 80);
        assert_eq!(backoff.next_backoff_seconds(), 160);
        assert_eq!(backoff.next_backoff_seconds(), 300); // capped
        assert_eq!(backoff.next_backoff_seconds(), 300);
    }

    #[test]
    fn test_exponential_backoff_reset() {
        let mut backoff = ExponentialBackoff::default();

        assert_eq!(backoff.next_backoff(), Duration::from_secs(5));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(10));

        backoff.reset();

        // Should restart from beginning after success
        assert_eq!(backoff.next_backoff(), Duration::from_secs(5));
    }

    #[test]
    fn test_cap_below_min_never_exceeds_min() {
        let mut backoff = ExponentialBackoff::new(60, 60);
        assert_eq!(backoff.next_backoff_seconds(), 60);
        assert_eq!(backoff.next_backoff_seconds(), 60);
    }

    #[test]
    fn test_keyed_backoff_is_per_service() {
        let backoff = KeyedBackoff::new(ExponentialBackoff::new(5, 300), Duration::from_secs(600));
        let web = ServiceKey::new("default", "web");
        let api = ServiceKey::new("default", "api");

        assert_eq!(backoff.on_failure(&web), Duration::from_secs(5));
        assert_eq!(backoff.on_failure(&web), Duration::from_secs(10));
        assert_eq!(backoff.on_failure(&api), Duration::from_secs(5));

        assert_eq!(backoff.on_success(&web), Duration::from_secs(600));
        assert_eq!(backoff.on_failure(&web), Duration::from_secs(5));
        assert_eq!(backoff.on_failure(&api), Duration::from_secs(10));
    }
}
