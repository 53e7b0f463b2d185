//! Bounded fixed-delay retry for invalid model streams.
//!
//! Invalid-stream conditions are assumed transient and rare, so the delay is
//! constant rather than exponential.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

/// Retry budget for re-requesting a stream with the same prompt id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamRetryPolicy {
    /// Additional attempts after the first request.
    pub max_retries: u32,
    pub delay_ms: u64,
}

impl Default for StreamRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl StreamRetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn start(&self) -> RetryState {
        RetryState {
            attempt: 0,
            max: self.max_retries,
            delay: self.delay(),
        }
    }
}

/// Retry counter for one prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
    max: u32,
    delay: Duration,
}

impl RetryState {
    /// Retries consumed so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn exhausted(&self) -> bool {
        self.attempt >= self.max
    }

    /// Consume one retry, returning the delay to wait, or `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.exhausted() {
            return None;
        }
        self.attempt += 1;
        Some(self.delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budget_is_two_retries_of_one_second() {
        let mut state = StreamRetryPolicy::default().start();
        assert_eq!(state.next_delay(), Some(Duration::from_millis(1_000)));
        assert_eq!(state.next_delay(), Some(Duration::from_millis(1_000)));
        assert_eq!(state.next_delay(), None);
        assert_eq!(state.attempt(), 2);
        assert!(state.exhausted());
    }

    #[test]
    fn zero_budget_never_retries() {
        let mut state = StreamRetryPolicy {
            max_retries: 0,
            delay_ms: 5,
        }
        .start();
        assert!(state.exhausted());
        assert_eq!(state.next_delay(), None);
    }
}
