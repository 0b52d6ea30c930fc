//! Task retry policy

use std::time::Duration;
use tw_db::CancelSignal;

/// Bounded retries with a fixed back-off between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    /// A policy allowing `attempts` tries in total (at least one)
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Decide whether failed attempt number `attempt` (1-based) is followed
    /// by another, waiting out the back-off first.
    ///
    /// Returns false once the budget is spent or the run is cancelled,
    /// including during the back-off.
    pub async fn should_retry(&self, attempt: u32, cancel: &CancelSignal) -> bool {
        if attempt >= self.attempts || cancel.is_cancelled() {
            return false;
        }
        if self.backoff.is_zero() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(self.backoff) => true,
            _ = cancel.cancelled() => false,
        }
    }
}

#[cfg(test)]
#[path = "retry_test.rs"]
mod tests;
