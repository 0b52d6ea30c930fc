//! Runner execution options

use std::time::Duration;
use tw_core::config::ExecutionConfig;
use tw_core::ActionType;

/// Knobs for a single Runner invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Retries after a failed attempt; `0` means exactly one attempt.
    /// Operation actions are never retried.
    pub action_retry_limit: u32,

    /// Delay before each retry
    pub retry_backoff: Duration,

    /// Minimum interval between progress notifications
    pub notification_period: Duration,

    /// Prefix for warehouse job identifiers
    pub job_prefix: Option<String>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            action_retry_limit: 0,
            retry_backoff: Duration::ZERO,
            notification_period: Duration::from_millis(5000),
            job_prefix: None,
        }
    }
}

impl ExecutionOptions {
    /// Attempts each task of an action of `action_type` gets
    pub fn attempts_for(&self, action_type: ActionType) -> u32 {
        match action_type {
            ActionType::Operation => 1,
            ActionType::Table | ActionType::Assertion => {
                self.action_retry_limit.saturating_add(1)
            }
        }
    }
}

impl From<&ExecutionConfig> for ExecutionOptions {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            action_retry_limit: config.action_retry_limit,
            retry_backoff: config.retry_backoff(),
            notification_period: config.notification_period(),
            job_prefix: config.job_prefix.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ExecutionOptions::default();
        assert_eq!(options.notification_period, Duration::from_secs(5));
        assert_eq!(options.attempts_for(ActionType::Table), 1);
    }

    #[test]
    fn test_attempts_per_action_type() {
        let options = ExecutionOptions {
            action_retry_limit: 2,
            ..Default::default()
        };
        assert_eq!(options.attempts_for(ActionType::Table), 3);
        assert_eq!(options.attempts_for(ActionType::Assertion), 3);
        assert_eq!(options.attempts_for(ActionType::Operation), 1);
    }

    #[test]
    fn test_from_config() {
        let config = ExecutionConfig {
            action_retry_limit: 1,
            retry_backoff_ms: 10,
            notification_period_ms: 100,
            job_prefix: Some("tw".to_string()),
        };
        let options = ExecutionOptions::from(&config);
        assert_eq!(options.action_retry_limit, 1);
        assert_eq!(options.retry_backoff, Duration::from_millis(10));
        assert_eq!(options.notification_period, Duration::from_millis(100));
        assert_eq!(options.job_prefix.as_deref(), Some("tw"));
    }
}
