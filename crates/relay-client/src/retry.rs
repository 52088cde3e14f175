//! Retry policy for the invocation pipeline.

use std::time::Duration;

use relay_common::config::RetrySettings;

/// Governs the retry loop around transport sends.
///
/// `max_retries` is the number of retries after the first attempt, so the
/// total attempt count is `max_retries + 1`. Only network-class errors are
/// retried; business and framework errors end the loop immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Prefer an instance that has not failed yet in this call.
    pub switch_instance_on_retry: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            timeout: Duration::from_secs(3),
            switch_instance_on_retry: true,
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            timeout: Duration::from_millis(settings.timeout_ms),
            switch_instance_on_retry: settings.switch_instance_on_retry,
        }
    }
}
