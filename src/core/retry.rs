//! Retry policy configuration for tasks.
//!
//! Constant backoff with a bounded total attempt count.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for a task.
///
/// `max_attempts` counts every invocation of the action, including the first.
/// A policy with `max_attempts = 3` allows the initial attempt plus two
/// retries. A value of 0 is treated like 1: the initial attempt always runs,
/// so every dispatched task reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts permitted.
    pub max_attempts: u32,

    /// Constant delay between attempts.
    #[serde(with = "serde_duration")]
    pub backoff: Duration,
}

impl RetryPolicy {
    /// A policy that runs the action exactly once.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    /// A policy allowing up to `max_attempts` total attempts with a constant
    /// delay between them.
    pub fn attempts(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Whether another attempt is permitted after `attempts_so_far` have run.
    pub fn should_retry(&self, attempts_so_far: u32) -> bool {
        attempts_so_far < self.max_attempts
    }

    /// Delay to wait before the next attempt.
    pub fn backoff_delay(&self) -> Duration {
        self.backoff
    }
}

impl Default for RetryPolicy {
    /// Default policy: a single attempt, no retries.
    fn default() -> Self {
        Self::once()
    }
}

/// Serde helper: store the backoff as whole seconds, matching the YAML
/// pipeline format.
mod serde_duration {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_single_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 1);
        assert!(!policy.should_retry(1));
    }

    #[test]
    fn test_should_retry_respects_total_attempts() {
        let policy = RetryPolicy::attempts(3, Duration::from_secs(1));

        // Initial attempt failed: two retries remain.
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        // Third attempt done: budget exhausted.
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(4));
    }

    #[test]
    fn test_backoff_delay_is_constant() {
        let delay = Duration::from_millis(500);
        let policy = RetryPolicy::attempts(2, delay);
        assert_eq!(policy.backoff_delay(), delay);
    }

    #[test]
    fn test_zero_attempts_never_retries() {
        // The executor still runs the initial attempt; the policy just never
        // grants a second one.
        let policy = RetryPolicy::attempts(0, Duration::ZERO);
        assert!(!policy.should_retry(1));
    }

    #[test]
    fn test_policy_serialization() {
        let policy = RetryPolicy::attempts(3, Duration::from_secs(10));
        let json = serde_json::to_string(&policy).expect("serialize");
        assert!(json.contains("\"backoff\":10"));
        let back: RetryPolicy = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(policy, back);
    }
}
