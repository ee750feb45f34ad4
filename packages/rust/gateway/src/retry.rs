//! Retry policy for upstream calls.
//!
//! Kept free of I/O so the attempt budget and backoff schedule can be
//! tested without a network or real delays.

use std::time::Duration;

use artmatch_shared::{ArtMatchError, GatewaySettings};

/// HTTP status the upstream uses to signal rate limiting.
pub const RATE_LIMIT_STATUS: u16 = 429;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then try again.
    Retry(Duration),
    /// The error is not retryable; surface it as is.
    Fail,
    /// The attempt budget is spent.
    Exhausted,
}

/// Attempt budget and backoff schedule for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per invocation, including the first.
    pub max_attempts: u32,
    /// Fixed delay after a rate-limited attempt.
    pub rate_limit_backoff: Duration,
    /// Fixed delay after any other transient failure.
    pub failure_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_backoff: Duration::from_secs(2),
            failure_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Policy with no delays, for tests and local fakes.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            rate_limit_backoff: Duration::ZERO,
            failure_backoff: Duration::ZERO,
        }
    }

    pub fn from_settings(settings: &GatewaySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            rate_limit_backoff: settings.rate_limit_backoff,
            failure_backoff: settings.failure_backoff,
        }
    }

    /// Whether `status` means "slow down" rather than "failed".
    pub fn is_rate_limit(&self, status: u16) -> bool {
        status == RATE_LIMIT_STATUS
    }

    /// Decide what follows failed attempt number `attempt` (1-based).
    ///
    /// Rate-limited attempts consume the budget like any other transient failure.
    pub fn decide(&self, attempt: u32, error: &ArtMatchError) -> RetryDecision {
        if !error.is_transient() {
            return RetryDecision::Fail;
        }
        if attempt >= self.max_attempts {
            return RetryDecision::Exhausted;
        }
        match error {
            ArtMatchError::RateLimited { .. } => RetryDecision::Retry(self.rate_limit_backoff),
            _ => RetryDecision::Retry(self.failure_backoff),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            rate_limit_backoff: Duration::from_millis(200),
            failure_backoff: Duration::from_millis(50),
        }
    }

    #[test]
    fn rate_limit_uses_its_own_backoff() {
        let decision = policy().decide(1, &ArtMatchError::RateLimited { status: 429 });
        assert_eq!(decision, RetryDecision::Retry(Duration::from_millis(200)));
    }

    #[test]
    fn transient_failure_uses_failure_backoff() {
        let decision = policy().decide(2, &ArtMatchError::Upstream("HTTP 503".into()));
        assert_eq!(decision, RetryDecision::Retry(Duration::from_millis(50)));
    }

    #[test]
    fn budget_is_shared_by_rate_limits_and_failures() {
        let p = policy();
        assert_eq!(
            p.decide(3, &ArtMatchError::RateLimited { status: 429 }),
            RetryDecision::Exhausted
        );
        assert_eq!(
            p.decide(3, &ArtMatchError::Upstream("reset".into())),
            RetryDecision::Exhausted
        );
    }

    #[test]
    fn format_errors_are_not_retried() {
        assert_eq!(
            policy().decide(1, &ArtMatchError::format("no text field")),
            RetryDecision::Fail
        );
    }

    #[test]
    fn single_attempt_policy_never_retries() {
        let p = RetryPolicy::immediate(1);
        assert_eq!(
            p.decide(1, &ArtMatchError::Upstream("down".into())),
            RetryDecision::Exhausted
        );
    }

    #[test]
    fn only_429_is_rate_limit() {
        let p = policy();
        assert!(p.is_rate_limit(429));
        assert!(!p.is_rate_limit(503));
        assert!(!p.is_rate_limit(200));
    }
}
