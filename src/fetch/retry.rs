//! Retry policy and per-call retry state
//!
//! | Outcome | Action |
//! |---------|--------|
//! | HTTP 200 | Success, stop immediately |
//! | HTTP 429 | Retry while attempts remain |
//! | Transport error | Retry while attempts remain |
//! | Other status, `any-failure` scope | Retry while attempts remain |
//! | 5xx, `server-errors` scope | Retry while attempts remain |
//! | Other status, `server-errors` scope | Fail immediately |

use crate::config::{RetryConfig, RetryScope};
use crate::fetch::error::{FetchErrorKind, ResponseMeta};
use rand::Rng;
use std::time::Duration;

/// Attempt ceiling and backoff shape for one logical fetch
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub jitter: Duration,
    pub scope: RetryScope,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            jitter: Duration::from_millis(config.jitter_ms),
            scope: config.retry_on,
        }
    }
}

/// Delay before zero-based attempt `attempt`
///
/// Attempt 0 is immediate. Attempt k >= 1 waits `base * 2^k` plus a
/// uniform jitter in `[0, jitter)`.
pub fn backoff_delay<R: Rng + ?Sized>(attempt: u32, policy: &RetryPolicy, rng: &mut R) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    let base = policy.backoff_base.saturating_mul(factor);

    let jitter_ms = u64::try_from(policy.jitter.as_millis()).unwrap_or(u64::MAX);
    let jitter = if jitter_ms == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(rng.random_range(0..jitter_ms))
    };

    base.saturating_add(jitter)
}

/// How a response status is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    RateLimited,
    Retryable,
    Fatal,
}

/// Classifies a response status under the given scope
pub fn classify_status(status: u16, scope: RetryScope) -> StatusClass {
    match status {
        200 => StatusClass::Success,
        429 => StatusClass::RateLimited,
        500..=599 => StatusClass::Retryable,
        _ => match scope {
            RetryScope::AnyFailure => StatusClass::Retryable,
            RetryScope::ServerErrors => StatusClass::Fatal,
        },
    }
}

/// Mutable state of one logical fetch; dropped on success or exhaustion
#[derive(Debug, Default)]
pub struct RetryState {
    /// Attempts sent so far
    pub attempts: u32,
    pub last_error: Option<FetchErrorKind>,
    pub last_response: Option<ResponseMeta>,
    /// Backoff applied before the most recent attempt
    pub last_delay: Duration,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    pub fn record_delay(&mut self, delay: Duration) {
        self.last_delay = delay;
    }

    /// Records a failed attempt; a response replaces the previous metadata
    pub fn record_failure(&mut self, kind: FetchErrorKind, response: Option<ResponseMeta>) {
        self.last_error = Some(kind);
        if response.is_some() {
            self.last_response = response;
        }
    }

    /// Consumes the state into the error to surface
    pub fn into_parts(self) -> (u32, Option<FetchErrorKind>, Option<ResponseMeta>) {
        (self.attempts, self.last_error, self.last_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_first_attempt_has_no_delay() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(backoff_delay(0, &RetryPolicy::default(), &mut rng), Duration::ZERO);
    }

    #[test]
    fn test_backoff_bounds_default_policy() {
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(42);

        for attempt in 1..=6u32 {
            let floor = Duration::from_secs(1u64 << attempt);
            let ceiling = floor + Duration::from_millis(1000);
            for _ in 0..200 {
                let delay = backoff_delay(attempt, &policy, &mut rng);
                assert!(delay >= floor, "attempt {attempt}: {delay:?} < {floor:?}");
                assert!(delay < ceiling, "attempt {attempt}: {delay:?} >= {ceiling:?}");
            }
        }
    }

    #[test]
    fn test_backoff_scales_with_base() {
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff_base: Duration::from_millis(10),
            jitter: Duration::ZERO,
            scope: RetryScope::AnyFailure,
        };
        let mut rng = StdRng::seed_from_u64(3);

        assert_eq!(backoff_delay(1, &policy, &mut rng), Duration::from_millis(20));
        assert_eq!(backoff_delay(3, &policy, &mut rng), Duration::from_millis(80));
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(3);
        // Must not panic on absurd attempt numbers.
        let delay = backoff_delay(200, &policy, &mut rng);
        assert!(delay >= Duration::from_secs(1u64 << 31));
    }

    #[test]
    fn test_classify_any_failure() {
        let scope = RetryScope::AnyFailure;
        assert_eq!(classify_status(200, scope), StatusClass::Success);
        assert_eq!(classify_status(429, scope), StatusClass::RateLimited);
        assert_eq!(classify_status(500, scope), StatusClass::Retryable);
        assert_eq!(classify_status(404, scope), StatusClass::Retryable);
        assert_eq!(classify_status(302, scope), StatusClass::Retryable);
        // 204 is a success elsewhere, but only 200 carries a body worth parsing.
        assert_eq!(classify_status(204, scope), StatusClass::Retryable);
    }

    #[test]
    fn test_classify_server_errors() {
        let scope = RetryScope::ServerErrors;
        assert_eq!(classify_status(429, scope), StatusClass::RateLimited);
        assert_eq!(classify_status(503, scope), StatusClass::Retryable);
        assert_eq!(classify_status(404, scope), StatusClass::Fatal);
        assert_eq!(classify_status(301, scope), StatusClass::Fatal);
    }

    #[test]
    fn test_retry_state_keeps_last_response() {
        let mut state = RetryState::new();
        state.record_attempt();
        state.record_failure(
            FetchErrorKind::Status(500),
            Some(ResponseMeta {
                status: 500,
                headers: Default::default(),
            }),
        );
        state.record_attempt();
        state.record_failure(FetchErrorKind::RateLimited, None);

        let (attempts, error, response) = state.into_parts();
        assert_eq!(attempts, 2);
        assert!(matches!(error, Some(FetchErrorKind::RateLimited)));
        assert_eq!(response.map(|r| r.status), Some(500));
    }
}
