//! Resilient call wrapper — exponential backoff under an overall deadline.
//!
//! One invocation of [`call_with_retry`] walks the attempt state machine:
//! each attempt either succeeds, fails fatally (no retry), or fails with a
//! retryable kind and sleeps `initial_delay * backoff_factor^i` before the
//! next one. Each attempt is bounded by `attempt_timeout`; the whole call,
//! sleeps included, by `deadline`. Running out of attempts or of deadline
//! both end as [`RetryError::ExhaustedRetries`].
//!
//! Failures are classified with [`ProviderError::failure_kind`], which looks
//! at the transport/protocol facts only.

use maitre_core::error::ProviderError;
use maitre_core::FailureKind;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Tuning for [`call_with_retry`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Upper bound on the number of calls, first attempt included.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    /// Budget for all attempts and sleeps together.
    pub deadline: Duration,
    /// Budget for a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            deadline: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(20),
        }
    }
}

impl RetryPolicy {
    /// Sleep inserted after the failed attempt `index` (zero-based).
    pub fn delay_for(&self, index: u32) -> Duration {
        let exponent = i32::try_from(index).unwrap_or(i32::MAX);
        let factor = self.backoff_factor.max(1.0).powi(exponent);
        Duration::try_from_secs_f64(self.initial_delay.as_secs_f64() * factor)
            .unwrap_or(self.deadline)
    }

    fn attempts_allowed(&self) -> u32 {
        self.max_retries.max(1)
    }
}

impl From<&maitre_config::RetryConfig> for RetryPolicy {
    fn from(config: &maitre_config::RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            backoff_factor: config.backoff_factor,
            deadline: Duration::from_secs(config.deadline_secs),
            attempt_timeout: Duration::from_secs(config.attempt_timeout_secs),
        }
    }
}

/// One failed attempt that is about to be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAttempt {
    /// Zero-based attempt index.
    pub index: u32,
    /// Sleep before the next attempt.
    pub delay: Duration,
    pub kind: FailureKind,
}

/// Terminal failure of a retried call.
#[derive(Debug, Clone, Error)]
pub enum RetryError {
    /// Every allowed attempt failed with a retryable kind, or the deadline
    /// left no room for another one.
    #[error("gave up after {attempts} attempt(s): {last}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        last: ProviderError,
    },
    /// An attempt failed with a non-retryable kind.
    #[error("fatal failure on attempt {attempts}: {error}")]
    FailedFatal {
        attempts: u32,
        #[source]
        error: ProviderError,
    },
}

impl RetryError {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::ExhaustedRetries { attempts, .. } | Self::FailedFatal { attempts, .. } => {
                *attempts
            }
        }
    }

    /// The error of the last attempt.
    pub fn last_error(&self) -> &ProviderError {
        match self {
            Self::ExhaustedRetries { last, .. } => last,
            Self::FailedFatal { error, .. } => error,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FailedFatal { .. })
    }
}

/// Run `op` until it succeeds, fails fatally, runs out of attempts, or
/// runs out of deadline. `op` receives the zero-based attempt index.
pub async fn call_with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, RetryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let deadline = Instant::now() + policy.deadline;
    let allowed = policy.attempts_allowed();
    let mut index = 0;

    loop {
        let attempt_deadline = (Instant::now() + policy.attempt_timeout).min(deadline);
        let outcome = match tokio::time::timeout_at(attempt_deadline, op(index)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProviderError::Timeout(format!(
                "attempt {} did not finish in time",
                index + 1
            ))),
        };

        let error = match outcome {
            Ok(value) => {
                if index > 0 {
                    info!(attempts = index + 1, "Backend call recovered after retry");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        let attempts = index + 1;
        let kind = error.failure_kind();
        if !kind.is_retryable() {
            warn!(
                attempt = attempts,
                kind = %kind,
                error = %error,
                "Backend call failed, not retrying"
            );
            return Err(RetryError::FailedFatal { attempts, error });
        }
        if attempts >= allowed {
            warn!(attempts, kind = %kind, error = %error, "Backend call exhausted retries");
            return Err(RetryError::ExhaustedRetries {
                attempts,
                last: error,
            });
        }

        let next = RetryAttempt {
            index,
            delay: policy.delay_for(index),
            kind,
        };
        if Instant::now() + next.delay >= deadline {
            warn!(
                attempts,
                delay_ms = next.delay.as_millis() as u64,
                "Backoff would overrun the call deadline, giving up"
            );
            return Err(RetryError::ExhaustedRetries {
                attempts,
                last: error,
            });
        }

        warn!(
            attempt = attempts,
            delay_ms = next.delay.as_millis() as u64,
            kind = %next.kind,
            error = %error,
            "Backend call failed, backing off"
        );
        tokio::time::sleep(next.delay).await;
        debug!(attempt = attempts + 1, "Retrying backend call");
        index += 1;
    }
}

/// [`call_with_retry`], substituting `fallback(&error)` for any terminal
/// failure.
pub async fn call_with_fallback<T, F, Fut, G>(policy: &RetryPolicy, op: F, fallback: G) -> T
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
    G: FnOnce(&RetryError) -> T,
{
    match call_with_retry(policy, op).await {
        Ok(value) => value,
        Err(error) => {
            info!(attempts = error.attempts(), fatal = error.is_fatal(), "Serving fallback");
            fallback(&error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn transport() -> ProviderError {
        ProviderError::Network("connection refused".into())
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_success_calls_once() {
        let calls = AtomicU32::new(0);
        let result = call_with_retry(&RetryPolicy::default(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ProviderError>("ok") }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_transport_failure_stops_at_max_retries() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();
        let log = Arc::clone(&calls);
        let result: Result<(), _> = call_with_retry(&RetryPolicy::default(), move |i| {
            log.lock().unwrap().push((i, start.elapsed()));
            async { Err(transport()) }
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::ExhaustedRetries { attempts: 3, .. }));
        let calls = calls.lock().unwrap();
        let offsets: Vec<u64> = calls.iter().map(|(_, at)| at.as_secs()).collect();
        assert_eq!(offsets, vec![0, 1, 3], "sleeps of 1s then 2s");
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = call_with_retry(&RetryPolicy::default(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::AuthenticationFailed("bad key".into())) }
        })
        .await;
        assert!(result.unwrap_err().is_fatal());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn client_error_is_fatal_but_server_error_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = call_with_retry(&RetryPolicy::default(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ProviderError::ApiError {
                    status_code: 400,
                    message: "bad request".into(),
                })
            }
        })
        .await;
        assert!(result.unwrap_err().is_fatal());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let result = call_with_retry(&RetryPolicy::default(), |i| async move {
            if i < 2 {
                Err(ProviderError::ApiError {
                    status_code: 503,
                    message: "unavailable".into(),
                })
            } else {
                Ok(i)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_recovers() {
        let result = call_with_retry(&RetryPolicy::default(), |i| async move {
            if i == 0 {
                Err(ProviderError::RateLimited {
                    retry_after_secs: 5,
                })
            } else {
                Ok("second time lucky")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "second time lucky");
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_attempt_times_out_as_transport() {
        let policy = RetryPolicy {
            attempt_timeout: Duration::from_secs(5),
            ..RetryPolicy::default()
        };
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = call_with_retry(&policy, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        })
        .await;
        let err = result.unwrap_err();
        assert!(matches!(err.last_error(), ProviderError::Timeout(_)));
        assert_eq!(err.last_error().failure_kind(), FailureKind::Transport);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_caps_total_time() {
        let policy = RetryPolicy {
            max_retries: 10,
            deadline: Duration::from_secs(10),
            ..RetryPolicy::default()
        };
        let start = Instant::now();
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = call_with_retry(&policy, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transport()) }
        })
        .await;

        // Sleeps of 1s, 2s, 4s fit; the next 8s would overrun.
        assert!(matches!(
            result.unwrap_err(),
            RetryError::ExhaustedRetries { attempts: 4, .. }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(start.elapsed() <= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_replaces_failure() {
        let reply = call_with_fallback(
            &RetryPolicy::default(),
            |_| async { Err::<String, _>(transport()) },
            |err| format!("fallback after {}", err.attempts()),
        )
        .await;
        assert_eq!(reply, "fallback after 3");
    }

    #[test]
    fn delays_grow_geometrically() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }

    #[test]
    fn policy_from_config() {
        let config = maitre_config::RetryConfig {
            max_retries: 5,
            initial_delay_ms: 250,
            backoff_factor: 3.0,
            deadline_secs: 12,
            attempt_timeout_secs: 4,
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.delay_for(1), Duration::from_millis(750));
        assert_eq!(policy.deadline, Duration::from_secs(12));
    }
}
