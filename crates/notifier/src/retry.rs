//! Retry executor: run a fallible async operation up to a fixed number of
//! attempts with a constant pause between failures.
//!
//! The executor never fails itself. It reports how the run ended as a
//! [`RetryReport`] and the caller decides what exhaustion means.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Default number of attempts per operation.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default pause between a failed attempt and the next one.
const DEFAULT_DELAY: Duration = Duration::from_secs(2);

/// How many times to attempt an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least 1.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_DELAY)
    }
}

/// Record of a single attempt, logged and then dropped.
#[derive(Debug)]
struct RetryOutcome {
    attempt: u32,
    elapsed: Duration,
    error: Option<String>,
}

impl RetryOutcome {
    fn log(&self, max_attempts: u32) {
        let elapsed_ms = self.elapsed.as_millis() as u64;
        match &self.error {
            None => tracing::info!(
                attempt = self.attempt,
                max_attempts,
                elapsed_ms,
                "Attempt succeeded"
            ),
            Some(error) => tracing::warn!(
                attempt = self.attempt,
                max_attempts,
                elapsed_ms,
                error = %error,
                "Attempt failed"
            ),
        }
    }
}

/// How a retried operation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryReport {
    Succeeded { attempts: u32 },
    Exhausted { attempts: u32, last_error: String },
}

impl RetryReport {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryReport::Succeeded { .. })
    }

    /// Number of times the operation was invoked.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryReport::Succeeded { attempts } | RetryReport::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Invoke `operation` until it succeeds or `policy.max_attempts()` attempts
/// have failed, sleeping `policy.delay()` after every failure except the last.
///
/// Attempts are strictly sequential.
pub async fn execute_with_retry<F, Fut, E>(policy: RetryPolicy, mut operation: F) -> RetryReport
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts;
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        tracing::debug!(attempt, max_attempts, "Executing attempt");

        let started = Instant::now();
        let result = operation().await;
        let outcome = RetryOutcome {
            attempt,
            elapsed: started.elapsed(),
            error: result.err().map(|e| e.to_string()),
        };
        outcome.log(max_attempts);

        match outcome.error {
            None => return RetryReport::Succeeded { attempts: attempt },
            Some(error) => last_error = error,
        }

        if attempt < max_attempts {
            tracing::info!(
                attempt,
                delay_ms = policy.delay.as_millis() as u64,
                "Waiting before next attempt"
            );
            tokio::time::sleep(policy.delay).await;
        }
    }

    tracing::error!(
        attempts = max_attempts,
        error = %last_error,
        "All attempts failed"
    );

    RetryReport::Exhausted {
        attempts: max_attempts,
        last_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Operation that fails its first `failures` invocations.
    fn flaky(failures: u32, calls: &mut u32) -> impl Future<Output = Result<(), String>> + use<> {
        *calls += 1;
        let call = *calls;
        async move {
            if call <= failures {
                Err(format!("failure {call}"))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_policy_clamps_attempts() {
        let policy = RetryPolicy::new(0, Duration::from_millis(5));
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(RetryPolicy::default().max_attempts(), 3);
        assert_eq!(RetryPolicy::default().delay(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success_does_not_wait() {
        let mut calls = 0;
        let start = Instant::now();

        let report = execute_with_retry(RetryPolicy::default(), || flaky(0, &mut calls)).await;

        assert_eq!(report, RetryReport::Succeeded { attempts: 1 });
        assert_eq!(calls, 1);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_twice_then_succeed() {
        let mut calls = 0;
        let start = Instant::now();

        let report = execute_with_retry(RetryPolicy::default(), || flaky(2, &mut calls)).await;

        assert_eq!(report, RetryReport::Succeeded { attempts: 3 });
        assert_eq!(calls, 3);
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_keeps_last_error() {
        let mut calls = 0;
        let start = Instant::now();

        let report = execute_with_retry(RetryPolicy::default(), || flaky(u32::MAX, &mut calls)).await;

        assert_eq!(
            report,
            RetryReport::Exhausted {
                attempts: 3,
                last_error: "failure 3".into()
            }
        );
        assert!(!report.is_success());
        assert_eq!(calls, 3);
        // Two pauses: none after the final attempt.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(4));
        assert!(elapsed < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invocations_never_exceed_max_attempts() {
        for failures in 0..6 {
            let mut calls = 0;
            let policy = RetryPolicy::new(3, Duration::from_millis(10));
            let report = execute_with_retry(policy, || flaky(failures, &mut calls)).await;

            assert_eq!(calls, (failures + 1).min(3));
            assert_eq!(report.attempts(), calls);
            assert_eq!(report.is_success(), failures < 3);
        }
    }
}
