//! Bounded exponential backoff for store calls.
//!
//! Every store call made by the engine goes through [`retry_on_error`]. The
//! predicate decides which errors are worth another attempt; the engine
//! retries everything except not-found on the delete paths.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Exponential backoff parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the second attempt.
    pub duration: Duration,
    /// Multiplier applied to the delay after each attempt.
    pub factor: f64,
    /// Up to `jitter * delay` of random extra wait.
    pub jitter: f64,
    /// Total number of attempts.
    pub steps: u32,
    /// Upper bound for a single delay.
    pub cap: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(10),
            factor: 5.0,
            jitter: 0.1,
            steps: 4,
            cap: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(steps: u32, duration: Duration) -> Self {
        Self {
            steps,
            duration,
            ..Self::default()
        }
    }

    /// Retries back to back; handy for tests.
    pub fn immediate(steps: u32) -> Self {
        Self::new(steps, Duration::ZERO).jitter(0.0)
    }

    pub fn factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn cap(mut self, cap: Duration) -> Self {
        self.cap = Some(cap);
        self
    }

    /// Number of attempts; a policy always makes at least one.
    pub fn attempts(&self) -> u32 {
        self.steps.max(1)
    }

    /// Delay after the attempt numbered `attempt` (0-based), before jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = if self.factor > 0.0 { self.factor } else { 1.0 };
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.duration.as_secs_f64() * factor.powi(exponent);
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
        match self.cap {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let extra = rand::thread_rng().gen_range(0.0..self.jitter);
        delay.saturating_add(delay.mul_f64(extra))
    }
}

/// Run `operation` until it succeeds, returns an error `retriable` rejects,
/// or the policy runs out of attempts. The last error is returned as is.
pub async fn retry_on_error<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    operation_name: &str,
    retriable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let attempts = policy.attempts();
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if !retriable(&e) {
                    debug!(operation = %operation_name, error = %e, "Not retrying");
                    return Err(e);
                }
                attempt += 1;
                if attempt >= attempts {
                    warn!(
                        operation = %operation_name,
                        attempts = attempt,
                        error = %e,
                        "Giving up after retries"
                    );
                    return Err(e);
                }

                let delay = policy.jittered(policy.delay_for(attempt - 1));
                debug!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_immediately() {
        let result: Result<i32, String> =
            retry_on_error(&RetryPolicy::immediate(3), "op", |_| true, || async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_exhausts_exactly_steps_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = retry_on_error(&RetryPolicy::immediate(4), "op", |_| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("boom".to_string()) }
        })
        .await;

        assert_eq!(result, Err("boom".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry_on_error(&RetryPolicy::immediate(5), "op", |_| true, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("transient".to_string())
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retriable_stops_at_once() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = retry_on_error(
            &RetryPolicy::immediate(4),
            "op",
            |e: &String| e != "fatal",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("fatal".to_string()) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_steps_still_attempts_once() {
        let calls = AtomicU32::new(0);
        let _: Result<(), String> = retry_on_error(&RetryPolicy::immediate(0), "op", |_| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("boom".to_string()) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy::new(4, Duration::from_millis(500))
            .factor(5.0)
            .cap(Duration::from_secs(5));
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2500));
        assert_eq!(policy.delay_for(2), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_bounded() {
        let policy = RetryPolicy::new(2, Duration::from_millis(100)).jitter(0.5);
        for _ in 0..50 {
            let d = policy.jittered(Duration::from_millis(100));
            assert!(d >= Duration::from_millis(100));
            assert!(d < Duration::from_millis(150));
        }
    }
}
