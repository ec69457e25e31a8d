//! Bounded retries with exponential backoff for transient errors.

use crate::error::Result;
use crate::video::clock::Clock;
use rand::Rng;
use std::future::Future;
use std::time::{Duration, Instant};

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Randomise each delay by up to `jitter_factor` in either direction.
    pub use_jitter: bool,
    /// Maximum jitter fraction (0.0 to 1.0).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            use_jitter: true,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Sets maximum attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, use_jitter: bool) -> Self {
        self.use_jitter = use_jitter;
        self
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped = Duration::from_millis(base_ms.min(u64::MAX as f64) as u64).min(self.max_delay);

        if !self.use_jitter || self.jitter_factor <= 0.0 {
            return capped;
        }
        let range = capped.as_millis() as f64 * self.jitter_factor.clamp(0.0, 1.0);
        let jitter = rand::thread_rng().gen_range(-range..=range);
        Duration::from_millis((capped.as_millis() as f64 + jitter).max(0.0) as u64)
    }

    /// Runs `operation`, retrying retryable errors per this policy.
    ///
    /// A `Retry-After` hint from the server replaces the computed delay,
    /// capped at `max_delay`.
    pub async fn run<F, Fut, T>(&self, clock: &dyn Clock, what: &str, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_until(clock, what, None, operation).await
    }

    /// Like [`run`](Self::run), but never sleeps past `deadline`.
    ///
    /// Retry delays are clamped to the time left. Once the deadline has
    /// passed, the last retryable error is returned instead of retrying.
    pub async fn run_until<F, Fut, T>(
        &self,
        clock: &dyn Clock,
        what: &str,
        deadline: Option<Instant>,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    let mut delay = e
                        .retry_after()
                        .map(|hint| hint.min(self.max_delay))
                        .unwrap_or_else(|| self.delay_for(attempt));
                    if let Some(deadline) = deadline {
                        let remaining = deadline.saturating_duration_since(clock.now());
                        if remaining.is_zero() {
                            tracing::warn!(attempts = attempt + 1, "{what}: deadline reached: {e}");
                            return Err(e);
                        }
                        delay = delay.min(remaining);
                    }
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "{what}: retrying after transient error: {e}"
                    );
                    clock.sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::error!(attempts = attempt + 1, "{what}: giving up: {e}");
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VeoGenError;
    use crate::video::clock::ManualClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn no_jitter() -> RetryPolicy {
        RetryPolicy::default().with_jitter(false)
    }

    #[test]
    fn test_delay_grows_exponentially_and_caps() {
        let policy = no_jitter().with_max_delay(Duration::from_secs(5));
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(5));
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let d = policy.delay_for(1);
            assert!(d >= Duration::from_millis(1800) && d <= Duration::from_millis(2200));
        }
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_until_success() {
        let clock = ManualClock::new();
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result = no_jitter()
            .run(&clock, "poll", move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(VeoGenError::Transient {
                        status: 503,
                        message: "unavailable".into(),
                    })
                } else {
                    Ok(n)
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 2);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let clock = ManualClock::new();
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let err = no_jitter()
            .with_max_attempts(3)
            .run(&clock, "poll", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(VeoGenError::RateLimited { retry_after: None })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VeoGenError::RateLimited { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(clock.sleeps().len(), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_surfaces_immediately() {
        let clock = ManualClock::new();
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let err = no_jitter()
            .run(&clock, "submit", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(VeoGenError::Api {
                    status: 400,
                    message: "bad".into(),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VeoGenError::Api { status: 400, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_retry_after_overrides_backoff() {
        let clock = ManualClock::new();
        let calls = AtomicU32::new(0);
        let calls = &calls;
        no_jitter()
            .run(&clock, "submit", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(VeoGenError::RateLimited {
                        retry_after: Some(Duration::from_secs(12)),
                    })
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap();
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(12)]);
    }

    #[tokio::test]
    async fn test_retry_after_is_capped_at_max_delay() {
        let clock = ManualClock::new();
        let calls = AtomicU32::new(0);
        let calls = &calls;
        no_jitter()
            .run(&clock, "submit", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(VeoGenError::RateLimited {
                        retry_after: Some(Duration::from_secs(3600)),
                    })
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap();
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(30)]);
    }

    #[tokio::test]
    async fn test_deadline_clamps_delay_and_stops_retrying() {
        let clock = ManualClock::new();
        let deadline = clock.now() + Duration::from_secs(5);
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let err = no_jitter()
            .with_max_attempts(10)
            .run_until(&clock, "poll", Some(deadline), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(VeoGenError::RateLimited {
                    retry_after: Some(Duration::from_secs(20)),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VeoGenError::RateLimited { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);
    }
}
