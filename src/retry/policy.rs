//! Retry policies
//!
//! Exponential backoff with jitter for re-running failed tasks and stream pulls.

use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{Result, StreamError};
use crate::stream::{Step, Stream};
use crate::task::Task;

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Backoff multiplier (for exponential backoff)
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays
    pub use_jitter: bool,
    /// Maximum jitter percentage (0.0 to 1.0)
    pub jitter_factor: f64,
    /// Custom retry condition function
    pub retry_condition: Option<fn(&StreamError) -> bool>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            use_jitter: true,
            jitter_factor: 0.1,
            retry_condition: None,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that retries immediately, without backoff.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::default()
            .with_max_attempts(max_attempts)
            .with_initial_delay(Duration::ZERO)
            .with_jitter(false)
    }

    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub const fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub const fn with_jitter(mut self, use_jitter: bool) -> Self {
        self.use_jitter = use_jitter;
        self
    }

    /// Set jitter factor, clamped to `0.0..=1.0`
    pub const fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Replace the default [`StreamError::is_retryable`] check.
    pub fn with_retry_condition(mut self, condition: fn(&StreamError) -> bool) -> Self {
        self.retry_condition = Some(condition);
        self
    }

    /// Check if an error should be retried
    pub fn should_retry(&self, error: &StreamError) -> bool {
        match self.retry_condition {
            Some(condition) => condition(error),
            None => error.is_retryable(),
        }
    }

    /// Delay before the retry following attempt number `attempt` (zero based).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);

        let delay = Duration::from_millis(base_delay as u64).min(self.max_delay);

        if self.use_jitter {
            self.add_jitter(delay)
        } else {
            delay
        }
    }

    fn add_jitter(&self, delay: Duration) -> Duration {
        let mut rng = rand::thread_rng();
        let jitter_range = delay.as_millis() as f64 * self.jitter_factor;
        let jitter = rng.gen_range(-jitter_range..=jitter_range);

        let new_delay = delay.as_millis() as f64 + jitter;
        Duration::from_millis(new_delay.max(0.0) as u64)
    }
}

/// Runs an operation under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Execute `operation` until it succeeds, fails with a non-retryable
    /// error, or runs out of attempts. The last error is returned.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if !self.policy.should_retry(&error) {
                        return Err(error);
                    }
                    if attempt == attempts - 1 {
                        last_error = Some(error);
                        break;
                    }

                    let delay = self.policy.calculate_delay(attempt);
                    tracing::debug!(
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        ?delay,
                        error = %error,
                        "retrying after failure"
                    );
                    last_error = Some(error);
                    sleep(delay).await;
                }
            }
        }

        let error = last_error
            .unwrap_or_else(|| StreamError::internal("retry executor finished without error"));
        tracing::warn!(max_attempts = attempts, error = %error, "retries exhausted");
        Err(error)
    }
}

impl<A: Send + 'static> Task<A> {
    /// Build a task with `factory` and re-build it after each retryable failure.
    ///
    /// Tasks are single-shot, so retrying needs a way to make a fresh one.
    pub fn retry<F>(policy: RetryPolicy, factory: F) -> Self
    where
        F: Fn() -> Task<A> + Send + Sync + 'static,
    {
        Task::from_future(async move {
            RetryExecutor::new(policy)
                .execute(|| factory().run())
                .await
        })
    }
}

impl<A: Send + 'static> Stream<A> {
    /// Re-run each failed pull under `policy`.
    ///
    /// Elements already emitted are unaffected; only the failing pull is
    /// repeated, so this suits sources whose pull is itself idempotent.
    pub fn retry_pulls(self, policy: RetryPolicy) -> Self {
        Stream::from_pull(move || {
            let source = self.clone();
            let tail_policy = policy.clone();
            Task::retry(policy.clone(), move || source.pull()).map(move |step| match step {
                Step::Emit(value, tail) => Step::Emit(value, tail.retry_pulls(tail_policy)),
                Step::Skip(tail) => Step::Skip(tail.retry_pulls(tail_policy)),
                Step::Done => Step::Done,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retry_success_on_second_attempt() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let executor = RetryExecutor::new(RetryPolicy::immediate(3));

        let result = executor
            .execute(|| {
                let counter = counter_clone.clone();
                async move {
                    let count = counter.fetch_add(1, Ordering::SeqCst);
                    if count == 0 {
                        Err(StreamError::production("flaky source"))
                    } else {
                        Ok("success")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("success"));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_exhaustion() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let executor = RetryExecutor::new(RetryPolicy::immediate(2));

        let result: Result<()> = executor
            .execute(|| {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(StreamError::production("down"))
                }
            })
            .await;

        assert_eq!(result, Err(StreamError::production("down")));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let task: Task<()> = Task::retry(RetryPolicy::immediate(5), move || {
            c.fetch_add(1, Ordering::SeqCst);
            Task::fail(StreamError::user("bad input"))
        });
        assert_eq!(task.run().await, Err(StreamError::user("bad input")));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn custom_retry_condition() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let policy = RetryPolicy::immediate(3).with_retry_condition(|e| {
            matches!(e, StreamError::UserFunction(_))
        });
        let task: Task<()> = Task::retry(policy, move || {
            c.fetch_add(1, Ordering::SeqCst);
            Task::fail(StreamError::user("always"))
        });
        assert!(task.run().await.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_pulls_recovers_flaky_source() {
        let failures = Arc::new(AtomicU32::new(0));
        let f = failures.clone();
        let source = Stream::unfold(0u32, move |n| {
            if n == 1 && f.fetch_add(1, Ordering::SeqCst) == 0 {
                return Task::fail(StreamError::production("blip"));
            }
            Task::pure((n < 3).then_some((n, n + 1)))
        });
        let out = source
            .retry_pulls(RetryPolicy::immediate(2))
            .to_list()
            .run()
            .await;
        assert_eq!(out, Ok(vec![0, 1, 2]));
        assert_eq!(failures.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn delay_calculation() {
        let policy = RetryPolicy::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0)
            .with_jitter(false);

        assert_eq!(policy.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(400));
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(3))
            .with_jitter(false);
        assert_eq!(policy.calculate_delay(5), Duration::from_secs(3));
    }
}
