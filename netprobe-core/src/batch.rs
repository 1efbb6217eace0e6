//! Concurrent Batch Runner (§4.5): bounded-parallel executor applying a
//! probe to many targets, with per-target timeout, retry-with-backoff,
//! and cancellation on drop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Semaphore;
use tokio::time::timeout;

/// Retry policy: count, base delay, multiplier, optional jitter (§4.5).
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_millis(200),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_retries(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier: 2.0,
            jitter: false,
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        let mut millis = self.base_delay.as_secs_f64() * factor * 1000.0;
        if self.jitter {
            let mut rng = rand::thread_rng();
            millis *= rng.gen_range(0.5..1.5);
        }
        Duration::from_millis(millis.max(0.0) as u64)
    }
}

/// Outcome of running the batch: successes, failures (both in
/// unspecified order per §4.5), and exact totals preserved by `len()`
/// on each vector.
pub struct BatchOutcome<T, E> {
    pub successes: Vec<T>,
    pub failures: Vec<E>,
}

/// A single target's terminal outcome after retries are exhausted.
enum Outcome<T, E> {
    Success(T),
    Failure(E),
}

/// Runs `probe` against every target in `targets`, at most `max_parallel`
/// in flight at once, each attempt bounded by `per_target_timeout`,
/// retrying failures the `should_retry` predicate accepts (and timeouts,
/// which §7 always treats as retryable) up to `retry.max_attempts` total
/// attempts with exponential backoff. `on_timeout` constructs the `E`
/// value recorded when every attempt times out. Neither the probes'
/// runtime errors nor scheduling errors (a panicked task) escape as
/// exceptions: both become a per-target failure record, or — for a
/// panicked task — are simply absent from both result lists, so callers
/// that must account for lost work compare `targets.len()` against
/// `successes.len() + failures.len()` (§4.5).
pub async fn run_batch<T, E, Target, F, Fut>(
    targets: Vec<Target>,
    max_parallel: usize,
    per_target_timeout: Duration,
    retry: RetryPolicy,
    should_retry: impl Fn(&E) -> bool + Send + Sync + 'static,
    on_timeout: impl Fn() -> E + Send + Sync + 'static,
    probe: F,
) -> BatchOutcome<T, E>
where
    Target: Clone + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
    F: Fn(Target) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send,
{
    let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
    let probe = Arc::new(probe);
    let should_retry = Arc::new(should_retry);
    let on_timeout = Arc::new(on_timeout);

    let mut handles = Vec::with_capacity(targets.len());
    for target in targets {
        let semaphore = semaphore.clone();
        let probe = probe.clone();
        let should_retry = should_retry.clone();
        let on_timeout = on_timeout.clone();
        handles.push(tokio::spawn(async move {
            run_one(
                target,
                semaphore,
                probe,
                should_retry,
                on_timeout,
                per_target_timeout,
                retry,
            )
            .await
        }));
    }

    let mut successes = Vec::new();
    let mut failures = Vec::new();
    for handle in handles {
        match handle.await {
            Ok(Outcome::Success(t)) => successes.push(t),
            Ok(Outcome::Failure(e)) => failures.push(e),
            Err(_join_error) => {
                // Scheduling failure (panic/abort): not a probe error,
                // deliberately not surfaced as one either.
            }
        }
    }

    BatchOutcome { successes, failures }
}

async fn run_one<T, E, Target, F, Fut>(
    target: Target,
    semaphore: Arc<Semaphore>,
    probe: Arc<F>,
    should_retry: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    on_timeout: Arc<dyn Fn() -> E + Send + Sync>,
    per_target_timeout: Duration,
    retry: RetryPolicy,
) -> Outcome<T, E>
where
    Target: Clone,
    F: Fn(Target) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, E>> + Send,
{
    let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
    let mut attempt = 0u32;
    loop {
        let is_last_attempt = attempt + 1 >= retry.max_attempts;
        match timeout(per_target_timeout, probe(target.clone())).await {
            Ok(Ok(value)) => return Outcome::Success(value),
            Ok(Err(error)) => {
                if !is_last_attempt && should_retry(&error) {
                    tokio::time::sleep(retry.delay_for_attempt(attempt)).await;
                    attempt += 1;
                    continue;
                }
                return Outcome::Failure(error);
            }
            Err(_elapsed) => {
                if !is_last_attempt {
                    tokio::time::sleep(retry.delay_for_attempt(attempt)).await;
                    attempt += 1;
                    continue;
                }
                return Outcome::Failure(on_timeout());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    enum TestError {
        Timeout,
        Permanent,
    }

    #[tokio::test]
    async fn all_succeed() {
        let targets = vec![1, 2, 3, 4];
        let outcome = run_batch(
            targets,
            2,
            Duration::from_secs(1),
            RetryPolicy::none(),
            |_e: &TestError| false,
            || TestError::Timeout,
            |t: i32| async move { Ok::<i32, TestError>(t * 2) },
        )
        .await;
        assert_eq!(outcome.successes.len(), 4);
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        let outcome = run_batch(
            vec![1],
            1,
            Duration::from_secs(1),
            RetryPolicy::with_retries(3, Duration::from_millis(1)),
            |e: &TestError| matches!(e, TestError::Timeout),
            || TestError::Timeout,
            move |_t: i32| {
                let attempts = attempts_clone.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, TestError>(TestError::Permanent)
                }
            },
        )
        .await;
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retryable_failures_are_retried_up_to_cap() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        let outcome = run_batch(
            vec![1],
            1,
            Duration::from_secs(1),
            RetryPolicy::with_retries(3, Duration::from_millis(1)),
            |e: &TestError| matches!(e, TestError::Timeout),
            || TestError::Timeout,
            move |_t: i32| {
                let attempts = attempts_clone.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, TestError>(TestError::Timeout)
                }
            },
        )
        .await;
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn timeouts_are_retried_and_recorded_via_on_timeout() {
        let outcome: BatchOutcome<i32, TestError> = run_batch(
            vec![1],
            1,
            Duration::from_millis(10),
            RetryPolicy::with_retries(2, Duration::from_millis(1)),
            |_e: &TestError| false,
            || TestError::Timeout,
            |_t: i32| async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<i32, TestError>(0)
            },
        )
        .await;
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0], TestError::Timeout);
    }

    #[tokio::test]
    async fn parallelism_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_observed = Arc::new(AtomicUsize::new(0));
        let targets: Vec<i32> = (0..10).collect();
        let in_flight_c = in_flight.clone();
        let max_observed_c = max_observed.clone();
        let _outcome = run_batch(
            targets,
            3,
            Duration::from_secs(1),
            RetryPolicy::none(),
            |_e: &TestError| false,
            || TestError::Timeout,
            move |_t: i32| {
                let in_flight = in_flight_c.clone();
                let max_observed = max_observed_c.clone();
                async move {
                    let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_observed.fetch_max(current, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<i32, TestError>(0)
                }
            },
        )
        .await;
        assert!(max_observed.load(Ordering::SeqCst) <= 3);
    }
}
