use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::encode::WriteJob;
use crate::error::WriteFailure;
use crate::metrics_consts::{WRITES_SUCCEEDED, WRITE_TIME};
use crate::router::Target;
use crate::stats::RunStats;
use crate::store::KvStore;

use super::observer::PipelineObserver;

/// Fixed-delay retry budget for store writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts made after the first one fails.
    pub retries: u32,
    /// Wait between two consecutive attempts. There is no backoff and no jitter.
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    pub const fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1))
    }
}

/// Write `job`, retrying up to `policy.retries` more times. Returns the number of attempts used.
///
/// The wait between attempts gives up as soon as `shutdown` is cancelled, and the job is then
/// reported as failed with `cancelled` set.
pub async fn write_with_retry(
    client: &dyn KvStore,
    job: &WriteJob,
    policy: &RetryPolicy,
    shutdown: &CancellationToken,
    observer: &dyn PipelineObserver,
) -> Result<u32, WriteFailure> {
    let mut attempt = 1;
    loop {
        let start = Instant::now();
        let result = client.set(&job.key, &job.payload).await;
        metrics::histogram!(WRITE_TIME).record(start.elapsed().as_millis() as f64);

        let error = match result {
            Ok(()) => return Ok(attempt),
            Err(error) => error,
        };
        if attempt >= policy.max_attempts() || !error.is_retryable() {
            return Err(WriteFailure {
                key: job.key.clone(),
                attempts: attempt,
                cancelled: false,
                source: error,
            });
        }
        observer.write_retrying(&job.key, attempt, &error);

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                return Err(WriteFailure {
                    key: job.key.clone(),
                    attempts: attempt,
                    cancelled: true,
                    source: error,
                });
            }
            _ = tokio::time::sleep(policy.delay) => {}
        }
        attempt += 1;
    }
}

/// Stage two: one of the loaders draining a single target's queue.
pub(crate) struct Loader {
    pub target: Target,
    pub queue: Arc<Mutex<mpsc::Receiver<WriteJob>>>,
    pub retry: RetryPolicy,
    pub progress_interval: u64,
    pub stats: Arc<RunStats>,
    pub observer: Arc<dyn PipelineObserver>,
    pub shutdown: CancellationToken,
}

impl Loader {
    pub async fn run(self) {
        loop {
            let next = self.queue.lock().await.recv().await;
            let Some(job) = next else {
                break;
            };

            match write_with_retry(
                self.target.client.as_ref(),
                &job,
                &self.retry,
                &self.shutdown,
                self.observer.as_ref(),
            )
            .await
            {
                Ok(_) => {
                    metrics::counter!(WRITES_SUCCEEDED).increment(1);
                    self.stats.record_processed();
                }
                Err(failure) => {
                    self.stats.record_error();
                    self.observer.write_failed(&self.target.device_type, &failure);
                }
            }

            let rows = self.stats.record_row();
            if self.progress_interval > 0 && rows % self.progress_interval == 0 {
                self.observer.progress(rows);
            }
        }
        debug!(address = %self.target.address, "loader finished");
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;
    use crate::error::StoreError;
    use crate::pipeline::observer::TracingObserver;
    use crate::store::{MemcacheClient, MockStore};

    // Paused time only moves in whole timer ticks
    fn assert_close(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(5),
            "expected {expected:?}, got {actual:?}"
        );
    }

    fn job(key: &str) -> WriteJob {
        WriteJob {
            key: key.to_string(),
            payload: vec![8, 1],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_failures_with_fixed_delay() {
        let store = MockStore::new().fail_times("idfa:1", 3);
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let start = Instant::now();

        let attempts = write_with_retry(
            &store,
            &job("idfa:1"),
            &policy,
            &CancellationToken::new(),
            &TracingObserver,
        )
        .await
        .unwrap();

        assert_eq!(attempts, 4);
        let calls = store.calls_for("idfa:1");
        assert_eq!(calls.len(), 4);
        assert!(calls[3].succeeded);
        for pair in calls.windows(2) {
            assert_close(pair[1].at - pair[0].at, Duration::from_secs(1));
        }
        assert_close(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries() {
        let store = MockStore::new().always_fail("idfa:1");
        let policy = RetryPolicy::new(2, Duration::from_millis(250));
        let start = Instant::now();

        let failure = write_with_retry(
            &store,
            &job("idfa:1"),
            &policy,
            &CancellationToken::new(),
            &TracingObserver,
        )
        .await
        .unwrap_err();

        assert_eq!(failure.attempts, 3);
        assert!(!failure.cancelled);
        assert_eq!(store.get_calls().len(), 3);
        // No wait after the final attempt
        assert_close(start.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_means_single_attempt() {
        let store = MockStore::new().always_fail("idfa:1");
        let policy = RetryPolicy::new(0, Duration::from_secs(1));

        let failure = write_with_retry(
            &store,
            &job("idfa:1"),
            &policy,
            &CancellationToken::new(),
            &TracingObserver,
        )
        .await
        .unwrap_err();

        assert_eq!(failure.attempts, 1);
        assert_eq!(store.get_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_key_is_not_retried() {
        // Nothing listens here; the key is refused before any connection is attempted
        let client = MemcacheClient::new("127.0.0.1:1", 1, Duration::from_secs(1));
        let start = Instant::now();

        let failure = write_with_retry(
            &client,
            &job("idfa:ID with spaces"),
            &RetryPolicy::default(),
            &CancellationToken::new(),
            &TracingObserver,
        )
        .await
        .unwrap_err();

        assert_eq!(failure.attempts, 1);
        assert!(!failure.cancelled);
        assert!(matches!(failure.source, StoreError::InvalidKey(_)));
        assert_close(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_retry_delay() {
        let store = MockStore::new().always_fail("idfa:1");
        let policy = RetryPolicy::new(5, Duration::from_secs(3600));
        let shutdown = CancellationToken::new();
        let start = Instant::now();

        let canceller = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let failure = write_with_retry(&store, &job("idfa:1"), &policy, &shutdown, &TracingObserver)
            .await
            .unwrap_err();

        assert!(failure.cancelled);
        assert_eq!(failure.attempts, 1);
        assert_eq!(store.get_calls().len(), 1);
        assert!(start.elapsed() < Duration::from_secs(3600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loader_counts_outcomes_and_keeps_going() {
        let store = MockStore::new().always_fail("gaid:bad");
        let (tx, rx) = mpsc::channel(8);
        let stats = Arc::new(RunStats::new());
        let loader = Loader {
            target: Target::new("gaid", "127.0.0.1:1", Arc::new(store.clone())),
            queue: Arc::new(Mutex::new(rx)),
            retry: RetryPolicy::new(1, Duration::from_secs(1)),
            progress_interval: 100,
            stats: stats.clone(),
            observer: Arc::new(TracingObserver),
            shutdown: CancellationToken::new(),
        };

        tx.send(job("gaid:bad")).await.unwrap();
        tx.send(job("gaid:ok1")).await.unwrap();
        tx.send(job("gaid:ok2")).await.unwrap();
        drop(tx);
        loader.run().await;

        let summary = stats.summary();
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.rows, 3);
        assert_eq!(store.stored_keys(), vec!["gaid:ok1", "gaid:ok2"]);
        assert_eq!(store.calls_for("gaid:bad").len(), 2);
    }
}
