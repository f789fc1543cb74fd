//! The two stage load pipeline.
//!
//! Raw lines are fanned out to a pool of parse workers, which route encoded jobs onto one bounded
//! queue per target. Each target queue is drained by its own pool of loaders. A run moves through
//! `Running -> Draining(workers) -> Draining(loaders) -> Done`: the input is closed once the
//! source is exhausted, the target queues are closed only once every worker has exited, and the
//! run returns once every loader has drained its queue.

mod loader;
mod observer;
mod worker;

use std::io;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::PipelineError;
use crate::router::Router;
use crate::source::open_gzip_lines;
use crate::stats::{RunStats, RunSummary};

pub use loader::{write_with_retry, RetryPolicy};
pub use observer::{PipelineObserver, TracingObserver};

use loader::Loader;
use worker::ParseWorker;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
pub const PROGRESS_INTERVAL: u64 = 100;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub workers: usize,
    pub loaders_per_target: usize,
    pub queue_capacity: usize,
    pub retry: RetryPolicy,
    pub progress_interval: u64,
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.worker_count(),
            loaders_per_target: config.loaders,
            queue_capacity: config.queue_capacity,
            retry: RetryPolicy::new(config.retries, config.retry_delay()),
            progress_interval: PROGRESS_INTERVAL,
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            loaders_per_target: 4,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            retry: RetryPolicy::default(),
            progress_interval: PROGRESS_INTERVAL,
        }
    }
}

pub struct Pipeline {
    router: Router,
    options: PipelineOptions,
    observer: Arc<dyn PipelineObserver>,
    shutdown: CancellationToken,
}

impl Pipeline {
    pub fn new(router: Router, options: PipelineOptions) -> Self {
        Self {
            router,
            options,
            observer: Arc::new(TracingObserver),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Cancelling `shutdown` cuts short any retry delay in progress. The run itself still drains.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Load one gzip compressed file.
    pub async fn process_file(&self, path: &Path) -> Result<RunSummary, PipelineError> {
        let lines = open_gzip_lines(path)?;
        self.run(lines).await
    }

    /// Push every line of `lines` through both stages and wait for the run to fully drain.
    ///
    /// A read error from `lines` stops the intake. Lines already accepted are still drained, but
    /// the run then fails with `PipelineError::Decompression`.
    pub async fn run<I>(&self, lines: I) -> Result<RunSummary, PipelineError>
    where
        I: IntoIterator<Item = io::Result<String>> + Send + 'static,
        I::IntoIter: Send,
    {
        let stats = Arc::new(RunStats::new());
        let capacity = self.options.queue_capacity;

        let (line_tx, line_rx) = mpsc::channel::<String>(capacity);
        let line_rx = Arc::new(Mutex::new(line_rx));
        let (routes, queues) = self.router.open_queues(capacity);

        let mut loaders = JoinSet::new();
        for (target, queue) in queues {
            let queue = Arc::new(Mutex::new(queue));
            for _ in 0..self.options.loaders_per_target {
                loaders.spawn(
                    Loader {
                        target: target.clone(),
                        queue: queue.clone(),
                        retry: self.options.retry,
                        progress_interval: self.options.progress_interval,
                        stats: stats.clone(),
                        observer: self.observer.clone(),
                        shutdown: self.shutdown.clone(),
                    }
                    .run(),
                );
            }
        }

        let mut workers = JoinSet::new();
        for id in 0..self.options.workers {
            workers.spawn(
                ParseWorker {
                    id,
                    lines: line_rx.clone(),
                    routes: routes.clone(),
                    stats: stats.clone(),
                    observer: self.observer.clone(),
                }
                .run(),
            );
        }
        drop(line_rx);

        debug!(
            workers = self.options.workers,
            loaders = self.options.loaders_per_target,
            "pipeline running"
        );

        // `line_tx` moves into the reader and is dropped when it returns, closing the input
        let reader = tokio::task::spawn_blocking(move || {
            for line in lines {
                let line = line.map_err(PipelineError::Decompression)?;
                if line_tx.blocking_send(line).is_err() {
                    break;
                }
            }
            Ok::<_, PipelineError>(())
        });
        let read_result = reader.await;

        debug!("input closed, draining workers");
        let workers_result = join_all(&mut workers).await;

        // Only now can no sender be in use, so dropping ours closes every target queue
        drop(routes);
        debug!("workers drained, draining loaders");
        let loaders_result = join_all(&mut loaders).await;

        let summary = stats.summary();
        info!(
            processed = summary.processed,
            errors = summary.errors,
            rows = summary.rows,
            "run drained"
        );
        read_result??;
        workers_result?;
        loaders_result?;
        Ok(summary)
    }
}

// Waits for every task, even after one has failed, and reports the first failure.
async fn join_all(set: &mut JoinSet<()>) -> Result<(), PipelineError> {
    let mut first_error = None;
    while let Some(result) = set.join_next().await {
        if let Err(e) = result {
            error!("pipeline task failed: {}", e);
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
