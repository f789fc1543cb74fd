use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::encode::encode_record;
use crate::error::RecordError;
use crate::metrics_consts::LINES_RECEIVED;
use crate::parse::parse_line;
use crate::router::RunRoutes;
use crate::stats::RunStats;

use super::observer::PipelineObserver;

/// Stage one: parse, encode and route raw lines until the input channel is closed and drained.
pub(crate) struct ParseWorker {
    pub id: usize,
    pub lines: Arc<Mutex<mpsc::Receiver<String>>>,
    pub routes: RunRoutes,
    pub stats: Arc<RunStats>,
    pub observer: Arc<dyn PipelineObserver>,
}

impl ParseWorker {
    pub async fn run(self) {
        loop {
            // The guard is dropped as soon as a line is taken, so workers only contend on receive
            let next = self.lines.lock().await.recv().await;
            let Some(line) = next else {
                break;
            };
            metrics::counter!(LINES_RECEIVED).increment(1);

            if let Err(error) = route_line(&line, &self.routes).await {
                self.stats.record_error();
                self.observer.record_dropped(&line, &error);
            }
        }
        debug!(worker = self.id, "parse worker finished");
    }
}

/// Blocks while the target queue is full, which is what throttles intake to the slowest store.
pub(crate) async fn route_line(line: &str, routes: &RunRoutes) -> Result<(), RecordError> {
    let record = parse_line(line)?;
    let job = encode_record(&record)?;
    let queue = routes.route(&record.device_type)?;
    queue
        .send(job)
        .await
        .map_err(|_| RecordError::QueueClosed(record.device_type))
}
