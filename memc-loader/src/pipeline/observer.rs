use tracing::{debug, error, info, warn};

use crate::error::{RecordError, StoreError, WriteFailure};
use crate::metrics_consts::{RECORDS_DROPPED, WRITES_FAILED, WRITE_RETRIES};

/// Receives everything workers and loaders want to report while a file is in flight.
pub trait PipelineObserver: Send + Sync {
    fn record_dropped(&self, line: &str, error: &RecordError);

    fn write_retrying(&self, key: &str, attempt: u32, error: &StoreError);

    fn write_failed(&self, device_type: &str, failure: &WriteFailure);

    /// Called each time the loaded row count crosses the progress interval.
    fn progress(&self, rows: u64);
}

/// Logs through `tracing` and counts through `metrics`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn record_dropped(&self, line: &str, error: &RecordError) {
        metrics::counter!(RECORDS_DROPPED, "reason" => error.reason()).increment(1);
        match error {
            RecordError::Encoding(_) | RecordError::QueueClosed(_) => {
                error!("dropping record {:?}: {}", line, error)
            }
            _ => debug!("dropping record {:?}: {}", line, error),
        }
    }

    fn write_retrying(&self, key: &str, attempt: u32, error: &StoreError) {
        metrics::counter!(WRITE_RETRIES).increment(1);
        debug!("write of {} failed on attempt {}: {}, retrying", key, attempt, error);
    }

    fn write_failed(&self, device_type: &str, failure: &WriteFailure) {
        metrics::counter!(WRITES_FAILED, "device_type" => device_type.to_string()).increment(1);
        warn!("{}", failure);
    }

    fn progress(&self, rows: u64) {
        info!(rows, "loaded rows");
    }
}
