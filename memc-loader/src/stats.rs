use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every worker and loader of a single file run.
#[derive(Debug, Default)]
pub struct RunStats {
    errors: AtomicU64,
    processed: AtomicU64,
    rows: AtomicU64,
}

/// A point-in-time copy of `RunStats`, handed to finalization once a run has drained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub errors: u64,
    pub processed: u64,
    pub rows: u64,
}

impl RunSummary {
    /// Failed rows per loaded row. A run that loaded nothing but failed something is infinitely
    /// bad, an empty run is perfect.
    pub fn error_rate(&self) -> f64 {
        match (self.errors, self.processed) {
            (0, _) => 0.0,
            (_, 0) => f64::INFINITY,
            (errors, processed) => errors as f64 / processed as f64,
        }
    }
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one loaded row and return the new total.
    pub fn record_row(&self) -> u64 {
        self.rows.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            errors: self.errors.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            rows: self.rows.load(Ordering::Relaxed),
        }
    }
}
