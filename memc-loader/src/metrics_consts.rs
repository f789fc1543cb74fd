pub const LINES_RECEIVED: &str = "memc_loader_lines_received";
pub const RECORDS_DROPPED: &str = "memc_loader_records_dropped";
pub const INVALID_NUMERIC_FIELDS: &str = "memc_loader_invalid_numeric_fields";
pub const WRITES_SUCCEEDED: &str = "memc_loader_writes_succeeded";
pub const WRITES_FAILED: &str = "memc_loader_writes_failed";
pub const WRITE_RETRIES: &str = "memc_loader_write_retries";
pub const WRITE_TIME: &str = "memc_loader_write_time_ms";
pub const FILES_PROCESSED: &str = "memc_loader_files_processed";
