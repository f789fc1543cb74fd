use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Reasons a raw line is rejected by the parser.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected 5 tab separated fields, found {0}")]
    WrongFieldCount(usize),
    #[error("device type or device id is empty")]
    MissingIdentifier,
}

impl ParseError {
    pub fn reason(&self) -> &'static str {
        match self {
            ParseError::WrongFieldCount(_) => "wrong_field_count",
            ParseError::MissingIdentifier => "missing_identifier",
        }
    }
}

#[derive(Error, Debug)]
#[error("failed to encode record: {0}")]
pub struct EncodeError(#[from] prost::EncodeError);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no target configured for device type {0:?}")]
pub struct UnknownDeviceType(pub String);

/// Errors a single store write attempt can end with.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Io(#[from] io::Error),
    #[error("store write timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected store response: {0:?}")]
    UnexpectedResponse(String),
    #[error("invalid store key: {0:?}")]
    InvalidKey(String),
    #[error("store client is closed")]
    Closed,
}

impl StoreError {
    /// Keys are checked before anything is sent, so a rejected key fails the same way every time.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StoreError::InvalidKey(_))
    }
}

/// Why a line never made it onto a target queue. Each one costs the run one error.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("malformed record: {0}")]
    Malformed(#[from] ParseError),
    #[error(transparent)]
    Encoding(#[from] EncodeError),
    #[error(transparent)]
    UnknownDeviceType(#[from] UnknownDeviceType),
    #[error("queue for device type {0:?} is closed")]
    QueueClosed(String),
}

impl RecordError {
    pub fn reason(&self) -> &'static str {
        match self {
            RecordError::Malformed(e) => e.reason(),
            RecordError::Encoding(_) => "encoding",
            RecordError::UnknownDeviceType(_) => "unknown_device_type",
            RecordError::QueueClosed(_) => "queue_closed",
        }
    }
}

/// A write job that could not be stored within its retry budget.
#[derive(Error, Debug)]
#[error("write of {key} failed after {attempts} attempt(s): {source}")]
pub struct WriteFailure {
    pub key: String,
    pub attempts: u32,
    pub cancelled: bool,
    #[source]
    pub source: StoreError,
}

/// Errors that abort the processing of a whole file.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to open {path}: {source}")]
    SourceOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decompress input: {0}")]
    Decompression(#[source] io::Error),
    #[error("pipeline task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("invalid file pattern: {0}")]
    Pattern(#[from] globset::Error),
    #[error("NORMAL_ERR_RATE must be a finite, non-negative number, got {0}")]
    ErrorRate(f64),
}
