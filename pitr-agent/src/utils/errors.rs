//! Error types for the PITR agent.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PitrError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error on {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Query `{query}` failed: {source}")]
    Query {
        query: &'static str,
        #[source]
        source: mysql_async::Error,
    },

    #[error("Query `{query}` returned an unexpected result: {reason}")]
    UnexpectedResult { query: &'static str, reason: String },

    #[error("Binary logging is disabled on the server (log_bin = {0})")]
    BinlogDisabled(String),

    #[error("No binlog files found in {0}")]
    BinlogsNotFound(PathBuf),

    #[error("Start binlog {0} not found")]
    StartSegmentNotFound(String),

    #[error("Stop position not found: stop datetime is earlier than every event examined")]
    StopPositionNotFound,

    #[error("Failed to read events from {segment}: {reason}")]
    EventStream { segment: PathBuf, reason: String },

    #[error("Non-retryable transfer error: {0}")]
    NonRetryable(String),

    #[error("Max retries reached after {attempts} attempts: {last_error}")]
    MaxRetries { attempts: u32, last_error: String },

    #[error("No binlog coordinate found in dump file {0}")]
    CoordinateNotFound(PathBuf),

    #[error("Command `{command}` failed: {reason}")]
    Command { command: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Sync(#[from] SyncFailures),
}

impl PitrError {
    /// Wrap an I/O error with the path it happened on.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PitrError::File {
            path: path.into(),
            source,
        }
    }
}

/// Every per-file failure from one sync sweep, joined into a single error.
#[derive(Debug, Default)]
pub struct SyncFailures {
    pub failures: Vec<(String, PitrError)>,
}

impl SyncFailures {
    pub fn push(&mut self, file: impl Into<String>, error: PitrError) {
        self.failures.push((file.into(), error));
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// `Ok(())` when nothing failed, otherwise the joined error.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(PitrError::Sync(self))
        }
    }
}

impl fmt::Display for SyncFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} file(s) failed to sync", self.failures.len())?;
        for (file, error) in &self.failures {
            write!(f, "\n{}: {}", file, error)?;
        }
        Ok(())
    }
}

impl std::error::Error for SyncFailures {}

pub type Result<T> = std::result::Result<T, PitrError>;
