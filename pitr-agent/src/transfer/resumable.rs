//! Resumable point-to-point file transfer.
//!
//! A transfer tracks how many bytes reached the destination. When an attempt
//! fails, the next one reopens the destination at that offset and either seeks
//! the source there or, for plain streams, first replays the bytes that were
//! read but never written. Delays between attempts double from the base delay
//! up to one minute.

use crate::config::TransferConfig;
use crate::storage::SourceStream;
use crate::utils::errors::{PitrError, Result};
use serde::Serialize;
use std::io::{self, Write};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound for the backoff delay.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Retry configuration for one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed (None = retry forever)
    pub max_attempts: Option<u32>,

    /// Delay before the first retry; doubled for each later one
    pub base_delay: Duration,

    /// Cap on the delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(5),
            base_delay: Duration::from_secs(1),
            max_delay: MAX_RETRY_DELAY,
        }
    }
}

impl From<&TransferConfig> for RetryPolicy {
    fn from(config: &TransferConfig) -> Self {
        Self {
            max_attempts: (config.max_attempts > 0).then_some(config.max_attempts),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: MAX_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Outcome of one `save` call, spanning all of its attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferResult {
    pub ok: bool,
    pub bytes_written: u64,
    pub error: Option<String>,
}

/// The destination side of a transfer.
pub trait RemoteSink {
    /// Create (or truncate) the destination for a fresh transfer.
    fn create(&mut self, path: &str) -> io::Result<Box<dyn Write + '_>>;

    /// Reopen the destination in append mode, positioned at `offset`.
    fn resume(&mut self, path: &str, offset: u64) -> io::Result<Box<dyn Write + '_>>;

    /// Drop any cached connection after a failed attempt.
    fn reset(&mut self) {}
}

enum AttemptError {
    Retryable(io::Error),
    NonRetryable(io::Error),
}

/// Copies a source to a sink, resuming at the last written byte on failure.
pub struct ResumableTransfer<S> {
    sink: S,
    policy: RetryPolicy,
    written: u64,
    attempts: u32,
    /// Read from the source but not accepted by the sink
    pending: Vec<u8>,
    result: TransferResult,
}

impl<S: RemoteSink> ResumableTransfer<S> {
    pub fn new(sink: S, policy: RetryPolicy) -> Self {
        Self {
            sink,
            policy,
            written: 0,
            attempts: 0,
            pending: Vec::new(),
            result: TransferResult::default(),
        }
    }

    /// Result of the most recent `save`.
    pub fn result(&self) -> &TransferResult {
        &self.result
    }

    /// Retries performed by the most recent `save`.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Transfer `source` to `path`, retrying with backoff.
    pub fn save(&mut self, source: &mut dyn SourceStream, path: &str) -> Result<u64> {
        self.written = 0;
        self.attempts = 0;
        self.pending.clear();
        self.result = TransferResult::default();

        loop {
            let error = match self.attempt(source, path) {
                Ok(()) => {
                    self.result.ok = true;
                    self.result.bytes_written = self.written;
                    self.result.error = None;
                    info!(
                        path,
                        bytes = self.written,
                        retries = self.attempts,
                        "Transfer complete"
                    );
                    return Ok(self.written);
                }
                Err(AttemptError::NonRetryable(e)) => {
                    self.result.bytes_written = self.written;
                    self.result.error = Some(e.to_string());
                    return Err(PitrError::NonRetryable(format!(
                        "{} at offset {}: {}",
                        path, self.written, e
                    )));
                }
                Err(AttemptError::Retryable(e)) => e,
            };

            self.result.bytes_written = self.written;
            self.result.error = Some(error.to_string());
            self.sink.reset();

            let attempt_number = self.attempts + 1;
            if let Some(max) = self.policy.max_attempts {
                if attempt_number >= max {
                    return Err(PitrError::MaxRetries {
                        attempts: attempt_number,
                        last_error: format!("{}: {}", path, error),
                    });
                }
            }

            let delay = self.policy.delay_for(self.attempts);
            warn!(
                path,
                written = self.written,
                attempt = attempt_number,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transfer attempt failed, retrying"
            );
            std::thread::sleep(delay);
            self.attempts += 1;
        }
    }

    fn attempt(
        &mut self,
        source: &mut dyn SourceStream,
        path: &str,
    ) -> std::result::Result<(), AttemptError> {
        let offset = self.written;
        if offset > 0 && source.is_seekable() {
            source.resume_at(offset).map_err(AttemptError::NonRetryable)?;
            self.pending.clear();
            debug!(path, offset, "Resuming transfer");
        }

        let mut dest = if offset == 0 {
            self.sink.create(path)
        } else {
            self.sink.resume(path, offset)
        }
        .map_err(AttemptError::Retryable)?;

        if !self.pending.is_empty() {
            let carried = std::mem::take(&mut self.pending);
            write_counted(&mut *dest, &carried, &mut self.written, &mut self.pending)?;
        }

        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        loop {
            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(AttemptError::Retryable(e)),
            };
            write_counted(&mut *dest, &buf[..n], &mut self.written, &mut self.pending)?;
        }

        dest.flush().map_err(AttemptError::Retryable)
    }
}

/// Write `chunk`, counting every byte the destination accepted. On failure
/// the unaccepted remainder is kept in `pending` for the next attempt.
fn write_counted(
    dest: &mut dyn Write,
    chunk: &[u8],
    written: &mut u64,
    pending: &mut Vec<u8>,
) -> std::result::Result<(), AttemptError> {
    let mut rest = chunk;
    while !rest.is_empty() {
        let error = match dest.write(rest) {
            Ok(0) => io::Error::new(io::ErrorKind::WriteZero, "destination accepted no bytes"),
            Ok(w) => {
                *written += w as u64;
                rest = &rest[w..];
                continue;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => e,
        };
        pending.extend_from_slice(rest);
        return Err(AttemptError::Retryable(error));
    }
    Ok(())
}
