//! Binlog segment replication.
//!
//! A sweep lists every segment in the log directory and copies each one to
//! storage, at most [`MAX_CONCURRENT_TRANSFERS`] at a time. With checksums
//! on, segments whose content was already transferred are skipped. One
//! failing segment never stops the others; all failures are reported
//! together once the sweep finishes.

pub mod checksum;

use crate::fs::walker::{list_segments_sorted, WalkOptions};
use crate::storage::{remote_path, Storage};
use crate::transfer::progress::SweepStats;
use crate::utils::errors::{PitrError, Result, SyncFailures};
use checksum::{compute_digest, ChecksumStore, STATE_FILE_STEM};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

/// Segments transferred in parallel.
pub const MAX_CONCURRENT_TRANSFERS: usize = 10;

/// What one sweep does.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Directory holding the binlog segments
    pub log_dir: PathBuf,

    /// Segment file name prefix (`mysql-bin`)
    pub prefix: String,

    /// Directory prefix for remote paths
    pub remote_dir: String,

    /// Skip segments whose content was already transferred
    pub checksum: bool,

    /// Where to write the JSON report
    pub result_log: Option<PathBuf>,
}

/// JSON report written after each sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub synced: Vec<String>,
    pub skipped: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug)]
enum FileOutcome {
    Synced(u64),
    Skipped,
}

pub struct Syncer {
    storage: Arc<dyn Storage>,
    options: SyncOptions,
}

impl Syncer {
    pub fn new(storage: Arc<dyn Storage>, options: SyncOptions) -> Self {
        Self { storage, options }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Run one sweep over the log directory.
    ///
    /// Every segment is attempted exactly once. The report is written before
    /// returning, also when some segments failed.
    pub async fn run(&self) -> Result<SyncReport> {
        let opts = &self.options;
        let log_dir = opts.log_dir.clone();
        let walk = WalkOptions::with_prefix(opts.prefix.clone());
        let segments = tokio::task::spawn_blocking(move || list_segments_sorted(&log_dir, &walk))
            .await
            .map_err(task_failed)?
            .map_err(|e| PitrError::file(&opts.log_dir, e))?;

        let state_prefix = format!("{}.", STATE_FILE_STEM);
        let segments: Vec<_> = segments
            .into_iter()
            .filter(|s| !s.name.starts_with(&state_prefix))
            .collect();

        info!(
            dir = %opts.log_dir.display(),
            segments = segments.len(),
            target = %self.storage.describe(),
            checksum = opts.checksum,
            "Starting sync sweep"
        );

        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_TRANSFERS));
        let mut handles = Vec::with_capacity(segments.len());

        for segment in segments {
            let sem = Arc::clone(&semaphore);
            let storage = Arc::clone(&self.storage);
            let remote = remote_path(&opts.remote_dir, &segment.name);
            let checksum = opts.checksum;
            let path = segment.path;

            let handle = tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.map_err(|e| {
                    PitrError::Io(io::Error::other(format!("semaphore closed: {}", e)))
                })?;
                tokio::task::spawn_blocking(move || {
                    sync_file(storage.as_ref(), &path, &remote, checksum)
                })
                .await
                .map_err(task_failed)?
            });
            handles.push((segment.name, handle));
        }

        let mut stats = SweepStats::start();
        let mut report = SyncReport::default();
        let mut failures = SyncFailures::default();

        for (name, handle) in handles {
            let outcome = handle.await.map_err(task_failed).and_then(|r| r);
            match outcome {
                Ok(FileOutcome::Synced(bytes)) => {
                    debug!(file = %name, bytes, "Segment synced");
                    stats.record_synced(bytes);
                    report.synced.push(name);
                }
                Ok(FileOutcome::Skipped) => {
                    debug!(file = %name, "Segment already transferred, skipping");
                    stats.record_skipped();
                    report.skipped.push(name);
                }
                Err(e) => {
                    warn!(file = %name, error = %e, "Segment sync failed");
                    stats.record_failed();
                    failures.push(name, e);
                }
            }
        }

        if !failures.is_empty() {
            report.error = Some(failures.to_string());
        }

        if let Some(path) = &opts.result_log {
            if let Err(e) = write_report(path, &report).await {
                warn!(path = %path.display(), error = %e, "Failed to write sync result log");
                if failures.is_empty() {
                    return Err(e);
                }
            }
        }

        info!("Sync sweep finished: {}", stats.summary());
        failures.into_result()?;
        Ok(report)
    }
}

/// Transfer one segment, consulting its checksum state.
fn sync_file(storage: &dyn Storage, path: &Path, remote: &str, checksum: bool) -> Result<FileOutcome> {
    let mut file = File::open(path).map_err(|e| PitrError::file(path, e))?;
    let state = ChecksumStore::new(path);

    if !checksum {
        state.delete_state()?;
        let bytes = storage.save(&mut file, remote)?;
        return Ok(FileOutcome::Synced(bytes));
    }

    // Digest first so a segment that grows mid-transfer is sent again next sweep
    let digest = compute_digest(path)?;
    if state.contains(&digest)? {
        return Ok(FileOutcome::Skipped);
    }

    let bytes = storage.save(&mut file, remote)?;
    state.record(&digest)?;
    Ok(FileOutcome::Synced(bytes))
}

async fn write_report(path: &Path, report: &SyncReport) -> Result<()> {
    let json = serde_json::to_vec_pretty(report)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PitrError::file(parent, e))?;
    }
    tokio::fs::write(path, json)
        .await
        .map_err(|e| PitrError::file(path, e))
}

fn task_failed(e: JoinError) -> PitrError {
    PitrError::Io(io::Error::other(format!("sync task failed: {}", e)))
}
