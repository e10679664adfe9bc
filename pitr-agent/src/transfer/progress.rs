//! Totals for a sync sweep and human-readable formatting for log lines.

use std::time::{Duration, Instant};

/// Aggregate counters for one sweep.
#[derive(Debug, Clone)]
pub struct SweepStats {
    started: Instant,

    /// Bytes written to storage
    pub bytes: u64,

    /// Files transferred
    pub synced: usize,

    /// Files skipped because their content was already transferred
    pub skipped: usize,

    /// Files that failed
    pub failed: usize,
}

impl SweepStats {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            bytes: 0,
            synced: 0,
            skipped: 0,
            failed: 0,
        }
    }

    pub fn record_synced(&mut self, bytes: u64) {
        self.synced += 1;
        self.bytes += bytes;
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn record_failed(&mut self) {
        self.failed += 1;
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Average throughput since the sweep started
    pub fn average_speed(&self) -> u64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            (self.bytes as f64 / elapsed) as u64
        } else {
            0
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} synced ({}), {} skipped, {} failed in {} at {}",
            self.synced,
            format_bytes(self.bytes),
            self.skipped,
            self.failed,
            format_duration(self.elapsed().as_secs()),
            format_speed(self.average_speed())
        )
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
