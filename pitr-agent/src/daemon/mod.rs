//! Long-running sync mode.

pub mod shutdown;

use crate::sync::Syncer;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub use shutdown::ShutdownCoordinator;

/// Run sync sweeps every `interval` until `cancel` fires. A failed sweep is
/// logged and retried on the next tick. Returns the number of sweeps run.
pub async fn watch(syncer: &Syncer, interval: Duration, cancel: CancellationToken) -> u64 {
    let mut sweeps = 0;
    info!(
        interval_secs = interval.as_secs(),
        dir = %syncer.options().log_dir.display(),
        "Watching binlog directory"
    );

    while !cancel.is_cancelled() {
        match syncer.run().await {
            Ok(report) => info!(
                synced = report.synced.len(),
                skipped = report.skipped.len(),
                "Sweep complete"
            ),
            Err(e) => error!("Sync sweep failed: {}", e),
        }
        sweeps += 1;

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!(sweeps, "Watch loop stopped");
    sweeps
}
