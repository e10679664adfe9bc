//! PITR Agent - Main entry point
//!
//! Binlog replication and point-in-time restore for MySQL.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use pitr_agent::binlog::{BinlogCoordinate, FileEventStream};
use pitr_agent::config::Config;
use pitr_agent::daemon::{self, ShutdownCoordinator};
use pitr_agent::mysql::{dump, position, ClientCredentials};
use pitr_agent::restore::{self, ClientCommand, RestoreExecutor, RestoreOptions};
use pitr_agent::sync::{SyncOptions, Syncer};
use pitr_agent::{storage, utils};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// MySQL DSN (overrides config and MYSQL_DSN)
    #[arg(long, global = true)]
    dsn: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy binlog segments to storage
    Sync {
        /// Binlog directory (queried from the server when omitted)
        #[arg(long, requires = "prefix")]
        binlog_dir: Option<PathBuf>,

        /// Segment file prefix, e.g. mysql-bin
        #[arg(long, requires = "binlog_dir")]
        prefix: Option<String>,

        /// Transfer every segment, ignoring recorded checksums
        #[arg(long)]
        no_checksum: bool,

        /// Write a JSON report of the sweep here
        #[arg(long, value_name = "FILE")]
        result_log: Option<PathBuf>,

        /// Keep syncing until interrupted
        #[arg(long)]
        watch: bool,

        /// Seconds between sweeps in watch mode
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Replay binlogs up to a point in time
    Restore {
        /// Directory holding the binlog segments
        #[arg(long)]
        binlog_dir: PathBuf,

        /// First segment to replay
        #[arg(long, required_unless_present = "dump_file", conflicts_with = "dump_file")]
        start_binlog: Option<String>,

        /// Byte offset in the first segment
        #[arg(long, requires = "start_binlog")]
        start_position: Option<u64>,

        /// Take the start coordinate from a mysqldump file (plain or gzip)
        #[arg(long, value_name = "FILE")]
        dump_file: Option<PathBuf>,

        /// Stop before the first event at or after this time
        /// ("YYYY-MM-DD HH:MM:SS" local time, or RFC 3339)
        #[arg(long)]
        stop_datetime: String,

        /// Print the SQL instead of applying it
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the server's current binlog coordinate as JSON
    Position,

    /// Print the binlog coordinate recorded in a dump file
    Coordinate {
        #[arg(value_name = "DUMP_FILE")]
        dump_file: PathBuf,
    },
}

/// Offset of the first event in a segment, right after the magic bytes.
const FIRST_EVENT_POSITION: u64 = 4;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(args.config.as_deref())?;
    config.apply_dsn_override(args.dsn.clone());

    // Initialize logging
    let level = match &args.log_level {
        Some(level) => level.clone(),
        None => utils::logger::level_for_verbosity(args.verbose, &config.log.level),
    };
    utils::logger::init(&level)?;

    tracing::debug!("Starting pitr-agent v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Sync {
            binlog_dir,
            prefix,
            no_checksum,
            result_log,
            watch,
            interval,
        } => {
            let (log_dir, prefix) = match (binlog_dir, prefix) {
                (Some(dir), Some(prefix)) => (dir, prefix),
                _ => {
                    let info = position::fetch_binlog_info(&config.database.dsn).await?;
                    tracing::info!(
                        coordinate = %info.coordinate,
                        version = %info.server_version,
                        "Read binlog location from server"
                    );
                    (info.log_directory, info.log_file_prefix)
                }
            };

            let storage = storage::from_config(&config.storage, &config.transfer)?;
            let syncer = Syncer::new(
                storage,
                SyncOptions {
                    log_dir,
                    prefix,
                    remote_dir: config.storage.remote_dir().to_string(),
                    checksum: config.sync.checksum && !no_checksum,
                    result_log: result_log.or(config.sync.result_log.clone()),
                },
            );

            if watch {
                let interval = Duration::from_secs(interval.unwrap_or(config.sync.interval_secs));
                let coordinator = ShutdownCoordinator::new();
                let cancel = coordinator.token();
                let signals = tokio::spawn(async move { coordinator.wait_for_signal().await });

                // Returns once a signal cancels the token and the current sweep is done
                daemon::watch(&syncer, interval, cancel.clone()).await;
                cancel.cancel();
                let _ = signals.await;
            } else {
                let report = syncer.run().await?;
                tracing::info!(
                    synced = report.synced.len(),
                    skipped = report.skipped.len(),
                    "Sync complete"
                );
            }
        }

        Command::Restore {
            binlog_dir,
            start_binlog,
            start_position,
            dump_file,
            stop_datetime,
            dry_run,
        } => {
            let start = match (dump_file, start_binlog) {
                (Some(dump_file), _) => {
                    let coordinate = dump::coordinate_from_dump(&dump_file)?;
                    tracing::info!(coordinate = %coordinate, dump = %dump_file.display(), "Start coordinate from dump");
                    coordinate
                }
                (None, Some(file)) => {
                    BinlogCoordinate::new(file, start_position.unwrap_or(FIRST_EVENT_POSITION))
                }
                (None, None) => anyhow::bail!("either --start-binlog or --dump-file is required"),
            };
            let stop = restore::parse_stop_datetime(&stop_datetime)?;

            let client = if dry_run {
                None
            } else {
                let credentials = ClientCredentials::from_dsn(&config.database.dsn)?;
                Some(ClientCommand::mysql(&config.restore.mysql_path, &credentials))
            };
            let executor = RestoreExecutor::new(
                RestoreOptions {
                    mysqlbinlog_path: config.restore.mysqlbinlog_path.clone(),
                    max_binlogs_per_command: config.restore.max_binlogs_per_command,
                    dry_run,
                },
                client,
            );

            let executed = tokio::task::spawn_blocking(move || -> pitr_agent::Result<usize> {
                let plan = restore::plan_restore(
                    &binlog_dir,
                    &start.file,
                    start.position,
                    stop,
                    &FileEventStream,
                )?;
                tracing::info!(
                    start_position = plan.start_position,
                    stop_position = ?plan.stop_position,
                    segments = plan.binlogs.len(),
                    "Restore plan ready"
                );
                let stdout = std::io::stdout();
                executor.execute(&plan, &mut stdout.lock())
            })
            .await
            .context("restore task failed")??;

            tracing::info!(commands = executed, dry_run, "Restore finished");
        }

        Command::Position => {
            let info = position::fetch_binlog_info(&config.database.dsn).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Command::Coordinate { dump_file } => {
            let coordinate = dump::coordinate_from_dump(&dump_file)?;
            println!("{}", serde_json::to_string_pretty(&coordinate)?);
        }
    }

    Ok(())
}
