//! Turning a restore plan into `mysqlbinlog` invocations and running them.

use super::planner::RestorePlan;
use crate::mysql::ClientCredentials;
use crate::utils::errors::{PitrError, Result};
use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use tracing::{debug, info, warn};

/// Default cap on segments per `mysqlbinlog` call, keeping the argument list
/// well below OS limits.
pub const DEFAULT_MAX_BINLOGS_PER_COMMAND: usize = 10;

/// Arguments for one `mysqlbinlog` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayCommand {
    pub args: Vec<String>,
}

impl ReplayCommand {
    fn new(args: Vec<String>) -> Self {
        Self { args }
    }
}

impl fmt::Display for ReplayCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args.join(" "))
    }
}

/// Split a plan into ordered commands.
///
/// The first segment carries the start position, the last one the stop
/// position; the segments in between are passed bare, at most
/// `max_per_command` at a time.
pub fn build_commands(plan: &RestorePlan, max_per_command: usize) -> Vec<ReplayCommand> {
    let segments: Vec<String> = plan
        .binlogs
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    let start_flag = format!("--start-position={}", plan.start_position);
    let stop_flag = plan.stop_position.map(|p| format!("--stop-position={}", p));

    match segments.as_slice() {
        [] => Vec::new(),
        [only] => {
            if plan.stop_position == Some(plan.start_position) {
                return Vec::new();
            }
            let mut args = vec![only.clone(), start_flag];
            args.extend(stop_flag);
            vec![ReplayCommand::new(args)]
        }
        [first, middle @ .., last] => {
            let mut commands = vec![ReplayCommand::new(vec![first.clone(), start_flag])];
            commands.extend(
                middle
                    .chunks(max_per_command.max(1))
                    .map(|chunk| ReplayCommand::new(chunk.to_vec())),
            );
            let mut args = vec![last.clone()];
            args.extend(stop_flag);
            commands.push(ReplayCommand::new(args));
            commands
        }
    }
}

/// The client process that receives the replayed SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl ClientCommand {
    /// `mysql` connected with the DSN's credentials.
    pub fn mysql(program: impl Into<PathBuf>, credentials: &ClientCredentials) -> Self {
        Self {
            program: program.into(),
            args: credentials.client_args(),
            env: credentials
                .env()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RestoreOptions {
    pub mysqlbinlog_path: PathBuf,
    pub max_binlogs_per_command: usize,

    /// Print the SQL instead of applying it
    pub dry_run: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            mysqlbinlog_path: PathBuf::from("mysqlbinlog"),
            max_binlogs_per_command: DEFAULT_MAX_BINLOGS_PER_COMMAND,
            dry_run: false,
        }
    }
}

pub struct RestoreExecutor {
    options: RestoreOptions,
    client: Option<ClientCommand>,
}

impl RestoreExecutor {
    /// `client` may be `None` only for dry runs.
    pub fn new(options: RestoreOptions, client: Option<ClientCommand>) -> Self {
        Self { options, client }
    }

    /// Run every command of `plan` in order. Dry-run output goes to `out`.
    /// Returns the number of commands executed.
    pub fn execute(&self, plan: &RestorePlan, out: &mut dyn Write) -> Result<usize> {
        let commands = build_commands(plan, self.options.max_binlogs_per_command);
        if commands.is_empty() {
            info!("Restore window is empty, nothing to replay");
            return Ok(0);
        }

        let client = match (&self.client, self.options.dry_run) {
            (_, true) => None,
            (Some(client), false) => Some(client),
            (None, false) => {
                return Err(PitrError::Config(
                    "applying a restore requires database credentials".into(),
                ))
            }
        };

        let total = commands.len();
        for (step, command) in commands.iter().enumerate() {
            info!(step = step + 1, total, command = %command, dry_run = self.options.dry_run, "Replaying binlogs");
            match client {
                None => self.dump(command, out)?,
                Some(client) => self.apply(command, client)?,
            }
        }

        info!(commands = total, "Replay finished");
        Ok(total)
    }

    fn spawn_binlog(&self, command: &ReplayCommand) -> Result<Child> {
        Command::new(&self.options.mysqlbinlog_path)
            .args(&command.args)
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| self.failure(command, format!("failed to start: {}", e)))
    }

    fn dump(&self, command: &ReplayCommand, out: &mut dyn Write) -> Result<()> {
        let mut child = self.spawn_binlog(command)?;
        let copied = match child.stdout.take() {
            Some(mut stdout) => io::copy(&mut stdout, out).and_then(|_| out.flush()),
            None => Ok(()),
        };
        let status = child
            .wait()
            .map_err(|e| self.failure(command, format!("failed to wait: {}", e)))?;

        copied.map_err(|e| self.failure(command, format!("failed to copy output: {}", e)))?;
        if !status.success() {
            return Err(self.failure(command, format!("exited with {}", status)));
        }
        Ok(())
    }

    fn apply(&self, command: &ReplayCommand, client: &ClientCommand) -> Result<()> {
        let mut binlog = self.spawn_binlog(command)?;
        let Some(stdout) = binlog.stdout.take() else {
            reap(&mut binlog);
            return Err(self.failure(command, "stdout was not captured".to_string()));
        };

        let spawned = Command::new(&client.program)
            .args(&client.args)
            .envs(client.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::from(stdout))
            .spawn();
        let mut sink = match spawned {
            Ok(child) => child,
            Err(e) => {
                reap(&mut binlog);
                return Err(self.failure(
                    command,
                    format!("failed to start {}: {}", client.program.display(), e),
                ));
            }
        };

        let binlog_status = binlog.wait();
        let client_status = sink
            .wait()
            .map_err(|e| self.failure(command, format!("failed to wait for client: {}", e)))?;
        let binlog_status =
            binlog_status.map_err(|e| self.failure(command, format!("failed to wait: {}", e)))?;

        if !binlog_status.success() {
            return Err(self.failure(command, format!("exited with {}", binlog_status)));
        }
        if !client_status.success() {
            return Err(self.failure(
                command,
                format!("{} exited with {}", client.program.display(), client_status),
            ));
        }
        debug!(command = %command, "Applied");
        Ok(())
    }

    fn failure(&self, command: &ReplayCommand, reason: String) -> PitrError {
        PitrError::Command {
            command: format!("{} {}", self.options.mysqlbinlog_path.display(), command),
            reason,
        }
    }
}

fn reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!("Failed to stop mysqlbinlog: {}", e);
    }
    let _ = child.wait();
}
