//! SFTP storage backend over `ssh2`.
//!
//! Each `save` opens its own SSH session so concurrent syncs never share a
//! channel. A failed attempt drops the session; the next attempt reconnects
//! and reopens the remote file truncated to the acknowledged offset.

use super::{SourceStream, Storage};
use crate::config::SftpConfig;
use crate::transfer::resumable::{RemoteSink, ResumableTransfer, RetryPolicy};
use crate::utils::errors::Result;
use ssh2::{FileStat, OpenFlags, OpenType, Session, Sftp};
use std::io::{self, Seek, SeekFrom, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct SftpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub private_key: Option<PathBuf>,
    pub passphrase: Option<String>,
    pub timeout_ms: u32,
}

impl From<&SftpConfig> for SftpSettings {
    fn from(config: &SftpConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            password: config.password.clone(),
            private_key: config.private_key.clone(),
            passphrase: config.passphrase.clone(),
            timeout_ms: config.timeout_ms,
        }
    }
}

/// Lazily connected SFTP destination.
pub struct SftpSink {
    settings: SftpSettings,
    connection: Option<(Session, Sftp)>,
}

impl SftpSink {
    pub fn new(settings: SftpSettings) -> Self {
        Self {
            settings,
            connection: None,
        }
    }

    fn connect(&self) -> io::Result<(Session, Sftp)> {
        let s = &self.settings;
        let tcp = TcpStream::connect((s.host.as_str(), s.port))?;
        let mut sess = Session::new()?;
        sess.set_tcp_stream(tcp);
        sess.set_timeout(s.timeout_ms);
        sess.handshake()?;

        if let Some(key) = &s.private_key {
            sess.userauth_pubkey_file(&s.username, None, key, s.passphrase.as_deref())?;
        } else if let Some(password) = &s.password {
            sess.userauth_password(&s.username, password)?;
        } else {
            sess.userauth_agent(&s.username)?;
        }

        if !sess.authenticated() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("SSH authentication failed for {}@{}", s.username, s.host),
            ));
        }

        let sftp = sess.sftp()?;
        debug!(host = %s.host, port = s.port, "SFTP session established");
        Ok((sess, sftp))
    }

    fn sftp(&mut self) -> io::Result<&Sftp> {
        let connection = match self.connection.take() {
            Some(connection) => connection,
            None => self.connect()?,
        };
        let (_, sftp) = self.connection.insert(connection);
        Ok(sftp)
    }
}

/// Create every missing directory above `path`.
fn ensure_parent_dirs(sftp: &Sftp, path: &Path) -> io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    let mut missing: Vec<&Path> = parent
        .ancestors()
        .filter(|dir| !dir.as_os_str().is_empty() && *dir != Path::new("/"))
        .take_while(|dir| sftp.stat(dir).is_err())
        .collect();
    missing.reverse();

    for dir in missing {
        if let Err(e) = sftp.mkdir(dir, 0o755) {
            // Another session may have created it in the meantime
            if sftp.stat(dir).is_err() {
                return Err(e.into());
            }
        }
    }
    Ok(())
}

/// Attributes that only change the remote file's size.
fn truncation_stat(size: u64) -> FileStat {
    FileStat {
        size: Some(size),
        uid: None,
        gid: None,
        perm: None,
        atime: None,
        mtime: None,
    }
}

impl RemoteSink for SftpSink {
    fn create(&mut self, path: &str) -> io::Result<Box<dyn Write + '_>> {
        let sftp = self.sftp()?;
        let remote = Path::new(path);
        ensure_parent_dirs(sftp, remote)?;
        let file = sftp.create(remote)?;
        Ok(Box::new(file))
    }

    fn resume(&mut self, path: &str, offset: u64) -> io::Result<Box<dyn Write + '_>> {
        let sftp = self.sftp()?;
        let remote = Path::new(path);
        // Bytes the server kept past the acknowledged offset are dropped
        sftp.setstat(remote, truncation_stat(offset))?;
        let mut file = sftp.open_mode(remote, OpenFlags::WRITE, 0o644, OpenType::File)?;
        file.seek(SeekFrom::Start(offset))?;
        Ok(Box::new(file))
    }

    fn reset(&mut self) {
        if let Some((sess, _)) = self.connection.take() {
            if let Err(e) = sess.disconnect(None, "transfer retry", None) {
                warn!("Failed to close SSH session: {}", e);
            }
        }
    }
}

/// Storage backend writing to a remote host over SFTP.
#[derive(Debug, Clone)]
pub struct SftpStorage {
    settings: SftpSettings,
    policy: RetryPolicy,
}

impl SftpStorage {
    pub fn new(settings: SftpSettings, policy: RetryPolicy) -> Self {
        Self { settings, policy }
    }
}

impl Storage for SftpStorage {
    fn save(&self, source: &mut dyn SourceStream, remote_path: &str) -> Result<u64> {
        let sink = SftpSink::new(self.settings.clone());
        let mut transfer = ResumableTransfer::new(sink, self.policy.clone());
        let result = transfer.save(source, remote_path);
        debug!(remote_path, result = ?transfer.result(), "SFTP transfer finished");
        result
    }

    fn describe(&self) -> String {
        format!(
            "sftp://{}@{}:{}",
            self.settings.username, self.settings.host, self.settings.port
        )
    }
}
