//! Destinations for synced segments.
//!
//! Every backend satisfies [`Storage::save`]: copy a source stream to a
//! remote path and report the bytes written.

pub mod local;
pub mod sftp;

use crate::config::{StorageConfig, StorageKind, TransferConfig};
use crate::transfer::resumable::RetryPolicy;
use crate::utils::errors::{PitrError, Result};
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::Arc;

pub use local::LocalStorage;
pub use sftp::{SftpSettings, SftpStorage};

/// A readable source that may be repositioned for a resumed transfer.
///
/// Plain streams cannot seek; a resumed transfer keeps reading where the last
/// attempt stopped.
pub trait SourceStream: Read + Send {
    fn is_seekable(&self) -> bool {
        false
    }

    /// Position the source at `offset` before a resumed attempt.
    fn resume_at(&mut self, offset: u64) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("source cannot seek to {}", offset),
        ))
    }
}

impl SourceStream for File {
    fn is_seekable(&self) -> bool {
        true
    }

    fn resume_at(&mut self, offset: u64) -> io::Result<()> {
        self.seek(SeekFrom::Start(offset)).map(|_| ())
    }
}

impl<T: AsRef<[u8]> + Send> SourceStream for Cursor<T> {
    fn is_seekable(&self) -> bool {
        true
    }

    fn resume_at(&mut self, offset: u64) -> io::Result<()> {
        self.seek(SeekFrom::Start(offset)).map(|_| ())
    }
}

/// Wraps a non-seekable reader (pipe, decompressor, socket).
pub struct StreamSource<R>(pub R);

impl<R: Read> Read for StreamSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read + Send> SourceStream for StreamSource<R> {}

/// A destination that segments are copied into.
pub trait Storage: Send + Sync {
    /// Copy `source` to `remote_path`, returning the bytes written.
    fn save(&self, source: &mut dyn SourceStream, remote_path: &str) -> Result<u64>;

    /// Human-readable target for logs.
    fn describe(&self) -> String;
}

/// Build the configured backend.
pub fn from_config(storage: &StorageConfig, transfer: &TransferConfig) -> Result<Arc<dyn Storage>> {
    let policy = RetryPolicy::from(transfer);
    match storage.kind {
        StorageKind::Local => Ok(Arc::new(LocalStorage::new(&storage.path, policy))),
        StorageKind::Sftp => {
            let sftp = storage.sftp.as_ref().ok_or_else(|| {
                PitrError::Config("storage.kind = \"sftp\" requires a [storage.sftp] section".into())
            })?;
            Ok(Arc::new(SftpStorage::new(SftpSettings::from(sftp), policy)))
        }
    }
}

/// Join a remote directory and a file name with `/`.
pub fn remote_path(dir: &str, file_name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", dir, file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_path() {
        assert_eq!(remote_path("binlogs/db1/", "mysql-bin.000001"), "binlogs/db1/mysql-bin.000001");
        assert_eq!(remote_path("/srv", "a"), "/srv/a");
        assert_eq!(remote_path("", "a"), "a");
    }

    #[test]
    fn test_cursor_resumes_at_offset() -> io::Result<()> {
        let mut cursor = Cursor::new(b"0123456789".to_vec());
        cursor.resume_at(4)?;
        let mut rest = String::new();
        cursor.read_to_string(&mut rest)?;
        assert_eq!(rest, "456789");
        Ok(())
    }
}
