//! Transfer state keyed by content digest.
//!
//! Each data file gets a sibling state file `checksum.<ext>` holding one
//! lowercase-hex SHA-256 per line. A digest in that file means "a transfer of
//! this exact content completed". Nothing checks whether the remote copy
//! still exists.

use crate::utils::errors::{PitrError, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const STATE_FILE_STEM: &str = "checksum";

/// Compute the SHA-256 of a file's content as lowercase hex.
pub fn compute_digest(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| PitrError::file(path, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| PitrError::file(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Path of the state file that tracks `data_file`.
pub fn state_path_for(data_file: &Path) -> PathBuf {
    let ext = data_file
        .extension()
        .or_else(|| data_file.file_name())
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = format!("{}.{}", STATE_FILE_STEM, ext);
    match data_file.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// Transfer state for one data file.
#[derive(Debug)]
pub struct ChecksumStore {
    data_file: PathBuf,
    state_file: PathBuf,
    append_lock: Mutex<()>,
}

impl ChecksumStore {
    pub fn new(data_file: impl Into<PathBuf>) -> Self {
        let data_file = data_file.into();
        let state_file = state_path_for(&data_file);
        Self {
            data_file,
            state_file,
            append_lock: Mutex::new(()),
        }
    }

    pub fn data_file(&self) -> &Path {
        &self.data_file
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    /// Whether the file's current content was already transferred.
    pub fn is_transferred(&self) -> Result<bool> {
        let digest = compute_digest(&self.data_file)?;
        self.contains(&digest)
    }

    /// Whether `digest` is recorded in the state file.
    pub fn contains(&self, digest: &str) -> Result<bool> {
        let file = match File::open(&self.state_file) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(PitrError::file(&self.state_file, e)),
        };

        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| PitrError::file(&self.state_file, e))?;
            if line.trim() == digest {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Append the file's current digest to the state file.
    pub fn record_transferred(&self) -> Result<String> {
        let digest = compute_digest(&self.data_file)?;
        self.record(&digest)?;
        Ok(digest)
    }

    /// Append a digest computed earlier, e.g. before the transfer started.
    pub fn record(&self, digest: &str) -> Result<()> {
        let _guard = self
            .append_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.state_file)
            .map_err(|e| PitrError::file(&self.state_file, e))?;
        let empty = file
            .metadata()
            .map_err(|e| PitrError::file(&self.state_file, e))?
            .len()
            == 0;

        let entry = if empty {
            digest.to_string()
        } else {
            format!("\n{}", digest)
        };
        file.write_all(entry.as_bytes())
            .map_err(|e| PitrError::file(&self.state_file, e))
    }

    /// Remove the state file. Missing state is not an error.
    pub fn delete_state(&self) -> Result<()> {
        match fs::remove_file(&self.state_file) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PitrError::file(&self.state_file, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_state_path_uses_extension() {
        assert_eq!(
            state_path_for(Path::new("/var/lib/mysql/mysql-bin.000042")),
            PathBuf::from("/var/lib/mysql/checksum.000042")
        );
        assert_eq!(
            state_path_for(Path::new("/data/dump")),
            PathBuf::from("/data/checksum.dump")
        );
    }

    #[test]
    fn test_digest_is_sha256_hex() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("empty.000001");
        fs::write(&path, b"")?;

        assert_eq!(
            compute_digest(&path)?,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        Ok(())
    }

    #[test]
    fn test_identical_content_identical_digest() -> Result<()> {
        let dir = TempDir::new()?;
        let a = dir.path().join("a.000001");
        let b = dir.path().join("b.000002");
        fs::write(&a, b"same bytes")?;
        fs::write(&b, b"same bytes")?;

        assert_eq!(compute_digest(&a)?, compute_digest(&b)?);
        Ok(())
    }

    #[test]
    fn test_record_then_is_transferred() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("mysql-bin.000001");
        fs::write(&path, b"segment content")?;

        let store = ChecksumStore::new(&path);
        assert!(!store.is_transferred()?);

        store.record_transferred()?;
        assert!(store.is_transferred()?);

        // A fresh instance (as after a restart) sees the same state
        assert!(ChecksumStore::new(&path).is_transferred()?);

        store.delete_state()?;
        assert!(!store.is_transferred()?);
        Ok(())
    }

    #[test]
    fn test_changed_content_is_not_transferred() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("mysql-bin.000001");
        fs::write(&path, b"v1")?;

        let store = ChecksumStore::new(&path);
        store.record_transferred()?;
        fs::write(&path, b"v1 plus more events")?;
        assert!(!store.is_transferred()?);

        store.record_transferred()?;
        let state = fs::read_to_string(store.state_file())?;
        let lines: Vec<_> = state.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.len() == 64));
        assert!(!state.ends_with('\n'));
        Ok(())
    }

    #[test]
    fn test_delete_state_is_idempotent() -> Result<()> {
        let dir = TempDir::new()?;
        let store = ChecksumStore::new(dir.path().join("mysql-bin.000009"));
        store.delete_state()?;
        store.delete_state()?;
        Ok(())
    }

    #[test]
    fn test_concurrent_appends() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("mysql-bin.000001");
        fs::write(&path, b"content")?;
        let store = Arc::new(ChecksumStore::new(&path));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.record_transferred().map(|_| ()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap()?;
        }

        let state = fs::read_to_string(store.state_file())?;
        assert_eq!(state.lines().count(), 8);
        assert!(state.lines().all(|l| l.len() == 64));
        Ok(())
    }
}
