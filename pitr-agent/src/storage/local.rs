//! Directory-backed storage (local disks, NFS mounts).

use super::{SourceStream, Storage};
use crate::transfer::resumable::{RemoteSink, ResumableTransfer, RetryPolicy};
use crate::utils::errors::Result;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Writes transfer destinations below a root directory.
#[derive(Debug, Clone)]
pub struct FsSink {
    root: PathBuf,
}

impl FsSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn target(&self, path: &str) -> io::Result<PathBuf> {
        let target = self.root.join(path.trim_start_matches('/'));
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(target)
    }
}

impl RemoteSink for FsSink {
    fn create(&mut self, path: &str) -> io::Result<Box<dyn Write + '_>> {
        let file = File::create(self.target(path)?)?;
        Ok(Box::new(file))
    }

    fn resume(&mut self, path: &str, offset: u64) -> io::Result<Box<dyn Write + '_>> {
        let target = self.target(path)?;
        let file = OpenOptions::new().append(true).open(&target)?;
        // Drop anything past the acknowledged offset before appending
        file.set_len(offset)?;
        Ok(Box::new(file))
    }
}

/// Storage backend rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    policy: RetryPolicy,
}

impl LocalStorage {
    pub fn new(root: impl AsRef<Path>, policy: RetryPolicy) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            policy,
        }
    }
}

impl Storage for LocalStorage {
    fn save(&self, source: &mut dyn SourceStream, remote_path: &str) -> Result<u64> {
        let mut transfer = ResumableTransfer::new(FsSink::new(&self.root), self.policy.clone());
        transfer.save(source, remote_path)
    }

    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }
}
