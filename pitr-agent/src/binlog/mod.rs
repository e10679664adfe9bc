//! Binlog coordinates and event streaming.

pub mod events;

use crate::mysql::version::ServerVersion;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

pub use events::{EventStream, FileEventStream, ScanOutcome};

/// An exact byte offset inside a named binlog segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinlogCoordinate {
    pub file: String,
    pub position: u64,
}

impl BinlogCoordinate {
    pub fn new(file: impl Into<String>, position: u64) -> Self {
        Self {
            file: file.into(),
            position,
        }
    }
}

impl fmt::Display for BinlogCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.position)
    }
}

/// Snapshot of the server's binlog state, taken once per backup cycle.
#[derive(Debug, Clone, Serialize)]
pub struct BinlogInfo {
    pub coordinate: BinlogCoordinate,
    pub log_directory: PathBuf,
    pub log_file_prefix: String,
    #[serde(serialize_with = "serialize_version")]
    pub server_version: ServerVersion,
}

fn serialize_version<S: serde::Serializer>(
    version: &ServerVersion,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(version)
}
