//! Binlog segment discovery.
//!
//! Segments live flat in the server's log directory next to the `.index`
//! file and any checksum state files. Only files named `<prefix>.<number>`
//! style are segments.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for listing segments
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Only names starting with this prefix are returned (empty = all)
    pub prefix: String,

    /// Name suffixes that are never segments
    pub exclude_suffixes: Vec<String>,
}

impl WalkOptions {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            exclude_suffixes: vec![".index".to_string(), ".tmp".to_string()],
        }
    }
}

/// A binlog segment found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFile {
    /// Full path to the segment
    pub path: PathBuf,

    /// File name, e.g. `mysql-bin.000042`
    pub name: String,

    /// Trailing sequence number (0 when the name has none)
    pub number: u64,
}

impl SegmentFile {
    /// Symlinked segments are resolved to their target's metadata.
    fn from_entry(entry: &DirEntry) -> std::io::Result<Option<Self>> {
        let metadata = std::fs::metadata(entry.path())?;
        if !metadata.is_file() {
            return Ok(None);
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            return Ok(None);
        };

        Ok(Some(Self {
            path: entry.path().to_path_buf(),
            number: segment_number(&name),
            name,
        }))
    }
}

/// List the segments directly inside `dir`, in no particular order.
pub fn list_segments(dir: &Path, options: &WalkOptions) -> std::io::Result<Vec<SegmentFile>> {
    let mut segments = Vec::new();

    let walker = WalkDir::new(dir).min_depth(1).max_depth(1);

    for entry in walker {
        let entry = entry?;

        if !is_segment_name(&entry, options) {
            continue;
        }

        if let Some(segment) = SegmentFile::from_entry(&entry)? {
            segments.push(segment);
        }
    }

    Ok(segments)
}

/// List segments sorted by sequence number, ties broken by name.
pub fn list_segments_sorted(
    dir: &Path,
    options: &WalkOptions,
) -> std::io::Result<Vec<SegmentFile>> {
    let mut segments = list_segments(dir, options)?;
    sort_segments(&mut segments);
    Ok(segments)
}

pub fn sort_segments(segments: &mut [SegmentFile]) {
    segments.sort_by(|a, b| a.number.cmp(&b.number).then_with(|| a.name.cmp(&b.name)));
}

/// Trailing numeric run of a file name: `mysql-bin.000042` -> 42.
pub fn segment_number(name: &str) -> u64 {
    let digits = name.len()
        - name
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .count();
    name[digits..].parse().unwrap_or(0)
}

fn is_segment_name(entry: &DirEntry, options: &WalkOptions) -> bool {
    let file_name = entry.file_name().to_string_lossy();

    if !file_name.starts_with(&options.prefix) {
        return false;
    }

    !options
        .exclude_suffixes
        .iter()
        .any(|suffix| file_name.ends_with(suffix.as_str()))
}
