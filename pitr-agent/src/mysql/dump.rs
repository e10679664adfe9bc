//! Binlog coordinate extraction from a full `mysqldump` file.
//!
//! Dumps taken with `--source-data`/`--master-data` embed the coordinate the
//! dump is consistent with. That coordinate is where replay resumes.

use crate::binlog::BinlogCoordinate;
use crate::utils::errors::{PitrError, Result};
use flate2::read::MultiGzDecoder;
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::OnceLock;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

fn coordinate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(?:MASTER|SOURCE)_LOG_FILE\s*=\s*'([^']+)'\s*,\s*(?:MASTER|SOURCE)_LOG_POS\s*=\s*(\d+)")
            .expect("coordinate pattern is valid")
    })
}

/// Read the embedded coordinate from a plain or gzip-compressed dump.
pub fn coordinate_from_dump(path: &Path) -> Result<BinlogCoordinate> {
    let file = File::open(path).map_err(|e| PitrError::file(path, e))?;
    let mut reader = BufReader::new(file);

    let compressed = reader
        .fill_buf()
        .map_err(|e| PitrError::file(path, e))?
        .starts_with(&GZIP_MAGIC);

    let found = if compressed {
        scan_lines(BufReader::new(MultiGzDecoder::new(reader)))
    } else {
        scan_lines(reader)
    }
    .map_err(|e| PitrError::file(path, e))?;

    found.ok_or_else(|| PitrError::CoordinateNotFound(path.to_path_buf()))
}

/// Scan line by line; dumps are far too large to read whole.
fn scan_lines<R: Read>(reader: BufReader<R>) -> std::io::Result<Option<BinlogCoordinate>> {
    let mut reader = reader;
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(None);
        }
        // Row data may not be UTF-8; only the header comments matter here
        let text = String::from_utf8_lossy(&line);
        if let Some(coordinate) = parse_coordinate(&text) {
            return Ok(Some(coordinate));
        }
    }
}

/// Extract the coordinate from a single `CHANGE MASTER`/`CHANGE REPLICATION SOURCE` line.
pub fn parse_coordinate(line: &str) -> Option<BinlogCoordinate> {
    let captures = coordinate_pattern().captures(line)?;
    let position = captures.get(2)?.as_str().parse().ok()?;
    Some(BinlogCoordinate::new(captures.get(1)?.as_str(), position))
}
