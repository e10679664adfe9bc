//! Event streaming over binlog segment files.
//!
//! The restore planner only needs `(timestamp, log_position)` for each event.
//! [`EventStream`] is the seam; [`FileEventStream`] decodes segment files with
//! the `mysql_common` binlog reader.

use mysql_common::binlog::consts::BinlogVersion;
use mysql_common::binlog::events::BinlogEventHeader;
use mysql_common::binlog::{BinlogFileHeader, EventStreamReader};
use mysql_common::io::ParseBuf;
use mysql_common::proto::MyDeserialize;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::debug;

/// Magic bytes at the start of every binlog file.
pub const BINLOG_MAGIC: [u8; BinlogFileHeader::LEN] = BinlogFileHeader::VALUE;

/// Size of the v4 common event header.
pub const EVENT_HEADER_LEN: usize = BinlogEventHeader::LEN;

/// What the callback tells the scanner after each event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Keep reading events.
    Continue,
    /// The stop boundary was reached; stop reading this segment.
    BoundaryReached,
    /// Abort with a reason.
    Failed(String),
}

/// Capability to stream `(timestamp, log_position)` pairs out of a segment.
///
/// Returns the outcome that ended the scan: `Continue` when the segment was
/// exhausted, otherwise whatever the callback returned to stop it. `Err` is
/// reserved for read/decode failures.
pub trait EventStream {
    fn stream_events(
        &self,
        segment: &Path,
        on_event: &mut dyn FnMut(u32, u64) -> ScanOutcome,
    ) -> io::Result<ScanOutcome>;
}

/// Reads v4 binlog files event by event.
///
/// A trailing event that is only partly on disk (a segment copied while the
/// server was still writing it) ends the scan like end of file; it is never
/// passed to the callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileEventStream;

impl EventStream for FileEventStream {
    fn stream_events(
        &self,
        segment: &Path,
        on_event: &mut dyn FnMut(u32, u64) -> ScanOutcome,
    ) -> io::Result<ScanOutcome> {
        let file = File::open(segment)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        BinlogFileHeader::read(&mut reader)?;
        let mut events = EventStreamReader::new(BinlogVersion::Version4);
        let mut offset = BinlogFileHeader::LEN as u64;
        let mut header = [0u8; EVENT_HEADER_LEN];

        loop {
            let remaining = file_len.saturating_sub(offset);
            if remaining < EVENT_HEADER_LEN as u64 {
                if remaining > 0 {
                    debug!(segment = %segment.display(), offset, remaining, "Partial event header at end of segment");
                }
                return Ok(ScanOutcome::Continue);
            }

            reader.read_exact(&mut header)?;
            let parsed = BinlogEventHeader::deserialize((), &mut ParseBuf(&header[..]))?;
            let event_size = u64::from(parsed.event_size());
            if event_size < EVENT_HEADER_LEN as u64 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("event size {} smaller than header", event_size),
                ));
            }
            if remaining < event_size {
                debug!(segment = %segment.display(), offset, event_size, remaining, "Partial event at end of segment");
                return Ok(ScanOutcome::Continue);
            }

            let event = events
                .read((&header[..]).chain(&mut reader))?
                .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "event vanished while reading"))?;
            offset += event_size;

            let event_header = event.header();
            match on_event(event_header.timestamp(), u64::from(event_header.log_pos())) {
                ScanOutcome::Continue => {}
                outcome => return Ok(outcome),
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::binlog_bytes;
    use super::*;
    use tempfile::TempDir;

    fn collect(path: &Path) -> io::Result<(Vec<(u32, u64)>, ScanOutcome)> {
        let mut seen = Vec::new();
        let outcome = FileEventStream.stream_events(path, &mut |ts, pos| {
            seen.push((ts, pos));
            ScanOutcome::Continue
        })?;
        Ok((seen, outcome))
    }

    #[test]
    fn test_reads_every_header() -> io::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("mysql-bin.000001");
        std::fs::write(&path, binlog_bytes(&[(100, 10), (101, 0), (105, 33)]))?;

        let (seen, outcome) = collect(&path)?;
        assert_eq!(outcome, ScanOutcome::Continue);
        assert_eq!(seen, vec![(100, 33), (101, 52), (105, 104)]);
        Ok(())
    }

    #[test]
    fn test_callback_stops_scan() -> io::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("mysql-bin.000001");
        std::fs::write(&path, binlog_bytes(&[(100, 1), (200, 1), (300, 1)]))?;

        let mut calls = 0;
        let outcome = FileEventStream.stream_events(&path, &mut |ts, _| {
            calls += 1;
            if ts >= 200 {
                ScanOutcome::BoundaryReached
            } else {
                ScanOutcome::Continue
            }
        })?;
        assert_eq!(outcome, ScanOutcome::BoundaryReached);
        assert_eq!(calls, 2);
        Ok(())
    }

    #[test]
    fn test_bad_magic() -> io::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("mysql-bin.000001");
        std::fs::write(&path, b"nope")?;

        let err = collect(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        Ok(())
    }

    #[test]
    fn test_truncated_header() -> io::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("mysql-bin.000001");
        let mut bytes = binlog_bytes(&[(100, 4)]);
        bytes.extend_from_slice(&[1, 2, 3]);
        std::fs::write(&path, bytes)?;

        let (seen, outcome) = collect(&path)?;
        assert_eq!(outcome, ScanOutcome::Continue);
        assert_eq!(seen, vec![(100, 27)]);
        Ok(())
    }

    #[test]
    fn test_partial_trailing_event_is_not_reported() -> io::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("mysql-bin.000001");
        let mut bytes = binlog_bytes(&[(100, 10), (101, 500)]);
        bytes.truncate(bytes.len() - 400);
        std::fs::write(&path, &bytes)?;

        let (seen, outcome) = collect(&path)?;
        assert_eq!(outcome, ScanOutcome::Continue);
        assert_eq!(seen, vec![(100, 33)]);
        assert!(seen.iter().all(|&(_, pos)| pos <= bytes.len() as u64));
        Ok(())
    }

    #[test]
    fn test_event_size_below_header() -> io::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("mysql-bin.000001");
        let mut bytes = binlog_bytes(&[(100, 0)]);
        // event_size field of the only event
        bytes[4 + 9..4 + 13].copy_from_slice(&5u32.to_le_bytes());
        std::fs::write(&path, bytes)?;

        let err = collect(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        Ok(())
    }
}
