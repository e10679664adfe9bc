//! Finding the stop coordinate for a point-in-time restore.
//!
//! Events are accepted while their timestamp is strictly earlier than the
//! stop time, the same exclusive rule `mysqlbinlog --stop-datetime` applies.
//! The end position of the last accepted event becomes the stop position.

use crate::binlog::{EventStream, ScanOutcome};
use crate::fs::walker::{list_segments_sorted, WalkOptions};
use crate::utils::errors::{PitrError, Result};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Format accepted for `--stop-datetime` besides RFC 3339.
pub const STOP_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestorePlan {
    pub start_position: u64,
    pub stop_position: Option<u64>,
    pub binlogs: Vec<PathBuf>,
}

/// Parse a stop datetime into unix seconds.
///
/// Naive values are local time, as with `mysqlbinlog`.
pub fn parse_stop_datetime(raw: &str) -> Result<i64> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp());
    }

    let naive = NaiveDateTime::parse_from_str(raw, STOP_DATETIME_FORMAT).map_err(|e| {
        PitrError::Config(format!(
            "invalid stop datetime {:?} (expected \"YYYY-MM-DD HH:MM:SS\" or RFC 3339): {}",
            raw, e
        ))
    })?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
        .ok_or_else(|| PitrError::Config(format!("stop datetime {:?} does not exist in local time", raw)))
}

/// Name prefix shared by a segment family: `mysql-bin.000042` -> `mysql-bin.`.
pub fn segment_prefix(name: &str) -> &str {
    name.trim_end_matches(|c: char| c.is_ascii_digit())
}

/// Build the replay plan from `start_binlog:start_position` up to `stop`
/// (unix seconds, exclusive).
pub fn plan_restore(
    dir: &Path,
    start_binlog: &str,
    start_position: u64,
    stop: i64,
    events: &dyn EventStream,
) -> Result<RestorePlan> {
    let walk = WalkOptions::with_prefix(segment_prefix(start_binlog));
    let segments = list_segments_sorted(dir, &walk).map_err(|e| PitrError::file(dir, e))?;
    if segments.is_empty() {
        return Err(PitrError::BinlogsNotFound(dir.to_path_buf()));
    }

    let start = segments
        .iter()
        .position(|s| s.name == start_binlog)
        .ok_or_else(|| PitrError::StartSegmentNotFound(start_binlog.to_string()))?;

    let mut plan = RestorePlan {
        start_position,
        stop_position: None,
        binlogs: Vec::new(),
    };
    // Index in `plan.binlogs` of the segment holding the stop position
    let mut stop_segment = None;

    for (index, segment) in segments[start..].iter().enumerate() {
        plan.binlogs.push(segment.path.clone());

        let mut accepted = None;
        let outcome = events
            .stream_events(&segment.path, &mut |timestamp, log_pos| {
                if i64::from(timestamp) < stop {
                    accepted = Some(log_pos);
                    ScanOutcome::Continue
                } else {
                    ScanOutcome::BoundaryReached
                }
            })
            .map_err(|e| PitrError::EventStream {
                segment: segment.path.clone(),
                reason: e.to_string(),
            })?;

        if let Some(log_pos) = accepted {
            // Events before the start offset still count; clamp to a no-op window
            let log_pos = if index == 0 { log_pos.max(start_position) } else { log_pos };
            plan.stop_position = Some(log_pos);
            stop_segment = Some(index);
        }

        match outcome {
            ScanOutcome::Continue => {
                debug!(segment = %segment.name, stop_position = ?plan.stop_position, "Segment exhausted");
            }
            ScanOutcome::Failed(reason) => {
                return Err(PitrError::EventStream {
                    segment: segment.path.clone(),
                    reason,
                });
            }
            ScanOutcome::BoundaryReached => {
                if let Some(last) = stop_segment {
                    // Segments after the one holding the stop contribute nothing
                    plan.binlogs.truncate(last + 1);
                    info!(
                        segment = %segment.name,
                        stop_position = ?plan.stop_position,
                        segments = plan.binlogs.len(),
                        "Stop boundary reached"
                    );
                    return Ok(plan);
                }
                debug!(segment = %segment.name, "Boundary reached before any accepted event");
            }
        }
    }

    if plan.stop_position.is_none() {
        return Err(PitrError::StopPositionNotFound);
    }
    info!(
        stop_position = ?plan.stop_position,
        segments = plan.binlogs.len(),
        "Stop datetime is after the last event, replaying every segment"
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binlog::events::testing::binlog_bytes;
    use crate::binlog::FileEventStream;
    use std::collections::HashMap;
    use std::io;
    use tempfile::TempDir;

    /// Serves canned `(timestamp, log_pos)` events per file name.
    struct FakeEvents(HashMap<String, Vec<(u32, u64)>>);

    impl EventStream for FakeEvents {
        fn stream_events(
            &self,
            segment: &Path,
            on_event: &mut dyn FnMut(u32, u64) -> ScanOutcome,
        ) -> io::Result<ScanOutcome> {
            let name = segment.file_name().unwrap().to_string_lossy().into_owned();
            for &(ts, pos) in self.0.get(&name).into_iter().flatten() {
                match on_event(ts, pos) {
                    ScanOutcome::Continue => {}
                    outcome => return Ok(outcome),
                }
            }
            Ok(ScanOutcome::Continue)
        }
    }

    fn dir_with(names: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in names {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        dir
    }

    fn fake(entries: &[(&str, &[(u32, u64)])]) -> FakeEvents {
        FakeEvents(
            entries
                .iter()
                .map(|(name, events)| (name.to_string(), events.to_vec()))
                .collect(),
        )
    }

    fn names(plan: &RestorePlan) -> Vec<String> {
        plan.binlogs
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_segment_prefix() {
        assert_eq!(segment_prefix("mysql-bin.000042"), "mysql-bin.");
        assert_eq!(segment_prefix("binlog"), "binlog");
    }

    #[test]
    fn test_parse_stop_datetime() {
        assert_eq!(parse_stop_datetime("2024-01-02T03:04:05Z").unwrap(), 1_704_164_645);
        assert_eq!(parse_stop_datetime("2024-01-02T05:04:05+02:00").unwrap(), 1_704_164_645);

        let naive = NaiveDateTime::parse_from_str("2024-01-02 03:04:05", STOP_DATETIME_FORMAT).unwrap();
        let expected = Local.from_local_datetime(&naive).earliest().unwrap().timestamp();
        assert_eq!(parse_stop_datetime("2024-01-02 03:04:05").unwrap(), expected);

        assert!(matches!(parse_stop_datetime("yesterday"), Err(PitrError::Config(_))));
    }

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        let err = plan_restore(dir.path(), "mysql-bin.000001", 4, 100, &fake(&[])).unwrap_err();
        assert!(matches!(err, PitrError::BinlogsNotFound(_)));
    }

    #[test]
    fn test_start_segment_not_found() {
        let dir = dir_with(&["mysql-bin.000002", "mysql-bin.000001"]);
        let err = plan_restore(dir.path(), "mysql-bin.000003", 4, 100, &fake(&[])).unwrap_err();
        match err {
            PitrError::StartSegmentNotFound(name) => assert_eq!(name, "mysql-bin.000003"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_stop_inside_start_segment() {
        let dir = dir_with(&["mysql-bin.000001", "mysql-bin.000002"]);
        let events = fake(&[("mysql-bin.000001", &[(10, 120), (20, 300), (30, 450)])]);

        let plan = plan_restore(dir.path(), "mysql-bin.000001", 4, 30, &events).unwrap();

        assert_eq!(plan.start_position, 4);
        assert_eq!(plan.stop_position, Some(300));
        assert_eq!(names(&plan), vec!["mysql-bin.000001"]);
    }

    #[test]
    fn test_boundary_is_exclusive() {
        let dir = dir_with(&["mysql-bin.000001"]);
        let events = fake(&[("mysql-bin.000001", &[(10, 120), (20, 300)])]);

        // An event stamped exactly at the stop time is excluded
        let plan = plan_restore(dir.path(), "mysql-bin.000001", 4, 20, &events).unwrap();
        assert_eq!(plan.stop_position, Some(120));
    }

    #[test]
    fn test_spans_segments_sorted_numerically() {
        let dir = dir_with(&[
            "mysql-bin.000010",
            "mysql-bin.000009",
            "mysql-bin.000011",
            "mysql-bin.index",
        ]);
        let events = fake(&[
            ("mysql-bin.000009", &[(10, 200), (11, 400)]),
            ("mysql-bin.000010", &[(12, 150), (13, 350)]),
            ("mysql-bin.000011", &[(14, 180), (50, 900)]),
        ]);

        let plan = plan_restore(dir.path(), "mysql-bin.000009", 154, 20, &events).unwrap();

        assert_eq!(names(&plan), vec!["mysql-bin.000009", "mysql-bin.000010", "mysql-bin.000011"]);
        assert_eq!(plan.stop_position, Some(180));
    }

    #[test]
    fn test_boundary_at_head_of_next_segment() {
        let dir = dir_with(&["mysql-bin.000001", "mysql-bin.000002", "mysql-bin.000003"]);
        let events = fake(&[
            ("mysql-bin.000001", &[(10, 120), (20, 300)]),
            ("mysql-bin.000002", &[(40, 150)]),
        ]);

        let plan = plan_restore(dir.path(), "mysql-bin.000001", 4, 30, &events).unwrap();

        assert_eq!(names(&plan), vec!["mysql-bin.000001"]);
        assert_eq!(plan.stop_position, Some(300));
    }

    #[test]
    fn test_stop_before_every_event() {
        let dir = dir_with(&["mysql-bin.000001", "mysql-bin.000002"]);
        let events = fake(&[
            ("mysql-bin.000001", &[(100, 120)]),
            ("mysql-bin.000002", &[(200, 150)]),
        ]);

        let err = plan_restore(dir.path(), "mysql-bin.000001", 4, 50, &events).unwrap_err();
        assert!(matches!(err, PitrError::StopPositionNotFound));
    }

    #[test]
    fn test_stop_after_every_event() {
        let dir = dir_with(&["mysql-bin.000001", "mysql-bin.000002"]);
        let events = fake(&[
            ("mysql-bin.000001", &[(10, 120)]),
            ("mysql-bin.000002", &[(20, 150), (21, 400)]),
        ]);

        let plan = plan_restore(dir.path(), "mysql-bin.000001", 4, 1_000, &events).unwrap();
        assert_eq!(names(&plan).len(), 2);
        assert_eq!(plan.stop_position, Some(400));
    }

    #[test]
    fn test_stop_before_start_offset_is_noop_window() {
        let dir = dir_with(&["mysql-bin.000001"]);
        let events = fake(&[("mysql-bin.000001", &[(10, 120), (20, 300), (30, 450)])]);

        let plan = plan_restore(dir.path(), "mysql-bin.000001", 300, 20, &events).unwrap();
        assert_eq!(plan.stop_position, Some(300));
        assert_eq!(plan.start_position, 300);
    }

    #[test]
    fn test_scan_failure_names_segment() {
        struct Broken;
        impl EventStream for Broken {
            fn stream_events(
                &self,
                _segment: &Path,
                _on_event: &mut dyn FnMut(u32, u64) -> ScanOutcome,
            ) -> io::Result<ScanOutcome> {
                Ok(ScanOutcome::Failed("checksum mismatch".into()))
            }
        }

        let dir = dir_with(&["mysql-bin.000001"]);
        let err = plan_restore(dir.path(), "mysql-bin.000001", 4, 20, &Broken).unwrap_err();
        match err {
            PitrError::EventStream { segment, reason } => {
                assert!(segment.ends_with("mysql-bin.000001"));
                assert_eq!(reason, "checksum mismatch");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_reads_real_segment_files() {
        let dir = TempDir::new().unwrap();
        // Positions: 33, 52, 104
        std::fs::write(
            dir.path().join("mysql-bin.000001"),
            binlog_bytes(&[(100, 10), (101, 0), (105, 33)]),
        )
        .unwrap();

        let plan = plan_restore(dir.path(), "mysql-bin.000001", 4, 105, &FileEventStream).unwrap();
        assert_eq!(plan.stop_position, Some(52));

        std::fs::write(dir.path().join("mysql-bin.000002"), b"not a binlog").unwrap();
        let err = plan_restore(dir.path(), "mysql-bin.000001", 4, 1_000, &FileEventStream).unwrap_err();
        assert!(matches!(err, PitrError::EventStream { .. }));
    }
}
