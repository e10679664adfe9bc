//! Local filesystem helpers.

pub mod walker;

pub use walker::{list_segments, list_segments_sorted, SegmentFile, WalkOptions};
