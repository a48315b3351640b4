//! Per-keyframe timing tables (`n,pts_time,fps,frame_idx`).

use crate::error::{ClipframeError, Result};
use serde::Deserialize;
use std::path::Path;

/// Timing of one keyframe within its video.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TimingRecord {
    /// 1-based keyframe sequence number.
    #[serde(rename = "n")]
    pub sequence_number: u32,
    /// Presentation time in seconds.
    pub pts_time: f64,
    /// Frame rate of the source video.
    pub fps: f64,
    /// Index of the decoded frame in the source video.
    pub frame_idx: u64,
}

/// Parse a timing CSV, preserving row order.
pub fn parse_timings(bytes: &[u8], path: &Path) -> Result<Vec<TimingRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let mut records = Vec::new();
    for row in reader.deserialize::<TimingRecord>() {
        let record = row.map_err(|e| {
            let line = e.position().map(|p| p.line()).unwrap_or_default();
            ClipframeError::parse(path, format!("line {}: {}", line, e))
        })?;
        records.push(record);
    }
    Ok(records)
}
