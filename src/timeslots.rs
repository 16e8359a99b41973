//! Time-bucket resolution for flow capture files.
//!
//! Capture files roll every five minutes and live under
//! `<data_root>/<source>/YYYY/MM/DD/flows.YYYYMMDDHHmm00.fds`. Rotation gaps
//! are common, so instead of enumerating every bucket in a range the resolver
//! probes inwards from both ends of the range and keeps the first bucket that
//! actually exists on each side.
//!
//! The result is a list of *boundary* buckets, not a dense listing:
//!
//! - start side: the first existing bucket walking forward from the start,
//!   once for every source that has it;
//! - end side: the first existing bucket walking backward from the end.
//!
//! Duplicates are kept. An empty result means "no coverage" and is not an
//! error at this level.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// Width of one bucket in seconds.
pub const BUCKET_SECS: i64 = 300;

/// Truncate an epoch timestamp down to the five-minute grid.
pub fn truncate_to_grid(ts: i64) -> i64 {
    ts - ts.rem_euclid(BUCKET_SECS)
}

/// Clock used to render bucket paths.
///
/// Collectors name files after their own wall clock, so installations that
/// capture in local time need [`BucketClock::Local`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketClock {
    #[default]
    Utc,
    Local,
}

impl BucketClock {
    /// Render the bucket path (relative to a source directory) for a
    /// grid-aligned timestamp. Returns `None` for timestamps chrono cannot
    /// represent.
    pub fn bucket_path(self, ts: i64) -> Option<String> {
        match self {
            BucketClock::Utc => Utc.timestamp_opt(ts, 0).single().map(|dt| format_bucket(&dt)),
            BucketClock::Local => Local
                .timestamp_opt(ts, 0)
                .earliest()
                .map(|dt| format_bucket(&dt)),
        }
    }
}

fn format_bucket<Tz>(dt: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{}/flows.{}00.fds",
        dt.format("%Y/%m/%d"),
        dt.format("%Y%m%d%H%M")
    )
}

/// A logical query window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Build a range from epoch seconds. Returns `None` if either bound is
    /// out of chrono's range.
    pub fn from_timestamps(start: i64, end: i64) -> Option<Self> {
        Some(Self {
            start: DateTime::from_timestamp(start, 0)?,
            end: DateTime::from_timestamp(end, 0)?,
        })
    }
}

/// Resolves a time range plus sources into boundary bucket paths.
#[derive(Debug, Clone)]
pub struct TimeRangeResolver {
    data_root: PathBuf,
    clock: BucketClock,
    max_steps: Option<u64>,
}

impl TimeRangeResolver {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            clock: BucketClock::Utc,
            max_steps: None,
        }
    }

    pub fn with_clock(mut self, clock: BucketClock) -> Self {
        self.clock = clock;
        self
    }

    /// Cap each walk at `max_steps` probes. Without a cap a walk is bounded
    /// only by the requested range.
    pub fn with_max_steps(mut self, max_steps: Option<u64>) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Resolve `range` for `sources` into bucket paths relative to each
    /// source directory: start-side boundaries first, then the end-side one.
    pub fn resolve(&self, range: &TimeRange, sources: &[String]) -> Vec<String> {
        let start = truncate_to_grid(range.start.timestamp());
        let end = truncate_to_grid(range.end.timestamp());
        debug!(start, end, sources = sources.len(), "resolving flow files");

        let mut slots = self.walk_forward(start, end, sources);
        if let Some(last) = self.walk_backward(start, end, sources) {
            slots.push(last);
        }
        slots
    }

    fn walk_forward(&self, start: i64, end: i64, sources: &[String]) -> Vec<String> {
        let mut cursor = start;
        let mut steps = 0u64;

        while cursor < end {
            if self.cap_reached(steps, "forward") {
                break;
            }
            steps += 1;

            if let Some(bucket) = self.clock.bucket_path(cursor) {
                let hits = sources
                    .iter()
                    .filter(|source| self.exists(source, &bucket))
                    .count();
                if hits > 0 {
                    debug!(bucket = %bucket, hits, steps, "start boundary");
                    return vec![bucket; hits];
                }
            }
            cursor += BUCKET_SECS;
        }
        Vec::new()
    }

    fn walk_backward(&self, start: i64, end: i64, sources: &[String]) -> Option<String> {
        let mut cursor = end;
        let mut steps = 0u64;

        // `>` rather than `!=` so an inverted range cannot walk forever
        while cursor > start {
            if self.cap_reached(steps, "backward") {
                break;
            }
            steps += 1;

            if let Some(bucket) = self.clock.bucket_path(cursor)
                && sources.iter().any(|source| self.exists(source, &bucket))
            {
                debug!(bucket = %bucket, steps, "end boundary");
                return Some(bucket);
            }
            cursor -= BUCKET_SECS;
        }
        None
    }

    fn cap_reached(&self, steps: u64, direction: &str) -> bool {
        match self.max_steps {
            Some(max) if steps >= max => {
                warn!(max, direction, "bucket walk hit probe cap without finding a file");
                true
            }
            _ => false,
        }
    }

    fn exists(&self, source: &str, bucket: &str) -> bool {
        let path = self.data_root.join(source).join(bucket);
        let found = path.exists();
        trace!(path = %path.display(), found, "probe");
        found
    }
}
