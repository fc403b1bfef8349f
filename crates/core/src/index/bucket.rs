//! Fixed-width time buckets
//!
//! A bucket is derived from an event's timestamp and never stored on the
//! event itself. Cells keep a directory of bucket spans so range queries can
//! skip whole days without touching individual events.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Bucket number: `floor(unix_seconds / width)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeBucket(pub i64);

impl TimeBucket {
    /// Bucket containing `t` for buckets of `width_secs` seconds
    #[inline]
    #[must_use]
    pub fn of(t: DateTime<Utc>, width_secs: i64) -> Self {
        Self(t.timestamp().div_euclid(width_secs))
    }

    /// First instant of the bucket
    #[must_use]
    pub fn start(self, width_secs: i64) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.0.checked_mul(width_secs)?, 0)
    }

    /// Last representable instant of the bucket
    #[must_use]
    pub fn end(self, width_secs: i64) -> Option<DateTime<Utc>> {
        let next = Self(self.0.checked_add(1)?).start(width_secs)?;
        next.checked_sub_signed(TimeDelta::nanoseconds(1))
    }
}

/// Contiguous run of a cell's members falling into one bucket.
///
/// `start..end` are offsets into the owning cell's member list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketSpan {
    pub bucket: TimeBucket,
    pub start: u32,
    pub end: u32,
}
