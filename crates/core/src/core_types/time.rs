//! Closed time intervals over UTC instants

use crate::error::InvalidRangeError;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Closed interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// # Errors
    ///
    /// `InvalidRangeError::InvertedWindow` if `start > end`. A zero-length
    /// window (`start == end`) is valid.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, InvalidRangeError> {
        if start > end {
            return Err(InvalidRangeError::InvertedWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Window `[at - lookback, at]`.
    ///
    /// # Errors
    ///
    /// `InvalidRangeError::TimeOverflow` if the subtraction leaves chrono's range.
    pub fn trailing(at: DateTime<Utc>, lookback: TimeDelta) -> Result<Self, InvalidRangeError> {
        let start = at
            .checked_sub_signed(lookback)
            .ok_or(InvalidRangeError::TimeOverflow(at))?;
        Self::new(start.min(at), at)
    }

    /// Half-open `[start, next_start)` expressed as the closed window ending
    /// one nanosecond before `next_start`.
    pub(crate) fn half_open(
        start: DateTime<Utc>,
        next_start: DateTime<Utc>,
    ) -> Result<Self, InvalidRangeError> {
        let end = next_start
            .checked_sub_signed(TimeDelta::nanoseconds(1))
            .ok_or(InvalidRangeError::TimeOverflow(next_start))?;
        Self::new(start, end)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t <= self.end
    }

    /// Overlap of two windows, `None` when disjoint
    #[must_use]
    pub fn intersect(&self, other: &TimeWindow) -> Option<TimeWindow> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then_some(TimeWindow { start, end })
    }

    /// Clamp an instant into the window
    #[must_use]
    pub fn clamp(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        t.clamp(self.start, self.end)
    }
}
