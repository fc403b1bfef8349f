//! Error taxonomy for the event store
//!
//! Every failure here is a deterministic function of the caller's input.
//! Callers are expected to correct the input and call again; nothing is
//! fatal to the process and nothing is retried internally. Empty results are
//! never errors.

use crate::core_types::EventId;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// A batch handed to `SpatioTemporalIndex::load` broke the normalizer contract.
///
/// The load is aborted and the previously published epoch stays queryable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndexBuildError {
    /// Latitude or longitude is non-finite or outside the WGS84 range.
    #[error("event {id}: coordinate ({latitude}, {longitude}) is out of range")]
    CoordinateOutOfRange {
        id: EventId,
        latitude: f64,
        longitude: f64,
    },

    /// Coordinate is valid but lies outside the admission region.
    #[error("event {id}: ({latitude}, {longitude}) lies outside the admission region")]
    OutsideRegion {
        id: EventId,
        latitude: f64,
        longitude: f64,
    },

    /// Brightness or FRP is negative or non-finite.
    #[error("event {id}: {field} must be finite and non-negative, got {value}")]
    InvalidIntensity {
        id: EventId,
        field: &'static str,
        value: f64,
    },

    /// Two events in the batch share an id.
    #[error("event id {0} appears more than once in the batch")]
    DuplicateId(EventId),

    /// Event store addresses events with `u32` indices.
    #[error("batch of {0} events exceeds the index capacity")]
    TooManyEvents(usize),
}

/// A query or plan was given a degenerate time window or viewport.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidRangeError {
    /// `t0 > t1`.
    #[error("time window start {start} is after end {end}")]
    InvertedWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// Viewport has non-finite, out-of-range, or zero/negative extent bounds.
    #[error("degenerate viewport [west {west}, south {south}, east {east}, north {north}]")]
    DegenerateViewport {
        west: f64,
        south: f64,
        east: f64,
        north: f64,
    },

    /// Calendar period that does not exist (month 13, ISO week 54, ...).
    #[error("invalid calendar period: {0}")]
    InvalidPeriod(String),

    /// Time arithmetic left the representable range.
    #[error("time {0} cannot be offset by the configured window")]
    TimeOverflow(DateTime<Utc>),
}

/// Aggregation was asked for a metric tag it does not support.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown aggregation metric '{tag}'")]
pub struct UnknownMetricError {
    pub tag: String,
}

/// Configuration could not be read, parsed or validated.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config value {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// Umbrella error for operations that span several components.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    IndexBuild(#[from] IndexBuildError),

    #[error(transparent)]
    InvalidRange(#[from] InvalidRangeError),

    #[error(transparent)]
    UnknownMetric(#[from] UnknownMetricError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_offender() {
        let err = IndexBuildError::DuplicateId(EventId(42));
        assert_eq!(err.to_string(), "event id 42 appears more than once in the batch");

        let err = UnknownMetricError {
            tag: "median_smoke".to_string(),
        };
        assert_eq!(err.to_string(), "unknown aggregation metric 'median_smoke'");
    }

    #[test]
    fn test_engine_error_wraps_transparently() {
        let inner = UnknownMetricError {
            tag: "x".to_string(),
        };
        let outer: EngineError = inner.clone().into();
        assert_eq!(outer.to_string(), inner.to_string());
        assert!(matches!(outer, EngineError::UnknownMetric(_)));
    }
}
