//! Fire Activity Playback Core Library
//!
//! Spatio-temporal event store for satellite fire detections (NASA FIRMS,
//! MODIS and VIIRS) over North America. Detections are loaded in bulk into
//! immutable epochs, played back frame by frame at animation speed with a
//! level-of-detail cap, and summarized per season, month, week or year.
//!
//! ## Components
//!
//! - [`ingest`]: raw FIRMS records to validated events
//! - [`index`]: grid-cell and time-bucket partitioned store with atomic
//!   epoch swaps
//! - [`planner`]: per-frame downsampling plans bounded by a point budget
//! - [`playback`]: pulled play/pause/seek state machine producing frames
//! - [`aggregation`]: cached period and region statistics

// Core types and utilities
pub mod config;
pub mod core_types;
pub mod error;
pub mod profiler;

// Data path
pub mod index;
pub mod ingest;
pub mod planner;

// Session-facing engines
pub mod aggregation;
pub mod playback;

// Re-export core types
pub use config::{DecayPolicy, EngineConfig, IndexConfig, PlannerConfig, PlaybackConfig};
pub use config::{SamplingPolicy, SeedScope};
pub use core_types::{
    BoundingBox, Confidence, EventId, FireEvent, Instrument, PixelFootprint, SatelliteSource, TimeWindow,
};
pub use error::{ConfigError, EngineError, IndexBuildError, InvalidRangeError, UnknownMetricError};

// Re-export engine types
pub use aggregation::{
    AggregationEngine, AggregationResult, Metric, MetricValue, PeriodGranularity, PeriodSpec, Season,
    SpatialExtent,
};
pub use index::{EpochId, IndexEpoch, SpatioTemporalIndex};
pub use ingest::{NormalizedBatch, Normalizer, OutlierColumn, RawDetection, RejectReason};
pub use planner::{QueryPlan, QueryPlanner, SampledFrame};
pub use playback::{FramePayload, FrameStats, OverlayPeriod, OverlayRequest, PlaybackController, PlaybackMode, PlaybackState};
