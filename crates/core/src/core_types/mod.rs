//! Core types and utilities

pub mod event;
pub mod geo;
pub mod time;

pub use event::{Confidence, EventId, FireEvent, Instrument, PixelFootprint, SatelliteSource};
pub use geo::BoundingBox;
pub use time::TimeWindow;
