//! Geographic bounding boxes in WGS84 degrees

use crate::error::InvalidRangeError;
use serde::{Deserialize, Serialize};

/// A geographic bounding box in WGS84 coordinates.
///
/// Edges are inclusive. Boxes crossing the antimeridian are not represented;
/// North America does not need them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western longitude boundary.
    pub west: f64,
    /// Southern latitude boundary.
    pub south: f64,
    /// Eastern longitude boundary.
    pub east: f64,
    /// Northern latitude boundary.
    pub north: f64,
}

impl BoundingBox {
    /// Creates a new bounding box from the given coordinates.
    #[must_use]
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Admission region for the event store: Alaska to eastern Canada, down to
    /// the southern tip of Florida.
    #[must_use]
    pub const fn north_america() -> Self {
        Self::new(-170.0, 25.0, -50.0, 70.0)
    }

    /// Contiguous United States
    #[must_use]
    pub const fn conus() -> Self {
        Self::new(-125.0, 25.0, -66.9, 49.5)
    }

    /// Alaska mainland
    #[must_use]
    pub const fn alaska() -> Self {
        Self::new(-170.0, 51.0, -129.9, 70.0)
    }

    /// Canada south of 70N
    #[must_use]
    pub const fn canada() -> Self {
        Self::new(-141.0, 41.7, -52.6, 70.0)
    }

    /// Reject boxes a query cannot meaningfully answer.
    ///
    /// # Errors
    ///
    /// `InvalidRangeError::DegenerateViewport` if any bound is non-finite or
    /// outside WGS84, or the box has zero or negative extent on either axis.
    pub fn validate(&self) -> Result<(), InvalidRangeError> {
        let finite = [self.west, self.south, self.east, self.north]
            .iter()
            .all(|v| v.is_finite());
        let in_range = (-180.0..=180.0).contains(&self.west)
            && (-180.0..=180.0).contains(&self.east)
            && (-90.0..=90.0).contains(&self.south)
            && (-90.0..=90.0).contains(&self.north);

        if finite && in_range && self.west < self.east && self.south < self.north {
            Ok(())
        } else {
            Err(InvalidRangeError::DegenerateViewport {
                west: self.west,
                south: self.south,
                east: self.east,
                north: self.north,
            })
        }
    }

    /// Whether the point lies inside (edges inclusive)
    #[inline]
    #[must_use]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.south
            && latitude <= self.north
            && longitude >= self.west
            && longitude <= self.east
    }

    /// Whether the two boxes share any point
    #[must_use]
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.west <= other.east
            && other.west <= self.east
            && self.south <= other.north
            && other.south <= self.north
    }

    /// Whether `other` lies completely inside this box
    #[must_use]
    pub fn covers(&self, other: &BoundingBox) -> bool {
        other.west >= self.west
            && other.east <= self.east
            && other.south >= self.south
            && other.north <= self.north
    }

    /// Width in degrees of longitude
    #[must_use]
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    /// Height in degrees of latitude
    #[must_use]
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Bit-exact hashable form, used as part of cache keys.
    #[must_use]
    pub fn key_bits(&self) -> [u64; 4] {
        [
            self.west.to_bits(),
            self.south.to_bits(),
            self.east.to_bits(),
            self.north.to_bits(),
        ]
    }
}
