//! Fire detection record as admitted into the event store

use crate::core_types::geo::BoundingBox;
use crate::error::IndexBuildError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier derived from the source record.
///
/// Never reassigned; it is the tie-breaker for events sharing a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Detection confidence band
///
/// Ordered `Low < Nominal < High` so a minimum threshold is a plain comparison.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Likely false alarm or sun glint
    #[default]
    Low,
    /// Typical detection
    Nominal,
    /// Saturated or unambiguous fire pixel
    High,
}

impl Confidence {
    /// Map a MODIS-style 0-100 confidence percentage onto a band.
    ///
    /// Uses the FIRMS class boundaries: below 30 is low, 80 and above is high.
    #[must_use]
    pub fn from_percent(percent: u8) -> Self {
        match percent {
            0..=29 => Self::Low,
            30..=79 => Self::Nominal,
            _ => Self::High,
        }
    }

    /// Parse a VIIRS-style letter code (`l`, `n`, `h`) or a full band name.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "l" | "low" => Some(Self::Low),
            "n" | "nominal" => Some(Self::Nominal),
            "h" | "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Sensor family that produced the detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instrument {
    Modis,
    Viirs,
    Unknown,
}

/// Provenance tag: which satellite pass produced the detection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SatelliteSource {
    Terra,
    Aqua,
    SuomiNpp,
    Noaa20,
    Noaa21,
    Other(String),
}

impl SatelliteSource {
    /// Parse a FIRMS satellite column value (`T`, `A`, `N`, `1`, `N20`, ...).
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "T" | "TERRA" => Self::Terra,
            "A" | "AQUA" => Self::Aqua,
            "N" | "NPP" | "SUOMI NPP" | "SUOMI-NPP" => Self::SuomiNpp,
            "1" | "N20" | "NOAA-20" | "NOAA20" => Self::Noaa20,
            "2" | "N21" | "NOAA-21" | "NOAA21" => Self::Noaa21,
            other => Self::Other(other.to_string()),
        }
    }

    /// Instrument carried by the platform
    #[must_use]
    pub fn instrument(&self) -> Instrument {
        match self {
            Self::Terra | Self::Aqua => Instrument::Modis,
            Self::SuomiNpp | Self::Noaa20 | Self::Noaa21 => Instrument::Viirs,
            Self::Other(_) => Instrument::Unknown,
        }
    }
}

/// Along-scan and along-track pixel size in kilometres.
///
/// MODIS pixels grow from 1x1 km at nadir to roughly 2x4.8 km at the swath
/// edge; VIIRS I-band pixels stay under a kilometre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelFootprint {
    pub scan: f64,
    pub track: f64,
}

impl PixelFootprint {
    /// Ground area covered by the pixel, km²
    #[inline]
    #[must_use]
    pub fn area(&self) -> f64 {
        self.scan * self.track
    }
}

/// A single satellite fire detection.
///
/// Immutable once admitted. Corrections arrive as new events with a
/// superseding timestamp, never as in-place edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireEvent {
    /// Stable source-derived identifier
    pub id: EventId,
    /// Degrees north, -90..=90
    pub latitude: f64,
    /// Degrees east, -180..=180
    pub longitude: f64,
    /// Acquisition instant (UTC)
    pub timestamp: DateTime<Utc>,
    /// Brightness temperature (Kelvin)
    pub brightness: f64,
    /// Fire radiative power (MW)
    pub frp: f64,
    /// Confidence band
    pub confidence: Confidence,
    /// Provenance
    pub satellite: SatelliteSource,
    /// Pixel size, when the source reported `scan` and `track`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel: Option<PixelFootprint>,
}

impl FireEvent {
    /// UTC calendar day of the detection
    #[must_use]
    pub fn day(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// Burning area estimate from the pixel size, `None` without one
    #[must_use]
    pub fn fire_area(&self) -> Option<f64> {
        self.pixel.map(|p| p.area())
    }

    /// Check the normalizer contract against an admission region.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule as an `IndexBuildError`.
    pub fn validate(&self, region: &BoundingBox) -> Result<(), IndexBuildError> {
        let lat_ok = self.latitude.is_finite() && (-90.0..=90.0).contains(&self.latitude);
        let lon_ok = self.longitude.is_finite() && (-180.0..=180.0).contains(&self.longitude);
        if !lat_ok || !lon_ok {
            return Err(IndexBuildError::CoordinateOutOfRange {
                id: self.id,
                latitude: self.latitude,
                longitude: self.longitude,
            });
        }

        if !region.contains(self.latitude, self.longitude) {
            return Err(IndexBuildError::OutsideRegion {
                id: self.id,
                latitude: self.latitude,
                longitude: self.longitude,
            });
        }

        for (field, value) in [("brightness", self.brightness), ("frp", self.frp)] {
            if !value.is_finite() || value < 0.0 {
                return Err(IndexBuildError::InvalidIntensity {
                    id: self.id,
                    field,
                    value,
                });
            }
        }

        if let Some(pixel) = self.pixel {
            for (field, value) in [("scan", pixel.scan), ("track", pixel.track)] {
                if !value.is_finite() || value <= 0.0 {
                    return Err(IndexBuildError::InvalidIntensity {
                        id: self.id,
                        field,
                        value,
                    });
                }
            }
        }

        Ok(())
    }
}
