//! Raw FIRMS records to validated [`FireEvent`]s
//!
//! Upstream parsers hand over one [`RawDetection`] per CSV row or JSON record,
//! with whichever column casing the archive used. The [`Normalizer`] applies
//! the same admission rules the index enforces, so a batch it accepts always
//! loads. An optional interquartile-range pass over the accepted batch drops
//! sensor outliers column by column.

use crate::aggregation::percentile;
use crate::core_types::{BoundingBox, Confidence, EventId, FireEvent, PixelFootprint, SatelliteSource};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use serde::{Deserialize, Serialize};
use std::hash::Hasher;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Field that may arrive as a number or as text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Int(i64),
    Float(f64),
    Text(String),
}

/// One detection as delivered by FIRMS (MODIS or VIIRS)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    #[serde(alias = "LATITUDE")]
    pub latitude: f64,
    #[serde(alias = "LONGITUDE")]
    pub longitude: f64,
    /// MODIS `brightness` or VIIRS `bright_ti4`, Kelvin
    #[serde(alias = "BRIGHTNESS", alias = "bright_ti4", alias = "BRIGHT_TI4")]
    pub brightness: Option<f64>,
    #[serde(alias = "FRP", default)]
    pub frp: Option<f64>,
    /// `YYYY-MM-DD`
    #[serde(alias = "ACQ_DATE")]
    pub acq_date: String,
    /// UTC `HHMM`, often with leading zeros stripped
    #[serde(alias = "ACQ_TIME")]
    pub acq_time: RawValue,
    /// MODIS percentage or VIIRS `l`/`n`/`h`
    #[serde(alias = "CONFIDENCE")]
    pub confidence: RawValue,
    #[serde(alias = "SATELLITE", default)]
    pub satellite: String,
    /// Along-scan pixel size, km
    #[serde(alias = "SCAN", default)]
    pub scan: Option<f64>,
    /// Along-track pixel size, km
    #[serde(alias = "TRACK", default)]
    pub track: Option<f64>,
}

/// Why a raw record was not admitted
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectReason {
    #[error("missing {0}")]
    MissingField(&'static str),
    #[error("coordinate ({0}, {1}) is not a valid WGS84 position")]
    InvalidCoordinate(f64, f64),
    #[error("({0}, {1}) lies outside the admission region")]
    OutsideRegion(f64, f64),
    #[error("unparseable acquisition date '{0}'")]
    InvalidDate(String),
    #[error("unparseable acquisition time {0:?}")]
    InvalidTime(RawValue),
    #[error("unparseable confidence {0:?}")]
    InvalidConfidence(RawValue),
    #[error("{0} must be finite and non-negative")]
    InvalidIntensity(&'static str),
    #[error("acquisition time {0} is in the future")]
    FutureTimestamp(DateTime<Utc>),
    #[error("duplicate of an earlier record")]
    Duplicate,
    #[error("{0} outside the batch's interquartile fence")]
    Outlier(&'static str),
}

impl RejectReason {
    /// Stable label for counting
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingField(_) => "missing_field",
            Self::InvalidCoordinate(..) => "invalid_coordinate",
            Self::OutsideRegion(..) => "outside_region",
            Self::InvalidDate(_) => "invalid_date",
            Self::InvalidTime(_) => "invalid_time",
            Self::InvalidConfidence(_) => "invalid_confidence",
            Self::InvalidIntensity(_) => "invalid_intensity",
            Self::FutureTimestamp(_) => "future_timestamp",
            Self::Duplicate => "duplicate",
            Self::Outlier(_) => "outlier",
        }
    }
}

/// Column screened by the outlier pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierColumn {
    Brightness,
    Frp,
    Scan,
    Track,
}

impl OutlierColumn {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Brightness => "brightness",
            Self::Frp => "frp",
            Self::Scan => "scan",
            Self::Track => "track",
        }
    }

    /// Value under screening; events without a pixel size pass the
    /// scan and track columns untouched.
    fn value(self, event: &FireEvent) -> Option<f64> {
        match self {
            Self::Brightness => Some(event.brightness),
            Self::Frp => Some(event.frp),
            Self::Scan => event.pixel.map(|p| p.scan),
            Self::Track => event.pixel.map(|p| p.track),
        }
    }
}

/// Outcome of normalizing a batch
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub accepted: Vec<FireEvent>,
    /// Rejected records per [`RejectReason::kind`]
    pub rejected: FxHashMap<&'static str, usize>,
    /// Outlier rejections per screened column
    pub outliers: FxHashMap<&'static str, usize>,
}

impl NormalizedBatch {
    #[must_use]
    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }
}

/// Converts raw detections into admitted events
#[derive(Debug, Clone)]
pub struct Normalizer {
    region: BoundingBox,
    reject_after: Option<DateTime<Utc>>,
    outlier_columns: Vec<OutlierColumn>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(BoundingBox::north_america())
    }
}

fn parse_hhmm(raw: &RawValue) -> Option<NaiveTime> {
    let value = match raw {
        RawValue::Int(v) => u32::try_from(*v).ok()?,
        RawValue::Float(v) if v.fract() == 0.0 && *v >= 0.0 => *v as u32,
        RawValue::Float(_) => return None,
        RawValue::Text(text) => {
            let digits: String = text.trim().chars().filter(|c| *c != ':').collect();
            if digits.is_empty() || digits.len() > 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            digits.parse().ok()?
        }
    };
    NaiveTime::from_hms_opt(value / 100, value % 100, 0)
}

fn parse_percent(value: f64) -> Option<Confidence> {
    (value.is_finite() && (0.0..=100.0).contains(&value))
        .then(|| Confidence::from_percent(value.round() as u8))
}

fn parse_confidence(raw: &RawValue) -> Option<Confidence> {
    match raw {
        RawValue::Int(v) => parse_percent(*v as f64),
        RawValue::Float(v) => parse_percent(*v),
        RawValue::Text(text) => Confidence::from_code(text)
            .or_else(|| text.trim().parse::<f64>().ok().and_then(parse_percent)),
    }
}

fn intensity(value: Option<f64>, field: &'static str) -> Result<f64, RejectReason> {
    let value = value.ok_or(RejectReason::MissingField(field))?;
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(RejectReason::InvalidIntensity(field))
    }
}

fn pixel(scan: Option<f64>, track: Option<f64>) -> Result<Option<PixelFootprint>, RejectReason> {
    let positive = |value: f64, field: &'static str| {
        if value.is_finite() && value > 0.0 {
            Ok(value)
        } else {
            Err(RejectReason::InvalidIntensity(field))
        }
    };
    match (scan, track) {
        (None, None) => Ok(None),
        (Some(scan), Some(track)) => Ok(Some(PixelFootprint {
            scan: positive(scan, "scan")?,
            track: positive(track, "track")?,
        })),
        (None, Some(_)) => Err(RejectReason::MissingField("scan")),
        (Some(_), None) => Err(RejectReason::MissingField("track")),
    }
}

/// Tukey fence `[q1 - 1.5 iqr, q3 + 1.5 iqr]` over the values present
fn iqr_fence(events: &[FireEvent], column: OutlierColumn) -> Option<(f64, f64)> {
    let mut values: Vec<f64> = events.iter().filter_map(|e| column.value(e)).collect();
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(f64::total_cmp);
    let q1 = percentile(&values, 25);
    let q3 = percentile(&values, 75);
    let iqr = q3 - q1;
    Some((q1 - 1.5 * iqr, q3 + 1.5 * iqr))
}

/// Id derived from what identifies a detection, so the same record always
/// maps to the same event across reloads.
fn detection_id(latitude: f64, longitude: f64, timestamp: DateTime<Utc>, satellite: &str) -> EventId {
    let mut hasher = FxHasher::default();
    hasher.write_u64(latitude.to_bits());
    hasher.write_u64(longitude.to_bits());
    hasher.write_i64(timestamp.timestamp());
    hasher.write(satellite.trim().to_ascii_uppercase().as_bytes());
    EventId(hasher.finish())
}

impl Normalizer {
    #[must_use]
    pub fn new(region: BoundingBox) -> Self {
        Self {
            region,
            reject_after: None,
            outlier_columns: Vec::new(),
        }
    }

    /// Reject detections stamped after `limit`, usually "now".
    #[must_use]
    pub fn reject_after(mut self, limit: DateTime<Utc>) -> Self {
        self.reject_after = Some(limit);
        self
    }

    /// Screen the accepted batch column by column, in the given order, and
    /// drop events outside each column's interquartile fence. Quartiles are
    /// recomputed over the survivors of the previous column.
    #[must_use]
    pub fn reject_outliers(mut self, columns: &[OutlierColumn]) -> Self {
        self.outlier_columns = columns.to_vec();
        self
    }

    #[must_use]
    pub fn region(&self) -> &BoundingBox {
        &self.region
    }

    /// Normalize one record.
    ///
    /// # Errors
    ///
    /// The first rule the record breaks.
    pub fn normalize(&self, raw: &RawDetection) -> Result<FireEvent, RejectReason> {
        let (lat, lon) = (raw.latitude, raw.longitude);
        if !lat.is_finite() || !lon.is_finite() || lat.abs() > 90.0 || lon.abs() > 180.0 {
            return Err(RejectReason::InvalidCoordinate(lat, lon));
        }
        if !self.region.contains(lat, lon) {
            return Err(RejectReason::OutsideRegion(lat, lon));
        }

        let date = NaiveDate::parse_from_str(raw.acq_date.trim(), "%Y-%m-%d")
            .map_err(|_| RejectReason::InvalidDate(raw.acq_date.clone()))?;
        let time = parse_hhmm(&raw.acq_time).ok_or_else(|| RejectReason::InvalidTime(raw.acq_time.clone()))?;
        let timestamp = date.and_time(time).and_utc();
        if self.reject_after.is_some_and(|limit| timestamp > limit) {
            return Err(RejectReason::FutureTimestamp(timestamp));
        }

        let confidence = parse_confidence(&raw.confidence)
            .ok_or_else(|| RejectReason::InvalidConfidence(raw.confidence.clone()))?;
        let brightness = intensity(raw.brightness, "brightness")?;
        let frp = intensity(raw.frp, "frp")?;
        let pixel = pixel(raw.scan, raw.track)?;

        Ok(FireEvent {
            id: detection_id(lat, lon, timestamp, &raw.satellite),
            latitude: lat,
            longitude: lon,
            timestamp,
            brightness,
            frp,
            confidence,
            satellite: SatelliteSource::from_code(&raw.satellite),
            pixel,
        })
    }

    /// Normalize a batch, dropping exact repeats of earlier records.
    pub fn normalize_batch<'a, I>(&self, records: I) -> NormalizedBatch
    where
        I: IntoIterator<Item = &'a RawDetection>,
    {
        let mut batch = NormalizedBatch::default();
        let mut seen = FxHashSet::default();

        for raw in records {
            let outcome = self
                .normalize(raw)
                .and_then(|event| if seen.insert(event.id) { Ok(event) } else { Err(RejectReason::Duplicate) });
            match outcome {
                Ok(event) => batch.accepted.push(event),
                Err(reason) => {
                    debug!("Rejected detection: {}", reason);
                    *batch.rejected.entry(reason.kind()).or_insert(0) += 1;
                }
            }
        }

        for &column in &self.outlier_columns {
            self.screen(&mut batch, column);
        }

        let rejected = batch.rejected_total();
        if rejected > 0 {
            warn!(
                "Rejected {} of {} detections: {:?}",
                rejected,
                rejected + batch.accepted.len(),
                batch.rejected
            );
        }
        info!("Normalized {} detections", batch.accepted.len());
        batch
    }

    fn screen(&self, batch: &mut NormalizedBatch, column: OutlierColumn) {
        let Some((low, high)) = iqr_fence(&batch.accepted, column) else {
            return;
        };
        let before = batch.accepted.len();
        batch
            .accepted
            .retain(|e| column.value(e).map_or(true, |v| (low..=high).contains(&v)));

        let dropped = before - batch.accepted.len();
        if dropped > 0 {
            debug!(
                "Dropped {} {} outliers outside {:.2}..{:.2}",
                dropped,
                column.name(),
                low,
                high
            );
            *batch.rejected.entry(RejectReason::Outlier(column.name()).kind()).or_insert(0) += dropped;
            *batch.outliers.entry(column.name()).or_insert(0) += dropped;
        }
    }
}
