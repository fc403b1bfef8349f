//! Aggregation metrics and their evaluation

use crate::core_types::FireEvent;
use crate::error::UnknownMetricError;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Percentiles reported by [`Metric::FrpPercentiles`]
pub const PERCENTILE_BANDS: [u8; 5] = [10, 25, 50, 75, 90];

/// Statistic computed over the events of one period and region.
///
/// Parsed from the tags `count`, `mean_frp`, `min_frp`, `max_frp`,
/// `frp_sum`, `mean_brightness`, `min_brightness`, `max_brightness`,
/// `fire_area_sum`, `mean_fire_area`, `frp_p<NN>`, `frp_percentiles`,
/// `extent` and `distinct_days`.
///
/// Fire-area metrics only see events that carry a pixel footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Metric {
    Count,
    MeanFrp,
    MinFrp,
    MaxFrp,
    FrpSum,
    MeanBrightness,
    MinBrightness,
    MaxBrightness,
    FireAreaSum,
    MeanFireArea,
    /// Single FRP percentile, 0..=100
    FrpPercentile(u8),
    FrpPercentiles,
    /// Mean and range of detection coordinates
    Extent,
    DistinctDays,
}

impl FromStr for Metric {
    type Err = UnknownMetricError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        let metric = match tag {
            "count" => Metric::Count,
            "mean_frp" => Metric::MeanFrp,
            "min_frp" => Metric::MinFrp,
            "max_frp" => Metric::MaxFrp,
            "frp_sum" => Metric::FrpSum,
            "mean_brightness" => Metric::MeanBrightness,
            "min_brightness" => Metric::MinBrightness,
            "max_brightness" => Metric::MaxBrightness,
            "fire_area_sum" => Metric::FireAreaSum,
            "mean_fire_area" => Metric::MeanFireArea,
            "frp_percentiles" => Metric::FrpPercentiles,
            "extent" => Metric::Extent,
            "distinct_days" => Metric::DistinctDays,
            other => other
                .strip_prefix("frp_p")
                .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|digits| digits.parse::<u8>().ok())
                .filter(|&p| p <= 100)
                .map(Metric::FrpPercentile)
                .ok_or_else(|| UnknownMetricError {
                    tag: tag.to_string(),
                })?,
        };
        Ok(metric)
    }
}

impl TryFrom<String> for Metric {
    type Error = UnknownMetricError;

    fn try_from(tag: String) -> Result<Self, Self::Error> {
        tag.parse()
    }
}

impl From<Metric> for String {
    fn from(metric: Metric) -> Self {
        metric.to_string()
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Count => f.write_str("count"),
            Metric::MeanFrp => f.write_str("mean_frp"),
            Metric::MinFrp => f.write_str("min_frp"),
            Metric::MaxFrp => f.write_str("max_frp"),
            Metric::FrpSum => f.write_str("frp_sum"),
            Metric::MeanBrightness => f.write_str("mean_brightness"),
            Metric::MinBrightness => f.write_str("min_brightness"),
            Metric::MaxBrightness => f.write_str("max_brightness"),
            Metric::FireAreaSum => f.write_str("fire_area_sum"),
            Metric::MeanFireArea => f.write_str("mean_fire_area"),
            Metric::FrpPercentile(p) => write!(f, "frp_p{p}"),
            Metric::FrpPercentiles => f.write_str("frp_percentiles"),
            Metric::Extent => f.write_str("extent"),
            Metric::DistinctDays => f.write_str("distinct_days"),
        }
    }
}

/// FRP distribution summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PercentileBands {
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
}

/// Where the detections of a period sat
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatialExtent {
    pub mean_latitude: f64,
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub mean_longitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl SpatialExtent {
    fn of(events: &[&FireEvent]) -> Self {
        let Some(first) = events.first() else {
            return Self::default();
        };
        let mut extent = Self {
            mean_latitude: 0.0,
            min_latitude: first.latitude,
            max_latitude: first.latitude,
            mean_longitude: 0.0,
            min_longitude: first.longitude,
            max_longitude: first.longitude,
        };
        let (mut lat_sum, mut lon_sum) = (0.0, 0.0);
        for e in events {
            lat_sum += e.latitude;
            lon_sum += e.longitude;
            extent.min_latitude = extent.min_latitude.min(e.latitude);
            extent.max_latitude = extent.max_latitude.max(e.latitude);
            extent.min_longitude = extent.min_longitude.min(e.longitude);
            extent.max_longitude = extent.max_longitude.max(e.longitude);
        }
        extent.mean_latitude = mean(lat_sum, events.len());
        extent.mean_longitude = mean(lon_sum, events.len());
        extent
    }
}

/// Value of an aggregation. Empty inputs produce zeros, never errors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricValue {
    Count(u64),
    Scalar(f64),
    Bands(PercentileBands),
    Extent(SpatialExtent),
}

impl MetricValue {
    /// Scalar view; bands report their median, extents their mean latitude
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        match *self {
            MetricValue::Count(n) => n as f64,
            MetricValue::Scalar(v) => v,
            MetricValue::Bands(b) => b.p50,
            MetricValue::Extent(e) => e.mean_latitude,
        }
    }
}

/// Linearly interpolated percentile of an ascending slice, 0 when empty.
#[must_use]
pub fn percentile(sorted: &[f64], p: u8) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = f64::from(p.min(100)) / 100.0 * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
        }
    }
}

fn sorted_frp(events: &[&FireEvent]) -> Vec<f64> {
    let mut values: Vec<f64> = events.iter().map(|e| e.frp).collect();
    values.sort_unstable_by(f64::total_cmp);
    values
}

fn mean(sum: f64, n: usize) -> f64 {
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

impl Metric {
    /// Evaluate over a set of events in any order
    #[must_use]
    pub fn evaluate(&self, events: &[&FireEvent]) -> MetricValue {
        let n = events.len();
        match self {
            Metric::Count => MetricValue::Count(n as u64),
            Metric::MeanFrp => MetricValue::Scalar(mean(events.iter().map(|e| e.frp).sum(), n)),
            Metric::MinFrp => MetricValue::Scalar(
                events.iter().map(|e| e.frp).reduce(f64::min).unwrap_or(0.0),
            ),
            Metric::MaxFrp => MetricValue::Scalar(
                events.iter().map(|e| e.frp).reduce(f64::max).unwrap_or(0.0),
            ),
            Metric::FrpSum => MetricValue::Scalar(events.iter().map(|e| e.frp).sum()),
            Metric::MeanBrightness => {
                MetricValue::Scalar(mean(events.iter().map(|e| e.brightness).sum(), n))
            }
            Metric::MinBrightness => MetricValue::Scalar(
                events.iter().map(|e| e.brightness).reduce(f64::min).unwrap_or(0.0),
            ),
            Metric::MaxBrightness => MetricValue::Scalar(
                events.iter().map(|e| e.brightness).reduce(f64::max).unwrap_or(0.0),
            ),
            Metric::FireAreaSum => {
                MetricValue::Scalar(events.iter().filter_map(|e| e.fire_area()).sum())
            }
            Metric::MeanFireArea => {
                let (sum, with_pixel) = events
                    .iter()
                    .filter_map(|e| e.fire_area())
                    .fold((0.0, 0), |(sum, n), area| (sum + area, n + 1));
                MetricValue::Scalar(mean(sum, with_pixel))
            }
            Metric::Extent => MetricValue::Extent(SpatialExtent::of(events)),
            Metric::FrpPercentile(p) => MetricValue::Scalar(percentile(&sorted_frp(events), *p)),
            Metric::FrpPercentiles => {
                let sorted = sorted_frp(events);
                let [p10, p25, p50, p75, p90] = PERCENTILE_BANDS.map(|p| percentile(&sorted, p));
                MetricValue::Bands(PercentileBands {
                    p10,
                    p25,
                    p50,
                    p75,
                    p90,
                })
            }
            Metric::DistinctDays => {
                let days: FxHashSet<_> = events.iter().map(|e| e.day()).collect();
                MetricValue::Count(days.len() as u64)
            }
        }
    }
}
