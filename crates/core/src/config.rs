//! Engine configuration
//!
//! All sections deserialize with `#[serde(default)]`, so a JSON document only
//! needs to name the values it overrides:
//!
//! ```json
//! { "decay": { "window_secs": 259200 }, "planner": { "sampling": "priority" } }
//! ```

use crate::core_types::{BoundingBox, Confidence, FireEvent};
use crate::error::ConfigError;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

const SECONDS_PER_DAY: i64 = 86_400;

/// Top-level configuration for one engine instance
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub index: IndexConfig,
    pub decay: DecayPolicy,
    pub planner: PlannerConfig,
    pub playback: PlaybackConfig,
}

impl EngineConfig {
    /// Parse and validate a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed JSON and
    /// `ConfigError::Invalid` for out-of-range values.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`EngineConfig::from_json_str`].
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// # Errors
    ///
    /// Returns the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.index.validate()?;
        self.decay.validate()?;
        self.planner.validate()?;
        self.playback.validate()
    }
}

fn invalid(field: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        message: message.into(),
    }
}

/// Partitioning of the event store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Edge length of a spatial cell in degrees
    pub cell_size_degrees: f64,
    /// Width of a time bucket in seconds
    pub bucket_width_secs: i64,
    /// Events outside this box are rejected at load
    pub admission_region: BoundingBox,
}

impl Default for IndexConfig {
    /// One-degree cells, daily buckets, North America.
    fn default() -> Self {
        Self {
            cell_size_degrees: 1.0,
            bucket_width_secs: SECONDS_PER_DAY,
            admission_region: BoundingBox::north_america(),
        }
    }
}

impl IndexConfig {
    /// # Errors
    ///
    /// `ConfigError::Invalid` naming the first out-of-range field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.cell_size_degrees.is_finite()
            || self.cell_size_degrees < 0.01
            || self.cell_size_degrees > 90.0
        {
            return Err(invalid(
                "index.cell_size_degrees",
                format!("must be within 0.01..=90, got {}", self.cell_size_degrees),
            ));
        }
        if self.bucket_width_secs <= 0 {
            return Err(invalid(
                "index.bucket_width_secs",
                format!("must be positive, got {}", self.bucket_width_secs),
            ));
        }
        self.admission_region
            .validate()
            .map_err(|e| invalid("index.admission_region", e.to_string()))
    }
}

/// How long a point detection stays visible after its timestamp.
///
/// A detection is active at `t` when `timestamp <= t <= timestamp + window`.
/// Each confidence band may override the base window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayPolicy {
    /// Base persistence in seconds
    pub window_secs: i64,
    pub low_secs: Option<i64>,
    pub nominal_secs: Option<i64>,
    pub high_secs: Option<i64>,
}

impl Default for DecayPolicy {
    /// Three days for every band.
    fn default() -> Self {
        Self::uniform(TimeDelta::days(3))
    }
}

impl DecayPolicy {
    /// Same window for every confidence band
    #[must_use]
    pub fn uniform(window: TimeDelta) -> Self {
        Self {
            window_secs: window.num_seconds(),
            low_secs: None,
            nominal_secs: None,
            high_secs: None,
        }
    }

    /// Window applying to detections of the given band
    #[must_use]
    pub fn window_for(&self, confidence: Confidence) -> TimeDelta {
        let secs = match confidence {
            Confidence::Low => self.low_secs,
            Confidence::Nominal => self.nominal_secs,
            Confidence::High => self.high_secs,
        }
        .unwrap_or(self.window_secs);
        TimeDelta::try_seconds(secs).unwrap_or(TimeDelta::MAX)
    }

    /// Longest window over all bands; bounds the temporal scan
    #[must_use]
    pub fn max_window(&self) -> TimeDelta {
        [Confidence::Low, Confidence::Nominal, Confidence::High]
            .into_iter()
            .map(|c| self.window_for(c))
            .max()
            .unwrap_or(TimeDelta::MAX)
    }

    /// Whether `event` is part of the visible footprint at `at`
    #[inline]
    #[must_use]
    pub fn is_active(&self, event: &FireEvent, at: DateTime<Utc>) -> bool {
        if event.timestamp > at {
            return false;
        }
        event
            .timestamp
            .checked_add_signed(self.window_for(event.confidence))
            .map_or(true, |expiry| at <= expiry)
    }

    /// # Errors
    ///
    /// `ConfigError::Invalid` for a negative window or one longer than ten
    /// years.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Ten years keeps timestamp arithmetic far from chrono's limits.
        const MAX_SECS: i64 = 10 * 366 * SECONDS_PER_DAY;
        let fields = [
            ("decay.window_secs", Some(self.window_secs)),
            ("decay.low_secs", self.low_secs),
            ("decay.nominal_secs", self.nominal_secs),
            ("decay.high_secs", self.high_secs),
        ];
        for (field, value) in fields {
            if let Some(secs) = value {
                if !(0..=MAX_SECS).contains(&secs) {
                    return Err(invalid(field, format!("must be within 0..={MAX_SECS}, got {secs}")));
                }
            }
        }
        Ok(())
    }
}

/// How the planner picks events when a cell holds more than its quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingPolicy {
    /// Uniform reservoir sample seeded per cell and frame
    Reservoir,
    /// Highest FRP first, ties broken by id
    Priority,
}

/// Which seed feeds reservoir sampling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedScope {
    /// Every session viewing the same frame sees the same subset
    Global,
    /// Each planner mixes in its own session seed
    Session,
}

/// Level-of-detail policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Hard ceiling on events in one frame
    pub frame_cap: usize,
    /// Per-cell quota at zoom 0; doubles with every zoom level
    pub cell_cap_at_min_zoom: usize,
    /// From this zoom on only `frame_cap` limits the output
    pub full_detail_zoom: u8,
    pub sampling: SamplingPolicy,
    pub seed_scope: SeedScope,
    /// Base seed for reservoir sampling
    pub seed: u64,
    /// Frames whose end times fall in the same quantum share a seed
    pub seed_quantum_secs: i64,
}

impl Default for PlannerConfig {
    /// 50k points per frame, 64 per cell at zoom 0, reservoir sampling
    /// globally seeded per day.
    fn default() -> Self {
        Self {
            frame_cap: 50_000,
            cell_cap_at_min_zoom: 64,
            full_detail_zoom: 10,
            sampling: SamplingPolicy::Reservoir,
            seed_scope: SeedScope::Global,
            seed: 0x5EED_F1E5,
            seed_quantum_secs: SECONDS_PER_DAY,
        }
    }
}

impl PlannerConfig {
    /// Per-cell quota at the given zoom level
    #[must_use]
    pub fn cell_cap(&self, zoom: u8) -> usize {
        if zoom >= self.full_detail_zoom {
            return usize::MAX;
        }
        let shift = u32::from(zoom).min(usize::BITS - 1);
        self.cell_cap_at_min_zoom
            .checked_shl(shift)
            .filter(|cap| cap >> shift == self.cell_cap_at_min_zoom)
            .unwrap_or(usize::MAX)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_cap == 0 {
            return Err(invalid("planner.frame_cap", "must be positive"));
        }
        if self.cell_cap_at_min_zoom == 0 {
            return Err(invalid("planner.cell_cap_at_min_zoom", "must be positive"));
        }
        if self.seed_quantum_secs <= 0 {
            return Err(invalid(
                "planner.seed_quantum_secs",
                format!("must be positive, got {}", self.seed_quantum_secs),
            ));
        }
        Ok(())
    }
}

/// Playback speed and end-of-data behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Data seconds advanced per wall-clock second at speed 1.0
    pub base_rate: f64,
    pub default_speed: f64,
    pub min_speed: f64,
    pub max_speed: f64,
    /// Wrap to the start instead of pausing at the end of data
    pub loop_at_end: bool,
    /// Frames slower than this are logged
    pub frame_budget_ms: f64,
}

impl Default for PlaybackConfig {
    /// One data day per second, speeds 0.1x to 10x, 30fps budget.
    fn default() -> Self {
        Self {
            base_rate: SECONDS_PER_DAY as f64,
            default_speed: 1.0,
            min_speed: 0.1,
            max_speed: 10.0,
            loop_at_end: false,
            frame_budget_ms: 33.0,
        }
    }
}

impl PlaybackConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_rate.is_finite() || self.base_rate <= 0.0 {
            return Err(invalid(
                "playback.base_rate",
                format!("must be finite and positive, got {}", self.base_rate),
            ));
        }
        if !(self.min_speed.is_finite() && self.max_speed.is_finite())
            || self.min_speed <= 0.0
            || self.min_speed > self.max_speed
        {
            return Err(invalid(
                "playback.min_speed",
                format!(
                    "need 0 < min_speed <= max_speed, got {}..{}",
                    self.min_speed, self.max_speed
                ),
            ));
        }
        if !(self.min_speed..=self.max_speed).contains(&self.default_speed) {
            return Err(invalid(
                "playback.default_speed",
                format!(
                    "must lie within {}..={}, got {}",
                    self.min_speed, self.max_speed, self.default_speed
                ),
            ));
        }
        if !self.frame_budget_ms.is_finite() || self.frame_budget_ms <= 0.0 {
            return Err(invalid("playback.frame_budget_ms", "must be finite and positive"));
        }
        Ok(())
    }
}
