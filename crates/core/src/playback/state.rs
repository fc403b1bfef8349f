//! Per-session playback state

use super::frame::OverlayRequest;
use crate::config::PlaybackConfig;
use crate::core_types::{BoundingBox, Confidence, TimeWindow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Controller state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    #[default]
    Paused,
    Playing,
    /// Only observable while a seek is being applied
    Seeking,
}

/// Everything a session can change. Owned by exactly one controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    /// `None` until the first tick or seek places it on the data
    pub cursor: Option<DateTime<Utc>>,
    pub mode: PlaybackMode,
    pub speed: f64,
    pub viewport: BoundingBox,
    pub zoom: u8,
    pub min_confidence: Confidence,
    /// Restricts both the cursor range and the events shown
    pub date_range: Option<TimeWindow>,
    pub overlays: Vec<OverlayRequest>,
}

impl PlaybackState {
    /// Paused at the start of data, whole continent at zoom 3
    #[must_use]
    pub fn new(config: &PlaybackConfig) -> Self {
        Self {
            cursor: None,
            mode: PlaybackMode::Paused,
            speed: config.default_speed.clamp(config.min_speed, config.max_speed),
            viewport: BoundingBox::north_america(),
            zoom: 3,
            min_confidence: Confidence::Low,
            date_range: None,
            overlays: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.mode == PlaybackMode::Playing
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new(&PlaybackConfig::default())
    }
}
