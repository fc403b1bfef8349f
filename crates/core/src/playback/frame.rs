//! Renderable frame payloads

use crate::aggregation::{AggregationResult, Metric, PeriodGranularity, PeriodSpec};
use crate::core_types::{BoundingBox, FireEvent};
use crate::error::UnknownMetricError;
use crate::index::IndexEpoch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which period an overlay summarizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayPeriod {
    Fixed(PeriodSpec),
    /// Period of this granularity containing the cursor, following playback
    AtCursor(PeriodGranularity),
}

/// Aggregation evaluated alongside every frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayRequest {
    pub period: OverlayPeriod,
    /// `None` follows the current viewport
    pub region: Option<BoundingBox>,
    pub metric: Metric,
}

impl OverlayRequest {
    /// Overlay from a metric tag as sent by the analysis UI.
    ///
    /// # Errors
    ///
    /// `UnknownMetricError` for an unsupported tag.
    pub fn parse(
        period: OverlayPeriod,
        region: Option<BoundingBox>,
        metric_tag: &str,
    ) -> Result<Self, UnknownMetricError> {
        Ok(Self {
            period,
            region,
            metric: metric_tag.parse()?,
        })
    }

    pub(crate) fn resolve(&self, cursor: DateTime<Utc>) -> PeriodSpec {
        match self.period {
            OverlayPeriod::Fixed(period) => period,
            OverlayPeriod::AtCursor(granularity) => PeriodSpec::containing(cursor, granularity),
        }
    }
}

/// How a frame was built
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameStats {
    /// Active events that passed every filter
    pub candidates: usize,
    pub rendered: usize,
    /// Whether downsampling dropped candidates
    pub truncated: bool,
    pub cells_scanned: usize,
    pub build_ms: f64,
    pub over_budget: bool,
}

/// One frame for the rendering layer.
///
/// Events are store indices into `epoch`; the frame keeps the epoch alive so
/// they stay valid even if a newer epoch is published meanwhile.
#[derive(Debug, Clone)]
pub struct FramePayload {
    pub cursor_time: DateTime<Utc>,
    pub epoch: Arc<IndexEpoch>,
    /// Ascending `(timestamp, id)` order
    pub indices: Vec<u32>,
    pub overlays: Vec<AggregationResult>,
    pub stats: FrameStats,
}

impl FramePayload {
    pub fn events(&self) -> impl Iterator<Item = &FireEvent> + '_ {
        self.indices.iter().filter_map(|&i| self.epoch.event(i))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}
