//! Playback controller
//!
//! A pulled state machine: the rendering loop calls [`PlaybackController::tick`]
//! once per animation frame with the wall time since the previous call, and
//! gets back the active fire footprint at the new cursor. Setters only touch
//! the session's [`PlaybackState`]; they take effect on the next tick.
//!
//! ```text
//! Paused --play--> Playing --pause--> Paused
//! any --seek(t)--> Seeking --> Paused | Playing (whichever it was before)
//! Playing --reaches end--> Paused, or wraps to start with loop_at_end
//! ```

pub mod frame;
pub mod state;

pub use frame::{FramePayload, FrameStats, OverlayPeriod, OverlayRequest};
pub use state::{PlaybackMode, PlaybackState};

use crate::aggregation::AggregationEngine;
use crate::config::{EngineConfig, PlannerConfig, PlaybackConfig};
use crate::core_types::{BoundingBox, Confidence, TimeWindow};
use crate::error::{EngineError, InvalidRangeError};
use crate::index::{IndexEpoch, SpatioTemporalIndex};
use crate::planner::{QueryPlanner, SampledFrame};
use crate::profiler::{FrameTimer, ProfilerScope};
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Drives one playback session over a shared index
#[derive(Debug)]
pub struct PlaybackController {
    index: Arc<SpatioTemporalIndex>,
    planner: QueryPlanner,
    aggregation: AggregationEngine,
    config: PlaybackConfig,
    timer: FrameTimer,
    state: PlaybackState,
}

impl PlaybackController {
    #[must_use]
    pub fn new(
        index: Arc<SpatioTemporalIndex>,
        planner: QueryPlanner,
        config: PlaybackConfig,
    ) -> Self {
        Self {
            aggregation: AggregationEngine::new(Arc::clone(&index)),
            index,
            planner,
            timer: FrameTimer::new(config.frame_budget_ms),
            state: PlaybackState::new(&config),
            config,
        }
    }

    /// Session with its own sampling seed (used when the seed scope is
    /// `Session`).
    #[must_use]
    pub fn from_config(index: Arc<SpatioTemporalIndex>, config: &EngineConfig, session_seed: u64) -> Self {
        Self::new(
            index,
            QueryPlanner::with_session_seed(config.planner.clone(), session_seed),
            config.playback.clone(),
        )
    }

    /// Session with default planner and playback settings
    #[must_use]
    pub fn with_defaults(index: Arc<SpatioTemporalIndex>) -> Self {
        Self::new(
            index,
            QueryPlanner::new(PlannerConfig::default()),
            PlaybackConfig::default(),
        )
    }

    #[must_use]
    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    #[must_use]
    pub fn mode(&self) -> PlaybackMode {
        self.state.mode
    }

    #[must_use]
    pub fn cursor(&self) -> Option<DateTime<Utc>> {
        self.state.cursor
    }

    #[must_use]
    pub fn speed(&self) -> f64 {
        self.state.speed
    }

    #[must_use]
    pub fn timer(&self) -> &FrameTimer {
        &self.timer
    }

    #[must_use]
    pub fn aggregation(&self) -> &AggregationEngine {
        &self.aggregation
    }

    /// Start advancing the cursor. At the end of data without looping this
    /// rewinds to the start first.
    pub fn play(&mut self) {
        if let Some(bounds) = self.bounds(&self.index.snapshot()) {
            if !self.config.loop_at_end && self.state.cursor.is_some_and(|c| c >= bounds.end) {
                self.state.cursor = Some(bounds.start);
            }
        }
        self.state.mode = PlaybackMode::Playing;
    }

    pub fn pause(&mut self) {
        self.state.mode = PlaybackMode::Paused;
    }

    /// Jump the cursor, clamped to the playable range. Playing sessions keep
    /// playing from the new position.
    pub fn seek(&mut self, t: DateTime<Utc>) {
        let resume = self.state.is_playing();
        self.state.mode = PlaybackMode::Seeking;

        let target = match self.bounds(&self.index.snapshot()) {
            Some(bounds) => bounds.clamp(t),
            None => t,
        };
        self.state.cursor = Some(target);
        debug!("Seek to {} (requested {})", target, t);

        self.state.mode = if resume {
            PlaybackMode::Playing
        } else {
            PlaybackMode::Paused
        };
    }

    /// Set the playback speed multiplier, clamped to the configured range.
    /// Non-finite input is ignored.
    pub fn set_speed(&mut self, speed: f64) {
        if !speed.is_finite() {
            warn!("Ignoring non-finite playback speed {}", speed);
            return;
        }
        self.state.speed = speed.clamp(self.config.min_speed, self.config.max_speed);
    }

    /// Confidence threshold and optional date range for shown events.
    ///
    /// # Errors
    ///
    /// `InvalidRangeError` for an inverted date range; the previous filter
    /// stays in place.
    pub fn set_filter(
        &mut self,
        min_confidence: Confidence,
        date_range: Option<TimeWindow>,
    ) -> Result<(), InvalidRangeError> {
        if let Some(range) = &date_range {
            TimeWindow::new(range.start, range.end)?;
        }
        self.state.min_confidence = min_confidence;
        self.state.date_range = date_range;
        Ok(())
    }

    /// # Errors
    ///
    /// `InvalidRangeError` for a degenerate viewport; the previous viewport
    /// stays in place.
    pub fn set_viewport(&mut self, viewport: BoundingBox, zoom: u8) -> Result<(), InvalidRangeError> {
        viewport.validate()?;
        self.state.viewport = viewport;
        self.state.zoom = zoom;
        Ok(())
    }

    pub fn add_overlay(&mut self, overlay: OverlayRequest) {
        self.state.overlays.push(overlay);
    }

    pub fn clear_overlays(&mut self) {
        self.state.overlays.clear();
    }

    /// Playable range: dataset span narrowed by the date-range filter when
    /// they overlap.
    fn bounds(&self, epoch: &IndexEpoch) -> Option<TimeWindow> {
        let span = epoch.time_span()?;
        Some(
            self.state
                .date_range
                .and_then(|range| span.intersect(&range))
                .unwrap_or(span),
        )
    }

    fn advance(&mut self, bounds: &TimeWindow, elapsed: Duration) {
        let cursor = self.state.cursor.unwrap_or(bounds.start);
        let secs = self.config.base_rate * self.state.speed * elapsed.as_secs_f64();
        let step = TimeDelta::nanoseconds((secs * 1e9) as i64);
        let next = cursor.checked_add_signed(step).unwrap_or(bounds.end);

        if next < bounds.end {
            self.state.cursor = Some(next);
        } else if self.config.loop_at_end {
            debug!("Playback wrapped to {}", bounds.start);
            self.state.cursor = Some(bounds.start);
        } else {
            info!("Playback reached end of data at {}", bounds.end);
            self.state.cursor = Some(bounds.end);
            self.state.mode = PlaybackMode::Paused;
        }
    }

    /// Advance (when playing) and build the frame at the new cursor.
    ///
    /// Never blocks on I/O; all data comes from the epoch current at the
    /// start of the call.
    ///
    /// # Errors
    ///
    /// `InvalidRange` when the active window or an overlay period cannot be
    /// represented.
    pub fn tick(&mut self, elapsed: Duration) -> Result<FramePayload, EngineError> {
        let scope = ProfilerScope::new("playback.tick");
        let epoch = self.index.snapshot();

        let cursor = match self.bounds(&epoch) {
            Some(bounds) => {
                if self.state.is_playing() {
                    self.advance(&bounds, elapsed);
                }
                let cursor = bounds.clamp(self.state.cursor.unwrap_or(bounds.start));
                self.state.cursor = Some(cursor);
                cursor
            }
            None => self.state.cursor.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        };

        let mut window = epoch.active_window(cursor)?;
        if let Some(range) = self.state.date_range {
            window = match window.intersect(&range) {
                Some(w) => w,
                None => return self.finish(epoch, cursor, SampledFrame::default(), 0, &scope),
            };
        }

        let plan = self
            .planner
            .plan(&epoch, &self.state.viewport, self.state.zoom, &window)?;
        let sampled = plan.execute(self.state.min_confidence, Some(cursor));
        let cells = plan.cells().len();
        drop(plan);

        self.finish(epoch, cursor, sampled, cells, &scope)
    }

    fn finish(
        &mut self,
        epoch: Arc<IndexEpoch>,
        cursor: DateTime<Utc>,
        sampled: SampledFrame,
        cells_scanned: usize,
        scope: &ProfilerScope,
    ) -> Result<FramePayload, EngineError> {
        let overlays = self
            .state
            .overlays
            .iter()
            .map(|overlay| {
                let region = overlay.region.unwrap_or(self.state.viewport);
                self.aggregation
                    .aggregate_on(&epoch, overlay.resolve(cursor), &region, overlay.metric)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let build_ms = scope.elapsed_ms();
        let over_budget = self.timer.record(build_ms);
        if over_budget {
            warn!(
                "Frame at {} took {:.1} ms, over the {:.1} ms budget ({} events)",
                cursor,
                build_ms,
                self.timer.budget_ms(),
                sampled.indices.len()
            );
        }

        let stats = FrameStats {
            candidates: sampled.candidates,
            rendered: sampled.indices.len(),
            truncated: sampled.truncated,
            cells_scanned,
            build_ms,
            over_budget,
        };
        Ok(FramePayload {
            cursor_time: cursor,
            epoch,
            indices: sampled.indices,
            overlays,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::{Metric, MetricValue, PeriodGranularity};
    use crate::core_types::{EventId, FireEvent, SatelliteSource};
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 7, d, 0, 0, 0).unwrap()
    }

    fn event(id: u64, t: DateTime<Utc>, confidence: Confidence) -> FireEvent {
        FireEvent {
            id: EventId(id),
            latitude: 39.0,
            longitude: -120.0,
            timestamp: t,
            brightness: 320.0,
            frp: 12.0,
            confidence,
            satellite: SatelliteSource::Noaa20,
            pixel: None,
        }
    }

    fn controller() -> PlaybackController {
        let index = Arc::new(SpatioTemporalIndex::default());
        index
            .load(vec![
                event(1, day(1), Confidence::High),
                event(2, day(3), Confidence::Low),
                event(3, day(10), Confidence::Nominal),
            ])
            .unwrap();
        PlaybackController::with_defaults(index)
    }

    #[test]
    fn test_first_tick_starts_at_data_start() {
        let mut ctl = controller();
        let frame = ctl.tick(Duration::ZERO).unwrap();
        assert_eq!(frame.cursor_time, day(1));
        assert_eq!(frame.len(), 1);
        assert_eq!(ctl.mode(), PlaybackMode::Paused);
    }

    #[test]
    fn test_playing_advances_by_base_rate() {
        let mut ctl = controller();
        ctl.play();
        // one simulated day per wall second at speed 1
        let frame = ctl.tick(Duration::from_secs(2)).unwrap();
        assert_eq!(frame.cursor_time, day(3));
        let ids: Vec<u64> = frame.events().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![1, 2]);

        ctl.set_speed(0.5);
        let frame = ctl.tick(Duration::from_secs(2)).unwrap();
        assert_eq!(frame.cursor_time, day(4));
    }

    #[test]
    fn test_end_of_data_pauses_then_play_rewinds() {
        let mut ctl = controller();
        ctl.play();
        let frame = ctl.tick(Duration::from_secs(60)).unwrap();
        assert_eq!(frame.cursor_time, day(10));
        assert_eq!(ctl.mode(), PlaybackMode::Paused);

        ctl.play();
        assert_eq!(ctl.cursor(), Some(day(1)));
        assert_eq!(ctl.mode(), PlaybackMode::Playing);
    }

    fn looping_controller() -> PlaybackController {
        let index = Arc::new(SpatioTemporalIndex::default());
        index
            .load(vec![event(1, day(1), Confidence::High), event(2, day(5), Confidence::High)])
            .unwrap();
        PlaybackController::new(
            index,
            QueryPlanner::new(PlannerConfig::default()),
            PlaybackConfig {
                loop_at_end: true,
                ..PlaybackConfig::default()
            },
        )
    }

    #[test]
    fn test_loop_at_end_wraps() {
        let mut ctl = looping_controller();
        ctl.play();
        let frame = ctl.tick(Duration::from_secs(30)).unwrap();
        assert_eq!(frame.cursor_time, day(1));
        assert_eq!(ctl.mode(), PlaybackMode::Playing);
    }

    /// A step landing exactly on the last detection still wraps.
    #[test]
    fn test_loop_at_end_wraps_on_exact_end_step() {
        let mut ctl = looping_controller();
        ctl.play();
        let frame = ctl.tick(Duration::from_secs(4)).unwrap();
        assert_eq!(frame.cursor_time, day(1));
        assert_eq!(ctl.mode(), PlaybackMode::Playing);

        let frame = ctl.tick(Duration::from_secs(1)).unwrap();
        assert_eq!(frame.cursor_time, day(2));
    }

    #[test]
    fn test_seek_clamps_and_keeps_mode() {
        let mut ctl = controller();
        ctl.seek(day(20));
        assert_eq!(ctl.cursor(), Some(day(10)));
        assert_eq!(ctl.mode(), PlaybackMode::Paused);

        ctl.play();
        ctl.seek(day(2));
        assert_eq!(ctl.mode(), PlaybackMode::Playing);
        let frame = ctl.tick(Duration::ZERO).unwrap();
        assert_eq!(frame.cursor_time, day(2));
    }

    #[test]
    fn test_speed_clamped_and_nan_ignored() {
        let mut ctl = controller();
        ctl.set_speed(100.0);
        assert_eq!(ctl.speed(), 10.0);
        ctl.set_speed(f64::NAN);
        assert_eq!(ctl.speed(), 10.0);
        ctl.set_speed(-3.0);
        assert_eq!(ctl.speed(), 0.1);
    }

    #[test]
    fn test_filters_apply_to_frames() {
        let mut ctl = controller();
        ctl.seek(day(3));
        assert_eq!(ctl.tick(Duration::ZERO).unwrap().len(), 2);

        ctl.set_filter(Confidence::Nominal, None).unwrap();
        let ids: Vec<u64> = ctl.tick(Duration::ZERO).unwrap().events().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![1]);

        let inverted = TimeWindow {
            start: day(5),
            end: day(1),
        };
        assert!(ctl.set_filter(Confidence::Low, Some(inverted)).is_err());
        assert_eq!(ctl.state().min_confidence, Confidence::Nominal);

        ctl.set_filter(Confidence::Low, Some(TimeWindow::new(day(2), day(12)).unwrap()))
            .unwrap();
        let frame = ctl.tick(Duration::ZERO).unwrap();
        let ids: Vec<u64> = frame.events().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![2]);

        let flat = BoundingBox::new(-120.0, 30.0, -120.0, 40.0);
        assert!(ctl.set_viewport(flat, 5).is_err());
        assert_eq!(ctl.state().viewport, BoundingBox::north_america());
    }

    #[test]
    fn test_overlays_follow_cursor() {
        let mut ctl = controller();
        ctl.add_overlay(
            OverlayRequest::parse(OverlayPeriod::AtCursor(PeriodGranularity::Monthly), None, "count")
                .unwrap(),
        );
        ctl.seek(day(3));
        let frame = ctl.tick(Duration::ZERO).unwrap();
        assert_eq!(frame.overlays.len(), 1);
        assert_eq!(frame.overlays[0].metric, Metric::Count);
        assert_eq!(frame.overlays[0].value, MetricValue::Count(3));

        ctl.clear_overlays();
        assert!(ctl.tick(Duration::ZERO).unwrap().overlays.is_empty());
        assert!(OverlayRequest::parse(OverlayPeriod::AtCursor(PeriodGranularity::Yearly), None, "bogus")
            .is_err());
    }

    #[test]
    fn test_empty_index_yields_empty_frames() {
        let mut ctl = PlaybackController::with_defaults(Arc::new(SpatioTemporalIndex::default()));
        ctl.play();
        let frame = ctl.tick(Duration::from_millis(16)).unwrap();
        assert!(frame.is_empty());
        assert_eq!(ctl.timer().frames(), 1);
    }
}
