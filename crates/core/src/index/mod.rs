//! Spatio-temporal event store
//!
//! The store is rebuilt wholesale per batch. Each build produces an immutable
//! [`IndexEpoch`]; the [`SpatioTemporalIndex`] handle publishes the newest one
//! behind an `RwLock<Arc<_>>`. Readers clone the `Arc` and keep querying that
//! epoch for as long as they hold it, so a reload never shows them a mix of
//! old and new data. The write lock is held only for the pointer swap.
//!
//! # Example
//!
//! ```rust,ignore
//! use firewatch_core::{SpatioTemporalIndex, BoundingBox, Confidence};
//!
//! let index = SpatioTemporalIndex::default();
//! index.load(events)?;
//!
//! let epoch = index.snapshot();
//! for event in epoch.query(&window, &BoundingBox::conus(), Confidence::Nominal)? {
//!     // ascending (timestamp, id)
//! }
//! ```

pub mod bucket;
pub mod cell;
pub mod query;

pub use bucket::{BucketSpan, TimeBucket};
pub use cell::{CellGrid, CellKey, SpatialCell};
pub use query::{EventQuery, IndexedEventQuery};

use crate::config::{DecayPolicy, EngineConfig, IndexConfig};
use crate::core_types::{BoundingBox, Confidence, EventId, FireEvent, TimeWindow};
use crate::error::{ConfigError, IndexBuildError, InvalidRangeError};
use crate::profiler::ProfilerScope;
use chrono::{DateTime, Utc};
use query::EventFilter;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Identifier of one complete build of the store
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EpochId(pub u64);

/// Cell that a query has to scan, with its members already cut to the window
#[derive(Debug, Clone, Copy)]
pub struct CellRange<'a> {
    pub key: CellKey,
    pub bounds: BoundingBox,
    pub members: &'a [u32],
}

/// One immutable build of the store.
///
/// The event vector is the sole owner of every event and is sorted by
/// `(timestamp, id)`; cells refer into it by index.
#[derive(Debug)]
pub struct IndexEpoch {
    id: EpochId,
    config: IndexConfig,
    decay: DecayPolicy,
    grid: CellGrid,
    events: Vec<FireEvent>,
    cells: FxHashMap<CellKey, SpatialCell>,
    by_id: FxHashMap<EventId, u32>,
    bucket_count: usize,
}

impl IndexEpoch {
    fn empty(id: EpochId, config: IndexConfig, decay: DecayPolicy) -> Self {
        Self {
            id,
            grid: CellGrid::new(config.cell_size_degrees),
            config,
            decay,
            events: Vec::new(),
            cells: FxHashMap::default(),
            by_id: FxHashMap::default(),
            bucket_count: 0,
        }
    }

    /// Validate, sort and partition a batch. Nothing is published here.
    fn build(
        id: EpochId,
        config: IndexConfig,
        decay: DecayPolicy,
        mut events: Vec<FireEvent>,
    ) -> Result<Self, IndexBuildError> {
        if u32::try_from(events.len()).is_err() {
            return Err(IndexBuildError::TooManyEvents(events.len()));
        }

        let region = config.admission_region;
        if let Some(err) = events
            .par_iter()
            .find_map_first(|event| event.validate(&region).err())
        {
            return Err(err);
        }

        events.par_sort_unstable_by(|a, b| (a.timestamp, a.id).cmp(&(b.timestamp, b.id)));

        let mut by_id = FxHashMap::with_capacity_and_hasher(events.len(), Default::default());
        for (i, event) in events.iter().enumerate() {
            if by_id.insert(event.id, i as u32).is_some() {
                return Err(IndexBuildError::DuplicateId(event.id));
            }
        }

        let grid = CellGrid::new(config.cell_size_degrees);
        let width = config.bucket_width_secs;
        let mut cells: FxHashMap<CellKey, SpatialCell> = FxHashMap::default();
        let mut bucket_count = 0;
        let mut last_bucket = None;

        for (i, event) in events.iter().enumerate() {
            let bucket = TimeBucket::of(event.timestamp, width);
            if last_bucket != Some(bucket) {
                bucket_count += 1;
                last_bucket = Some(bucket);
            }

            let key = grid.key_for(event.latitude, event.longitude);
            cells
                .entry(key)
                .or_insert_with(|| SpatialCell::new(key))
                .push(i as u32, bucket);
        }

        Ok(Self {
            id,
            config,
            decay,
            grid,
            events,
            cells,
            by_id,
            bucket_count,
        })
    }

    #[must_use]
    pub fn id(&self) -> EpochId {
        self.id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// All events, sorted by `(timestamp, id)`
    #[must_use]
    pub fn events(&self) -> &[FireEvent] {
        &self.events
    }

    /// Event at a store index
    #[must_use]
    pub fn event(&self, index: u32) -> Option<&FireEvent> {
        self.events.get(index as usize)
    }

    /// Look up an event by its source id
    #[must_use]
    pub fn get(&self, id: EventId) -> Option<&FireEvent> {
        self.by_id.get(&id).and_then(|&i| self.event(i))
    }

    /// Earliest and latest detection, `None` for an empty epoch
    #[must_use]
    pub fn time_span(&self) -> Option<TimeWindow> {
        let first = self.events.first()?;
        let last = self.events.last()?;
        Some(TimeWindow {
            start: first.timestamp,
            end: last.timestamp,
        })
    }

    /// Number of populated spatial cells
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Number of distinct time buckets holding at least one event
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    #[must_use]
    pub fn cell(&self, key: CellKey) -> Option<&SpatialCell> {
        self.cells.get(&key)
    }

    #[must_use]
    pub fn grid(&self) -> &CellGrid {
        &self.grid
    }

    #[must_use]
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    #[must_use]
    pub fn decay(&self) -> &DecayPolicy {
        &self.decay
    }

    /// Cells intersecting `area`, each cut to the members inside `window`.
    ///
    /// Cells whose cut is empty are omitted. The result is ordered by cell
    /// key so downstream sampling is deterministic.
    #[must_use]
    pub fn candidate_cells(&self, window: &TimeWindow, area: &BoundingBox) -> Vec<CellRange<'_>> {
        let mut ranges: Vec<CellRange<'_>> = if self.grid.span_len(area) > self.cells.len() as u64 {
            // Sparse epoch under a wide box: walk what exists.
            self.cells
                .values()
                .filter(|cell| self.grid.bounds(cell.key()).intersects(area))
                .filter_map(|cell| self.cut(cell, window))
                .collect()
        } else {
            let (rows, cols) = self.grid.span(area);
            rows.flat_map(|row| cols.clone().map(move |col| CellKey { row, col }))
                .filter_map(|key| self.cells.get(&key))
                .filter_map(|cell| self.cut(cell, window))
                .collect()
        };
        ranges.sort_unstable_by_key(|r| r.key);
        ranges
    }

    fn cut<'s>(&'s self, cell: &'s SpatialCell, window: &TimeWindow) -> Option<CellRange<'s>> {
        let members = cell.members_in(window, &self.events, self.config.bucket_width_secs);
        (!members.is_empty()).then(|| CellRange {
            key: cell.key(),
            bounds: self.grid.bounds(cell.key()),
            members,
        })
    }

    fn run<'a>(
        &'a self,
        window: &TimeWindow,
        viewport: &BoundingBox,
        filter: EventFilter<'a>,
    ) -> EventQuery<'a> {
        let slices = self
            .candidate_cells(window, viewport)
            .into_iter()
            .map(|r| r.members)
            .collect();
        EventQuery::new(&self.events, slices, filter)
    }

    /// Events inside `window` and `viewport` with at least `min_confidence`.
    ///
    /// Results stream in ascending `(timestamp, id)` order.
    ///
    /// # Errors
    ///
    /// `InvalidRangeError` for an inverted window or degenerate viewport.
    pub fn query(
        &self,
        window: &TimeWindow,
        viewport: &BoundingBox,
        min_confidence: Confidence,
    ) -> Result<EventQuery<'_>, InvalidRangeError> {
        TimeWindow::new(window.start, window.end)?;
        viewport.validate()?;

        Ok(self.run(
            window,
            viewport,
            EventFilter {
                viewport: *viewport,
                min_confidence,
                active_at: None,
            },
        ))
    }

    /// Active fire footprint at `t`: events with
    /// `timestamp <= t <= timestamp + decay`.
    ///
    /// # Errors
    ///
    /// `InvalidRangeError` for a degenerate viewport.
    pub fn query_at_or_before(
        &self,
        t: DateTime<Utc>,
        viewport: &BoundingBox,
    ) -> Result<EventQuery<'_>, InvalidRangeError> {
        self.query_active(t, viewport, Confidence::Low)
    }

    /// [`IndexEpoch::query_at_or_before`] with a confidence threshold.
    ///
    /// # Errors
    ///
    /// `InvalidRangeError` for a degenerate viewport or a decay window that
    /// reaches past chrono's range.
    pub fn query_active(
        &self,
        t: DateTime<Utc>,
        viewport: &BoundingBox,
        min_confidence: Confidence,
    ) -> Result<EventQuery<'_>, InvalidRangeError> {
        viewport.validate()?;
        let window = self.active_window(t)?;

        Ok(self.run(
            &window,
            viewport,
            EventFilter {
                viewport: *viewport,
                min_confidence,
                active_at: Some((t, &self.decay)),
            },
        ))
    }

    /// Temporal scan range for the footprint at `t`
    pub(crate) fn active_window(&self, t: DateTime<Utc>) -> Result<TimeWindow, InvalidRangeError> {
        TimeWindow::trailing(t, self.decay.max_window())
    }
}

/// Single-writer, multi-reader handle to the current epoch
#[derive(Debug)]
pub struct SpatioTemporalIndex {
    config: IndexConfig,
    decay: DecayPolicy,
    current: RwLock<Arc<IndexEpoch>>,
    next_epoch: AtomicU64,
}

impl Default for SpatioTemporalIndex {
    fn default() -> Self {
        Self::publish_empty(IndexConfig::default(), DecayPolicy::default())
    }
}

impl SpatioTemporalIndex {
    /// Create a handle publishing an empty epoch 0
    ///
    /// # Errors
    ///
    /// `ConfigError::Invalid` if the partitioning or decay settings are out of
    /// range.
    pub fn new(config: IndexConfig, decay: DecayPolicy) -> Result<Self, ConfigError> {
        config.validate()?;
        decay.validate()?;
        Ok(Self::publish_empty(config, decay))
    }

    /// # Errors
    ///
    /// As [`SpatioTemporalIndex::new`].
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        Self::new(config.index.clone(), config.decay.clone())
    }

    fn publish_empty(config: IndexConfig, decay: DecayPolicy) -> Self {
        let empty = IndexEpoch::empty(EpochId(0), config.clone(), decay.clone());
        Self {
            config,
            decay,
            current: RwLock::new(Arc::new(empty)),
            next_epoch: AtomicU64::new(1),
        }
    }

    /// Build a new epoch from a complete batch and publish it.
    ///
    /// Long-running for large batches; never call from the frame loop. On
    /// error the previous epoch stays published untouched.
    ///
    /// # Errors
    ///
    /// `IndexBuildError` if any event breaks the normalizer contract.
    pub fn load<I>(&self, events: I) -> Result<EpochId, IndexBuildError>
    where
        I: IntoIterator<Item = FireEvent>,
    {
        let scope = ProfilerScope::new("index.load");
        let events: Vec<FireEvent> = events.into_iter().collect();
        let count = events.len();

        let mut epoch =
            match IndexEpoch::build(EpochId(0), self.config.clone(), self.decay.clone(), events) {
                Ok(epoch) => epoch,
                Err(err) => {
                    warn!("Rejected batch of {} events: {}", count, err);
                    return Err(err);
                }
            };

        let (id, published, previous) = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            let id = EpochId(self.next_epoch.fetch_add(1, Ordering::Relaxed));
            epoch.id = id;
            let published = Arc::new(epoch);
            let previous = std::mem::replace(&mut *current, Arc::clone(&published));
            (id, published, previous)
        };
        // Last reader of the old epoch may be us; free it outside the lock.
        drop(previous);

        info!(
            "Published epoch {} with {} events in {} cells over {} buckets ({:.1} ms)",
            id.0,
            published.len(),
            published.cell_count(),
            published.bucket_count(),
            scope.elapsed_ms()
        );
        if let Some(span) = published.time_span() {
            debug!("Epoch {} spans {} to {}", id.0, span.start, span.end);
        }
        Ok(id)
    }

    /// Current epoch. Hold the `Arc` for as long as results must stay
    /// consistent.
    #[must_use]
    pub fn snapshot(&self) -> Arc<IndexEpoch> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    #[must_use]
    pub fn epoch_id(&self) -> EpochId {
        self.snapshot().id()
    }

    #[must_use]
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    #[must_use]
    pub fn decay(&self) -> &DecayPolicy {
        &self.decay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::SatelliteSource;
    use chrono::{TimeDelta, TimeZone};

    fn event(id: u64, lat: f64, lon: f64, t: DateTime<Utc>) -> FireEvent {
        FireEvent {
            id: EventId(id),
            latitude: lat,
            longitude: lon,
            timestamp: t,
            brightness: 330.0,
            frp: id as f64,
            confidence: Confidence::Nominal,
            satellite: SatelliteSource::Noaa20,
            pixel: None,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 8, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_load_partitions_and_sorts() {
        let index = SpatioTemporalIndex::default();
        let id = index
            .load(vec![
                event(3, 34.2, -118.5, t0() + TimeDelta::hours(5)),
                event(1, 34.2, -118.5, t0()),
                event(2, 45.0, -75.0, t0() + TimeDelta::hours(5)),
            ])
            .unwrap();

        let epoch = index.snapshot();
        assert_eq!(epoch.id(), id);
        assert_eq!(epoch.len(), 3);
        assert_eq!(epoch.cell_count(), 2);
        assert_eq!(epoch.bucket_count(), 1);
        let ids: Vec<u64> = epoch.events().iter().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(epoch.get(EventId(2)).map(|e| e.longitude), Some(-75.0));
        assert_eq!(
            epoch.time_span(),
            Some(TimeWindow {
                start: t0(),
                end: t0() + TimeDelta::hours(5)
            })
        );
    }

    #[test]
    fn test_failed_load_keeps_previous_epoch() {
        let index = SpatioTemporalIndex::default();
        let first = index.load(vec![event(1, 34.0, -118.0, t0())]).unwrap();

        let err = index
            .load(vec![event(5, 34.0, -118.0, t0()), event(6, 10.0, -118.0, t0())])
            .unwrap_err();
        assert!(matches!(err, IndexBuildError::OutsideRegion { id: EventId(6), .. }));

        let err = index
            .load(vec![event(5, 34.0, -118.0, t0()), event(5, 35.0, -118.0, t0())])
            .unwrap_err();
        assert_eq!(err, IndexBuildError::DuplicateId(EventId(5)));

        let epoch = index.snapshot();
        assert_eq!(epoch.id(), first);
        assert_eq!(epoch.len(), 1);
        assert!(epoch.get(EventId(1)).is_some());
    }

    #[test]
    fn test_epoch_ids_increase_and_snapshots_stay_consistent() {
        let index = SpatioTemporalIndex::default();
        assert_eq!(index.epoch_id(), EpochId(0));

        let a = index.load(vec![event(1, 34.0, -118.0, t0())]).unwrap();
        let held = index.snapshot();
        let b = index.load(Vec::new()).unwrap();

        assert!(b > a);
        assert_eq!(held.len(), 1);
        assert!(index.snapshot().is_empty());
    }

    /// Readers running against a writer that keeps swapping between two
    /// datasets only ever see one dataset whole.
    #[test]
    fn test_concurrent_readers_see_whole_epochs() {
        use std::sync::atomic::AtomicBool;

        let batch = |ids: std::ops::Range<u64>| -> Vec<FireEvent> {
            ids.map(|id| {
                let offset = (id % 17) as f64 * 0.5;
                event(id, 30.0 + offset, -120.0 + offset, t0() + TimeDelta::hours(id as i64 % 48))
            })
            .collect()
        };
        let first = batch(1..41);
        let second = batch(1000..1025);
        let ids_of = |events: &[FireEvent]| {
            let mut ids: Vec<EventId> = events.iter().map(|e| e.id).collect();
            ids.sort_unstable();
            ids
        };
        let (first_ids, second_ids) = (ids_of(&first), ids_of(&second));

        let index = SpatioTemporalIndex::default();
        index.load(first.clone()).unwrap();
        let window = TimeWindow::new(t0() - TimeDelta::days(1), t0() + TimeDelta::days(3)).unwrap();
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    let mut last_epoch = EpochId(0);
                    loop {
                        let epoch = index.snapshot();
                        assert!(epoch.id() >= last_epoch);
                        last_epoch = epoch.id();

                        let mut seen: Vec<EventId> = epoch
                            .query(&window, &BoundingBox::north_america(), Confidence::Low)
                            .unwrap()
                            .map(|e| e.id)
                            .collect();
                        seen.sort_unstable();
                        assert!(
                            seen == first_ids || seen == second_ids,
                            "epoch {:?} returned {} events from neither dataset",
                            epoch.id(),
                            seen.len()
                        );
                        if done.load(Ordering::Acquire) {
                            break;
                        }
                    }
                });
            }

            for round in 0..60 {
                let next = if round % 2 == 0 { &second } else { &first };
                index.load(next.clone()).unwrap();
            }
            done.store(true, Ordering::Release);
        });

        assert_eq!(index.snapshot().len(), first.len());
    }

    #[test]
    fn test_new_rejects_unusable_partitioning() {
        let zero_buckets = IndexConfig {
            bucket_width_secs: 0,
            ..IndexConfig::default()
        };
        assert!(matches!(
            SpatioTemporalIndex::new(zero_buckets, DecayPolicy::default()),
            Err(ConfigError::Invalid {
                field: "index.bucket_width_secs",
                ..
            })
        ));

        let negative_cells = IndexConfig {
            cell_size_degrees: -1.0,
            ..IndexConfig::default()
        };
        assert!(SpatioTemporalIndex::new(negative_cells, DecayPolicy::default()).is_err());

        let endless = DecayPolicy {
            window_secs: i64::MAX,
            ..DecayPolicy::default()
        };
        assert!(matches!(
            SpatioTemporalIndex::new(IndexConfig::default(), endless),
            Err(ConfigError::Invalid {
                field: "decay.window_secs",
                ..
            })
        ));

        assert!(SpatioTemporalIndex::new(IndexConfig::default(), DecayPolicy::default()).is_ok());
    }

    #[test]
    fn test_query_rejects_bad_ranges() {
        let index = SpatioTemporalIndex::default();
        index.load(vec![event(1, 34.0, -118.0, t0())]).unwrap();
        let epoch = index.snapshot();

        let inverted = TimeWindow {
            start: t0() + TimeDelta::days(1),
            end: t0(),
        };
        assert!(matches!(
            epoch.query(&inverted, &BoundingBox::conus(), Confidence::Low),
            Err(InvalidRangeError::InvertedWindow { .. })
        ));

        let flat = BoundingBox::new(-100.0, 30.0, -100.0, 40.0);
        assert!(matches!(
            epoch.query_at_or_before(t0(), &flat),
            Err(InvalidRangeError::DegenerateViewport { .. })
        ));
    }

    #[test]
    fn test_empty_results_are_not_errors() {
        let index = SpatioTemporalIndex::default();
        let epoch = index.snapshot();
        let window = TimeWindow::new(t0(), t0() + TimeDelta::days(30)).unwrap();
        assert_eq!(
            epoch
                .query(&window, &BoundingBox::north_america(), Confidence::Low)
                .unwrap()
                .count(),
            0
        );
    }

    #[test]
    fn test_candidate_cells_prune_space_and_time() {
        let index = SpatioTemporalIndex::default();
        index
            .load(vec![
                event(1, 34.0, -118.0, t0()),
                event(2, 34.0, -118.0, t0() + TimeDelta::days(10)),
                event(3, 60.0, -150.0, t0()),
            ])
            .unwrap();
        let epoch = index.snapshot();
        let window = TimeWindow::new(t0(), t0() + TimeDelta::days(1)).unwrap();

        let cells = epoch.candidate_cells(&window, &BoundingBox::conus());
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].members.len(), 1);

        let everywhere = epoch.candidate_cells(&window, &BoundingBox::north_america());
        assert_eq!(everywhere.len(), 2);
    }
}
