//! Seasonal and statistical summaries over the event store
//!
//! Results are computed from the full set of events in a period and region,
//! never from a downsampled frame, and are cached per exact
//! `(period, region, metric)` key. An aggregation is only valid for the epoch
//! it was computed on: the cache is dropped wholesale as soon as a newer
//! epoch is observed, or when it fills up within one epoch (overlays that
//! follow the viewport add a key per distinct pan).

pub mod metric;
pub mod period;

pub use metric::{percentile, Metric, MetricValue, PercentileBands, SpatialExtent, PERCENTILE_BANDS};
pub use period::{PeriodGranularity, PeriodSpec, Season};

use crate::core_types::{BoundingBox, FireEvent, TimeWindow};
use crate::error::{EngineError, InvalidRangeError};
use crate::index::{EpochId, IndexEpoch, SpatioTemporalIndex};
use crate::profiler::ProfilerScope;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Cache key. Regions are compared bit-exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct AggregationKey {
    period: PeriodSpec,
    region: [u64; 4],
    metric: Metric,
}

/// One computed summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub period: PeriodSpec,
    pub window: TimeWindow,
    pub region: BoundingBox,
    pub metric: Metric,
    pub value: MetricValue,
    /// Events the value was computed from
    pub sample_size: u64,
    pub epoch: EpochId,
}

#[derive(Debug, Default)]
struct AggregationCache {
    epoch: EpochId,
    entries: FxHashMap<AggregationKey, AggregationResult>,
}

/// Cached results kept per epoch before the cache starts over
pub const DEFAULT_CACHE_ENTRIES: usize = 4096;

/// Computes and caches aggregations against the current epoch
#[derive(Debug)]
pub struct AggregationEngine {
    index: Arc<SpatioTemporalIndex>,
    cache: RwLock<AggregationCache>,
    max_entries: usize,
}

impl AggregationEngine {
    #[must_use]
    pub fn new(index: Arc<SpatioTemporalIndex>) -> Self {
        Self::with_cache_limit(index, DEFAULT_CACHE_ENTRIES)
    }

    /// Engine whose cache holds at most `max_entries` results (at least one)
    #[must_use]
    pub fn with_cache_limit(index: Arc<SpatioTemporalIndex>, max_entries: usize) -> Self {
        Self {
            index,
            cache: RwLock::new(AggregationCache::default()),
            max_entries: max_entries.max(1),
        }
    }

    #[must_use]
    pub fn index(&self) -> &Arc<SpatioTemporalIndex> {
        &self.index
    }

    /// Aggregate by metric tag.
    ///
    /// # Errors
    ///
    /// `UnknownMetric` for an unsupported tag, `InvalidRange` for a bad period
    /// or degenerate region.
    pub fn aggregate(
        &self,
        period: PeriodSpec,
        region: &BoundingBox,
        metric_tag: &str,
    ) -> Result<AggregationResult, EngineError> {
        let metric: Metric = metric_tag.parse()?;
        Ok(self.aggregate_metric(period, region, metric)?)
    }

    /// Aggregate a typed metric against the current epoch.
    ///
    /// # Errors
    ///
    /// `InvalidRangeError` for a bad period or degenerate region.
    pub fn aggregate_metric(
        &self,
        period: PeriodSpec,
        region: &BoundingBox,
        metric: Metric,
    ) -> Result<AggregationResult, InvalidRangeError> {
        let epoch = self.index.snapshot();
        self.aggregate_on(&epoch, period, region, metric)
    }

    /// Aggregate against a specific epoch, typically the one a frame was
    /// built from.
    ///
    /// # Errors
    ///
    /// `InvalidRangeError` for a bad period or degenerate region.
    pub fn aggregate_on(
        &self,
        epoch: &IndexEpoch,
        period: PeriodSpec,
        region: &BoundingBox,
        metric: Metric,
    ) -> Result<AggregationResult, InvalidRangeError> {
        region.validate()?;
        let window = period.window()?;
        let key = AggregationKey {
            period,
            region: region.key_bits(),
            metric,
        };

        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if cache.epoch == epoch.id() {
                if let Some(hit) = cache.entries.get(&key) {
                    return Ok(hit.clone());
                }
            }
        }

        let result = compute(epoch, period, window, region, metric);
        debug!(
            "Computed {} over {} for epoch {} from {} events",
            metric,
            period,
            epoch.id().0,
            result.sample_size
        );

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if epoch.id() > cache.epoch {
            if !cache.entries.is_empty() {
                info!(
                    "Dropping {} cached aggregations from epoch {}",
                    cache.entries.len(),
                    cache.epoch.0
                );
            }
            cache.entries.clear();
            cache.epoch = epoch.id();
        }
        // Results from an older snapshot are returned but never cached.
        if epoch.id() == cache.epoch {
            if cache.entries.len() >= self.max_entries && !cache.entries.contains_key(&key) {
                debug!("Aggregation cache full at {} entries, starting over", cache.entries.len());
                cache.entries.clear();
            }
            cache.entries.insert(key, result.clone());
        }
        Ok(result)
    }

    /// One result per period of `granularity` from the first to the last
    /// detection in the current epoch. Empty epochs yield an empty series.
    ///
    /// # Errors
    ///
    /// `InvalidRangeError` for a degenerate region.
    pub fn series(
        &self,
        granularity: PeriodGranularity,
        region: &BoundingBox,
        metric: Metric,
    ) -> Result<Vec<AggregationResult>, InvalidRangeError> {
        region.validate()?;
        let epoch = self.index.snapshot();
        let Some(span) = epoch.time_span() else {
            return Ok(Vec::new());
        };

        let mut results = Vec::new();
        let mut period = Some(PeriodSpec::containing(span.start, granularity));
        while let Some(current) = period {
            if current.window()?.start > span.end {
                break;
            }
            results.push(self.aggregate_on(&epoch, current, region, metric)?);
            period = current.next();
        }
        Ok(results)
    }

    /// Cached entries for the epoch currently held by the cache
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).entries.len()
    }
}

fn compute(
    epoch: &IndexEpoch,
    period: PeriodSpec,
    window: TimeWindow,
    region: &BoundingBox,
    metric: Metric,
) -> AggregationResult {
    let _scope = ProfilerScope::new("aggregation.compute");
    let events = epoch.events();
    let ranges = epoch.candidate_cells(&window, region);

    let selected: Vec<&FireEvent> = ranges
        .par_iter()
        .flat_map_iter(|range| {
            let covered = region.covers(&range.bounds);
            range
                .members
                .iter()
                .map(|&i| &events[i as usize])
                .filter(move |e| covered || region.contains(e.latitude, e.longitude))
        })
        .collect();

    AggregationResult {
        period,
        window,
        region: *region,
        metric,
        value: metric.evaluate(&selected),
        sample_size: selected.len() as u64,
        epoch: epoch.id(),
    }
}
