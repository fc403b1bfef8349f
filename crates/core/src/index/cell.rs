//! Fixed-resolution lat/lon grid and the cells hanging off it

use crate::core_types::{BoundingBox, FireEvent, TimeWindow};
use crate::index::bucket::{BucketSpan, TimeBucket};
use serde::{Deserialize, Serialize};

/// Row/column address of a grid cell.
///
/// Rows count north from -90, columns count east from -180.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellKey {
    pub row: u32,
    pub col: u32,
}

impl CellKey {
    /// Single integer form, stable across runs (used for sampling seeds)
    #[inline]
    #[must_use]
    pub fn packed(self) -> u64 {
        (u64::from(self.row) << 32) | u64::from(self.col)
    }
}

/// Maps coordinates to cells
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellGrid {
    cell_size: f64,
    rows: u32,
    cols: u32,
}

impl CellGrid {
    #[must_use]
    pub(crate) fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            rows: (180.0 / cell_size).ceil() as u32,
            cols: (360.0 / cell_size).ceil() as u32,
        }
    }

    #[must_use]
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    #[inline]
    fn row_of(&self, latitude: f64) -> u32 {
        let row = ((latitude + 90.0) / self.cell_size).floor();
        (row.max(0.0) as u32).min(self.rows - 1)
    }

    #[inline]
    fn col_of(&self, longitude: f64) -> u32 {
        let col = ((longitude + 180.0) / self.cell_size).floor();
        (col.max(0.0) as u32).min(self.cols - 1)
    }

    /// Cell owning the point. The north and east edges of the globe fold into
    /// the last row and column.
    #[inline]
    #[must_use]
    pub fn key_for(&self, latitude: f64, longitude: f64) -> CellKey {
        CellKey {
            row: self.row_of(latitude),
            col: self.col_of(longitude),
        }
    }

    /// Geographic extent of a cell
    #[must_use]
    pub fn bounds(&self, key: CellKey) -> BoundingBox {
        let south = f64::from(key.row) * self.cell_size - 90.0;
        let west = f64::from(key.col) * self.cell_size - 180.0;
        BoundingBox::new(
            west,
            south,
            (west + self.cell_size).min(180.0),
            (south + self.cell_size).min(90.0),
        )
    }

    /// Inclusive row and column ranges of cells a box touches
    #[must_use]
    pub fn span(&self, bbox: &BoundingBox) -> (std::ops::RangeInclusive<u32>, std::ops::RangeInclusive<u32>) {
        (
            self.row_of(bbox.south)..=self.row_of(bbox.north),
            self.col_of(bbox.west)..=self.col_of(bbox.east),
        )
    }

    /// Number of grid addresses a box touches, populated or not
    #[must_use]
    pub fn span_len(&self, bbox: &BoundingBox) -> u64 {
        let (rows, cols) = self.span(bbox);
        let r = u64::from(rows.end() - rows.start() + 1);
        let c = u64::from(cols.end() - cols.start() + 1);
        r * c
    }
}

/// Leaf of the spatial partition.
///
/// Holds non-owning indices into the epoch's event store, ascending, which is
/// also ascending `(timestamp, id)` because the store is sorted that way.
#[derive(Debug, Clone)]
pub struct SpatialCell {
    key: CellKey,
    members: Vec<u32>,
    buckets: Vec<BucketSpan>,
}

impl SpatialCell {
    pub(crate) fn new(key: CellKey) -> Self {
        Self {
            key,
            members: Vec::new(),
            buckets: Vec::new(),
        }
    }

    /// Append an event. Callers push in store order, so buckets arrive sorted.
    pub(crate) fn push(&mut self, event_index: u32, bucket: TimeBucket) {
        let offset = self.members.len() as u32;
        self.members.push(event_index);

        match self.buckets.last_mut() {
            Some(span) if span.bucket == bucket => span.end = offset + 1,
            _ => self.buckets.push(BucketSpan {
                bucket,
                start: offset,
                end: offset + 1,
            }),
        }
    }

    #[must_use]
    pub fn key(&self) -> CellKey {
        self.key
    }

    /// Event store indices, in time order
    #[must_use]
    pub fn members(&self) -> &[u32] {
        &self.members
    }

    /// Bucket directory, ascending
    #[must_use]
    pub fn buckets(&self) -> &[BucketSpan] {
        &self.buckets
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members whose timestamps fall inside `window`.
    ///
    /// Buckets outside the window are pruned through the directory; only the
    /// edge buckets are binary-searched on event timestamps.
    #[must_use]
    pub fn members_in<'a>(
        &'a self,
        window: &TimeWindow,
        events: &[FireEvent],
        bucket_width_secs: i64,
    ) -> &'a [u32] {
        let first_bucket = TimeBucket::of(window.start, bucket_width_secs);
        let last_bucket = TimeBucket::of(window.end, bucket_width_secs);

        let lo_span = self.buckets.partition_point(|b| b.bucket < first_bucket);
        let hi_span = self.buckets.partition_point(|b| b.bucket <= last_bucket);
        if lo_span >= hi_span {
            return &[];
        }

        let coarse_start = self.buckets[lo_span].start as usize;
        let coarse_end = self.buckets[hi_span - 1].end as usize;
        let coarse = &self.members[coarse_start..coarse_end];

        let lo = coarse.partition_point(|&i| events[i as usize].timestamp < window.start);
        let hi = coarse.partition_point(|&i| events[i as usize].timestamp <= window.end);
        &coarse[lo..hi.max(lo)]
    }
}
