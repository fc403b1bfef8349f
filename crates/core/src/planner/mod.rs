//! Level-of-detail query planning
//!
//! The planner decides how much of a (window, viewport, zoom) request is
//! actually rendered. Per-frame output is bounded by `frame_cap` regardless of
//! how dense the underlying cells are; at low zoom each cell is additionally
//! limited to a quota that doubles with every zoom level until
//! `full_detail_zoom`.
//!
//! # Example
//!
//! ```rust,ignore
//! let planner = QueryPlanner::new(PlannerConfig::default());
//! let epoch = index.snapshot();
//! let plan = planner.plan(&epoch, &viewport, 4, &window)?;
//! let frame = plan.execute(Confidence::Nominal, Some(cursor));
//! assert!(frame.indices.len() <= planner.config().frame_cap);
//! ```

pub mod sampling;

use crate::config::{PlannerConfig, SamplingPolicy, SeedScope};
use crate::core_types::{BoundingBox, Confidence, TimeWindow};
use crate::index::query::EventFilter;
use crate::index::{CellKey, IndexEpoch};
use crate::error::InvalidRangeError;
use chrono::{DateTime, Utc};
use tracing::debug;

/// A candidate cell with its share of the frame budget
#[derive(Debug, Clone, Copy)]
pub struct CellPlan<'a> {
    pub key: CellKey,
    /// Members inside the plan window, before per-event filtering
    pub members: &'a [u32],
    /// Upper bound on events this cell contributes
    pub quota: usize,
}

/// Outcome of executing a plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampledFrame {
    /// Store indices in ascending `(timestamp, id)` order
    pub indices: Vec<u32>,
    /// Events that passed the filters before sampling
    pub candidates: usize,
    /// Whether sampling dropped any candidate
    pub truncated: bool,
}

/// Partitions to scan for one frame, with per-cell quotas.
#[derive(Debug, Clone)]
pub struct QueryPlan<'a> {
    epoch: &'a IndexEpoch,
    window: TimeWindow,
    viewport: BoundingBox,
    zoom: u8,
    cells: Vec<CellPlan<'a>>,
    cell_cap: usize,
    frame_cap: usize,
    policy: SamplingPolicy,
    frame_seed: u64,
}

impl<'a> QueryPlan<'a> {
    #[must_use]
    pub fn cells(&self) -> &[CellPlan<'a>] {
        &self.cells
    }

    #[must_use]
    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    #[must_use]
    pub fn viewport(&self) -> &BoundingBox {
        &self.viewport
    }

    #[must_use]
    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    #[must_use]
    pub fn frame_seed(&self) -> u64 {
        self.frame_seed
    }

    /// Sum of cell quotas; never above the frame cap
    #[must_use]
    pub fn point_budget(&self) -> usize {
        self.cells.iter().map(|c| c.quota).sum()
    }

    /// Members inside the window across all candidate cells
    #[must_use]
    pub fn scanned(&self) -> usize {
        self.cells.iter().map(|c| c.members.len()).sum()
    }

    /// Apply per-event filters, then downsample.
    ///
    /// Quotas are re-split over the filtered counts so a cell whose events
    /// were mostly filtered out does not strand budget. The result never
    /// exceeds the frame cap and is identical for identical plans.
    #[must_use]
    pub fn execute(&self, min_confidence: Confidence, active_at: Option<DateTime<Utc>>) -> SampledFrame {
        let events = self.epoch.events();
        let decay = self.epoch.decay();
        let filter = EventFilter {
            viewport: self.viewport,
            min_confidence,
            active_at: active_at.map(|t| (t, decay)),
        };

        let mut per_cell: Vec<Vec<u32>> = self
            .cells
            .iter()
            .map(|cell| {
                cell.members
                    .iter()
                    .copied()
                    .filter(|&i| filter.accepts(&events[i as usize]))
                    .collect::<Vec<u32>>()
            })
            .collect();

        let candidates: usize = per_cell.iter().map(Vec::len).sum();
        let demands: Vec<usize> = per_cell.iter().map(|c| c.len().min(self.cell_cap)).collect();
        let quotas = sampling::allocate_quotas(&demands, self.frame_cap);

        let mut truncated = false;
        for ((cell, selected), &quota) in self.cells.iter().zip(per_cell.iter_mut()).zip(&quotas) {
            if selected.len() <= quota {
                continue;
            }
            truncated = true;
            match self.policy {
                SamplingPolicy::Reservoir => {
                    sampling::reservoir(selected, quota, sampling::cell_seed(self.frame_seed, cell.key));
                }
                SamplingPolicy::Priority => sampling::priority(selected, quota, events),
            }
        }

        let mut indices: Vec<u32> = per_cell.into_iter().flatten().collect();
        indices.sort_unstable();

        SampledFrame {
            indices,
            candidates,
            truncated,
        }
    }
}

/// Translates frame requests into bounded plans
#[derive(Debug, Clone)]
pub struct QueryPlanner {
    config: PlannerConfig,
    session_seed: u64,
}

impl QueryPlanner {
    /// Planner using the configured seed scope with session seed 0
    #[must_use]
    pub fn new(config: PlannerConfig) -> Self {
        Self::with_session_seed(config, 0)
    }

    /// Planner whose reservoir samples differ from other sessions when the
    /// seed scope is `Session`
    #[must_use]
    pub fn with_session_seed(config: PlannerConfig, session_seed: u64) -> Self {
        Self {
            config,
            session_seed,
        }
    }

    #[must_use]
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    fn base_seed(&self) -> u64 {
        match self.config.seed_scope {
            SeedScope::Global => self.config.seed,
            SeedScope::Session => sampling::frame_seed(self.config.seed, self.session_seed as i64),
        }
    }

    /// Plan one frame.
    ///
    /// # Errors
    ///
    /// `InvalidRangeError` for an inverted window or degenerate viewport.
    pub fn plan<'a>(
        &self,
        epoch: &'a IndexEpoch,
        viewport: &BoundingBox,
        zoom: u8,
        window: &TimeWindow,
    ) -> Result<QueryPlan<'a>, InvalidRangeError> {
        TimeWindow::new(window.start, window.end)?;
        viewport.validate()?;

        let cell_cap = self.config.cell_cap(zoom);
        let ranges = epoch.candidate_cells(window, viewport);
        let demands: Vec<usize> = ranges.iter().map(|r| r.members.len().min(cell_cap)).collect();
        let quotas = sampling::allocate_quotas(&demands, self.config.frame_cap);

        let cells: Vec<CellPlan<'a>> = ranges
            .iter()
            .zip(quotas)
            .map(|(range, quota)| CellPlan {
                key: range.key,
                members: range.members,
                quota,
            })
            .collect();

        let frame = window.end.timestamp().div_euclid(self.config.seed_quantum_secs);
        let plan = QueryPlan {
            epoch,
            window: *window,
            viewport: *viewport,
            zoom,
            cells,
            cell_cap,
            frame_cap: self.config.frame_cap,
            policy: self.config.sampling,
            frame_seed: sampling::frame_seed(self.base_seed(), frame),
        };

        debug!(
            "Planned zoom {} frame: {} cells, {} scanned, budget {}",
            zoom,
            plan.cells.len(),
            plan.scanned(),
            plan.point_budget()
        );
        Ok(plan)
    }
}
