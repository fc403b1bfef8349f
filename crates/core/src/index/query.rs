//! Lazy, ordered query results
//!
//! Each candidate cell contributes an ascending slice of store indices. A
//! k-way merge over those slices yields events in global `(timestamp, id)`
//! order one at a time, so a caller can stop as soon as its frame budget is
//! spent without the full result ever being built.

use crate::config::DecayPolicy;
use crate::core_types::{BoundingBox, Confidence, FireEvent};
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Per-event predicates applied after partition pruning
#[derive(Debug, Clone, Copy)]
pub(crate) struct EventFilter<'a> {
    pub viewport: BoundingBox,
    pub min_confidence: Confidence,
    /// Keep only events still inside their decay window at this instant
    pub active_at: Option<(DateTime<Utc>, &'a DecayPolicy)>,
}

impl EventFilter<'_> {
    #[inline]
    pub fn accepts(&self, event: &FireEvent) -> bool {
        event.confidence >= self.min_confidence
            && self.viewport.contains(event.latitude, event.longitude)
            && self
                .active_at
                .map_or(true, |(at, decay)| decay.is_active(event, at))
    }
}

/// Iterator over query results in ascending `(timestamp, id)` order
pub struct EventQuery<'a> {
    events: &'a [FireEvent],
    slices: Vec<&'a [u32]>,
    heap: BinaryHeap<Reverse<(u32, usize)>>,
    positions: Vec<usize>,
    filter: EventFilter<'a>,
}

impl<'a> EventQuery<'a> {
    pub(crate) fn new(
        events: &'a [FireEvent],
        slices: Vec<&'a [u32]>,
        filter: EventFilter<'a>,
    ) -> Self {
        let slices: Vec<&'a [u32]> = slices.into_iter().filter(|s| !s.is_empty()).collect();
        let heap = slices
            .iter()
            .enumerate()
            .map(|(slot, s)| Reverse((s[0], slot)))
            .collect();
        let positions = vec![0; slices.len()];
        Self {
            events,
            slices,
            heap,
            positions,
            filter,
        }
    }

    /// Next store index passing the filter
    fn advance(&mut self) -> Option<u32> {
        while let Some(Reverse((index, slot))) = self.heap.pop() {
            let next = self.positions[slot] + 1;
            self.positions[slot] = next;
            if let Some(&following) = self.slices[slot].get(next) {
                self.heap.push(Reverse((following, slot)));
            }

            if self.filter.accepts(&self.events[index as usize]) {
                return Some(index);
            }
        }
        None
    }

    /// Yield store indices alongside the events
    pub fn with_indices(self) -> IndexedEventQuery<'a> {
        IndexedEventQuery(self)
    }
}

impl<'a> Iterator for EventQuery<'a> {
    type Item = &'a FireEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let events = self.events;
        self.advance().map(|i| &events[i as usize])
    }
}

/// [`EventQuery`] that also reports each event's store index
pub struct IndexedEventQuery<'a>(EventQuery<'a>);

impl<'a> Iterator for IndexedEventQuery<'a> {
    type Item = (u32, &'a FireEvent);

    fn next(&mut self) -> Option<Self::Item> {
        let events = self.0.events;
        self.0.advance().map(|i| (i, &events[i as usize]))
    }
}
