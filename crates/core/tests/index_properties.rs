//! Event store properties under randomized and scripted data
//!
//! Run tests with: cargo test --test `index_properties`

mod common;

use chrono::{TimeDelta, Utc};
use common::{event, june, random_events};
use firewatch_core::{
    BoundingBox, Confidence, DecayPolicy, EventId, FireEvent, IndexConfig, SpatioTemporalIndex,
    TimeWindow,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

fn brute_force(
    events: &[FireEvent],
    window: &TimeWindow,
    viewport: &BoundingBox,
    min: Confidence,
) -> Vec<EventId> {
    let mut hits: Vec<&FireEvent> = events
        .iter()
        .filter(|e| window.contains(e.timestamp))
        .filter(|e| viewport.contains(e.latitude, e.longitude))
        .filter(|e| e.confidence >= min)
        .collect();
    hits.sort_by_key(|e| (e.timestamp, e.id));
    hits.into_iter().map(|e| e.id).collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Containment and ordering
// ═══════════════════════════════════════════════════════════════════════════════

/// Every matching event comes back exactly once, in `(timestamp, id)` order.
#[test]
fn test_query_matches_brute_force() {
    let events = random_events(11, 20_000, june(1), 60);
    let index = SpatioTemporalIndex::default();
    index.load(events.clone()).unwrap();
    let epoch = index.snapshot();

    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..40 {
        let west = rng.random_range(-170.0..-60.0);
        let south = rng.random_range(25.0..65.0);
        let viewport = BoundingBox::new(
            west,
            south,
            west + rng.random_range(0.5..40.0_f64).min(-50.0 - west),
            south + rng.random_range(0.5..20.0_f64).min(70.0 - south),
        );
        let start = june(1) + TimeDelta::seconds(rng.random_range(0..50 * 86_400));
        let window = TimeWindow::new(start, start + TimeDelta::hours(rng.random_range(1..400))).unwrap();
        let min = [Confidence::Low, Confidence::Nominal, Confidence::High][rng.random_range(0..3)];

        let got: Vec<EventId> = epoch.query(&window, &viewport, min).unwrap().map(|e| e.id).collect();
        assert_eq!(got, brute_force(&events, &window, &viewport, min), "viewport {viewport:?}");
    }
}

/// Every event lives in exactly one cell, and each member list is sorted.
#[test]
fn test_cells_partition_the_store() {
    let index = SpatioTemporalIndex::default();
    index.load(random_events(3, 5_000, june(1), 20)).unwrap();
    let epoch = index.snapshot();

    let window = epoch.time_span().unwrap();
    let cells = epoch.candidate_cells(&window, &BoundingBox::new(-180.0, -90.0, 180.0, 90.0));
    let mut seen = vec![0u8; epoch.len()];
    for cell in &cells {
        assert!(cell.members.windows(2).all(|w| w[0] < w[1]));
        for &i in cell.members {
            seen[i as usize] += 1;
        }
    }
    assert!(seen.iter().all(|&n| n == 1));
    assert_eq!(cells.len(), epoch.cell_count());
}

// ═══════════════════════════════════════════════════════════════════════════════
// Load semantics
// ═══════════════════════════════════════════════════════════════════════════════

/// Loading the same batch twice, in any order, yields identical query results.
#[test]
fn test_load_is_idempotent() {
    let events = random_events(5, 4_000, june(1), 30);
    let index = SpatioTemporalIndex::default();

    let first_id = index.load(events.clone()).unwrap();
    let first = index.snapshot();

    let mut shuffled = events;
    shuffled.shuffle(&mut StdRng::seed_from_u64(1));
    let second_id = index.load(shuffled).unwrap();
    let second = index.snapshot();

    assert!(second_id > first_id);
    assert_eq!(first.events(), second.events());

    let window = TimeWindow::new(june(5), june(15)).unwrap();
    let a: Vec<EventId> = first
        .query(&window, &BoundingBox::conus(), Confidence::Nominal)
        .unwrap()
        .map(|e| e.id)
        .collect();
    let b: Vec<EventId> = second
        .query(&window, &BoundingBox::conus(), Confidence::Nominal)
        .unwrap()
        .map(|e| e.id)
        .collect();
    assert_eq!(a, b);
    assert!(!a.is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════════
// Decay window
// ═══════════════════════════════════════════════════════════════════════════════

fn three_day_index() -> SpatioTemporalIndex {
    SpatioTemporalIndex::new(IndexConfig::default(), DecayPolicy::uniform(TimeDelta::days(3))).unwrap()
}

/// Active from the detection instant through `timestamp + decay`, inclusive.
#[test]
fn test_decay_boundaries() {
    let index = three_day_index();
    let t = june(10) + TimeDelta::hours(14);
    index.load(vec![event(1, 37.0, -119.0, t)]).unwrap();
    let epoch = index.snapshot();

    let visible = |at| {
        epoch
            .query_at_or_before(at, &BoundingBox::conus())
            .unwrap()
            .count()
    };
    let eps = TimeDelta::nanoseconds(1);
    assert_eq!(visible(t - eps), 0);
    assert_eq!(visible(t), 1);
    assert_eq!(visible(t + TimeDelta::days(1)), 1);
    assert_eq!(visible(t + TimeDelta::days(3)), 1);
    assert_eq!(visible(t + TimeDelta::days(3) + eps), 0);
}

/// Longer persistence for high-confidence detections.
#[test]
fn test_decay_by_confidence() {
    let decay = DecayPolicy {
        high_secs: Some(7 * 86_400),
        ..DecayPolicy::uniform(TimeDelta::days(2))
    };
    let index = SpatioTemporalIndex::new(IndexConfig::default(), decay).unwrap();
    let mut strong = event(1, 37.0, -119.0, june(1));
    strong.confidence = Confidence::High;
    let weak = event(2, 37.1, -119.1, june(1));
    index.load(vec![strong, weak]).unwrap();
    let epoch = index.snapshot();

    let ids = |at| -> Vec<u64> {
        epoch
            .query_at_or_before(at, &BoundingBox::conus())
            .unwrap()
            .map(|e| e.id.0)
            .collect()
    };
    assert_eq!(ids(june(2)), vec![1, 2]);
    assert_eq!(ids(june(5)), vec![1]);
    assert_eq!(ids(june(8)), vec![1]);
    assert!(ids(june(9)).is_empty());
}

/// Scripted three-event scenario with a three-day decay window.
#[test]
fn test_three_event_scenario() {
    let index = three_day_index();
    index
        .load(vec![
            event(1, 34.0, -118.0, june(1)),
            event(2, 40.0, -105.0, june(2)),
            event(3, 34.0, -118.0, june(5)),
        ])
        .unwrap();
    let epoch = index.snapshot();

    let at = |t| -> Vec<u64> {
        epoch
            .query_at_or_before(t, &BoundingBox::conus())
            .unwrap()
            .map(|e| e.id.0)
            .collect()
    };
    assert_eq!(at(june(2)), vec![1, 2]);
    assert_eq!(at(june(6)), vec![3]);
}

/// Queries against an empty store are empty, never errors.
#[test]
fn test_empty_store_queries() {
    let index = SpatioTemporalIndex::default();
    let epoch = index.snapshot();
    assert_eq!(
        epoch
            .query_at_or_before(Utc::now(), &BoundingBox::north_america())
            .unwrap()
            .count(),
        0
    );
    assert!(epoch.time_span().is_none());
}
