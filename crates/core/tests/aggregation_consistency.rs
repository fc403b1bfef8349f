//! Aggregations agree with raw queries over the same period and region
//!
//! Run tests with: cargo test --test `aggregation_consistency`

mod common;

use approx::assert_relative_eq;
use chrono::{TimeZone, Utc};
use common::random_events;
use firewatch_core::{
    AggregationEngine, BoundingBox, Confidence, Metric, MetricValue, PeriodGranularity, PeriodSpec,
    Season, SpatioTemporalIndex,
};
use std::sync::Arc;

fn engine() -> AggregationEngine {
    let index = Arc::new(SpatioTemporalIndex::default());
    let start = Utc.with_ymd_and_hms(2020, 5, 1, 0, 0, 0).unwrap();
    index.load(random_events(21, 30_000, start, 330)).unwrap();
    AggregationEngine::new(index)
}

fn seasons() -> [PeriodSpec; 3] {
    [
        PeriodSpec::Season {
            year: 2020,
            season: Season::Summer,
        },
        PeriodSpec::Season {
            year: 2020,
            season: Season::Fall,
        },
        PeriodSpec::Season {
            year: 2021,
            season: Season::Winter,
        },
    ]
}

fn regions() -> [BoundingBox; 2] {
    [BoundingBox::conus(), BoundingBox::alaska()]
}

#[test]
fn test_count_matches_query() {
    let engine = engine();
    let epoch = engine.index().snapshot();

    for period in seasons() {
        let window = period.window().unwrap();
        for region in regions() {
            let queried = epoch.query(&window, &region, Confidence::Low).unwrap().count();
            let result = engine.aggregate(period, &region, "count").unwrap();
            assert_eq!(result.value, MetricValue::Count(queried as u64), "{period} {region:?}");
            assert!(queried > 0, "{period} {region:?} should not be empty");
        }
    }
}

#[test]
fn test_frp_statistics_match_query() {
    let engine = engine();
    let epoch = engine.index().snapshot();

    for period in seasons() {
        let window = period.window().unwrap();
        for region in regions() {
            let frps: Vec<f64> = epoch
                .query(&window, &region, Confidence::Low)
                .unwrap()
                .map(|e| e.frp)
                .collect();
            let sum: f64 = frps.iter().sum();
            let max = frps.iter().copied().fold(0.0, f64::max);

            let got_sum = engine.aggregate(period, &region, "frp_sum").unwrap().value.as_f64();
            let got_mean = engine.aggregate(period, &region, "mean_frp").unwrap().value.as_f64();
            let got_max = engine.aggregate(period, &region, "max_frp").unwrap().value.as_f64();
            assert_relative_eq!(got_sum, sum, max_relative = 1e-9);
            assert_relative_eq!(got_mean, sum / frps.len() as f64, max_relative = 1e-9);
            assert_relative_eq!(got_max, max);
        }
    }
}

/// Seasons tile the timeline, so a seasonal series over the whole admission
/// region accounts for every event exactly once.
#[test]
fn test_seasonal_series_covers_every_event() {
    let engine = engine();
    let total = engine.index().snapshot().len() as u64;

    let series = engine
        .series(PeriodGranularity::Seasonal, &BoundingBox::north_america(), Metric::Count)
        .unwrap();
    let counted: u64 = series
        .iter()
        .map(|r| match r.value {
            MetricValue::Count(n) => n,
            other => panic!("unexpected value {other:?}"),
        })
        .sum();
    assert_eq!(counted, total);
    assert_eq!(series.first().map(|r| r.period.to_string()), Some("2020-Spring".to_string()));
}

#[test]
fn test_results_stable_within_epoch() {
    let engine = engine();
    let period = seasons()[0];
    let a = engine
        .aggregate(period, &BoundingBox::conus(), "frp_percentiles")
        .unwrap();
    let b = engine
        .aggregate(period, &BoundingBox::conus(), "frp_percentiles")
        .unwrap();
    assert_eq!(a, b);

    let MetricValue::Bands(bands) = a.value else {
        panic!("expected percentile bands");
    };
    assert!(bands.p10 <= bands.p25 && bands.p25 <= bands.p50);
    assert!(bands.p50 <= bands.p75 && bands.p75 <= bands.p90);
}
