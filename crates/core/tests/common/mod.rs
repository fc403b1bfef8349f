//! Shared fixtures for the integration suites

#![allow(dead_code)]

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use firewatch_core::{Confidence, EventId, FireEvent, PixelFootprint, SatelliteSource};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Install a test subscriber once per test binary; `RUST_LOG` controls it.
#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Midnight UTC on the given day of June 2021
pub fn june(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 6, day, 0, 0, 0).unwrap()
}

pub fn event(id: u64, latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> FireEvent {
    FireEvent {
        id: EventId(id),
        latitude,
        longitude,
        timestamp,
        brightness: 325.0,
        frp: 10.0,
        confidence: Confidence::Nominal,
        satellite: SatelliteSource::Noaa20,
        pixel: None,
    }
}

/// `n` events scattered over the admission region between `start` and
/// `start + days`, at whole-second timestamps.
pub fn random_events(seed: u64, n: usize, start: DateTime<Utc>, days: i64) -> Vec<FireEvent> {
    let mut rng = StdRng::seed_from_u64(seed);
    let span_secs = days * 86_400;
    (0..n as u64)
        .map(|id| FireEvent {
            id: EventId(id),
            latitude: rng.random_range(25.0..70.0),
            longitude: rng.random_range(-170.0..-50.0),
            timestamp: start + TimeDelta::seconds(rng.random_range(0..span_secs)),
            brightness: rng.random_range(300.0..400.0),
            frp: rng.random_range(0.0..250.0),
            confidence: match rng.random_range(0..3) {
                0 => Confidence::Low,
                1 => Confidence::Nominal,
                _ => Confidence::High,
            },
            satellite: if rng.random_bool(0.5) {
                SatelliteSource::Aqua
            } else {
                SatelliteSource::SuomiNpp
            },
            pixel: Some(PixelFootprint {
                scan: rng.random_range(0.4..2.0),
                track: rng.random_range(0.4..2.0),
            }),
        })
        .collect()
}
