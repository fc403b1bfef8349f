use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use clap::Parser;
use firewatch_core::ingest::RawValue;
use firewatch_core::{
    AggregationEngine, BoundingBox, Confidence, EngineConfig, Metric, Normalizer, OutlierColumn,
    OverlayPeriod, OverlayRequest, PeriodGranularity, PlaybackController, RawDetection,
    SpatioTemporalIndex,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Headless fire activity playback over synthetic FIRMS detections
#[derive(Parser, Debug)]
#[command(name = "firewatch-demo")]
#[command(about = "Synthetic FIRMS playback and seasonal summary", long_about = None)]
struct Args {
    /// Number of fire complexes to synthesize
    #[arg(short = 'n', long, default_value_t = 400)]
    fires: u32,

    /// Mean detections per fire complex
    #[arg(long, default_value_t = 600)]
    detections_per_fire: u32,

    /// Days of data starting 2020-01-01
    #[arg(short, long, default_value_t = 365)]
    days: i64,

    /// RNG seed for the synthetic dataset
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Frames to play
    #[arg(short, long, default_value_t = 300)]
    frames: u32,

    /// Wall time per frame in milliseconds
    #[arg(long, default_value_t = 33)]
    frame_ms: u64,

    /// Playback speed multiplier
    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    /// Map zoom level
    #[arg(short, long, default_value_t = 4)]
    zoom: u8,

    /// Minimum confidence (low, nominal, high)
    #[arg(long, default_value = "low")]
    min_confidence: String,

    /// Engine configuration JSON
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Report every N frames
    #[arg(short, long, default_value_t = 30)]
    report_interval: u32,

    /// Drop brightness and pixel-size outliers before loading
    #[arg(long)]
    reject_outliers: bool,
}

/// Clustered detections around random ignition points, half MODIS and half
/// VIIRS, with a sprinkling of malformed rows.
fn synthesize(args: &Args, start: DateTime<Utc>) -> Vec<RawDetection> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut records = Vec::new();

    for _ in 0..args.fires {
        let lat = rng.random_range(26.0..68.0);
        let lon = rng.random_range(-165.0..-55.0);
        let ignition = start + TimeDelta::seconds(rng.random_range(0..args.days.max(1) * 86_400));
        let burn_days = rng.random_range(1..30);
        let modis = rng.random_bool(0.5);
        // MODIS pixels widen towards the swath edge; VIIRS I-band stays small.
        let (scan, track) = if modis {
            let scan: f64 = rng.random_range(1.0..4.8);
            (scan, 1.0 + (scan - 1.0) * 0.27)
        } else {
            let scan: f64 = rng.random_range(0.32..0.78);
            (scan, rng.random_range(0.36..0.75))
        };
        let count = rng.random_range(args.detections_per_fire / 2..=args.detections_per_fire * 3 / 2);

        for _ in 0..count {
            let t = ignition + TimeDelta::minutes(rng.random_range(0..burn_days * 1440));
            let frp: f64 = rng.random_range(0.5..8.0_f64).powi(2);
            let confidence = if modis {
                RawValue::Int(rng.random_range(0..=100))
            } else {
                RawValue::Text(["l", "n", "h"][rng.random_range(0..3)].to_string())
            };
            records.push(RawDetection {
                latitude: lat + rng.random_range(-0.3..0.3),
                longitude: lon + rng.random_range(-0.3..0.3),
                brightness: Some(300.0 + frp.sqrt() * 10.0),
                frp: (rng.random_range(0..200) != 0).then_some(frp),
                acq_date: t.format("%Y-%m-%d").to_string(),
                acq_time: RawValue::Text(t.format("%H%M").to_string()),
                confidence,
                satellite: if modis { "Aqua" } else { "N20" }.to_string(),
                scan: Some(scan),
                track: Some(track),
            });
        }
    }
    records
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    println!("=== Fire Activity Playback Demo ===\n");

    let config = match &args.config {
        Some(path) => match EngineConfig::from_json_file(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("Could not load {}: {err}", path.display());
                std::process::exit(2);
            }
        },
        None => EngineConfig::default(),
    };
    let min_confidence = Confidence::from_code(&args.min_confidence).unwrap_or_else(|| {
        println!("Unknown confidence '{}', using low", args.min_confidence);
        Confidence::Low
    });

    // Ingest
    let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).single().unwrap_or_default();
    let raw = synthesize(&args, start);
    let mut normalizer = Normalizer::new(config.index.admission_region);
    if args.reject_outliers {
        normalizer = normalizer.reject_outliers(&[
            OutlierColumn::Brightness,
            OutlierColumn::Scan,
            OutlierColumn::Track,
        ]);
    }
    let batch = normalizer.normalize_batch(&raw);
    println!(
        "Synthesized {} detections: {} accepted, {} rejected",
        raw.len(),
        batch.accepted.len(),
        batch.rejected_total()
    );
    let mut reasons: Vec<_> = batch.rejected.iter().collect();
    reasons.sort();
    for (reason, count) in reasons {
        println!("  {reason}: {count}");
    }

    let index = match SpatioTemporalIndex::from_config(&config) {
        Ok(index) => Arc::new(index),
        Err(err) => {
            eprintln!("Invalid index settings: {err}");
            std::process::exit(2);
        }
    };
    let load_start = Instant::now();
    if let Err(err) = index.load(batch.accepted) {
        eprintln!("Load failed: {err}");
        std::process::exit(1);
    }
    let epoch = index.snapshot();
    println!(
        "Loaded epoch {} with {} events in {} cells ({:.1} ms)\n",
        epoch.id().0,
        epoch.len(),
        epoch.cell_count(),
        load_start.elapsed().as_secs_f64() * 1000.0
    );

    // Playback
    let mut player = PlaybackController::from_config(Arc::clone(&index), &config, args.seed);
    player.set_speed(args.speed);
    if let Err(err) = player
        .set_filter(min_confidence, None)
        .and_then(|()| player.set_viewport(BoundingBox::north_america(), args.zoom))
    {
        eprintln!("Invalid playback settings: {err}");
        std::process::exit(2);
    }
    player.add_overlay(OverlayRequest {
        period: OverlayPeriod::AtCursor(PeriodGranularity::Monthly),
        region: Some(BoundingBox::conus()),
        metric: Metric::Count,
    });
    player.play();

    let elapsed = Duration::from_millis(args.frame_ms);
    let report_interval = args.report_interval.max(1);
    for frame_no in 0..args.frames {
        let frame = match player.tick(elapsed) {
            Ok(frame) => frame,
            Err(err) => {
                eprintln!("Frame {frame_no} failed: {err}");
                break;
            }
        };
        if frame_no % report_interval == 0 || !player.state().is_playing() {
            let overlay = frame.overlays.first().map_or(0.0, |o| o.value.as_f64());
            println!(
                "Frame {:4} | {} | shown {:5} of {:6}{} | {:3} cells | {:5.2} ms | CONUS month {:.0}",
                frame_no,
                frame.cursor_time.format("%Y-%m-%d %H:%M"),
                frame.stats.rendered,
                frame.stats.candidates,
                if frame.stats.truncated { "*" } else { " " },
                frame.stats.cells_scanned,
                frame.stats.build_ms,
                overlay
            );
        }
        if !player.state().is_playing() {
            println!("Reached end of data");
            break;
        }
    }
    let timer = player.timer();
    println!(
        "\n{} frames, worst {:.2} ms, {} over the {:.0} ms budget\n",
        timer.frames(),
        timer.worst_frame_time_ms(),
        timer.over_budget(),
        timer.budget_ms()
    );

    // Seasonal summary
    let aggregation = AggregationEngine::new(Arc::clone(&index));
    for (name, region) in [("CONUS", BoundingBox::conus()), ("Alaska", BoundingBox::alaska())] {
        println!("{name} by season:");
        let series = [Metric::Count, Metric::MeanFrp, Metric::FireAreaSum]
            .map(|metric| aggregation.series(PeriodGranularity::Seasonal, &region, metric));
        match series.into_iter().collect::<Result<Vec<_>, _>>() {
            Ok(columns) => {
                let [counts, means, areas] = &columns[..] else {
                    continue;
                };
                for ((count, mean), area) in counts.iter().zip(means).zip(areas) {
                    println!(
                        "  {:12} {:7.0} detections, mean FRP {:6.2} MW, {:8.1} km² burning",
                        count.period.to_string(),
                        count.value.as_f64(),
                        mean.value.as_f64(),
                        area.value.as_f64()
                    );
                }
            }
            Err(err) => eprintln!("  aggregation failed: {err}"),
        }
    }

    println!("\n=== Demo Complete ===");
}
