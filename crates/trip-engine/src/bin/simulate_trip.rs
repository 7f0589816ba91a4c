//! Drive a scripted trip through the tracking engine and print snapshots.
//!
//! Runs entirely in memory against fake collaborators: a straight-road
//! routing oracle, a vehicle that advances along the route with GPS jitter,
//! and a completion sink that just logs.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use rand::Rng;
use tokio::sync::{mpsc, Mutex};

use trip_core::models::{Point, PositionSample, SampleSource, TripGeometry, TripStatus};
use trip_engine::oracle::{
    Collaborators, CostOracle, OracleError, PositionSource, RouteRequest, RoutingOracle,
    WaypointCompletionSink,
};
use trip_engine::session::TripDescriptor;
use trip_engine::{TrackerConfig, TripTracker};

#[derive(Parser, Debug)]
#[command(about = "Simulate a tracked trip end to end")]
struct Args {
    /// Trip length in degrees of longitude (~111km per degree at equator)
    #[arg(long, default_value_t = 0.004)]
    length_deg: f64,

    /// Number of intermediate stops
    #[arg(long, default_value_t = 1)]
    stops: usize,

    /// Push sample rate in milliseconds
    #[arg(long, default_value_t = 500)]
    tick_ms: u64,

    /// GPS jitter in degrees applied to each sample
    #[arg(long, default_value_t = 0.00001)]
    jitter_deg: f64,
}

/// Straight-road oracle: densifies the requested legs into 20m vertices.
struct StraightRoad;

impl RoutingOracle for StraightRoad {
    async fn estimate_route(&self, request: RouteRequest) -> Result<Vec<Point>, OracleError> {
        let mut legs = vec![request.origin];
        legs.extend(request.stops.iter().copied());
        legs.push(request.destination);

        let mut points = Vec::new();
        for pair in legs.windows(2) {
            let steps = 10;
            for i in 0..steps {
                let t = i as f64 / steps as f64;
                points.push(Point::new(
                    pair[0].lat + t * (pair[1].lat - pair[0].lat),
                    pair[0].lon + t * (pair[1].lon - pair[0].lon),
                ));
            }
        }
        points.push(*legs.last().unwrap());
        Ok(points)
    }
}

/// Vehicle position shared between the driver task and the poll source.
struct SharedVehicle {
    position: Mutex<Point>,
}

impl PositionSource for SharedVehicle {
    async fn fetch_position(&self, _vehicle_id: &str) -> Result<Option<Point>, OracleError> {
        Ok(Some(*self.position.lock().await))
    }
}

struct MeterReader;

impl CostOracle for MeterReader {
    async fn declared_cost(&self, _trip_id: &str) -> Result<f64, OracleError> {
        Ok(0.0)
    }
}

struct LoggingSink;

impl WaypointCompletionSink for LoggingSink {
    async fn report_completion(&self, trip_id: &str, order: u32) -> Result<(), OracleError> {
        tracing::info!(trip_id, order, "completion reported to backend");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let start = Point::new(0.0, 0.0001);
    let end = Point::new(0.0, 0.0001 + args.length_deg);
    let stops: Vec<Point> = (1..=args.stops)
        .map(|i| {
            let t = i as f64 / (args.stops + 1) as f64;
            Point::new(0.0, start.lon + t * (end.lon - start.lon))
        })
        .collect();
    let geometry = TripGeometry::new(start, &stops, end);

    let vehicle = Arc::new(SharedVehicle {
        position: Mutex::new(start),
    });
    let collaborators = Collaborators {
        positions: Arc::clone(&vehicle),
        routing: Arc::new(StraightRoad),
        costs: Arc::new(MeterReader),
        completions: Arc::new(LoggingSink),
    };

    let tracker = TripTracker::new(TrackerConfig::from_env(), collaborators);
    let (push_tx, push_rx) = mpsc::channel(32);

    let mut snapshots = tracker.track(
        TripDescriptor {
            trip_id: "sim-trip".into(),
            vehicle_id: "sim-vehicle".into(),
            geometry,
            status: TripStatus::InProgress,
            base_price: 50.0,
            per_km_rate: 12.0,
            declared_cost: 55.0,
            vehicle_kind: Some("sedan".into()),
        },
        push_rx,
    )?;

    // Driver task: crawl from start to end, pushing jittered samples.
    let driver = {
        let vehicle = Arc::clone(&vehicle);
        let tick = Duration::from_millis(args.tick_ms);
        tokio::spawn(async move {
            let steps = 80;
            for i in 0..=steps {
                let t = i as f64 / steps as f64;
                let jitter_lat = rand::rng().random_range(-args.jitter_deg..=args.jitter_deg);
                let point = Point::new(
                    jitter_lat,
                    start.lon + t * (end.lon - start.lon),
                );
                *vehicle.position.lock().await = point;
                let _ = push_tx
                    .send(PositionSample::new(point, SampleSource::Push, Utc::now()))
                    .await;
                tokio::time::sleep(tick).await;
            }
        })
    };

    let printer = tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow().clone();
            tracing::info!(
                next_target = ?snapshot.next_target.map(|w| (w.kind, w.order)),
                completed = snapshot.completed.len(),
                approach_pts = snapshot.approach.as_ref().map_or(0, |p| p.len()),
                remaining_pts = snapshot.remaining.as_ref().map_or(0, |p| p.len()),
                traveled_km = format!("{:.3}", snapshot.cost.traveled_km),
                cost = format!("{:.2}", snapshot.cost.current_cost),
                "snapshot"
            );
        }
    });

    driver.await?;
    tracker.set_status("sim-trip", TripStatus::Finished).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    tracker.stop_all();
    printer.abort();
    Ok(())
}
