//! End-to-end engine tests against in-memory collaborators.
//!
//! All tests run on a paused clock (`start_paused`), so debounce windows and
//! poll intervals elapse instantly while ordering is preserved.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;

use trip_core::models::{
    Point, PositionSample, SampleSource, TripGeometry, TripStatus, WaypointKind,
};
use trip_engine::oracle::{
    Collaborators, CostOracle, OracleError, PositionSource, RouteRequest, RoutingOracle,
    WaypointCompletionSink,
};
use trip_engine::session::TripDescriptor;
use trip_engine::{spawn_session, TrackerConfig};

/// Routing oracle that counts calls and can be gated shut for in-flight
/// scenarios. Also tracks the maximum number of concurrent calls.
struct CountingRoad {
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl CountingRoad {
    fn open() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            gate: None,
        }
    }

    fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::open()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl RoutingOracle for CountingRoad {
    async fn estimate_route(&self, request: RouteRequest) -> Result<Vec<Point>, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.expect("gate closed");
            permit.forget();
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        let mut points = vec![request.origin];
        points.extend(request.stops);
        points.push(request.destination);
        Ok(points)
    }
}

struct NoVehicle;

impl PositionSource for NoVehicle {
    async fn fetch_position(&self, _vehicle_id: &str) -> Result<Option<Point>, OracleError> {
        Ok(None)
    }
}

struct BrokenPositions;

impl PositionSource for BrokenPositions {
    async fn fetch_position(&self, _vehicle_id: &str) -> Result<Option<Point>, OracleError> {
        Err(OracleError::Transport("connection refused".into()))
    }
}

struct FixedCost(f64);

impl CostOracle for FixedCost {
    async fn declared_cost(&self, _trip_id: &str) -> Result<f64, OracleError> {
        if self.0.is_finite() {
            Ok(self.0)
        } else {
            Err(OracleError::NotFound)
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    reported: Mutex<Vec<u32>>,
}

impl WaypointCompletionSink for RecordingSink {
    async fn report_completion(&self, _trip_id: &str, order: u32) -> Result<(), OracleError> {
        self.reported.lock().unwrap().push(order);
        Ok(())
    }
}

fn geometry() -> TripGeometry {
    TripGeometry::new(
        Point::new(0.0, 0.001),
        &[Point::new(0.0, 0.002)],
        Point::new(0.0, 0.003),
    )
}

fn descriptor(status: TripStatus) -> TripDescriptor {
    TripDescriptor {
        trip_id: "t-100".into(),
        vehicle_id: "v-100".into(),
        geometry: geometry(),
        status,
        base_price: 100.0,
        per_km_rate: 8.0,
        declared_cost: 0.0,
        vehicle_kind: None,
    }
}

fn config() -> TrackerConfig {
    TrackerConfig {
        debounce: Duration::from_secs(2),
        poll_interval: Duration::from_secs(60),
        cost_sync_interval: Duration::from_secs(3600),
        ..TrackerConfig::default()
    }
}

fn push_sample(lon: f64, offset_ms: i64) -> PositionSample {
    PositionSample::new(
        Point::new(0.0, lon),
        SampleSource::Push,
        Utc::now() + ChronoDuration::milliseconds(offset_ms),
    )
}

#[tokio::test(start_paused = true)]
async fn first_sample_fetches_immediately_then_debounces() {
    let road = Arc::new(CountingRoad::open());
    let collaborators = Collaborators {
        positions: Arc::new(NoVehicle),
        routing: Arc::clone(&road),
        costs: Arc::new(FixedCost(0.0)),
        completions: Arc::new(RecordingSink::default()),
    };
    let (push_tx, push_rx) = mpsc::channel(8);
    let handle = spawn_session(config(), descriptor(TripStatus::InProgress), collaborators, push_rx);
    let snapshots = handle.snapshot_rx();

    push_tx.send(push_sample(0.0010, 0)).await.unwrap();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(road.calls(), 1, "first fetch is immediate on trip load");

    // A burst of movement settles into exactly one more fetch.
    push_tx.send(push_sample(0.0011, 100)).await.unwrap();
    push_tx.send(push_sample(0.0012, 200)).await.unwrap();
    sleep(Duration::from_millis(500)).await;
    assert_eq!(road.calls(), 1, "debounce still pending");

    sleep(Duration::from_secs(3)).await;
    assert_eq!(road.calls(), 2, "one fetch after settle");

    let snapshot = snapshots.borrow().clone();
    assert!(snapshot.approach.is_some());
    handle.stop();
}

#[tokio::test(start_paused = true)]
async fn in_flight_fetch_is_superseded_exactly_once() {
    let gate = Arc::new(Semaphore::new(0));
    let road = Arc::new(CountingRoad::gated(Arc::clone(&gate)));
    let collaborators = Collaborators {
        positions: Arc::new(NoVehicle),
        routing: Arc::clone(&road),
        costs: Arc::new(FixedCost(0.0)),
        completions: Arc::new(RecordingSink::default()),
    };
    let (push_tx, push_rx) = mpsc::channel(8);
    let handle = spawn_session(config(), descriptor(TripStatus::InProgress), collaborators, push_rx);

    push_tx.send(push_sample(0.0010, 0)).await.unwrap();
    sleep(Duration::from_millis(20)).await;
    assert_eq!(road.calls(), 1);

    // Two more updates while the first call is held open.
    push_tx.send(push_sample(0.0012, 100)).await.unwrap();
    push_tx.send(push_sample(0.0014, 200)).await.unwrap();
    sleep(Duration::from_millis(20)).await;
    assert_eq!(road.calls(), 1, "no concurrent call is stacked");

    // Release the first call; exactly one follow-up must be issued.
    gate.add_permits(1);
    sleep(Duration::from_millis(20)).await;
    assert_eq!(road.calls(), 2);

    gate.add_permits(1);
    sleep(Duration::from_secs(5)).await;
    assert_eq!(road.calls(), 2, "supersede flag fires only once");
    assert_eq!(road.max_active(), 1, "never two calls in flight");
    handle.stop();
}

#[tokio::test(start_paused = true)]
async fn poll_failure_budget_flips_degraded() {
    let collaborators = Collaborators {
        positions: Arc::new(BrokenPositions),
        routing: Arc::new(CountingRoad::open()),
        costs: Arc::new(FixedCost(0.0)),
        completions: Arc::new(RecordingSink::default()),
    };
    let (_push_tx, push_rx) = mpsc::channel::<PositionSample>(8);
    let config = TrackerConfig {
        poll_interval: Duration::from_millis(100),
        max_poll_failures: 3,
        cost_sync_interval: Duration::from_secs(3600),
        ..TrackerConfig::default()
    };
    let handle = spawn_session(config, descriptor(TripStatus::InProgress), collaborators, push_rx);
    let snapshots = handle.snapshot_rx();

    sleep(Duration::from_secs(2)).await;
    assert!(snapshots.borrow().degraded, "degraded after 3 consecutive failures");
    handle.stop();
}

#[tokio::test(start_paused = true)]
async fn stop_discards_late_oracle_results() {
    let gate = Arc::new(Semaphore::new(0));
    let road = Arc::new(CountingRoad::gated(Arc::clone(&gate)));
    let collaborators = Collaborators {
        positions: Arc::new(NoVehicle),
        routing: Arc::clone(&road),
        costs: Arc::new(FixedCost(0.0)),
        completions: Arc::new(RecordingSink::default()),
    };
    let (push_tx, push_rx) = mpsc::channel(8);
    let handle = spawn_session(config(), descriptor(TripStatus::InProgress), collaborators, push_rx);
    let snapshots = handle.snapshot_rx();

    push_tx.send(push_sample(0.0010, 0)).await.unwrap();
    sleep(Duration::from_millis(20)).await;
    assert_eq!(road.calls(), 1);

    handle.stop();
    sleep(Duration::from_millis(20)).await;
    assert!(handle.is_finished());

    // Late oracle completion must not surface as geometry.
    let before = snapshots.borrow().clone();
    gate.add_permits(8);
    sleep(Duration::from_millis(20)).await;
    let after = snapshots.borrow().clone();
    assert_eq!(after.approach, before.approach);
    assert_eq!(after.remaining, before.remaining);
    assert!(
        snapshots.has_changed().is_err(),
        "session is gone; no further snapshots can arrive"
    );
}

#[tokio::test(start_paused = true)]
async fn backend_cost_adoption_raises_displayed_cost() {
    let collaborators = Collaborators {
        positions: Arc::new(NoVehicle),
        routing: Arc::new(CountingRoad::open()),
        costs: Arc::new(FixedCost(500.0)),
        completions: Arc::new(RecordingSink::default()),
    };
    let (push_tx, push_rx) = mpsc::channel(8);
    let config = TrackerConfig {
        cost_sync_interval: Duration::from_millis(100),
        poll_interval: Duration::from_secs(3600),
        ..TrackerConfig::default()
    };
    let handle = spawn_session(config, descriptor(TripStatus::InProgress), collaborators, push_rx);
    let snapshots = handle.snapshot_rx();

    push_tx.send(push_sample(0.0010, 0)).await.unwrap();
    sleep(Duration::from_millis(500)).await;

    let cost = snapshots.borrow().cost;
    assert!(cost.current_cost >= 500.0, "got {}", cost.current_cost);
    // Implied distance from (500 - 100) / 8.
    assert!((cost.traveled_km - 50.0).abs() < 1e-9);
    handle.stop();
}

#[tokio::test(start_paused = true)]
async fn pickup_to_dropoff_reports_each_stop_once() {
    let sink = Arc::new(RecordingSink::default());
    let collaborators = Collaborators {
        positions: Arc::new(NoVehicle),
        routing: Arc::new(CountingRoad::open()),
        costs: Arc::new(FixedCost(0.0)),
        completions: Arc::clone(&sink),
    };
    let (push_tx, push_rx) = mpsc::channel(32);
    let handle = spawn_session(config(), descriptor(TripStatus::Accepted), collaborators, push_rx);
    let snapshots = handle.snapshot_rx();

    // Approach the pickup; pre-trip the target is the pickup itself.
    push_tx.send(push_sample(0.0008, 0)).await.unwrap();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(
        snapshots.borrow().next_target.unwrap().kind,
        WaypointKind::Start
    );

    // Rider picked up.
    assert!(handle.set_status(TripStatus::InProgress).await);
    sleep(Duration::from_millis(50)).await;

    // Drive through the stop's geofence several times over.
    for (i, lon) in [0.0015, 0.002, 0.00201, 0.0025].iter().enumerate() {
        push_tx
            .send(push_sample(*lon, 1000 + i as i64 * 100))
            .await
            .unwrap();
        sleep(Duration::from_secs(3)).await;
    }

    assert_eq!(
        *sink.reported.lock().unwrap(),
        vec![1],
        "stop reported exactly once despite repeated geofence hits"
    );
    assert_eq!(
        snapshots.borrow().next_target.unwrap().kind,
        WaypointKind::End
    );

    // Dropoff: terminal status ends the session and clears geometry.
    assert!(handle.set_status(TripStatus::Finished).await);
    sleep(Duration::from_millis(50)).await;
    assert!(handle.is_finished());
    let last = snapshots.borrow().clone();
    assert!(last.approach.is_none());
    assert!(last.remaining.is_none());
}
