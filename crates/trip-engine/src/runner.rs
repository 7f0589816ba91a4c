//! Per-session runner task.
//!
//! Single task owning the [`TripSession`]; every mutation of session state
//! is serialized through its select loop. The loop stays responsive to new
//! samples while a route fetch is in flight, and the scheduler guarantees
//! at most one oracle call at a time.

use std::future::{self, Future};
use std::pin::Pin;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use trip_core::error::TrackingError;
use trip_core::models::{PositionSample, RouteSnapshot, TripStatus};

use crate::config::TrackerConfig;
use crate::loops::{cost_sync_loop, poll_loop, RunnerMsg};
use crate::oracle::{
    Collaborators, CostOracle, OracleError, PositionSource, RoutingOracle, WaypointCompletionSink,
};
use crate::scheduler::{Directive, RecomputationScheduler};
use crate::session::{TripDescriptor, TripSession};

type FetchFuture = Pin<Box<dyn Future<Output = Result<Vec<trip_core::models::Point>, OracleError>> + Send>>;
type ReportFuture = Pin<Box<dyn Future<Output = (u32, Result<(), OracleError>)> + Send>>;

/// External control messages for a running session.
#[derive(Debug)]
pub(crate) enum ControlMsg {
    Status(TripStatus),
}

/// Handle to a spawned tracking session.
pub struct SessionHandle {
    trip_id: String,
    shutdown: broadcast::Sender<()>,
    control: mpsc::Sender<ControlMsg>,
    snapshot_rx: watch::Receiver<RouteSnapshot>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn trip_id(&self) -> &str {
        &self.trip_id
    }

    /// A fresh receiver of published snapshots.
    pub fn snapshot_rx(&self) -> watch::Receiver<RouteSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Forward a backend status transition into the session.
    pub async fn set_status(&self, status: TripStatus) -> bool {
        self.control.send(ControlMsg::Status(status)).await.is_ok()
    }

    /// Stop tracking. Cancels the debounce timer, the background loops and
    /// any in-flight oracle call; late results are discarded, not applied.
    pub fn stop(&self) {
        let _ = self.shutdown.send(());
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn the runner and its background loops for one trip.
pub fn spawn_session<P, R, C, S>(
    config: TrackerConfig,
    descriptor: TripDescriptor,
    collaborators: Collaborators<P, R, C, S>,
    push_rx: mpsc::Receiver<PositionSample>,
) -> SessionHandle
where
    P: PositionSource,
    R: RoutingOracle,
    C: CostOracle,
    S: WaypointCompletionSink,
{
    let (session, snapshot_rx) = TripSession::new(
        &descriptor,
        config.completion_threshold_m,
        config.glitch_cap_km,
    );
    let (shutdown_tx, _) = broadcast::channel(1);
    let (control_tx, control_rx) = mpsc::channel(16);

    let trip_id = descriptor.trip_id.clone();
    let task = tokio::spawn(run_session(
        session,
        descriptor,
        config,
        collaborators,
        push_rx,
        control_rx,
        shutdown_tx.clone(),
    ));

    SessionHandle {
        trip_id,
        shutdown: shutdown_tx,
        control: control_tx,
        snapshot_rx,
        task,
    }
}

async fn run_session<P, R, C, S>(
    mut session: TripSession,
    descriptor: TripDescriptor,
    config: TrackerConfig,
    collaborators: Collaborators<P, R, C, S>,
    mut push_rx: mpsc::Receiver<PositionSample>,
    mut control_rx: mpsc::Receiver<ControlMsg>,
    shutdown_tx: broadcast::Sender<()>,
) where
    P: PositionSource,
    R: RoutingOracle,
    C: CostOracle,
    S: WaypointCompletionSink,
{
    let trip_id = descriptor.trip_id.clone();
    tracing::info!(trip_id = %trip_id, vehicle_id = %descriptor.vehicle_id, "tracking session started");

    let (msg_tx, mut msg_rx) = mpsc::channel::<RunnerMsg>(32);

    tokio::spawn(poll_loop::run_poll_loop(
        Arc::clone(&collaborators.positions),
        descriptor.vehicle_id.clone(),
        config.poll_interval,
        config.max_poll_failures,
        msg_tx.clone(),
        shutdown_tx.subscribe(),
    ));
    tokio::spawn(cost_sync_loop::run_cost_sync_loop(
        Arc::clone(&collaborators.costs),
        trip_id.clone(),
        config.cost_sync_interval,
        msg_tx.clone(),
        shutdown_tx.subscribe(),
    ));

    let mut shutdown = shutdown_tx.subscribe();
    let mut scheduler = RecomputationScheduler::new();
    let mut debounce_at: Option<Instant> = None;
    let mut in_flight: Option<FetchFuture> = None;
    let mut reports: FuturesUnordered<ReportFuture> = FuturesUnordered::new();
    let mut push_open = true;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!(trip_id = %trip_id, "tracking session stopped");
                break;
            }
            result = next_fetch(&mut in_flight), if in_flight.is_some() => {
                in_flight = None;
                match result {
                    Ok(points) => session.install_polyline(points),
                    Err(err) => {
                        // Last-known geometry is retained; the next debounce
                        // cycle retries.
                        let err = TrackingError::OracleUnavailable {
                            reason: err.to_string(),
                        };
                        tracing::warn!(trip_id = %trip_id, error = %err, "route refresh failed");
                    }
                }
                let directive = scheduler.on_fetch_resolved();
                apply_directive(
                    directive,
                    &session,
                    &descriptor,
                    &config,
                    &collaborators.routing,
                    &mut scheduler,
                    &mut debounce_at,
                    &mut in_flight,
                );
            }
            _ = next_deadline(debounce_at), if debounce_at.is_some() => {
                debounce_at = None;
                let directive = scheduler.on_debounce_expired();
                apply_directive(
                    directive,
                    &session,
                    &descriptor,
                    &config,
                    &collaborators.routing,
                    &mut scheduler,
                    &mut debounce_at,
                    &mut in_flight,
                );
            }
            Some((order, result)) = reports.next(), if !reports.is_empty() => {
                session.report_resolved(order, result);
            }
            maybe_sample = push_rx.recv(), if push_open => {
                match maybe_sample {
                    Some(sample) => handle_sample(
                        sample,
                        &mut session,
                        &descriptor,
                        &config,
                        &collaborators,
                        &mut scheduler,
                        &mut debounce_at,
                        &mut in_flight,
                        &mut reports,
                    ),
                    None => {
                        // Push transport closed; polling carries on alone.
                        tracing::debug!(trip_id = %trip_id, "push stream ended");
                        push_open = false;
                    }
                }
            }
            Some(msg) = msg_rx.recv() => {
                match msg {
                    RunnerMsg::Sample(sample) => handle_sample(
                        sample,
                        &mut session,
                        &descriptor,
                        &config,
                        &collaborators,
                        &mut scheduler,
                        &mut debounce_at,
                        &mut in_flight,
                        &mut reports,
                    ),
                    RunnerMsg::PollDegraded { failures } => {
                        let err = TrackingError::DegradedTracking { failures };
                        tracing::warn!(trip_id = %trip_id, error = %err, "session degraded");
                        session.mark_degraded();
                    }
                    RunnerMsg::BackendCost(cost) => session.adopt_backend_cost(cost),
                }
            }
            Some(msg) = control_rx.recv() => {
                let ControlMsg::Status(status) = msg;
                session.set_status(status);
                if status.is_terminal() {
                    tracing::info!(trip_id = %trip_id, ?status, "trip reached terminal status");
                    break;
                }
                // The needed segments changed (e.g. pickup happened), so
                // schedule a recomputation from the current position.
                if session.route_request(None).is_some() {
                    let directive = scheduler.on_position_change();
                    apply_directive(
                        directive,
                        &session,
                        &descriptor,
                        &config,
                        &collaborators.routing,
                        &mut scheduler,
                        &mut debounce_at,
                        &mut in_flight,
                    );
                }
            }
        }
    }

    // Stop the background loops whichever way the runner exits.
    let _ = shutdown_tx.send(());
}

#[allow(clippy::too_many_arguments)]
fn handle_sample<P, R, C, S>(
    sample: PositionSample,
    session: &mut TripSession,
    descriptor: &TripDescriptor,
    config: &TrackerConfig,
    collaborators: &Collaborators<P, R, C, S>,
    scheduler: &mut RecomputationScheduler,
    debounce_at: &mut Option<Instant>,
    in_flight: &mut Option<FetchFuture>,
    reports: &mut FuturesUnordered<ReportFuture>,
) where
    P: PositionSource,
    R: RoutingOracle,
    C: CostOracle,
    S: WaypointCompletionSink,
{
    let tick = match session.handle_sample(sample) {
        Ok(tick) => tick,
        Err(err) => {
            tracing::debug!(trip_id = %session.trip_id(), error = %err, "sample dropped");
            return;
        }
    };

    for order in tick.newly_completed {
        let sink = Arc::clone(&collaborators.completions);
        let trip_id = session.trip_id().to_string();
        reports.push(Box::pin(async move {
            (order, sink.report_completion(&trip_id, order).await)
        }));
    }

    if tick.position_changed {
        let directive = scheduler.on_position_change();
        apply_directive(
            directive,
            session,
            descriptor,
            config,
            &collaborators.routing,
            scheduler,
            debounce_at,
            in_flight,
        );
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_directive<R: RoutingOracle>(
    directive: Directive,
    session: &TripSession,
    descriptor: &TripDescriptor,
    config: &TrackerConfig,
    routing: &Arc<R>,
    scheduler: &mut RecomputationScheduler,
    debounce_at: &mut Option<Instant>,
    in_flight: &mut Option<FetchFuture>,
) {
    match directive {
        Directive::Nothing => {}
        Directive::ArmDebounce => {
            *debounce_at = Some(Instant::now() + config.debounce);
        }
        Directive::StartFetch => {
            match session.route_request(descriptor.vehicle_kind.clone()) {
                Some(request) => {
                    let routing = Arc::clone(routing);
                    *in_flight =
                        Some(Box::pin(async move { routing.estimate_route(request).await }));
                }
                None => {
                    // Nothing to fetch (no fix yet or trip over); unwind the
                    // scheduler so it does not sit in-flight forever.
                    scheduler.on_fetch_resolved();
                }
            }
        }
    }
}

async fn next_fetch(
    in_flight: &mut Option<FetchFuture>,
) -> Result<Vec<trip_core::models::Point>, OracleError> {
    match in_flight.as_mut() {
        Some(fetch) => fetch.as_mut().await,
        // Guarded out by the select arm; never polled.
        None => future::pending().await,
    }
}

async fn next_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => future::pending().await,
    }
}
