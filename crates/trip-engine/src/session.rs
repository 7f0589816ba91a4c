//! Session-scoped tracking state for one trip.
//!
//! Owns the per-trip mutable state: the completion set, the cost state,
//! the cached detailed polyline and the reconciler. All mutation happens
//! through this object from the single runner task, which serializes ticks.
//! Within a tick, completion evaluation always runs before segmentation.

use std::collections::BTreeSet;

use tokio::sync::watch;

use trip_core::completion::CompletionTracker;
use trip_core::cost::CostModel;
use trip_core::error::TrackingError;
use trip_core::models::{
    CompletionSet, DetailedPolyline, Point, PositionSample, RouteSnapshot, TripCostState,
    TripGeometry, TripStatus,
};
use trip_core::reconcile::{LocationReconciler, SampleOutcome};
use trip_core::segment;

use crate::oracle::{OracleError, RouteRequest};

/// Everything needed to start tracking a trip.
#[derive(Debug, Clone)]
pub struct TripDescriptor {
    pub trip_id: String,
    pub vehicle_id: String,
    pub geometry: TripGeometry,
    pub status: TripStatus,
    pub base_price: f64,
    pub per_km_rate: f64,
    /// Backend-declared estimate; floor for the displayed cost.
    pub declared_cost: f64,
    pub vehicle_kind: Option<String>,
}

/// What a single position tick produced.
#[derive(Debug, Default)]
pub struct TickResult {
    /// The authoritative position moved; recomputation should be scheduled.
    pub position_changed: bool,
    /// Stops newly completed this tick, to be reported to the sink.
    pub newly_completed: Vec<u32>,
}

pub struct TripSession {
    trip_id: String,
    geometry: TripGeometry,
    status: TripStatus,
    reconciler: LocationReconciler,
    tracker: CompletionTracker,
    cost_model: CostModel,
    cost: TripCostState,
    completed: CompletionSet,
    detailed: Option<DetailedPolyline>,
    /// Completions reported to the sink but not yet acked. Used only to
    /// suppress duplicate reports; local completion state is already final
    /// (fail-open).
    pending_reports: BTreeSet<u32>,
    degraded: bool,
    snapshot_tx: watch::Sender<RouteSnapshot>,
}

impl TripSession {
    pub fn new(
        descriptor: &TripDescriptor,
        threshold_m: f64,
        glitch_cap_km: f64,
    ) -> (Self, watch::Receiver<RouteSnapshot>) {
        let cost_model = CostModel::new(
            descriptor.base_price,
            descriptor.per_km_rate,
            descriptor.declared_cost,
        );
        let mut cost = TripCostState::default();
        cost_model.reset(&mut cost);

        let (snapshot_tx, snapshot_rx) =
            watch::channel(RouteSnapshot::initial(&descriptor.trip_id, descriptor.status));

        let session = Self {
            trip_id: descriptor.trip_id.clone(),
            geometry: descriptor.geometry.clone(),
            status: descriptor.status,
            reconciler: LocationReconciler::new(glitch_cap_km),
            tracker: CompletionTracker::with_threshold_m(threshold_m),
            cost_model,
            cost,
            completed: CompletionSet::new(),
            detailed: None,
            pending_reports: BTreeSet::new(),
            degraded: false,
            snapshot_tx,
        };
        (session, snapshot_rx)
    }

    pub fn trip_id(&self) -> &str {
        &self.trip_id
    }

    pub fn status(&self) -> TripStatus {
        self.status
    }

    /// Process one raw position sample. Reconcile, then (in progress only)
    /// evaluate completion, then accrue cost, then re-segment and publish.
    ///
    /// A dropped sample comes back as the [`TrackingError`] describing why;
    /// session state is untouched in that case.
    pub fn handle_sample(&mut self, sample: PositionSample) -> Result<TickResult, TrackingError> {
        let mut result = TickResult::default();
        if self.status.is_terminal() {
            return Ok(result);
        }

        match self.reconciler.accept(sample, &mut self.cost) {
            SampleOutcome::Accepted(accepted) => {
                if self.status.is_in_progress() {
                    result.newly_completed = self.tracker.evaluate(
                        accepted.point,
                        self.geometry.waypoints(),
                        &mut self.completed,
                    );
                    for &order in &result.newly_completed {
                        self.pending_reports.insert(order);
                        tracing::info!(trip_id = %self.trip_id, order, "stop completed");
                    }
                    self.cost_model.tick(&mut self.cost);
                }
                result.position_changed = true;
                self.publish();
            }
            SampleOutcome::Unchanged => {
                tracing::trace!(trip_id = %self.trip_id, "position unchanged, tick suppressed");
            }
            SampleOutcome::Rejected(reason) => {
                return Err(reason.into_error(&sample));
            }
        }
        Ok(result)
    }

    /// Apply a backend-driven status transition.
    pub fn set_status(&mut self, status: TripStatus) {
        if status == self.status {
            return;
        }
        let was_in_progress = self.status.is_in_progress();
        tracing::info!(trip_id = %self.trip_id, from = ?self.status, to = ?status, "trip status change");
        self.status = status;

        if status.is_in_progress() && !was_in_progress {
            // Pickup happened: the fare meter starts from zero.
            self.cost_model.reset(&mut self.cost);
        }
        self.publish();
    }

    /// Install a freshly fetched route, replacing the cache wholesale.
    pub fn install_polyline(&mut self, points: Vec<Point>) {
        tracing::debug!(trip_id = %self.trip_id, vertices = points.len(), "route refreshed");
        self.detailed = Some(DetailedPolyline::new(points));
        self.publish();
    }

    /// True once any oracle fetch has succeeded for this session.
    pub fn has_detailed_route(&self) -> bool {
        self.detailed.is_some()
    }

    /// The oracle request covering every segment currently needed: vehicle
    /// to pickup before the trip, vehicle through uncompleted stops to the
    /// destination during it. None while there is no accepted position.
    pub fn route_request(&self, vehicle_kind: Option<String>) -> Option<RouteRequest> {
        let position = self.reconciler.current()?.point;
        if self.status.is_terminal() {
            return None;
        }
        if !self.status.is_in_progress() {
            return Some(RouteRequest {
                origin: position,
                destination: self.geometry.start().point,
                stops: Vec::new(),
                vehicle_kind,
            });
        }
        let stops = self
            .geometry
            .stops()
            .filter(|stop| !self.completed.contains(stop.order))
            .map(|stop| stop.point)
            .collect();
        Some(RouteRequest {
            origin: position,
            destination: self.geometry.end().point,
            stops,
            vehicle_kind,
        })
    }

    /// Fold the backend's own cost figure into the local state.
    pub fn adopt_backend_cost(&mut self, backend_cost: f64) {
        if !self.status.is_in_progress() {
            return;
        }
        let before = self.cost.current_cost;
        self.cost_model.adopt_backend_cost(&mut self.cost, backend_cost);
        if self.cost.current_cost != before {
            tracing::debug!(
                trip_id = %self.trip_id,
                cost = self.cost.current_cost,
                "adopted backend cost"
            );
            self.publish();
        }
    }

    /// Resolution of a completion report. Fail-open: an error only clears
    /// the duplicate-suppression entry, the stop stays completed locally.
    pub fn report_resolved(&mut self, order: u32, result: Result<(), OracleError>) {
        self.pending_reports.remove(&order);
        if let Err(err) = result {
            let err = TrackingError::CompletionReportFailed {
                order,
                reason: err.to_string(),
            };
            tracing::warn!(
                trip_id = %self.trip_id,
                error = %err,
                "keeping local completion"
            );
        }
    }

    /// Flag the session degraded after the poll failure budget is spent.
    pub fn mark_degraded(&mut self) {
        if !self.degraded {
            self.degraded = true;
            self.publish();
        }
    }

    fn publish(&self) {
        let position = self.reconciler.current().map(|s| s.point);
        let split = match position {
            Some(position) => segment::segment(
                position,
                &self.geometry,
                self.detailed.as_ref(),
                &self.completed,
                self.status,
            ),
            None => segment::RouteSplit {
                approach: None,
                remaining: None,
                next_target: segment::next_target(&self.geometry, &self.completed, self.status),
            },
        };

        let snapshot = RouteSnapshot {
            trip_id: self.trip_id.clone(),
            status: self.status,
            approach: split.approach,
            remaining: split.remaining,
            next_target: split.next_target,
            driver_position: position,
            completed: self.completed.clone(),
            cost: self.cost,
            degraded: self.degraded,
        };
        // Send only fails with no receivers; the session outlives interest.
        let _ = self.snapshot_tx.send(snapshot);
    }
}
