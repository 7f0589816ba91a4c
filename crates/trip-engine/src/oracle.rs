//! Collaborator interfaces the engine depends on.
//!
//! The engine is generic over these traits; `trip-client` provides HTTP
//! implementations and tests provide in-memory fakes. Methods return
//! `impl Future + Send` so implementations can simply write `async fn`.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use trip_core::models::Point;

/// Failure of an external collaborator call. All variants are recoverable;
/// the engine retries on its next cycle.
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("backend returned status {status}")]
    Http { status: u16 },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("not found")]
    NotFound,
}

/// One route-estimation request: origin through ordered stops to the
/// destination.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub origin: Point,
    pub destination: Point,
    pub stops: Vec<Point>,
    pub vehicle_kind: Option<String>,
}

/// Polled source of the vehicle's position. `Ok(None)` means the vehicle is
/// currently unknown to the backend, which is not a transport failure.
pub trait PositionSource: Send + Sync + 'static {
    fn fetch_position(
        &self,
        vehicle_id: &str,
    ) -> impl Future<Output = Result<Option<Point>, OracleError>> + Send;
}

/// Remote routing computation. Expensive and rate-limited; callers debounce.
pub trait RoutingOracle: Send + Sync + 'static {
    fn estimate_route(
        &self,
        request: RouteRequest,
    ) -> impl Future<Output = Result<Vec<Point>, OracleError>> + Send;
}

/// Backend's own cost figure, polled out-of-band for reconciliation.
pub trait CostOracle: Send + Sync + 'static {
    fn declared_cost(
        &self,
        trip_id: &str,
    ) -> impl Future<Output = Result<f64, OracleError>> + Send;
}

/// Receives stop-completion reports. Failures never roll back local state.
pub trait WaypointCompletionSink: Send + Sync + 'static {
    fn report_completion(
        &self,
        trip_id: &str,
        order: u32,
    ) -> impl Future<Output = Result<(), OracleError>> + Send;
}

/// The full collaborator set a session runs against.
pub struct Collaborators<P, R, C, S> {
    pub positions: Arc<P>,
    pub routing: Arc<R>,
    pub costs: Arc<C>,
    pub completions: Arc<S>,
}

impl<P, R, C, S> Clone for Collaborators<P, R, C, S> {
    fn clone(&self) -> Self {
        Self {
            positions: Arc::clone(&self.positions),
            routing: Arc::clone(&self.routing),
            costs: Arc::clone(&self.costs),
            completions: Arc::clone(&self.completions),
        }
    }
}
