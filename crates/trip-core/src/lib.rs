pub mod completion;
pub mod cost;
pub mod error;
pub mod geo;
pub mod models;
pub mod reconcile;
pub mod segment;

pub use completion::CompletionTracker;
pub use cost::CostModel;
pub use error::{GeoError, TrackingError};
pub use models::{
    CompletionSet, DetailedPolyline, Point, PositionSample, RouteSnapshot, SampleSource,
    TripCostState, TripGeometry, TripStatus, Waypoint, WaypointKind,
};
pub use reconcile::{LocationReconciler, RejectReason, SampleOutcome};
pub use segment::{next_target, segment, split_at_vertex, RouteSplit};
