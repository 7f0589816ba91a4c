pub mod config;
mod loops;
pub mod oracle;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod session;

pub use config::TrackerConfig;
pub use oracle::{
    Collaborators, CostOracle, OracleError, PositionSource, RouteRequest, RoutingOracle,
    WaypointCompletionSink,
};
pub use registry::{TrackError, TripTracker};
pub use runner::{spawn_session, SessionHandle};
pub use scheduler::{Directive, FetchState, RecomputationScheduler};
pub use session::{TripDescriptor, TripSession};
