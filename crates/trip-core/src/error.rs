//! Error taxonomy for the tracking engine.
//!
//! Every collaborator failure is converted into one of these at the engine
//! boundary; none of them propagate as panics. Most are recoverable and only
//! inform logging or a degraded-tracking flag.

use thiserror::Error;

/// Geometry-level defects. Should not occur with normalized trip geometry;
/// callers log and fall back to the coarse waypoint sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GeoError {
    #[error("polyline is empty")]
    EmptyPolyline,

    #[error("polyline has no segments")]
    NoSegments,

    #[error("waypoint sequence is not [start, stops.., end]")]
    MalformedWaypoints,
}

/// Top-level failure taxonomy for a tracking session.
#[derive(Debug, Error)]
pub enum TrackingError {
    /// Malformed or placeholder coordinate; the sample is dropped.
    #[error("invalid coordinate ({lat}, {lon})")]
    InvalidCoordinate { lat: f64, lon: f64 },

    /// Sample older than the currently accepted one; dropped silently.
    #[error("stale sample (observed {observed_at})")]
    StaleSample { observed_at: chrono::DateTime<chrono::Utc> },

    /// Defective geometry reached a geo routine.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(#[from] GeoError),

    /// Routing or cost oracle call failed; retried on the next cycle.
    #[error("oracle unavailable: {reason}")]
    OracleUnavailable { reason: String },

    /// Completion sink rejected a report; local state is already advanced
    /// (fail-open).
    #[error("completion report failed for stop {order}: {reason}")]
    CompletionReportFailed { order: u32, reason: String },

    /// Poll source exceeded its consecutive-failure budget.
    #[error("tracking degraded after {failures} consecutive poll failures")]
    DegradedTracking { failures: u32 },
}
