//! Core data models for trip tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{GeoError, TrackingError};

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

impl Point {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// `(0,0)` is a placeholder for "no fix yet", never a real position.
    pub fn is_missing(&self) -> bool {
        self.lat == 0.0 && self.lon == 0.0
    }

    /// Coordinates within WGS84 range and not the placeholder.
    pub fn is_valid(&self) -> bool {
        !self.is_missing()
            && self.lat.is_finite()
            && self.lon.is_finite()
            && self.lat.abs() <= 90.0
            && self.lon.abs() <= 180.0
    }
}

/// Role of a waypoint within a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaypointKind {
    /// Pickup point
    Start,
    /// Intermediate stop
    Stop,
    /// Final destination
    End,
}

/// A point in the trip's planned geometry. `order` is stable for the
/// lifetime of the trip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub point: Point,
    pub order: u32,
    pub kind: WaypointKind,
}

/// Normalized planned geometry: `[Start, Stop*, End]`, ordered.
///
/// Built once when a trip is loaded; replaced wholesale if the routing
/// oracle reports a materially different route, never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "GeometryWire")]
pub struct TripGeometry {
    waypoints: Vec<Waypoint>,
}

/// Unvalidated wire shape of [`TripGeometry`]; conversion enforces the
/// `[Start, Stop*, End]` invariant that [`TripGeometry::new`] establishes.
#[derive(Debug, Deserialize)]
struct GeometryWire {
    waypoints: Vec<Waypoint>,
}

impl TryFrom<GeometryWire> for TripGeometry {
    type Error = TrackingError;

    fn try_from(wire: GeometryWire) -> Result<Self, Self::Error> {
        let waypoints = wire.waypoints;
        let well_formed = waypoints
            .first()
            .is_some_and(|w| w.kind == WaypointKind::Start)
            && waypoints.last().is_some_and(|w| w.kind == WaypointKind::End)
            && waypoints.len() >= 2
            && waypoints[1..waypoints.len() - 1]
                .iter()
                .all(|w| w.kind == WaypointKind::Stop)
            && waypoints.iter().enumerate().all(|(i, w)| w.order == i as u32);
        if !well_formed {
            return Err(GeoError::MalformedWaypoints.into());
        }
        Ok(Self { waypoints })
    }
}

impl TripGeometry {
    /// Normalize a pickup, intermediate stops and a destination into the
    /// canonical ordered sequence. Stops keep their given order; `order`
    /// indices are assigned contiguously starting at 0 for the pickup.
    pub fn new(start: Point, stops: &[Point], end: Point) -> Self {
        let mut waypoints = Vec::with_capacity(stops.len() + 2);
        waypoints.push(Waypoint {
            point: start,
            order: 0,
            kind: WaypointKind::Start,
        });
        for (i, stop) in stops.iter().enumerate() {
            waypoints.push(Waypoint {
                point: *stop,
                order: (i + 1) as u32,
                kind: WaypointKind::Stop,
            });
        }
        waypoints.push(Waypoint {
            point: end,
            order: (stops.len() + 1) as u32,
            kind: WaypointKind::End,
        });
        Self { waypoints }
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn start(&self) -> &Waypoint {
        // Constructor guarantees a leading Start
        &self.waypoints[0]
    }

    pub fn end(&self) -> &Waypoint {
        &self.waypoints[self.waypoints.len() - 1]
    }

    pub fn stops(&self) -> impl Iterator<Item = &Waypoint> {
        self.waypoints
            .iter()
            .filter(|w| w.kind == WaypointKind::Stop)
    }

    /// The straight-line fallback polyline implied by the waypoint sequence.
    pub fn coarse_polyline(&self) -> Vec<Point> {
        self.waypoints.iter().map(|w| w.point).collect()
    }
}

/// Road-following polyline returned by the routing oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedPolyline {
    pub points: Vec<Point>,
    pub fetched_at: DateTime<Utc>,
}

impl DetailedPolyline {
    pub fn new(points: Vec<Point>) -> Self {
        Self {
            points,
            fetched_at: Utc::now(),
        }
    }
}

/// Set of STOP orders marked completed. Grows monotonically within a
/// tracking session; there is deliberately no removal API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionSet {
    orders: BTreeSet<u32>,
}

impl CompletionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a stop completed. Returns true if it was newly inserted.
    pub fn insert(&mut self, order: u32) -> bool {
        self.orders.insert(order)
    }

    pub fn contains(&self, order: u32) -> bool {
        self.orders.contains(&order)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.orders.iter().copied()
    }
}

/// Where a position sample came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleSource {
    Poll,
    Push,
}

/// A raw position report from either source. Transient; only the latest
/// accepted sample is retained per session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub point: Point,
    pub source: SampleSource,
    pub observed_at: DateTime<Utc>,
}

impl PositionSample {
    pub fn new(point: Point, source: SampleSource, observed_at: DateTime<Utc>) -> Self {
        Self {
            point,
            source,
            observed_at,
        }
    }
}

/// Live distance and cost accumulators for one trip session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TripCostState {
    pub traveled_km: f64,
    pub current_cost: f64,
}

/// Trip lifecycle status, as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Pending,
    Accepted,
    Scheduled,
    InProgress,
    Finished,
    Cancelled,
}

impl TripStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TripStatus::Finished | TripStatus::Cancelled)
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, TripStatus::InProgress)
    }
}

/// Everything a map/render consumer needs for one frame of a tracked trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSnapshot {
    pub trip_id: String,
    pub status: TripStatus,
    /// Route from the vehicle to its next target, if any.
    pub approach: Option<Vec<Point>>,
    /// Route from the next target onward to the destination, if any.
    pub remaining: Option<Vec<Point>>,
    pub next_target: Option<Waypoint>,
    pub driver_position: Option<Point>,
    pub completed: CompletionSet,
    pub cost: TripCostState,
    /// Set when the poll source has exceeded its failure budget.
    pub degraded: bool,
}

impl RouteSnapshot {
    /// Empty snapshot published before the first accepted sample.
    pub fn initial(trip_id: impl Into<String>, status: TripStatus) -> Self {
        Self {
            trip_id: trip_id.into(),
            status,
            approach: None,
            remaining: None,
            next_target: None,
            driver_position: None,
            completed: CompletionSet::new(),
            cost: TripCostState::default(),
            degraded: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_is_missing_not_valid() {
        let p = Point::new(0.0, 0.0);
        assert!(p.is_missing());
        assert!(!p.is_valid());
    }

    #[test]
    fn out_of_range_coordinates_invalid() {
        assert!(!Point::new(91.0, 0.5).is_valid());
        assert!(!Point::new(45.0, 181.0).is_valid());
        assert!(Point::new(-33.9, 18.4).is_valid());
    }

    #[test]
    fn geometry_orders_are_contiguous() {
        let geometry = TripGeometry::new(
            Point::new(1.0, 1.0),
            &[Point::new(2.0, 2.0), Point::new(3.0, 3.0)],
            Point::new(4.0, 4.0),
        );
        let orders: Vec<u32> = geometry.waypoints().iter().map(|w| w.order).collect();
        assert_eq!(orders, vec![0, 1, 2, 3]);
        assert_eq!(geometry.start().kind, WaypointKind::Start);
        assert_eq!(geometry.end().kind, WaypointKind::End);
        assert_eq!(geometry.stops().count(), 2);
    }

    #[test]
    fn geometry_deserialization_rejects_malformed_waypoints() {
        let err = TripGeometry::try_from(GeometryWire { waypoints: Vec::new() }).unwrap_err();
        assert!(matches!(err, TrackingError::InvalidGeometry(_)));

        // End before Start
        let mut reversed = TripGeometry::new(Point::new(1.0, 1.0), &[], Point::new(2.0, 2.0))
            .waypoints()
            .to_vec();
        reversed.reverse();
        assert!(TripGeometry::try_from(GeometryWire { waypoints: reversed }).is_err());

        let good = TripGeometry::new(Point::new(1.0, 1.0), &[Point::new(1.5, 1.5)], Point::new(2.0, 2.0))
            .waypoints()
            .to_vec();
        let geometry = TripGeometry::try_from(GeometryWire { waypoints: good }).unwrap();
        assert_eq!(geometry.stops().count(), 1);
    }

    #[test]
    fn completion_set_insert_is_idempotent() {
        let mut set = CompletionSet::new();
        assert!(set.insert(1));
        assert!(!set.insert(1));
        assert_eq!(set.len(), 1);
    }
}
