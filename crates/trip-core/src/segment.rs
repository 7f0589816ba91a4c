//! Route segmentation: splits the planned route into the part the vehicle
//! is driving now (approach) and the part beyond its next target
//! (remaining).
//!
//! Works from the oracle's detailed polyline when one has been fetched and
//! falls back to the straight-line coarse waypoint sequence otherwise.
//! Callers must evaluate waypoint completion for the tick before calling
//! [`segment`], so that a vehicle sitting on its target has already advanced
//! past it.

use crate::geo;
use crate::models::{
    CompletionSet, DetailedPolyline, Point, TripGeometry, TripStatus, Waypoint, WaypointKind,
};

/// Output of one segmentation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSplit {
    pub approach: Option<Vec<Point>>,
    pub remaining: Option<Vec<Point>>,
    pub next_target: Option<Waypoint>,
}

impl RouteSplit {
    fn terminal() -> Self {
        Self {
            approach: None,
            remaining: None,
            next_target: None,
        }
    }
}

/// The waypoint the vehicle is currently heading for.
///
/// Before the trip is in progress that is the pickup; during the trip it is
/// the lowest-order uncompleted stop, then the destination. Terminal trips
/// have no target.
pub fn next_target(
    geometry: &TripGeometry,
    completed: &CompletionSet,
    status: TripStatus,
) -> Option<Waypoint> {
    if status.is_terminal() {
        return None;
    }
    if !status.is_in_progress() {
        return Some(*geometry.start());
    }
    geometry
        .stops()
        .find(|stop| !completed.contains(stop.order))
        .copied()
        .or(Some(*geometry.end()))
}

/// Split a polyline at vertex `k`: approach is `P[..=k]`, remaining is
/// `P[k..]`. The split vertex appears in both halves, so
/// `approach ++ remaining[1..]` reconstructs `P` exactly.
pub fn split_at_vertex(polyline: &[Point], k: usize) -> (Vec<Point>, Vec<Point>) {
    let k = k.min(polyline.len().saturating_sub(1));
    (polyline[..=k].to_vec(), polyline[k..].to_vec())
}

/// Compute the approach and remaining segments for the current tick.
pub fn segment(
    position: Point,
    geometry: &TripGeometry,
    detailed: Option<&DetailedPolyline>,
    completed: &CompletionSet,
    status: TripStatus,
) -> RouteSplit {
    if status.is_terminal() {
        return RouteSplit::terminal();
    }

    let target = match next_target(geometry, completed, status) {
        Some(target) => target,
        None => return RouteSplit::terminal(),
    };

    let detailed_points = detailed
        .map(|d| d.points.as_slice())
        .filter(|points| points.len() >= 2);

    if !status.is_in_progress() {
        // Pre-trip: only the approach to the pickup is meaningful.
        let approach = match detailed_points {
            Some(points) => trim_behind(position, points),
            None => vec![position, target.point],
        };
        return RouteSplit {
            approach: Some(approach),
            remaining: None,
            next_target: Some(target),
        };
    }

    match detailed_points {
        Some(points) => segment_detailed(position, points, &target),
        None => segment_coarse(position, geometry, completed, &target),
    }
}

fn segment_detailed(position: Point, points: &[Point], target: &Waypoint) -> RouteSplit {
    // Both lookups are on a polyline of two or more vertices, so they
    // cannot fail.
    let p_idx = split_index(position, points);
    let t_idx = geo::nearest_vertex_index(target.point, points).unwrap_or(0);

    if target.kind == WaypointKind::End {
        // Everything left is approach; nothing lies beyond the destination.
        let mut approach = points[p_idx..].to_vec();
        prepend_if_distinct(&mut approach, position);
        return RouteSplit {
            approach: Some(approach),
            remaining: None,
            next_target: Some(*target),
        };
    }

    if t_idx < p_idx {
        // The vehicle is past the split vertex but the stop has not closed
        // its geofence yet; degrade the approach to a direct connector.
        return RouteSplit {
            approach: Some(vec![position, target.point]),
            remaining: Some(points[t_idx..].to_vec()),
            next_target: Some(*target),
        };
    }

    let (mut approach, remaining) = split_at_vertex(&points[p_idx..], t_idx - p_idx);
    prepend_if_distinct(&mut approach, position);
    RouteSplit {
        approach: Some(approach),
        remaining: Some(remaining),
        next_target: Some(*target),
    }
}

fn segment_coarse(
    position: Point,
    geometry: &TripGeometry,
    completed: &CompletionSet,
    target: &Waypoint,
) -> RouteSplit {
    let approach = vec![position, target.point];

    if target.kind == WaypointKind::End {
        return RouteSplit {
            approach: Some(approach),
            remaining: None,
            next_target: Some(*target),
        };
    }

    // Target stop, then every later uncompleted stop, then the destination.
    let mut remaining = vec![target.point];
    for stop in geometry.stops() {
        if stop.order > target.order && !completed.contains(stop.order) {
            remaining.push(stop.point);
        }
    }
    remaining.push(geometry.end().point);

    RouteSplit {
        approach: Some(approach),
        remaining: Some(remaining),
        next_target: Some(*target),
    }
}

/// Drop the polyline vertices already behind the vehicle.
fn trim_behind(position: Point, points: &[Point]) -> Vec<Point> {
    let mut trimmed = points[split_index(position, points)..].to_vec();
    prepend_if_distinct(&mut trimmed, position);
    trimmed
}

/// Index of the first polyline vertex not yet behind the vehicle: the end
/// vertex of the segment nearest to it. A vehicle between two vertices is
/// past the earlier one even when that vertex is still the closer of the
/// two.
fn split_index(position: Point, points: &[Point]) -> usize {
    match geo::nearest_segment_index(position, points) {
        Ok(seg) => seg + 1,
        Err(_) => 0,
    }
}

fn prepend_if_distinct(points: &mut Vec<Point>, position: Point) {
    match points.first() {
        Some(first) if *first == position => {}
        _ => points.insert(0, position),
    }
}
