//! Geofence-based waypoint completion.
//!
//! Each STOP runs a one-way state machine, pending -> completed; nothing
//! ever moves a stop back. START and END are not tracked here: the pickup
//! is implicit in the trip going in-progress and arrival at the destination
//! is a backend-driven status change.

use crate::geo;
use crate::models::{CompletionSet, Point, Waypoint, WaypointKind};

/// Decides which stops a vehicle has arrived at.
#[derive(Debug, Clone, Copy)]
pub struct CompletionTracker {
    /// Geofence radius in meters; inclusive boundary.
    pub threshold_m: f64,
}

impl CompletionTracker {
    /// Tight threshold for driver-reported positions.
    pub fn driver() -> Self {
        Self { threshold_m: 30.0 }
    }

    /// Loose threshold for coarse observer contexts.
    pub fn observer() -> Self {
        Self { threshold_m: 80.0 }
    }

    pub fn with_threshold_m(threshold_m: f64) -> Self {
        Self { threshold_m }
    }

    /// Mark every not-yet-completed STOP within the geofence as completed.
    /// Returns the newly completed orders, in waypoint order. Evaluating
    /// twice at the same position returns nothing the second time.
    pub fn evaluate(
        &self,
        position: Point,
        waypoints: &[Waypoint],
        completed: &mut CompletionSet,
    ) -> Vec<u32> {
        let mut newly = Vec::new();
        for waypoint in waypoints {
            if waypoint.kind != WaypointKind::Stop || completed.contains(waypoint.order) {
                continue;
            }
            if geo::distance_m(position, waypoint.point) <= self.threshold_m
                && completed.insert(waypoint.order)
            {
                newly.push(waypoint.order);
            }
        }
        newly
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TripGeometry;

    fn geometry() -> TripGeometry {
        TripGeometry::new(
            Point::new(0.0, 0.0),
            &[Point::new(0.0, 0.001), Point::new(0.0, 0.002)],
            Point::new(0.0, 0.003),
        )
    }

    #[test]
    fn completes_stop_inside_geofence() {
        let geometry = geometry();
        let tracker = CompletionTracker::driver();
        let mut completed = CompletionSet::new();

        // ~1m from the first stop
        let newly = tracker.evaluate(
            Point::new(0.0, 0.00099),
            geometry.waypoints(),
            &mut completed,
        );
        assert_eq!(newly, vec![1]);
        assert!(completed.contains(1));
        assert!(!completed.contains(2));
    }

    #[test]
    fn start_and_end_are_never_tracked() {
        let geometry = geometry();
        let tracker = CompletionTracker::driver();
        let mut completed = CompletionSet::new();

        // Sitting on the pickup completes nothing.
        let newly = tracker.evaluate(Point::new(0.0, 1e-9), geometry.waypoints(), &mut completed);
        assert!(newly.is_empty());

        // Sitting on the destination completes nothing either; the nearest
        // stop is ~111m away.
        let newly = tracker.evaluate(Point::new(0.0, 0.003), geometry.waypoints(), &mut completed);
        assert!(newly.is_empty());
        assert!(!completed.contains(0));
        assert!(!completed.contains(3));
    }

    #[test]
    fn evaluation_is_idempotent_at_same_position() {
        let geometry = geometry();
        let tracker = CompletionTracker::driver();
        let mut completed = CompletionSet::new();
        let position = Point::new(0.0, 0.00099);

        let first = tracker.evaluate(position, geometry.waypoints(), &mut completed);
        let second = tracker.evaluate(position, geometry.waypoints(), &mut completed);
        assert_eq!(first, vec![1]);
        assert!(second.is_empty());
        assert_eq!(completed.len(), 1);
    }

    #[test]
    fn completion_set_never_shrinks() {
        let geometry = geometry();
        let tracker = CompletionTracker::driver();
        let mut completed = CompletionSet::new();

        tracker.evaluate(Point::new(0.0, 0.001), geometry.waypoints(), &mut completed);
        // Drive far away again; stop 1 stays completed.
        tracker.evaluate(Point::new(0.5, 0.5), geometry.waypoints(), &mut completed);
        assert!(completed.contains(1));
    }

    #[test]
    fn geofence_boundary_is_inclusive() {
        let stop = Point::new(0.0, 0.001);
        let geometry = TripGeometry::new(Point::new(0.01, 0.0), &[stop], Point::new(0.02, 0.0));
        let mut completed = CompletionSet::new();

        // Pick a position whose measured distance lands just at/inside the
        // threshold, then configure the tracker to that exact distance.
        let position = Point::new(0.0, 0.00127); // ~30m east of the stop
        let exact_m = geo::distance_m(position, stop);
        let tracker = CompletionTracker::with_threshold_m(exact_m);

        let newly = tracker.evaluate(position, geometry.waypoints(), &mut completed);
        assert_eq!(newly, vec![1], "boundary must complete (inclusive)");

        // One hair beyond the boundary must not complete.
        let mut completed = CompletionSet::new();
        let tracker = CompletionTracker::with_threshold_m(exact_m - 0.001);
        let newly = tracker.evaluate(position, geometry.waypoints(), &mut completed);
        assert!(newly.is_empty());
    }
}
