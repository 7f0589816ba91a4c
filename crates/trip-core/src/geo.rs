//! Great-circle math over trip polylines.

use crate::error::GeoError;
use crate::models::Point;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine great-circle distance between two points, in kilometers.
///
/// Pure and total for finite inputs.
pub fn distance_km(a: Point, b: Point) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let dphi = (b.lat - a.lat).to_radians();
    let dlambda = (b.lon - a.lon).to_radians();
    let h = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Distance in meters; convenience for geofence thresholds.
pub fn distance_m(a: Point, b: Point) -> f64 {
    distance_km(a, b) * 1000.0
}

/// Index of the polyline vertex closest to `point`. Ties break to the
/// lowest index.
pub fn nearest_vertex_index(point: Point, polyline: &[Point]) -> Result<usize, GeoError> {
    if polyline.is_empty() {
        return Err(GeoError::EmptyPolyline);
    }

    let mut best_idx = 0;
    let mut best_dist = f64::INFINITY;
    for (i, vertex) in polyline.iter().enumerate() {
        let d = distance_km(point, *vertex);
        if d < best_dist {
            best_dist = d;
            best_idx = i;
        }
    }
    Ok(best_idx)
}

/// Index of the polyline segment nearest to `point`, where segment `i`
/// joins vertices `i` and `i + 1`. Ties break to the lowest index.
///
/// More robust than [`nearest_vertex_index`] for a vehicle travelling
/// between vertices: the segment it is on wins even when the vertex behind
/// it is closer than the vertex ahead.
pub fn nearest_segment_index(point: Point, polyline: &[Point]) -> Result<usize, GeoError> {
    if polyline.len() < 2 {
        return Err(GeoError::NoSegments);
    }

    let mut best_idx = 0;
    let mut best_dist = f64::INFINITY;
    for (i, pair) in polyline.windows(2).enumerate() {
        let d = distance_to_segment_km(point, pair[0], pair[1]);
        if d < best_dist {
            best_dist = d;
            best_idx = i;
        }
    }
    Ok(best_idx)
}

/// Sum of consecutive-segment distances from `index` to the end of the
/// polyline, in kilometers. An out-of-range index contributes nothing.
pub fn cumulative_distance_from(index: usize, polyline: &[Point]) -> f64 {
    if index + 1 >= polyline.len() {
        return 0.0;
    }
    polyline[index..]
        .windows(2)
        .map(|pair| distance_km(pair[0], pair[1]))
        .sum()
}

/// Minimum distance from a point to the segment `a`-`b`, in kilometers.
///
/// Projects into a local equirectangular frame around the segment start;
/// adequate at the sub-kilometer scales tracking operates on.
pub fn distance_to_segment_km(point: Point, a: Point, b: Point) -> f64 {
    let cos_lat = a.lat.to_radians().cos();

    let px = (point.lon - a.lon) * cos_lat;
    let py = point.lat - a.lat;
    let sx = (b.lon - a.lon) * cos_lat;
    let sy = b.lat - a.lat;

    let seg_len_sq = sx * sx + sy * sy;
    if seg_len_sq < 1e-18 {
        // Segment is essentially a point
        return distance_km(point, a);
    }

    let t = ((px * sx + py * sy) / seg_len_sq).clamp(0.0, 1.0);
    let closest = Point::new(a.lat + t * sy, a.lon + t * sx / cos_lat.max(1e-9));
    distance_km(point, closest)
}
