//! Merges polled and pushed position updates into one authoritative stream.
//!
//! Both sources are equally trusted; the latest valid sample by observation
//! time wins regardless of which transport delivered it first. Identical
//! repeated positions are suppressed so downstream recomputation is not
//! triggered on dead air.

use crate::error::TrackingError;
use crate::geo;
use crate::models::{PositionSample, TripCostState};

/// Why a sample was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// `(0,0)` placeholder or coordinates outside WGS84 range.
    InvalidCoordinate,
    /// Observed earlier than the currently accepted sample.
    StaleSample,
}

impl RejectReason {
    /// The taxonomy error for the dropped sample.
    pub fn into_error(self, sample: &PositionSample) -> TrackingError {
        match self {
            RejectReason::InvalidCoordinate => TrackingError::InvalidCoordinate {
                lat: sample.point.lat,
                lon: sample.point.lon,
            },
            RejectReason::StaleSample => TrackingError::StaleSample {
                observed_at: sample.observed_at,
            },
        }
    }
}

/// Result of offering a sample to the reconciler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    /// The sample moved the authoritative position; downstream should tick.
    Accepted(PositionSample),
    /// Valid but did not change the position; no downstream work.
    Unchanged,
    Rejected(RejectReason),
}

/// Per-session position reconciler. Retains only the latest accepted sample.
#[derive(Debug)]
pub struct LocationReconciler {
    /// Largest single-tick distance credited to the fare; bigger jumps are
    /// treated as GPS glitches (position still accepted for display).
    glitch_cap_km: f64,
    accepted: Option<PositionSample>,
}

impl LocationReconciler {
    pub const DEFAULT_GLITCH_CAP_KM: f64 = 0.25;

    pub fn new(glitch_cap_km: f64) -> Self {
        Self {
            glitch_cap_km,
            accepted: None,
        }
    }

    /// Latest accepted sample, if any.
    pub fn current(&self) -> Option<&PositionSample> {
        self.accepted.as_ref()
    }

    /// Offer a raw sample. On acceptance the traveled distance in `cost` is
    /// advanced by the movement delta, unless the delta exceeds the glitch
    /// cap.
    pub fn accept(&mut self, sample: PositionSample, cost: &mut TripCostState) -> SampleOutcome {
        if !sample.point.is_valid() {
            return SampleOutcome::Rejected(RejectReason::InvalidCoordinate);
        }

        let Some(previous) = self.accepted else {
            self.accepted = Some(sample);
            return SampleOutcome::Accepted(sample);
        };

        if sample.observed_at < previous.observed_at {
            return SampleOutcome::Rejected(RejectReason::StaleSample);
        }

        if sample.point == previous.point {
            // Keep the newer timestamp so later stale checks stay correct.
            self.accepted = Some(sample);
            return SampleOutcome::Unchanged;
        }

        let delta_km = geo::distance_km(previous.point, sample.point);
        if delta_km <= self.glitch_cap_km {
            cost.traveled_km += delta_km;
        }
        self.accepted = Some(sample);
        SampleOutcome::Accepted(sample)
    }
}

impl Default for LocationReconciler {
    fn default() -> Self {
        Self::new(Self::DEFAULT_GLITCH_CAP_KM)
    }
}
