//! Registry of active tracking sessions, keyed by trip id.

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use trip_core::models::{PositionSample, RouteSnapshot, TripStatus};

use crate::config::TrackerConfig;
use crate::oracle::{Collaborators, CostOracle, PositionSource, RoutingOracle, WaypointCompletionSink};
use crate::runner::{spawn_session, SessionHandle};
use crate::session::TripDescriptor;

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("trip {0} is already being tracked")]
    AlreadyTracking(String),
}

/// Owns every live tracking session for a set of collaborators.
pub struct TripTracker<P, R, C, S> {
    config: TrackerConfig,
    collaborators: Collaborators<P, R, C, S>,
    sessions: DashMap<String, SessionHandle>,
}

impl<P, R, C, S> TripTracker<P, R, C, S>
where
    P: PositionSource,
    R: RoutingOracle,
    C: CostOracle,
    S: WaypointCompletionSink,
{
    pub fn new(config: TrackerConfig, collaborators: Collaborators<P, R, C, S>) -> Self {
        Self {
            config,
            collaborators,
            sessions: DashMap::new(),
        }
    }

    /// Start tracking a trip. `push_rx` is the push-transport sample stream
    /// (the transport reconnects on its own; a reconnect is just a fresh
    /// stream of samples).
    pub fn track(
        &self,
        descriptor: TripDescriptor,
        push_rx: mpsc::Receiver<PositionSample>,
    ) -> Result<watch::Receiver<RouteSnapshot>, TrackError> {
        let trip_id = descriptor.trip_id.clone();

        // Replace a finished session's leftover handle, but never a live one.
        if let Some(existing) = self.sessions.get(&trip_id) {
            if !existing.is_finished() {
                return Err(TrackError::AlreadyTracking(trip_id));
            }
        }

        let handle = spawn_session(
            self.config.clone(),
            descriptor,
            self.collaborators.clone(),
            push_rx,
        );
        let snapshot_rx = handle.snapshot_rx();
        self.sessions.insert(trip_id, handle);
        Ok(snapshot_rx)
    }

    /// Forward a backend status change. Returns false for unknown trips.
    pub async fn set_status(&self, trip_id: &str, status: TripStatus) -> bool {
        match self.sessions.get(trip_id) {
            Some(handle) => handle.set_status(status).await,
            None => false,
        }
    }

    /// Latest snapshot stream for a tracked trip.
    pub fn snapshot_rx(&self, trip_id: &str) -> Option<watch::Receiver<RouteSnapshot>> {
        self.sessions.get(trip_id).map(|h| h.snapshot_rx())
    }

    /// Stop and forget a session. Returns false for unknown trips.
    pub fn stop(&self, trip_id: &str) -> bool {
        match self.sessions.remove(trip_id) {
            Some((_, handle)) => {
                handle.stop();
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        for entry in self.sessions.iter() {
            entry.value().stop();
        }
        self.sessions.clear();
    }

    pub fn active_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| !entry.value().is_finished())
            .count()
    }
}

impl<P, R, C, S> Drop for TripTracker<P, R, C, S> {
    fn drop(&mut self) {
        for entry in self.sessions.iter() {
            entry.value().stop();
        }
    }
}
