//! Fixed-interval position poll.
//!
//! Transport failures count toward a consecutive-failure budget; once the
//! budget is spent the loop reports degraded tracking and stops rather than
//! retrying forever. Push samples keep flowing independently.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;

use trip_core::models::{PositionSample, SampleSource};

use crate::loops::RunnerMsg;
use crate::oracle::PositionSource;

pub(crate) async fn run_poll_loop<P: PositionSource>(
    positions: Arc<P>,
    vehicle_id: String,
    poll_interval: Duration,
    max_failures: u32,
    tx: mpsc::Sender<RunnerMsg>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval(poll_interval);
    let mut consecutive_failures = 0u32;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!(vehicle_id = %vehicle_id, "poll loop shutting down");
                return;
            }
            _ = ticker.tick() => {
                match positions.fetch_position(&vehicle_id).await {
                    Ok(Some(point)) => {
                        consecutive_failures = 0;
                        let sample =
                            PositionSample::new(point, SampleSource::Poll, Utc::now());
                        if tx.send(RunnerMsg::Sample(sample)).await.is_err() {
                            return; // runner gone
                        }
                    }
                    Ok(None) => {
                        // Vehicle unknown to the backend right now; not a
                        // transport failure, keep polling.
                        tracing::debug!(vehicle_id = %vehicle_id, "no active position");
                    }
                    Err(err) => {
                        consecutive_failures += 1;
                        tracing::debug!(
                            vehicle_id = %vehicle_id,
                            consecutive_failures,
                            error = %err,
                            "position poll failed"
                        );
                        if consecutive_failures >= max_failures {
                            tracing::warn!(
                                vehicle_id = %vehicle_id,
                                failures = consecutive_failures,
                                "poll failure budget spent, tracking degraded"
                            );
                            let _ = tx
                                .send(RunnerMsg::PollDegraded {
                                    failures: consecutive_failures,
                                })
                                .await;
                            return;
                        }
                    }
                }
            }
        }
    }
}
