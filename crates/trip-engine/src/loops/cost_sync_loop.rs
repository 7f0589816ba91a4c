//! Out-of-band poll of the backend's own cost figure.
//!
//! Failures here are recoverable; the locally accrued cost keeps displaying
//! and the next cycle retries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;

use crate::loops::RunnerMsg;
use crate::oracle::CostOracle;

pub(crate) async fn run_cost_sync_loop<C: CostOracle>(
    costs: Arc<C>,
    trip_id: String,
    sync_interval: Duration,
    tx: mpsc::Sender<RunnerMsg>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval(sync_interval);
    // The backend figure can't have moved at t=0; skip the immediate tick.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!(trip_id = %trip_id, "cost sync loop shutting down");
                return;
            }
            _ = ticker.tick() => {
                match costs.declared_cost(&trip_id).await {
                    Ok(cost) => {
                        if tx.send(RunnerMsg::BackendCost(cost)).await.is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        tracing::debug!(trip_id = %trip_id, error = %err, "cost sync failed, will retry");
                    }
                }
            }
        }
    }
}
