//! Background loops feeding a session's runner task.

pub(crate) mod cost_sync_loop;
pub(crate) mod poll_loop;

use trip_core::models::PositionSample;

/// Messages the background loops send into the runner.
#[derive(Debug)]
pub(crate) enum RunnerMsg {
    Sample(PositionSample),
    /// Poll source exceeded its consecutive-failure budget and stopped.
    PollDegraded { failures: u32 },
    BackendCost(f64),
}
