//! Debounced route-recomputation state machine.
//!
//! Pure transitions, no timers: the runner owns the actual sleep and the
//! in-flight oracle future and feeds events back in. This keeps the
//! request-budget rules testable without a runtime.
//!
//! States: Idle -> PendingDebounce -> InFlight -> Idle. A position change
//! while a fetch is in flight marks it superseded; exactly one follow-up
//! fetch is issued when the in-flight call resolves, never a concurrent
//! second call.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    PendingDebounce,
    InFlight { superseded: bool },
}

/// What the runner should do after feeding the scheduler an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Nothing,
    /// (Re)arm the debounce timer.
    ArmDebounce,
    /// Issue one oracle fetch now.
    StartFetch,
}

#[derive(Debug)]
pub struct RecomputationScheduler {
    state: FetchState,
    /// The very first fetch of a session skips the debounce so the map is
    /// live immediately on trip load.
    fetched_once: bool,
}

impl RecomputationScheduler {
    pub fn new() -> Self {
        Self {
            state: FetchState::Idle,
            fetched_once: false,
        }
    }

    pub fn state(&self) -> FetchState {
        self.state
    }

    /// The authoritative position moved.
    pub fn on_position_change(&mut self) -> Directive {
        match self.state {
            FetchState::Idle if !self.fetched_once => {
                self.state = FetchState::InFlight { superseded: false };
                self.fetched_once = true;
                Directive::StartFetch
            }
            FetchState::Idle | FetchState::PendingDebounce => {
                self.state = FetchState::PendingDebounce;
                Directive::ArmDebounce
            }
            FetchState::InFlight { .. } => {
                self.state = FetchState::InFlight { superseded: true };
                Directive::Nothing
            }
        }
    }

    /// The debounce timer fired.
    pub fn on_debounce_expired(&mut self) -> Directive {
        match self.state {
            FetchState::PendingDebounce => {
                self.state = FetchState::InFlight { superseded: false };
                self.fetched_once = true;
                Directive::StartFetch
            }
            // A stray timer after a state change is a no-op.
            FetchState::Idle | FetchState::InFlight { .. } => Directive::Nothing,
        }
    }

    /// The in-flight oracle call resolved (success or failure).
    pub fn on_fetch_resolved(&mut self) -> Directive {
        match self.state {
            FetchState::InFlight { superseded: true } => {
                self.state = FetchState::InFlight { superseded: false };
                Directive::StartFetch
            }
            FetchState::InFlight { superseded: false } => {
                self.state = FetchState::Idle;
                Directive::Nothing
            }
            FetchState::Idle | FetchState::PendingDebounce => Directive::Nothing,
        }
    }
}

impl Default for RecomputationScheduler {
    fn default() -> Self {
        Self::new()
    }
}
