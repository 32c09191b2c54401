//! Shared cancellation flag and run state.
//!
//! These are the only values shared between the supervising thread and
//! whoever observes it (CLI signal handling, a UI). Both are safe to read
//! and write from any thread.
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Cooperative cancellation flag. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// The underlying flag, for code that sets it outside of `cancel`, such
    /// as a signal handler.
    pub fn shared_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Cancelling,
    Completed,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Cancelling => "cancelling",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        }
    }

    fn can_move_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Idle, RunState::Running)
                | (RunState::Running, RunState::Cancelling)
                | (RunState::Running, RunState::Completed)
                | (RunState::Cancelling, RunState::Completed)
                | (RunState::Running, RunState::Failed)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutex-guarded run state that only allows the documented transitions.
#[derive(Debug, Clone)]
pub struct RunStateCell {
    state: Arc<Mutex<RunState>>,
}

impl Default for RunStateCell {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(RunState::Idle)),
        }
    }
}

impl RunStateCell {
    pub fn get(&self) -> RunState {
        match self.state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Move to `next` if the transition is legal; returns the state before.
    pub fn transition(&self, next: RunState) -> Result<RunState, RunState> {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        let current = *state;
        if current.can_move_to(next) {
            *state = next;
            tracing::debug!(from = %current, to = %next, "run state changed");
            Ok(current)
        } else {
            Err(current)
        }
    }
}

/// What an observer gets: read the state, request a stop.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    state: RunStateCell,
    cancel: CancelToken,
}

impl ControlHandle {
    pub(crate) fn new(state: RunStateCell, cancel: CancelToken) -> Self {
        Self { state, cancel }
    }

    pub fn state(&self) -> RunState {
        self.state.get()
    }

    /// Set the cancellation flag; a running batch moves to `Cancelling`.
    pub fn request_stop(&self) {
        self.cancel.cancel();
        let _ = self.state.transition(RunState::Cancelling);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_documented_transitions_are_allowed() {
        let cell = RunStateCell::default();
        assert_eq!(cell.transition(RunState::Completed), Err(RunState::Idle));
        assert_eq!(cell.transition(RunState::Running), Ok(RunState::Idle));
        assert_eq!(cell.transition(RunState::Cancelling), Ok(RunState::Running));
        assert_eq!(cell.transition(RunState::Failed), Err(RunState::Cancelling));
        assert_eq!(cell.transition(RunState::Completed), Ok(RunState::Cancelling));
        assert_eq!(cell.get(), RunState::Completed);
        assert!(cell.transition(RunState::Running).is_err());
    }

    #[test]
    fn stop_request_before_start_only_sets_the_flag() {
        let handle = ControlHandle::new(RunStateCell::default(), CancelToken::new());
        handle.request_stop();
        assert!(handle.is_stop_requested());
        assert_eq!(handle.state(), RunState::Idle);
    }

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let observer = token.clone();
        std::thread::spawn(move || observer.cancel())
            .join()
            .expect("join");
        assert!(token.is_cancelled());
    }
}
