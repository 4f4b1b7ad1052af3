// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Cooperative, poll-driven handles.
//!
//! Every unit of asynchronous work in the scraper (a network transfer, a
//! search, a media resolve) is represented by a handle that an external
//! driver polls until it reaches a terminal state. Nothing runs in the
//! background: a handle only makes progress inside [`AsyncHandle::poll`].

use std::fmt;
use std::time::Duration;

use crate::errors::ScrapeError;

/// Status of an asynchronous handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AsyncStatus {
    /// Still working, keep polling
    #[default]
    InProgress,
    /// Finished successfully
    Done,
    /// Failed (transport, validation, IO, configuration)
    Error,
    /// Failed because the remote identity could not be verified
    ErrorAuth,
}

impl AsyncStatus {
    /// Returns true once the handle will never change state again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, AsyncStatus::InProgress)
    }

    /// Returns true for any of the error variants.
    pub fn is_error(self) -> bool {
        matches!(self, AsyncStatus::Error | AsyncStatus::ErrorAuth)
    }
}

impl fmt::Display for AsyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AsyncStatus::InProgress => "in progress",
            AsyncStatus::Done => "done",
            AsyncStatus::Error => "error",
            AsyncStatus::ErrorAuth => "verification error",
        };
        f.write_str(label)
    }
}

/// Status plus error slot shared by every handle implementation.
///
/// Transitions are monotonic: once a terminal status has been recorded,
/// later calls to [`set_done`](Self::set_done) or
/// [`set_error`](Self::set_error) are ignored.
#[derive(Debug, Clone, Default)]
pub struct HandleState {
    status: AsyncStatus,
    error: Option<ScrapeError>,
}

impl HandleState {
    /// Create a state in [`AsyncStatus::InProgress`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a state that is already terminal with the given error.
    pub fn failed(error: ScrapeError) -> Self {
        let mut state = Self::new();
        state.set_error(error);
        state
    }

    pub fn status(&self) -> AsyncStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn error(&self) -> Option<&ScrapeError> {
        self.error.as_ref()
    }

    pub fn set_done(&mut self) {
        if !self.is_terminal() {
            self.status = AsyncStatus::Done;
        }
    }

    pub fn set_error(&mut self, error: ScrapeError) {
        if !self.is_terminal() {
            self.status = error.status();
            self.error = Some(error);
        }
    }
}

/// A unit of asynchronous work driven by repeated polling.
pub trait AsyncHandle {
    /// Advance the handle by one step and return the resulting status.
    ///
    /// Polling a terminal handle is a no-op.
    fn poll(&mut self) -> AsyncStatus;

    /// Borrow the handle's status/error state.
    fn state(&self) -> &HandleState;

    /// Current status, without advancing the handle.
    fn status(&self) -> AsyncStatus {
        self.state().status()
    }

    /// The error, once the status is one of the error variants.
    fn error(&self) -> Option<&ScrapeError> {
        self.state().error()
    }

    /// Human-readable error message, once the status is one of the error variants.
    fn error_message(&self) -> Option<String> {
        self.error().map(ToString::to_string)
    }
}

/// Poll `handle` once per `frame` until it is terminal.
///
/// `on_frame` runs after every non-terminal poll, which is where a driver
/// updates its progress display.
pub fn run_until_terminal<H, F>(handle: &mut H, frame: Duration, mut on_frame: F) -> AsyncStatus
where
    H: AsyncHandle + ?Sized,
    F: FnMut(&H),
{
    loop {
        let status = handle.poll();
        if status.is_terminal() {
            return status;
        }
        on_frame(handle);
        std::thread::sleep(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountdownHandle {
        remaining: u32,
        fail: bool,
        state: HandleState,
    }

    impl AsyncHandle for CountdownHandle {
        fn poll(&mut self) -> AsyncStatus {
            if self.state.is_terminal() {
                return self.state.status();
            }
            if self.remaining == 0 {
                if self.fail {
                    self.state.set_error(ScrapeError::Network("boom".to_string()));
                } else {
                    self.state.set_done();
                }
            } else {
                self.remaining -= 1;
            }
            self.state.status()
        }

        fn state(&self) -> &HandleState {
            &self.state
        }
    }

    #[test]
    fn test_state_starts_in_progress() {
        let state = HandleState::new();
        assert_eq!(state.status(), AsyncStatus::InProgress);
        assert!(state.error().is_none());
    }

    #[test]
    fn test_terminal_state_never_regresses() {
        let mut state = HandleState::new();
        state.set_done();
        state.set_error(ScrapeError::Io("late".to_string()));
        assert_eq!(state.status(), AsyncStatus::Done);
        assert!(state.error().is_none());

        let mut state = HandleState::new();
        state.set_error(ScrapeError::Validation("first".to_string()));
        state.set_error(ScrapeError::Io("second".to_string()));
        state.set_done();
        assert_eq!(state.status(), AsyncStatus::Error);
        assert_eq!(state.error(), Some(&ScrapeError::Validation("first".to_string())));
    }

    #[test]
    fn test_trust_error_maps_to_auth_status() {
        let state = HandleState::failed(ScrapeError::Trust("bad cert".to_string()));
        assert_eq!(state.status(), AsyncStatus::ErrorAuth);
        assert!(state.status().is_error());
    }

    #[test]
    fn test_run_until_terminal_counts_frames() {
        let mut handle = CountdownHandle { remaining: 3, fail: false, state: HandleState::new() };
        let mut frames = 0;
        let status = run_until_terminal(&mut handle, Duration::ZERO, |_| frames += 1);
        assert_eq!(status, AsyncStatus::Done);
        assert_eq!(frames, 3);
    }

    #[test]
    fn test_error_message_available_after_failure() {
        let mut handle = CountdownHandle { remaining: 0, fail: true, state: HandleState::new() };
        assert_eq!(handle.poll(), AsyncStatus::Error);
        assert_eq!(handle.error_message().as_deref(), Some("Network error: boom"));

        // Terminal handles ignore further polls.
        assert_eq!(handle.poll(), AsyncStatus::Error);
    }
}
