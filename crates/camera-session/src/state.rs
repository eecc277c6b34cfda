//! Capture session state machine
//!
//! The transition table is a pure function; the manager applies side effects
//! after a transition is accepted. Inputs that are not valid in the current
//! state yield `None` and are ignored.

use std::fmt;

/// Lifecycle of the camera pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No device, no worker
    #[default]
    Idle,
    /// Worker running, device opening or session being configured
    Opening,
    /// Repeating request submitted, frames flowing
    Previewing,
    /// Teardown in progress
    Closing,
}

/// Things that move the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Start,
    DeviceOpened,
    /// Open failure, device error or disconnect
    DeviceLost,
    Configured,
    ConfigureFailed,
    Stop,
    Closed,
}

impl SessionState {
    /// Next state for `input`, or `None` if the input does not apply
    pub fn next(self, input: Input) -> Option<SessionState> {
        use Input::*;
        use SessionState::*;

        match (self, input) {
            (Idle, Start) => Some(Opening),
            (Opening, DeviceOpened) => Some(Opening),
            (Opening, Configured) => Some(Previewing),
            // Terminal for the attempt; stays non-previewing until stopped
            (Opening, ConfigureFailed) => Some(Opening),
            (Opening | Previewing, DeviceLost) => Some(Idle),
            (Opening | Previewing, Stop) => Some(Closing),
            (Closing, Closed) => Some(Idle),
            _ => None,
        }
    }

    /// Whether a preview lifetime (and its worker) exists
    pub fn is_active(self) -> bool {
        self != SessionState::Idle
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Opening => "opening",
            SessionState::Previewing => "previewing",
            SessionState::Closing => "closing",
        };
        f.write_str(name)
    }
}
