//! Mail session lifecycle
//!
//! ```text
//!                 connect ok                      send
//! Disconnected ──────────────► Connecting ──► Authenticated ──► Sending
//!      ▲                           │               ▲               │
//!      │       connect failed      │               │   kept alive  ├──► Sent
//!      ├───────────────────────────┘               └───────────────┤
//!      │                    connection broken                      └──► SendFailed
//!      └───────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticated,
    Sending,
    Sent,
    SendFailed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Authenticated)
                | (Connecting, Disconnected)
                | (Authenticated, Sending)
                | (Authenticated, Disconnected)
                | (Sending, Sent)
                | (Sending, SendFailed)
                | (Sent, Authenticated)
                | (Sent, Disconnected)
                | (SendFailed, Authenticated)
                | (SendFailed, Disconnected)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticated => "authenticated",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::SendFailed => "send_failed",
        };
        f.write_str(name)
    }
}

/// State of the one mail session the dispatcher keeps across cycles.
#[derive(Debug, Clone)]
pub struct AlertSession {
    state: SessionState,
    /// Logged in without AUTH.
    degraded: bool,
    connects: u64,
    sends: u64,
}

impl AlertSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Disconnected,
            degraded: false,
            connects: 0,
            sends: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Number of transitions into `Connecting` since startup.
    pub fn connect_count(&self) -> u64 {
        self.connects
    }

    /// Number of transitions into `Sending` since startup.
    pub fn send_count(&self) -> u64 {
        self.sends
    }

    pub(crate) fn set_degraded(&mut self, degraded: bool) {
        self.degraded = degraded;
    }

    pub(crate) fn transition(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid session transition {} -> {}",
            self.state,
            next
        );
        trace!(from = %self.state, to = %next, "Alert session transition");

        match next {
            SessionState::Connecting => self.connects += 1,
            SessionState::Sending => self.sends += 1,
            SessionState::Disconnected => self.degraded = false,
            _ => {}
        }
        self.state = next;
    }
}

impl Default for AlertSession {
    fn default() -> Self {
        Self::new()
    }
}
