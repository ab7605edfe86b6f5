//! Session lifecycle state.

use std::fmt;

use crate::protocol::Frame;

/// Lifecycle of a session.
///
/// ```text
/// Connecting ──attach──▶ Open ──close / idle──▶ Closing ──close frame / grace──▶ Closed
///      └───────────────────┴────────────abort────────┴──────────────────────────▶ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no listener has ever attached.
    Connecting,
    /// The open frame has been sent.
    Open,
    /// Close requested, close frame not yet delivered.
    Closing,
    /// Terminal.
    Closed,
}

impl SessionState {
    pub fn is_terminating(self) -> bool {
        matches!(self, SessionState::Closing | SessionState::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Code and reason carried by the close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Sent when a session expires or is closed without an explicit reason.
    pub fn go_away() -> Self {
        Self::new(3000, "Go away!")
    }

    pub fn server_shutdown() -> Self {
        Self::new(1001, "Server shutting down")
    }

    pub fn to_frame(&self) -> Frame {
        Frame::close(self.code, self.reason.clone())
    }
}

impl Default for CloseReason {
    fn default() -> Self {
        Self::go_away()
    }
}
