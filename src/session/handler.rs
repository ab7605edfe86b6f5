//! Upstream consumer of a session's inbound messages.

use std::sync::Arc;

use crate::session::engine::Session;
use crate::session::error::SessionError;
use crate::session::id::SessionId;
use crate::session::state::{CloseReason, SessionState};

/// Application callbacks for a session.
///
/// Callbacks run on the task that triggered them and never under the session
/// lock, so a handler may write to or close its socket from inside a callback.
pub trait SessionHandler: Send + Sync + 'static {
    /// The session sent its open frame. Fires once.
    fn on_open(&self, _socket: Socket) {}

    /// One payload from a client batch. Payloads of a batch arrive in order.
    fn on_message(&self, socket: &Socket, payload: String);

    /// The session reached `Closed`. Fires once, and only for opened sessions.
    fn on_close(&self, _socket: &Socket, _reason: &CloseReason) {}
}

/// Handle to a session given to handlers.
#[derive(Debug, Clone)]
pub struct Socket(Arc<Session>);

impl Socket {
    pub(crate) fn new(session: Arc<Session>) -> Self {
        Self(session)
    }

    pub fn id(&self) -> &SessionId {
        self.0.id()
    }

    /// Queue a message for the client.
    pub fn write(&self, payload: impl Into<String>) -> Result<(), SessionError> {
        self.0.enqueue(payload)
    }

    pub fn close(&self, code: u16, reason: impl Into<String>) {
        self.0.close(CloseReason::new(code, reason));
    }

    pub fn state(&self) -> SessionState {
        self.0.state()
    }
}

/// Writes every message back to the client that sent it.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoHandler;

impl SessionHandler for EchoHandler {
    fn on_message(&self, socket: &Socket, payload: String) {
        if let Err(e) = socket.write(payload) {
            tracing::debug!(session_id = %socket.id(), error = %e, "Echo dropped");
        }
    }
}
