//! Per-session timer driver.
//!
//! One task per session sleeps until the session's next deadline (heartbeat,
//! idle expiry or close grace) and wakes early whenever the session signals a
//! change. When the session reaches `Closed` the task removes it from the
//! registry and exits.

use std::sync::Arc;

use tokio::time::sleep_until;

use crate::session::engine::Session;
use crate::session::registry::SessionRegistry;

pub(crate) async fn drive(session: Arc<Session>, registry: SessionRegistry) {
    while let Some(deadline) = session.next_deadline() {
        tokio::select! {
            _ = sleep_until(deadline) => session.on_timer(),
            _ = session.changed() => {}
        }
    }

    if registry.remove(session.id(), &session) {
        tracing::debug!(session_id = %session.id(), "Session removed from registry");
    }
}
