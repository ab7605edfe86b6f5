//! Process-wide session table.
//!
//! # Responsibilities
//! - Create-or-reuse sessions by id
//! - Start the timer driver for each new session
//! - Drop sessions once they reach `Closed`
//! - Close every session at shutdown
//!
//! # Design Decisions
//! - `DashMap` for sharded concurrent access; the entry API makes create-or-reuse atomic
//! - A shard guard is never held while calling back into a session, except for
//!   the `is_closed` check inside `get_or_create`; sessions never touch the registry
//! - Removal compares `Arc` identity so a replaced session is never removed by
//!   its predecessor's driver

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::observability::metrics;
use crate::session::engine::{Session, SessionSettings};
use crate::session::error::SendError;
use crate::session::handler::SessionHandler;
use crate::session::id::SessionId;
use crate::session::state::CloseReason;
use crate::session::timer;

#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<SessionId, Arc<Session>>>,
    handler: Arc<dyn SessionHandler>,
}

impl SessionRegistry {
    pub fn new(handler: Arc<dyn SessionHandler>) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            handler,
        }
    }

    /// Return the live session for `id`, creating a `Connecting` one if there is
    /// none or the existing one is closed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn get_or_create(&self, id: &SessionId, settings: SessionSettings) -> Arc<Session> {
        let created = match self.sessions.entry(id.clone()) {
            Entry::Occupied(entry) if !entry.get().is_closed() => return Arc::clone(entry.get()),
            Entry::Occupied(mut entry) => {
                let session = self.build(id, settings);
                entry.insert(Arc::clone(&session));
                session
            }
            Entry::Vacant(entry) => {
                let session = self.build(id, settings);
                entry.insert(Arc::clone(&session));
                session
            }
        };

        tracing::debug!(session_id = %id, "Session created");
        metrics::record_active_sessions(self.sessions.len());
        tokio::spawn(timer::drive(Arc::clone(&created), self.clone()));
        created
    }

    fn build(&self, id: &SessionId, settings: SessionSettings) -> Arc<Session> {
        Arc::new(Session::new(id.clone(), settings, Arc::clone(&self.handler)))
    }

    /// The live session for `id`, if any.
    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        let session = self.sessions.get(id).map(|entry| Arc::clone(entry.value()))?;
        (!session.is_closed()).then_some(session)
    }

    /// Deliver a client batch to the session `id`.
    pub fn deliver(&self, id: &SessionId, raw: &[u8]) -> Result<usize, SendError> {
        let session = self.get(id).ok_or(SendError::SessionNotFound)?;
        Ok(session.handle_inbound_batch(raw)?)
    }

    /// Remove `session` if it is still the one registered under `id`.
    pub fn remove(&self, id: &SessionId, session: &Arc<Session>) -> bool {
        let removed = self
            .sessions
            .remove_if(id, |_, current| Arc::ptr_eq(current, session))
            .is_some();
        if removed {
            metrics::record_active_sessions(self.sessions.len());
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Close every session: a close frame where a listener is attached, then
    /// an abort for whatever is left.
    pub fn shutdown(&self) {
        let sessions: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        tracing::info!(sessions = sessions.len(), "Closing all sessions");
        for session in sessions {
            session.close(CloseReason::server_shutdown());
            session.abort(CloseReason::server_shutdown());
        }
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}
