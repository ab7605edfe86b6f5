//! Transport route handlers.
//!
//! # Responsibilities
//! - Validate server and session path segments
//! - Bind a polling or streaming exchange to its session
//! - Decode `xhr_send` bodies and map the outcome to a status code
//!
//! # Design Decisions
//! - Response headers are committed only once the first chunk is ready, so a
//!   listener that never writes still yields a well-formed empty response
//! - Error bodies are the short plain-text messages clients of this protocol expect

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::http::server::AppState;
use crate::observability::metrics;
use crate::session::{is_valid_segment, SendError, SessionId, SessionSettings};
use crate::transport::{open_exchange, TransportKind};

pub const CONTENT_TYPE_JAVASCRIPT: &str = "application/javascript; charset=UTF-8";
pub const CONTENT_TYPE_PLAIN: &str = "text/plain; charset=UTF-8";

/// `(server, session)` path segments.
pub type SessionPath = Path<(String, String)>;

fn parse_ids(server: &str, session: &str) -> Option<SessionId> {
    if !is_valid_segment(server) {
        return None;
    }
    SessionId::parse(session)
}

pub async fn xhr_poll(State(state): State<AppState>, Path((server, session)): SessionPath) -> Response {
    open_transport(state, &server, &session, TransportKind::Polling).await
}

pub async fn xhr_streaming(
    State(state): State<AppState>,
    Path((server, session)): SessionPath,
) -> Response {
    open_transport(state, &server, &session, TransportKind::Streaming).await
}

async fn open_transport(state: AppState, server: &str, session: &str, kind: TransportKind) -> Response {
    let Some(id) = parse_ids(server, session) else {
        tracing::debug!(server, session, transport = kind.as_str(), "Rejected invalid session path");
        return StatusCode::NOT_FOUND.into_response();
    };

    let config = state.config.load_full();
    let session = state
        .registry
        .get_or_create(&id, SessionSettings::from(&config.sockjs));
    let mut body = open_exchange(&session, kind, &config.sockjs);

    if !body.ready().await {
        tracing::debug!(session_id = %id, transport = kind.as_str(), "Exchange ended before any frame");
    }

    (
        [(header::CONTENT_TYPE, CONTENT_TYPE_JAVASCRIPT)],
        Body::from_stream(body),
    )
        .into_response()
}

pub async fn xhr_send(
    State(state): State<AppState>,
    Path((server, session)): SessionPath,
    body: Bytes,
) -> Result<Response, SendError> {
    let Some(id) = parse_ids(&server, &session) else {
        metrics::record_send(SendError::SessionNotFound.outcome());
        return Err(SendError::SessionNotFound);
    };

    match state.registry.deliver(&id, &body) {
        Ok(count) => {
            tracing::debug!(session_id = %id, messages = count, "Batch accepted");
            metrics::record_send("accepted");
            Ok((
                StatusCode::NO_CONTENT,
                [(header::CONTENT_TYPE, CONTENT_TYPE_PLAIN)],
            )
                .into_response())
        }
        Err(e) => {
            tracing::debug!(session_id = %id, error = %e, "Batch rejected");
            metrics::record_send(e.outcome());
            Err(e)
        }
    }
}

impl IntoResponse for SendError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            SendError::SessionNotFound => (StatusCode::NOT_FOUND, ""),
            SendError::EmptyPayload => (StatusCode::INTERNAL_SERVER_ERROR, "Payload expected."),
            SendError::InvalidEncoding => (StatusCode::INTERNAL_SERVER_ERROR, "Broken JSON encoding."),
        };
        (status, [(header::CONTENT_TYPE, CONTENT_TYPE_PLAIN)], message).into_response()
    }
}
