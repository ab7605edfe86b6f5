//! Transport listener subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP exchange arrives (xhr / xhr_streaming)
//!     → open_exchange: response_channel() → (ResponseSink, ExchangeBody)
//!     → PollingListener / StreamingListener wraps the sink
//!     → Session::attach(listener)         (session owns the listener)
//!     → ExchangeBody becomes the HTTP response body (exchange owns the receiver)
//!
//! Session sends a frame
//!     → listener.send_frame → sink.write (non-blocking hand-off)
//!     → body stream yields the bytes to hyper
//!
//! Client disconnects
//!     → ExchangeBody dropped → guard → Session::detach_listener(id)
//! ```
//!
//! # Design Decisions
//! - One trait, two implementations; variant state stays local to each
//! - Listeners report `Delivery::Finished` instead of calling back into the
//!   session, so the session lock is never re-entered
//! - A listener is never reused across exchanges

pub mod exchange;
pub mod polling;
pub mod streaming;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::SockJsConfig;
use crate::observability::metrics;
use crate::protocol::Frame;
use crate::session::Session;

pub use exchange::{response_channel, ExchangeBody, ResponseSink, TransportError};
pub use polling::PollingListener;
pub use streaming::{StreamingListener, PREAMBLE_LEN};

/// Using relaxed ordering is sufficient since we only need uniqueness.
static LISTENER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a listener (one per HTTP exchange).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn new() -> Self {
        Self(LISTENER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lst-{}", self.0)
    }
}

/// Delivery mechanism of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// One frame per request/response cycle (`xhr`).
    Polling,
    /// Many frames on one long-lived response (`xhr_streaming`).
    Streaming,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Polling => "xhr",
            TransportKind::Streaming => "xhr_streaming",
        }
    }
}

/// What happened to the listener after a frame was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The listener can take more frames.
    Open,
    /// The listener ended its exchange after this frame and must be detached.
    Finished,
}

/// The live binding between one session and one in-flight HTTP exchange.
pub trait TransportListener: Send + fmt::Debug {
    fn id(&self) -> ListenerId;

    fn kind(&self) -> TransportKind;

    /// Write one frame. `Err` means the frame did not reach the exchange.
    fn send_frame(&mut self, frame: &Frame) -> Result<Delivery, TransportError>;

    /// End the exchange. Idempotent, never fails.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// Build the listener variant for `kind` around `sink`.
pub fn new_listener(
    kind: TransportKind,
    config: &SockJsConfig,
    sink: ResponseSink,
) -> Box<dyn TransportListener> {
    match kind {
        TransportKind::Polling => Box::new(PollingListener::new(sink)),
        TransportKind::Streaming => Box::new(StreamingListener::new(
            sink,
            config.max_bytes_streaming,
            config.preamble_accounting,
        )),
    }
}

/// Create an exchange for `kind`, attach its listener to `session` and return
/// the response body.
///
/// If the session refuses the attach because it is closing, the body carries the
/// close frame and then ends.
pub fn open_exchange(
    session: &Arc<Session>,
    kind: TransportKind,
    config: &SockJsConfig,
) -> ExchangeBody {
    let (sink, mut body) = response_channel();
    let listener = new_listener(kind, config, sink);
    let listener_id = listener.id();
    body.bind(session, listener_id);

    metrics::record_exchange(kind.as_str());

    if let Err(e) = session.attach(listener) {
        tracing::debug!(
            session_id = %session.id(),
            listener_id = %listener_id,
            transport = kind.as_str(),
            error = %e,
            "Attach refused"
        );
    }

    body
}
