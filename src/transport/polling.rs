//! XHR polling listener.
//!
//! A polling exchange carries exactly one frame: the first `send_frame` writes
//! it and ends the response. The client then issues the next poll.

use crate::protocol::Frame;
use crate::transport::exchange::{ResponseSink, TransportError};
use crate::transport::{Delivery, ListenerId, TransportKind, TransportListener};

#[derive(Debug)]
pub struct PollingListener {
    id: ListenerId,
    sink: ResponseSink,
    closed: bool,
}

impl PollingListener {
    pub fn new(sink: ResponseSink) -> Self {
        Self {
            id: ListenerId::new(),
            sink,
            closed: false,
        }
    }
}

impl TransportListener for PollingListener {
    fn id(&self) -> ListenerId {
        self.id
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Polling
    }

    fn send_frame(&mut self, frame: &Frame) -> Result<Delivery, TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionAlreadyClosed);
        }
        tracing::trace!(listener_id = %self.id, frame = frame.kind(), "XHR poll sending frame");

        let written = self.sink.write(frame.encode());
        self.close();
        written.map(|_| Delivery::Finished)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        tracing::trace!(listener_id = %self.id, "XHR poll closing listener");
        if self.sink.end().is_err() {
            // Underlying connection might already be closed - that's fine
            tracing::trace!(listener_id = %self.id, "XHR poll exchange already closed");
        }
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
