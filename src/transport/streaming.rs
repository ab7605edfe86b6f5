//! XHR streaming listener.
//!
//! Frames are appended to one long-lived response. Before the first frame a
//! 2049-byte preamble (2048 × `h` + newline) is written so that browsers which
//! buffer the start of a response hand data to the page straight away.
//!
//! Once `bytes_sent` reaches `max_bytes` the listener ends the exchange after the
//! current frame, which makes the client reconnect with a fresh response.

use axum::body::Bytes;

use crate::config::PreambleAccounting;
use crate::observability::metrics;
use crate::protocol::Frame;
use crate::transport::exchange::{ResponseSink, TransportError};
use crate::transport::{Delivery, ListenerId, TransportKind, TransportListener};

pub const PREAMBLE_LEN: usize = 2049;

static PREAMBLE: [u8; PREAMBLE_LEN] = {
    let mut block = [b'h'; PREAMBLE_LEN];
    block[PREAMBLE_LEN - 1] = b'\n';
    block
};

pub fn preamble() -> Bytes {
    Bytes::from_static(&PREAMBLE)
}

#[derive(Debug)]
pub struct StreamingListener {
    id: ListenerId,
    sink: ResponseSink,
    max_bytes: usize,
    accounting: PreambleAccounting,
    bytes_sent: usize,
    preamble_written: bool,
    closed: bool,
}

impl StreamingListener {
    pub fn new(sink: ResponseSink, max_bytes: usize, accounting: PreambleAccounting) -> Self {
        Self {
            id: ListenerId::new(),
            sink,
            max_bytes,
            accounting,
            bytes_sent: 0,
            preamble_written: false,
            closed: false,
        }
    }

    /// Bytes counted toward the recycling limit so far.
    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    fn write(&mut self, bytes: Bytes) -> Result<usize, TransportError> {
        match self.sink.write(bytes) {
            Ok(n) => Ok(n),
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }
}

impl TransportListener for StreamingListener {
    fn id(&self) -> ListenerId {
        self.id
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Streaming
    }

    fn send_frame(&mut self, frame: &Frame) -> Result<Delivery, TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionAlreadyClosed);
        }
        tracing::trace!(listener_id = %self.id, frame = frame.kind(), "XHR stream sending frame");

        if !self.preamble_written {
            let n = self.write(preamble())?;
            self.preamble_written = true;
            if self.accounting == PreambleAccounting::Included {
                self.bytes_sent += n;
            }
        }

        self.bytes_sent += self.write(frame.encode())?;

        if self.bytes_sent >= self.max_bytes {
            tracing::debug!(
                listener_id = %self.id,
                bytes_sent = self.bytes_sent,
                max_bytes = self.max_bytes,
                "XHR stream reached byte limit, recycling exchange"
            );
            metrics::record_streaming_recycled();
            self.close();
            return Ok(Delivery::Finished);
        }
        Ok(Delivery::Open)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        tracing::trace!(listener_id = %self.id, "XHR stream closing listener");
        if self.sink.end().is_err() {
            // Underlying connection might already be closed - that's fine
            tracing::trace!(listener_id = %self.id, "XHR stream exchange already closed");
        }
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::response_channel;

    /// A message frame whose encoding (including newline) is exactly 100 bytes.
    fn hundred_byte_frame() -> Frame {
        let frame = Frame::Message(vec!["x".repeat(94)]);
        assert_eq!(frame.encode().len(), 100);
        frame
    }

    fn frames_until_finished(listener: &mut StreamingListener) -> usize {
        let frame = hundred_byte_frame();
        let mut sent = 0;
        loop {
            sent += 1;
            if listener.send_frame(&frame).unwrap() == Delivery::Finished {
                return sent;
            }
            assert!(sent < 1000, "listener never finished");
        }
    }

    #[test]
    fn preamble_is_2048_fillers_and_newline() {
        let block = preamble();
        assert_eq!(block.len(), 2049);
        assert!(block[..2048].iter().all(|b| *b == b'h'));
        assert_eq!(block[2048], b'\n');
    }

    #[test]
    fn preamble_written_once_before_first_frame() {
        let (sink, mut body) = response_channel();
        let mut listener = StreamingListener::new(sink, 4096, PreambleAccounting::Excluded);
        listener.send_frame(&Frame::Open).unwrap();
        listener.send_frame(&Frame::Heartbeat).unwrap();

        let (chunks, ended) = body.drain_ready();
        assert!(!ended);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], preamble());
        assert_eq!(chunks[1], Bytes::from_static(b"o\n"));
        assert_eq!(chunks[2], Bytes::from_static(b"h\n"));
        assert_eq!(listener.bytes_sent(), 4);
    }

    #[test]
    fn excluded_preamble_ends_on_41st_frame() {
        let (sink, mut body) = response_channel();
        let mut listener = StreamingListener::new(sink, 4096, PreambleAccounting::Excluded);

        assert_eq!(frames_until_finished(&mut listener), 41);
        assert_eq!(listener.bytes_sent(), 4100);
        assert!(listener.is_closed());
        assert!(body.drain_ready().1);
    }

    #[test]
    fn included_preamble_ends_on_21st_frame() {
        let (sink, _body) = response_channel();
        let mut listener = StreamingListener::new(sink, 4096, PreambleAccounting::Included);

        assert_eq!(frames_until_finished(&mut listener), 21);
        assert_eq!(listener.bytes_sent(), 2049 + 2100);
    }

    #[test]
    fn close_twice_and_send_after_close() {
        let (sink, _body) = response_channel();
        let mut listener = StreamingListener::new(sink, 4096, PreambleAccounting::Excluded);
        listener.close();
        listener.close();
        assert_eq!(
            listener.send_frame(&Frame::Heartbeat),
            Err(TransportError::ConnectionAlreadyClosed)
        );
    }

    #[test]
    fn write_failure_closes_listener() {
        let (sink, body) = response_channel();
        let mut listener = StreamingListener::new(sink, 4096, PreambleAccounting::Excluded);
        drop(body);
        assert!(listener.send_frame(&Frame::Open).is_err());
        assert!(listener.is_closed());
    }
}
