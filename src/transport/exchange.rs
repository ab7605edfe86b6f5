//! Hand-off between a listener and the HTTP response body.
//!
//! The listener side (`ResponseSink`) only ever pushes into an unbounded
//! channel, so writing a frame never blocks while the session lock is held.
//! The exchange side (`ExchangeBody`) is the response body stream and owns a
//! non-owning guard back to the session.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use axum::body::Bytes;
use futures_util::Stream;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::session::Session;
use crate::transport::ListenerId;

/// Errors writing to an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The client went away or the exchange was already ended.
    #[error("connection already closed")]
    ConnectionAlreadyClosed,
}

/// Create a connected sink/body pair for one exchange.
pub fn response_channel() -> (ResponseSink, ExchangeBody) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ResponseSink { tx: Some(tx) },
        ExchangeBody {
            rx,
            pending: None,
            finished: false,
            guard: None,
        },
    )
}

/// Writing end of an exchange, held by a listener.
#[derive(Debug)]
pub struct ResponseSink {
    tx: Option<mpsc::UnboundedSender<Bytes>>,
}

impl ResponseSink {
    /// Queue bytes for the response. Returns the number of bytes written.
    pub fn write(&self, bytes: Bytes) -> Result<usize, TransportError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or(TransportError::ConnectionAlreadyClosed)?;
        let len = bytes.len();
        tx.send(bytes)
            .map_err(|_| TransportError::ConnectionAlreadyClosed)?;
        Ok(len)
    }

    /// End the response. Errors if it had already ended or the client left.
    pub fn end(&mut self) -> Result<(), TransportError> {
        match self.tx.take() {
            Some(tx) if !tx.is_closed() => Ok(()),
            _ => Err(TransportError::ConnectionAlreadyClosed),
        }
    }
}

/// Detaches the listener from its session when the exchange goes away.
#[derive(Debug)]
struct ExchangeGuard {
    session: Weak<Session>,
    listener: ListenerId,
}

impl Drop for ExchangeGuard {
    fn drop(&mut self) {
        if let Some(session) = self.session.upgrade() {
            session.detach_listener(self.listener);
        }
    }
}

/// Reading end of an exchange; used as the HTTP response body.
#[derive(Debug)]
pub struct ExchangeBody {
    rx: mpsc::UnboundedReceiver<Bytes>,
    pending: Option<Bytes>,
    finished: bool,
    guard: Option<ExchangeGuard>,
}

impl ExchangeBody {
    /// Tie this exchange's lifetime to `listener` on `session`.
    pub fn bind(&mut self, session: &Arc<Session>, listener: ListenerId) {
        self.guard = Some(ExchangeGuard {
            session: Arc::downgrade(session),
            listener,
        });
    }

    /// Wait until the first chunk is available. Returns `false` if the exchange
    /// ended without writing anything.
    pub async fn ready(&mut self) -> bool {
        if self.pending.is_none() && !self.finished {
            match self.rx.recv().await {
                Some(bytes) => self.pending = Some(bytes),
                None => self.finished = true,
            }
        }
        self.pending.is_some()
    }

    /// Take every chunk available right now without waiting.
    ///
    /// The flag is `true` once the writing side has ended.
    pub fn drain_ready(&mut self) -> (Vec<Bytes>, bool) {
        let mut chunks: Vec<Bytes> = self.pending.take().into_iter().collect();
        if self.finished {
            return (chunks, true);
        }
        loop {
            match self.rx.try_recv() {
                Ok(bytes) => chunks.push(bytes),
                Err(mpsc::error::TryRecvError::Empty) => return (chunks, false),
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.finished = true;
                    return (chunks, true);
                }
            }
        }
    }
}

impl Stream for ExchangeBody {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(bytes) = this.pending.take() {
            return Poll::Ready(Some(Ok(bytes)));
        }
        if this.finished {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(bytes)) => Poll::Ready(Some(Ok(bytes))),
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
