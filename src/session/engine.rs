//! Session state machine.
//!
//! # Responsibilities
//! - Own the lifecycle state, outbound queue and the single attached listener
//! - Flush the queue through whichever listener is attached, in order
//! - Track heartbeat and idle deadlines for the timer driver
//! - Hand inbound batches to the upstream handler
//!
//! # Design Decisions
//! - All mutation happens under one `Mutex`; listener writes are channel sends,
//!   so nothing under the lock waits on the network
//! - Handler callbacks are collected as `Effects` and run after the lock is released
//! - Timers are not spawned here: `next_deadline`/`on_timer` are driven by
//!   `session::timer`, which is woken through `changed()` after every mutation

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::config::{BatchingPolicy, SockJsConfig};
use crate::observability::metrics;
use crate::protocol::{decode_message_batch, Frame};
use crate::session::error::SessionError;
use crate::session::handler::{SessionHandler, Socket};
use crate::session::id::SessionId;
use crate::session::queue::MessageQueue;
use crate::session::state::{CloseReason, SessionState};
use crate::transport::{Delivery, ListenerId, TransportListener};

/// Per-session tuning, captured when the session is created.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub session_timeout: Duration,
    pub heartbeat_period: Duration,
    pub batching: BatchingPolicy,
}

impl From<&SockJsConfig> for SessionSettings {
    fn from(config: &SockJsConfig) -> Self {
        Self {
            session_timeout: config.session_timeout(),
            heartbeat_period: config.heartbeat_period(),
            batching: config.batching,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&SockJsConfig::default())
    }
}

/// One logical channel multiplexed over successive HTTP exchanges.
pub struct Session {
    id: SessionId,
    settings: SessionSettings,
    handler: Arc<dyn SessionHandler>,
    inner: Mutex<Inner>,
    wakeup: Notify,
}

struct Inner {
    state: SessionState,
    queue: MessageQueue,
    listener: Option<Box<dyn TransportListener>>,
    heartbeat_deadline: Instant,
    last_activity: Instant,
    close_reason: Option<CloseReason>,
    closing_deadline: Option<Instant>,
    opened: bool,
}

/// Work to do once the lock is released.
#[derive(Default)]
struct Effects {
    opened: bool,
    closed: Option<Closed>,
}

struct Closed {
    reason: CloseReason,
    cause: &'static str,
    was_open: bool,
}

impl Inner {
    /// Write one frame through the attached listener.
    ///
    /// Returns `false` when there is no listener or the write failed; a failed
    /// listener is detached.
    fn send_frame(&mut self, frame: &Frame, settings: &SessionSettings) -> bool {
        let Some(listener) = self.listener.as_mut() else {
            return false;
        };
        match listener.send_frame(frame) {
            Ok(delivery) => {
                self.heartbeat_deadline = Instant::now() + settings.heartbeat_period;
                metrics::record_frame_sent(frame.kind());
                if delivery == Delivery::Finished {
                    self.detach();
                }
                true
            }
            Err(e) => {
                tracing::debug!(
                    listener_id = %listener.id(),
                    frame = frame.kind(),
                    error = %e,
                    "Frame not delivered, detaching listener"
                );
                self.detach();
                false
            }
        }
    }

    /// Flush the queue while a listener is attached. An undelivered batch goes
    /// back to the front of the queue.
    fn pump(&mut self, settings: &SessionSettings) {
        while self.listener.is_some() && !self.queue.is_empty() {
            let frame = Frame::Message(self.queue.take_batch(settings.batching));
            if !self.send_frame(&frame, settings) {
                if let Frame::Message(batch) = frame {
                    self.queue.restore(batch);
                }
                break;
            }
        }
    }

    fn detach(&mut self) -> Option<ListenerId> {
        let mut listener = self.listener.take()?;
        listener.close();
        self.last_activity = Instant::now();
        Some(listener.id())
    }

    fn finish_close(&mut self, effects: &mut Effects, cause: &'static str) {
        self.state = SessionState::Closed;
        self.closing_deadline = None;
        self.detach();
        let reason = self
            .close_reason
            .get_or_insert_with(CloseReason::go_away)
            .clone();
        effects.closed = Some(Closed {
            reason,
            cause,
            was_open: self.opened,
        });
    }
}

impl Session {
    pub fn new(id: SessionId, settings: SessionSettings, handler: Arc<dyn SessionHandler>) -> Self {
        let now = Instant::now();
        Self {
            id,
            inner: Mutex::new(Inner {
                state: SessionState::Connecting,
                queue: MessageQueue::new(),
                listener: None,
                heartbeat_deadline: now + settings.heartbeat_period,
                last_activity: now,
                close_reason: None,
                closing_deadline: None,
                opened: false,
            }),
            settings,
            handler,
            wakeup: Notify::new(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install `listener` as the session's delivery channel.
    ///
    /// Any previously attached listener is closed first, under the same lock, so
    /// two listeners are never attached at once. On a closing or closed session
    /// the listener receives the close frame and is ended instead.
    pub fn attach(self: &Arc<Self>, mut listener: Box<dyn TransportListener>) -> Result<(), SessionError> {
        let settings = &self.settings;
        let now = Instant::now();
        let mut effects = Effects::default();

        let result = {
            let mut inner = self.lock();

            if inner.state.is_terminating() {
                let reason = inner.close_reason.clone().unwrap_or_default();
                let delivered = listener.send_frame(&reason.to_frame()).is_ok();
                listener.close();
                if delivered {
                    metrics::record_frame_sent("close");
                    if inner.state == SessionState::Closing {
                        inner.finish_close(&mut effects, "closed");
                    }
                }
                Err(SessionError::Closed(reason))
            } else {
                if let Some(previous) = inner.detach() {
                    tracing::debug!(
                        session_id = %self.id,
                        listener_id = %previous,
                        "Previous listener force-detached"
                    );
                }

                let heartbeat_due = now >= inner.heartbeat_deadline;
                inner.heartbeat_deadline = now + settings.heartbeat_period;
                inner.last_activity = now;

                tracing::debug!(
                    session_id = %self.id,
                    listener_id = %listener.id(),
                    transport = listener.kind().as_str(),
                    "Listener attached"
                );
                inner.listener = Some(listener);

                let just_opened = inner.state == SessionState::Connecting;
                if just_opened {
                    inner.state = SessionState::Open;
                    inner.opened = true;
                    effects.opened = true;
                    inner.send_frame(&Frame::Open, settings);
                }

                if !inner.queue.is_empty() {
                    inner.pump(settings);
                } else if heartbeat_due && !just_opened {
                    inner.send_frame(&Frame::Heartbeat, settings);
                }
                Ok(())
            }
        };

        self.wakeup.notify_one();
        self.apply(effects);
        result
    }

    /// Queue `payload` for delivery, sending it right away if a listener is attached.
    pub fn enqueue(&self, payload: impl Into<String>) -> Result<(), SessionError> {
        let mut inner = self.lock();
        if inner.state == SessionState::Closed {
            return Err(SessionError::Closed(inner.close_reason.clone().unwrap_or_default()));
        }
        inner.queue.push(payload.into());
        if inner.state == SessionState::Open {
            inner.pump(&self.settings);
        }
        drop(inner);
        self.wakeup.notify_one();
        Ok(())
    }

    /// Decode a client batch and deliver each payload to the handler, in order.
    ///
    /// Delivery stops as soon as the session starts closing, so the handler never
    /// sees a message after `on_close`. Returns the number of payloads delivered.
    pub fn handle_inbound_batch(self: &Arc<Self>, raw: &[u8]) -> Result<usize, SessionError> {
        self.ensure_accepting()?;

        let payloads = decode_message_batch(raw)?;
        self.lock().last_activity = Instant::now();

        let socket = Socket::new(Arc::clone(self));
        let total = payloads.len();
        let mut delivered = 0;
        for payload in payloads {
            if self.ensure_accepting().is_err() {
                tracing::debug!(
                    session_id = %self.id,
                    dropped = total - delivered,
                    "Session closing, rest of batch dropped"
                );
                break;
            }
            self.handler.on_message(&socket, payload);
            delivered += 1;
        }
        Ok(delivered)
    }

    fn ensure_accepting(&self) -> Result<(), SessionError> {
        let inner = self.lock();
        if inner.state.is_terminating() {
            return Err(SessionError::Closed(inner.close_reason.clone().unwrap_or_default()));
        }
        Ok(())
    }

    /// Detach the current listener, ending its exchange. The session keeps its
    /// state and queue. Idempotent.
    pub fn reset_listener(&self) {
        let detached = self.lock().detach();
        if let Some(listener_id) = detached {
            tracing::debug!(session_id = %self.id, listener_id = %listener_id, "Listener reset");
            self.wakeup.notify_one();
        }
    }

    /// Detach `listener_id` if it is still the attached listener.
    ///
    /// Called when an exchange goes away; a newer listener is left alone.
    pub fn detach_listener(&self, listener_id: ListenerId) {
        let detached = {
            let mut inner = self.lock();
            match inner.listener.as_ref() {
                Some(listener) if listener.id() == listener_id => inner.detach(),
                _ => None,
            }
        };
        if detached.is_some() {
            tracing::debug!(session_id = %self.id, listener_id = %listener_id, "Exchange ended, listener detached");
            self.wakeup.notify_one();
        }
    }

    /// Start closing the session. The close frame goes out now if a listener is
    /// attached; otherwise it waits one session timeout for the client to collect it.
    pub fn close(self: &Arc<Self>, reason: CloseReason) {
        let settings = &self.settings;
        let mut effects = Effects::default();
        {
            let mut inner = self.lock();
            if inner.state.is_terminating() {
                return;
            }
            tracing::info!(
                session_id = %self.id,
                code = reason.code,
                reason = %reason.reason,
                "Closing session"
            );
            inner.state = SessionState::Closing;
            inner.close_reason = Some(reason.clone());

            if inner.send_frame(&reason.to_frame(), settings) {
                inner.finish_close(&mut effects, "closed");
            } else {
                inner.closing_deadline = Some(Instant::now() + settings.session_timeout);
            }
        }
        self.wakeup.notify_one();
        self.apply(effects);
    }

    /// Move straight to `Closed` without delivering anything.
    pub fn abort(self: &Arc<Self>, reason: CloseReason) {
        let mut effects = Effects::default();
        {
            let mut inner = self.lock();
            if inner.state == SessionState::Closed {
                return;
            }
            inner.close_reason.get_or_insert(reason);
            inner.finish_close(&mut effects, "aborted");
        }
        self.wakeup.notify_one();
        self.apply(effects);
    }

    /// Act on whichever deadline has passed: close grace, heartbeat or idle expiry.
    pub fn on_timer(self: &Arc<Self>) {
        let settings = &self.settings;
        let now = Instant::now();
        let mut effects = Effects::default();
        {
            let mut inner = self.lock();
            match inner.state {
                SessionState::Closed => {}
                SessionState::Closing => {
                    if inner.closing_deadline.is_some_and(|deadline| now >= deadline) {
                        inner.finish_close(&mut effects, "closed");
                    }
                }
                SessionState::Connecting | SessionState::Open => {
                    if inner.listener.is_some() {
                        if now >= inner.heartbeat_deadline {
                            tracing::trace!(session_id = %self.id, "Heartbeat");
                            inner.send_frame(&Frame::Heartbeat, settings);
                        }
                    } else if now >= inner.last_activity + settings.session_timeout {
                        tracing::debug!(session_id = %self.id, "Session idle, expiring");
                        inner.close_reason.get_or_insert_with(CloseReason::go_away);
                        inner.finish_close(&mut effects, "timeout");
                    }
                }
            }
        }
        self.apply(effects);
    }

    /// The next instant `on_timer` has work to do, or `None` once closed.
    pub fn next_deadline(&self) -> Option<Instant> {
        let inner = self.lock();
        match inner.state {
            SessionState::Closed => None,
            SessionState::Closing => Some(
                inner
                    .closing_deadline
                    .unwrap_or_else(|| Instant::now() + self.settings.session_timeout),
            ),
            SessionState::Connecting | SessionState::Open => Some(if inner.listener.is_some() {
                inner.heartbeat_deadline
            } else {
                inner.last_activity + self.settings.session_timeout
            }),
        }
    }

    /// Resolves after the next mutation that may have moved a deadline.
    pub async fn changed(&self) {
        self.wakeup.notified().await
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    pub fn has_listener(&self) -> bool {
        self.lock().listener.is_some()
    }

    pub fn attached_listener(&self) -> Option<ListenerId> {
        self.lock().listener.as_ref().map(|listener| listener.id())
    }

    pub fn queued_messages(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn pending_messages(&self) -> Vec<String> {
        self.lock().queue.pending()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.lock().close_reason.clone()
    }

    fn apply(self: &Arc<Self>, effects: Effects) {
        if effects.opened {
            tracing::info!(session_id = %self.id, "Session opened");
            metrics::record_session_opened();
            self.handler.on_open(Socket::new(Arc::clone(self)));
        }
        if let Some(closed) = effects.closed {
            tracing::info!(
                session_id = %self.id,
                code = closed.reason.code,
                reason = %closed.reason.reason,
                cause = closed.cause,
                "Session closed"
            );
            metrics::record_session_closed(closed.cause);
            if closed.was_open {
                self.handler
                    .on_close(&Socket::new(Arc::clone(self)), &closed.reason);
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PreambleAccounting;
    use crate::transport::{
        new_listener, open_exchange, response_channel, ExchangeBody, PollingListener,
        StreamingListener, TransportKind,
    };
    use axum::body::Bytes;

    /// Records every callback so tests can assert on what the handler saw.
    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl SessionHandler for Recorder {
        fn on_open(&self, socket: Socket) {
            self.events.lock().unwrap().push(format!("open {}", socket.id()));
        }

        fn on_message(&self, _socket: &Socket, payload: String) {
            self.events.lock().unwrap().push(format!("message {payload}"));
        }

        fn on_close(&self, _socket: &Socket, reason: &CloseReason) {
            self.events
                .lock()
                .unwrap()
                .push(format!("close {} {}", reason.code, reason.reason));
        }
    }

    fn settings(batching: BatchingPolicy) -> SessionSettings {
        SessionSettings {
            session_timeout: Duration::from_secs(5),
            heartbeat_period: Duration::from_secs(25),
            batching,
        }
    }

    fn session_with(settings: SessionSettings) -> (Arc<Session>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let session = Arc::new(Session::new(
            SessionId::parse("s1").unwrap(),
            settings,
            recorder.clone(),
        ));
        (session, recorder)
    }

    fn session() -> (Arc<Session>, Arc<Recorder>) {
        session_with(settings(BatchingPolicy::Coalesce))
    }

    fn sockjs_config() -> SockJsConfig {
        SockJsConfig {
            max_bytes_streaming: 1 << 20,
            ..SockJsConfig::default()
        }
    }

    /// One polling exchange: everything it carried, as text.
    fn poll(session: &Arc<Session>) -> String {
        let mut body = open_exchange(session, TransportKind::Polling, &sockjs_config());
        let (chunks, ended) = body.drain_ready();
        assert!(ended, "a polling exchange ends after one frame");
        text(&chunks)
    }

    fn stream(session: &Arc<Session>) -> ExchangeBody {
        open_exchange(session, TransportKind::Streaming, &sockjs_config())
    }

    fn text(chunks: &[Bytes]) -> String {
        chunks
            .iter()
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect()
    }

    /// Drained chunks without the streaming preamble.
    fn frames(body: &mut ExchangeBody) -> (String, bool) {
        let (chunks, ended) = body.drain_ready();
        let chunks: Vec<Bytes> = chunks
            .into_iter()
            .filter(|c| c.len() != crate::transport::PREAMBLE_LEN)
            .collect();
        (text(&chunks), ended)
    }

    #[test]
    fn first_attach_opens_and_sends_open_frame() {
        let (session, recorder) = session();
        assert_eq!(session.state(), SessionState::Connecting);

        assert_eq!(poll(&session), "o\n");
        assert_eq!(session.state(), SessionState::Open);
        assert!(!session.has_listener());
        assert_eq!(recorder.events(), vec!["open s1"]);
    }

    #[test]
    fn per_message_polling_delivers_one_message_per_exchange() {
        let (session, _) = session_with(settings(BatchingPolicy::PerMessage));
        session.enqueue("ping").unwrap();
        session.enqueue("pong").unwrap();

        assert_eq!(poll(&session), "o\n");
        assert_eq!(poll(&session), "a[\"ping\"]\n");
        assert_eq!(poll(&session), "a[\"pong\"]\n");
        assert_eq!(session.queued_messages(), 0);
    }

    #[test]
    fn coalesce_polling_delivers_backlog_in_one_frame() {
        let (session, _) = session();
        session.enqueue("ping").unwrap();
        session.enqueue("pong").unwrap();

        assert_eq!(poll(&session), "o\n");
        assert_eq!(poll(&session), "a[\"ping\",\"pong\"]\n");
        assert_eq!(session.queued_messages(), 0);
    }

    #[test]
    fn streaming_flushes_backlog_in_order_after_open() {
        let (session, _) = session_with(settings(BatchingPolicy::PerMessage));
        for payload in ["1", "2", "3"] {
            session.enqueue(payload).unwrap();
        }
        let mut body = stream(&session);
        let (out, ended) = frames(&mut body);
        assert!(!ended);
        assert_eq!(out, "o\na[\"1\"]\na[\"2\"]\na[\"3\"]\n");

        session.enqueue("4").unwrap();
        assert_eq!(frames(&mut body).0, "a[\"4\"]\n");
    }

    #[test]
    fn idle_polling_listener_receives_next_enqueue() {
        let (session, _) = session();
        poll(&session);

        let mut body = open_exchange(&session, TransportKind::Polling, &sockjs_config());
        assert_eq!(body.drain_ready(), (vec![], false));
        assert!(session.has_listener());

        session.enqueue("late").unwrap();
        let (chunks, ended) = body.drain_ready();
        assert!(ended);
        assert_eq!(text(&chunks), "a[\"late\"]\n");
    }

    #[test]
    fn new_attach_force_detaches_previous_listener() {
        let (session, _) = session();
        let mut first = stream(&session);
        let first_id = session.attached_listener().unwrap();

        let mut second = stream(&session);
        let second_id = session.attached_listener().unwrap();
        assert_ne!(first_id, second_id);

        assert!(frames(&mut first).1, "previous exchange must be ended");
        assert!(!frames(&mut second).1);
    }

    #[test]
    fn concurrent_attaches_leave_exactly_one_listener() {
        let (session, _) = session();
        poll(&session);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let session = Arc::clone(&session);
                std::thread::spawn(move || {
                    (0..25)
                        .map(|_| {
                            let (sink, body) = response_channel();
                            let listener = StreamingListener::new(
                                sink,
                                1 << 20,
                                PreambleAccounting::Excluded,
                            );
                            session.attach(Box::new(listener)).unwrap();
                            body
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut bodies: Vec<ExchangeBody> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        let live = bodies
            .iter_mut()
            .map(|body| !body.drain_ready().1)
            .filter(|open| *open)
            .count();
        assert_eq!(live, 1);
        assert!(session.has_listener());
    }

    #[test]
    fn dropped_exchange_detaches_only_its_own_listener() {
        let (session, _) = session();
        let first = stream(&session);
        let _second = stream(&session);
        let attached = session.attached_listener();

        drop(first);
        assert_eq!(session.attached_listener(), attached);
    }

    #[test]
    fn reset_listener_then_reattach_replays_gap_in_order() {
        let (session, _) = session();
        let mut body = stream(&session);
        frames(&mut body);

        session.reset_listener();
        session.reset_listener();
        assert!(frames(&mut body).1);
        assert_eq!(session.state(), SessionState::Open);

        session.enqueue("a").unwrap();
        session.enqueue("b").unwrap();
        assert_eq!(session.pending_messages(), vec!["a", "b"]);

        assert_eq!(poll(&session), "a[\"a\",\"b\"]\n");
    }

    #[test]
    fn undeliverable_batch_is_restored() {
        let (session, _) = session();
        poll(&session);

        let (sink, body) = response_channel();
        session.attach(Box::new(PollingListener::new(sink))).unwrap();
        drop(body);

        session.enqueue("kept").unwrap();
        assert!(!session.has_listener());
        assert_eq!(session.pending_messages(), vec!["kept"]);
        assert_eq!(poll(&session), "a[\"kept\"]\n");
    }

    #[test]
    fn inbound_batch_reaches_handler_in_order() {
        let (session, recorder) = session();
        poll(&session);

        assert_eq!(session.handle_inbound_batch(br#"["a","b"]"#), Ok(2));
        assert_eq!(recorder.events()[1..], ["message a", "message b"]);
    }

    #[test]
    fn inbound_batch_errors_leave_session_untouched() {
        let (session, recorder) = session();
        poll(&session);

        assert!(matches!(
            session.handle_inbound_batch(b""),
            Err(SessionError::Decode(crate::protocol::DecodeError::EmptyPayload))
        ));
        assert!(matches!(
            session.handle_inbound_batch(b"not-json"),
            Err(SessionError::Decode(crate::protocol::DecodeError::InvalidEncoding(_)))
        ));
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(recorder.events().len(), 1);
    }

    /// Closes its socket when it sees `"bye"`.
    #[derive(Default)]
    struct ClosesOnBye {
        events: Mutex<Vec<String>>,
    }

    impl SessionHandler for ClosesOnBye {
        fn on_message(&self, socket: &Socket, payload: String) {
            self.events.lock().unwrap().push(format!("message {payload}"));
            if payload == "bye" {
                socket.close(3000, "Go away!");
            }
        }

        fn on_close(&self, _socket: &Socket, reason: &CloseReason) {
            self.events.lock().unwrap().push(format!("close {}", reason.code));
        }
    }

    #[test]
    fn no_message_delivered_after_close_mid_batch() {
        let handler = Arc::new(ClosesOnBye::default());
        let session = Arc::new(Session::new(
            SessionId::parse("s1").unwrap(),
            settings(BatchingPolicy::Coalesce),
            handler.clone(),
        ));
        let mut body = stream(&session);
        frames(&mut body);

        assert_eq!(session.handle_inbound_batch(br#"["a","bye","c"]"#), Ok(2));
        assert!(session.is_closed());
        assert_eq!(
            *handler.events.lock().unwrap(),
            vec!["message a", "message bye", "close 3000"]
        );
    }

    #[test]
    fn close_with_listener_delivers_close_frame_and_finishes() {
        let (session, recorder) = session();
        let mut body = stream(&session);
        frames(&mut body);

        session.close(CloseReason::new(3000, "Go away!"));
        let (out, ended) = frames(&mut body);
        assert_eq!(out, "c[3000,\"Go away!\"]\n");
        assert!(ended);
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(recorder.events().last().unwrap(), "close 3000 Go away!");

        session.close(CloseReason::go_away());
        assert_eq!(
            recorder.events().iter().filter(|e| e.starts_with("close")).count(),
            1
        );
        assert!(session.enqueue("x").is_err());
    }

    #[test]
    fn close_without_listener_waits_for_next_poll() {
        let (session, _) = session();
        poll(&session);

        session.close(CloseReason::new(1000, "bye"));
        assert_eq!(session.state(), SessionState::Closing);
        assert!(session.handle_inbound_batch(br#"["x"]"#).is_err());

        let mut body = open_exchange(&session, TransportKind::Polling, &sockjs_config());
        let (chunks, ended) = body.drain_ready();
        assert!(ended);
        assert_eq!(text(&chunks), "c[1000,\"bye\"]\n");
        assert_eq!(session.state(), SessionState::Closed);

        // later polls still see the close frame
        assert_eq!(poll(&session), "c[1000,\"bye\"]\n");
    }

    #[tokio::test(start_paused = true)]
    async fn close_grace_expires_to_closed() {
        let (session, _) = session();
        poll(&session);
        session.close(CloseReason::go_away());

        let deadline = session.next_deadline().unwrap();
        tokio::time::sleep_until(deadline).await;
        session.on_timer();
        assert!(session.is_closed());
        assert_eq!(session.next_deadline(), None);
    }

    #[test]
    fn abort_ends_exchange_without_frames() {
        let (session, recorder) = session();
        let mut body = stream(&session);
        frames(&mut body);

        session.abort(CloseReason::server_shutdown());
        let (out, ended) = frames(&mut body);
        assert_eq!(out, "");
        assert!(ended);
        assert!(session.is_closed());
        assert_eq!(recorder.events().last().unwrap(), "close 1001 Server shutting down");
    }

    #[test]
    fn never_opened_session_closes_silently() {
        let (session, recorder) = session();
        session.abort(CloseReason::go_away());
        assert!(session.is_closed());
        assert!(recorder.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_fires_on_quiet_listener() {
        let (session, _) = session_with(SessionSettings {
            heartbeat_period: Duration::from_secs(1),
            ..settings(BatchingPolicy::Coalesce)
        });
        let mut body = stream(&session);
        frames(&mut body);

        session.on_timer();
        assert_eq!(frames(&mut body).0, "", "not due yet");

        tokio::time::advance(Duration::from_millis(1_001)).await;
        session.on_timer();
        assert_eq!(frames(&mut body).0, "h\n");
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_deadline_moves_with_each_frame() {
        let (session, _) = session_with(SessionSettings {
            heartbeat_period: Duration::from_secs(1),
            ..settings(BatchingPolicy::Coalesce)
        });
        let mut body = stream(&session);
        frames(&mut body);

        tokio::time::advance(Duration::from_millis(600)).await;
        session.enqueue("data").unwrap();
        tokio::time::advance(Duration::from_millis(600)).await;
        session.on_timer();
        assert_eq!(frames(&mut body).0, "a[\"data\"]\n");
    }

    #[tokio::test(start_paused = true)]
    async fn attach_sends_heartbeat_only_when_overdue() {
        let (session, _) = session_with(SessionSettings {
            heartbeat_period: Duration::from_secs(1),
            session_timeout: Duration::from_secs(60),
            ..settings(BatchingPolicy::Coalesce)
        });
        poll(&session);

        let mut body = open_exchange(&session, TransportKind::Polling, &sockjs_config());
        assert_eq!(body.drain_ready(), (vec![], false));
        drop(body);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(poll(&session), "h\n");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_session_expires_straight_to_closed() {
        let (session, recorder) = session();
        poll(&session);

        let deadline = session.next_deadline().unwrap();
        assert_eq!(deadline, Instant::now() + Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(5)).await;
        session.on_timer();
        assert!(session.is_closed());
        assert_eq!(session.close_reason(), Some(CloseReason::go_away()));
        assert_eq!(recorder.events().last().unwrap(), "close 3000 Go away!");
    }

    #[test]
    fn factory_listener_can_attach() {
        let (session, _) = session();
        let (sink, _body) = response_channel();
        let listener = new_listener(TransportKind::Polling, &sockjs_config(), sink);
        assert!(session.attach(listener).is_ok());
    }
}
