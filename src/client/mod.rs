//! XHR client for the polling, streaming and send transports.
//!
//! # Responsibilities
//! - Pick server and session ids for a new session
//! - Issue `xhr`, `xhr_streaming` and `xhr_send` requests
//! - Split response bodies into frames
//! - Back off between failed polls
//!
//! # Design Decisions
//! - One `reqwest::Client` per `XhrClient`; connection pooling is reqwest's
//! - The streaming preamble is recognised by shape and dropped

pub mod backoff;

use reqwest::StatusCode;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::protocol::{DecodeError, Frame};
use crate::transport::PREAMBLE_LEN;

pub use backoff::Backoff;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("session not found")]
    SessionNotFound,

    #[error("unexpected status {0}")]
    UnexpectedStatus(u16),

    #[error("bad frame: {0}")]
    Frame(#[from] DecodeError),

    #[error("gave up after {0} polls")]
    PollLimit(usize),
}

/// A client bound to one session.
#[derive(Debug, Clone)]
pub struct XhrClient {
    http: reqwest::Client,
    base: String,
    server_id: String,
    session_id: String,
}

impl XhrClient {
    /// Client for a fresh session under `base` (e.g. `http://127.0.0.1:8080/echo`).
    pub fn new(base: &str) -> Result<Self, ClientError> {
        let server_id = format!("{:03}", fastrand::u32(0..1000));
        let session_id = Uuid::new_v4().simple().to_string();
        Self::with_ids(base, server_id, session_id)
    }

    /// Client for an existing session.
    pub fn with_ids(
        base: &str,
        server_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Result<Self, ClientError> {
        // Fail early on a malformed base.
        Url::parse(base)?;
        Ok(Self {
            http: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
            server_id: server_id.into(),
            session_id: session_id.into(),
        })
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn endpoint(&self, transport: &str) -> Result<Url, ClientError> {
        let url = format!(
            "{}/{}/{}/{}",
            self.base, self.server_id, self.session_id, transport
        );
        Ok(Url::parse(&url)?)
    }

    /// One polling exchange. Usually a single frame; empty if the server ended
    /// the exchange without writing.
    pub async fn poll(&self) -> Result<Vec<Frame>, ClientError> {
        let response = self.http.post(self.endpoint("xhr")?).send().await?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(ClientError::SessionNotFound),
            other => return Err(ClientError::UnexpectedStatus(other.as_u16())),
        }
        let body = response.text().await?;
        parse_frames(&body)
    }

    /// Submit a batch of messages.
    pub async fn send(&self, messages: &[String]) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.endpoint("xhr_send")?)
            .json(messages)
            .send()
            .await?;
        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => Err(ClientError::SessionNotFound),
            other => {
                let body = response.text().await.unwrap_or_default();
                tracing::debug!(status = %other, body = %body, "Send rejected");
                Err(ClientError::UnexpectedStatus(other.as_u16()))
            }
        }
    }

    /// Open a streaming exchange and hand every frame to `on_frame` until it
    /// returns `false` or the server ends the response. Returns the number of
    /// frames seen.
    pub async fn stream<F>(&self, mut on_frame: F) -> Result<usize, ClientError>
    where
        F: FnMut(Frame) -> bool,
    {
        let mut response = self.http.post(self.endpoint("xhr_streaming")?).send().await?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(ClientError::SessionNotFound),
            other => return Err(ClientError::UnexpectedStatus(other.as_u16())),
        }

        let mut buffer: Vec<u8> = Vec::new();
        let mut seen = 0;
        while let Some(chunk) = response.chunk().await? {
            buffer.extend_from_slice(&chunk);
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                if is_preamble(&line) {
                    continue;
                }
                let text = String::from_utf8_lossy(&line);
                let frame = Frame::parse(&text)?;
                seen += 1;
                if !on_frame(frame) {
                    return Ok(seen);
                }
            }
        }
        Ok(seen)
    }

    /// Poll repeatedly until a frame satisfies `done`, backing off after failed
    /// polls. Returns every frame received, in order.
    pub async fn poll_until<F>(&self, mut done: F, max_polls: usize) -> Result<Vec<Frame>, ClientError>
    where
        F: FnMut(&Frame) -> bool,
    {
        let mut backoff = Backoff::default();
        let mut received = Vec::new();

        for _ in 0..max_polls {
            match self.poll().await {
                Ok(frames) => {
                    backoff.reset();
                    let finished = frames.iter().any(&mut done);
                    received.extend(frames);
                    if finished {
                        return Ok(received);
                    }
                }
                Err(ClientError::Http(e)) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(error = %e, delay_ms = delay.as_millis() as u64, "Poll failed, backing off");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(ClientError::PollLimit(max_polls))
    }
}

fn is_preamble(line: &[u8]) -> bool {
    line.len() == PREAMBLE_LEN && line[..PREAMBLE_LEN - 1].iter().all(|b| *b == b'h')
}

/// Split a response body into frames.
pub fn parse_frames(body: &str) -> Result<Vec<Frame>, ClientError> {
    body.lines()
        .filter(|line| !line.is_empty())
        .map(|line| Frame::parse(line).map_err(ClientError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::streaming::preamble;

    #[test]
    fn new_client_picks_ids() {
        let client = XhrClient::new("http://127.0.0.1:8080/echo/").unwrap();
        assert_eq!(client.server_id().len(), 3);
        assert_eq!(client.session_id().len(), 32);
        assert_eq!(
            client.endpoint("xhr").unwrap().path(),
            format!("/echo/{}/{}/xhr", client.server_id(), client.session_id())
        );
    }

    #[test]
    fn bad_base_is_rejected() {
        assert!(matches!(XhrClient::new("not a url"), Err(ClientError::Url(_))));
    }

    #[test]
    fn parses_multi_frame_bodies() {
        let frames = parse_frames("o\na[\"x\"]\nh\n").unwrap();
        assert_eq!(
            frames,
            vec![Frame::Open, Frame::Message(vec!["x".into()]), Frame::Heartbeat]
        );
        assert!(parse_frames("").unwrap().is_empty());
        assert!(parse_frames("zz\n").is_err());
    }

    #[test]
    fn preamble_is_recognised() {
        assert!(is_preamble(&preamble()));
        assert!(!is_preamble(b"h\n"));
    }
}
