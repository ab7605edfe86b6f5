//! Frame encoding and decoding.
//!
//! Server → client frames:
//! - `o` open
//! - `h` heartbeat
//! - `a["m1","m2"]` message batch
//! - `c[3000,"Go away!"]` close
//!
//! Client → server batches are a bare JSON array of strings.

use axum::body::Bytes;
use thiserror::Error;

/// Errors produced while decoding client-submitted data or server frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The body was empty.
    #[error("payload expected")]
    EmptyPayload,

    /// The body was not a JSON array of strings (or not a known frame).
    #[error("broken JSON encoding: {0}")]
    InvalidEncoding(String),
}

/// A protocol frame sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Open,
    Heartbeat,
    Message(Vec<String>),
    Close { code: u16, reason: String },
}

impl Frame {
    /// Build a close frame.
    pub fn close(code: u16, reason: impl Into<String>) -> Self {
        Frame::Close {
            code,
            reason: reason.into(),
        }
    }

    /// Short name used in logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Open => "open",
            Frame::Heartbeat => "heartbeat",
            Frame::Message(_) => "message",
            Frame::Close { .. } => "close",
        }
    }

    /// Frame body without the trailing newline.
    pub fn body(&self) -> String {
        match self {
            Frame::Open => "o".to_string(),
            Frame::Heartbeat => "h".to_string(),
            Frame::Message(batch) => {
                // Serializing a slice of strings cannot fail.
                let json = serde_json::to_string(batch).unwrap_or_else(|_| "[]".to_string());
                format!("a{}", json)
            }
            Frame::Close { code, reason } => {
                let json = serde_json::to_string(&(code, reason))
                    .unwrap_or_else(|_| format!("[{},\"\"]", code));
                format!("c{}", json)
            }
        }
    }

    /// Encode the frame for an XHR response, newline-terminated.
    pub fn encode(&self) -> Bytes {
        let mut body = self.body();
        body.push('\n');
        Bytes::from(body)
    }

    /// Parse a single server frame (one line, newline already stripped).
    pub fn parse(line: &str) -> Result<Frame, DecodeError> {
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        let mut chars = line.chars();
        let Some(tag) = chars.next() else {
            return Err(DecodeError::EmptyPayload);
        };
        let rest = chars.as_str();

        match (tag, rest.is_empty()) {
            ('o', true) => Ok(Frame::Open),
            ('h', true) => Ok(Frame::Heartbeat),
            ('a', false) => {
                let batch: Vec<String> = serde_json::from_str(rest)
                    .map_err(|e| DecodeError::InvalidEncoding(e.to_string()))?;
                Ok(Frame::Message(batch))
            }
            ('c', false) => {
                let (code, reason): (u16, String) = serde_json::from_str(rest)
                    .map_err(|e| DecodeError::InvalidEncoding(e.to_string()))?;
                Ok(Frame::Close { code, reason })
            }
            _ => Err(DecodeError::InvalidEncoding(format!(
                "unknown frame {:?}",
                line.chars().take(16).collect::<String>()
            ))),
        }
    }
}

/// Decode a client-submitted batch into its payloads, in order.
pub fn decode_message_batch(raw: &[u8]) -> Result<Vec<String>, DecodeError> {
    if raw.is_empty() {
        return Err(DecodeError::EmptyPayload);
    }

    serde_json::from_slice::<Vec<String>>(raw).map_err(|e| DecodeError::InvalidEncoding(e.to_string()))
}
