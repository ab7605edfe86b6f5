//! Session identifiers.

use std::fmt;
use std::sync::Arc;

/// Identifier chosen by the client for one logical channel.
///
/// Appears as a single URL path segment, so it must be non-empty and must not
/// contain `.` or `/`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionId(Arc<str>);

impl SessionId {
    /// Validate a raw path segment.
    pub fn parse(raw: &str) -> Option<Self> {
        if is_valid_segment(raw) {
            Some(Self(Arc::from(raw)))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Server and session ids share the same segment rules.
pub fn is_valid_segment(raw: &str) -> bool {
    !raw.is_empty() && !raw.contains(&['.', '/'][..])
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
