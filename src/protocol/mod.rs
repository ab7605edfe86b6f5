//! Wire protocol subsystem.
//!
//! # Data Flow
//! ```text
//! Session decides what to say
//!     → frame.rs (Frame → bytes: o, h, a[...], c[...])
//!     → transport listener writes the bytes onto an HTTP response
//!
//! Client posts a batch to xhr_send
//!     → frame.rs (bytes → ordered payloads)
//!     → session hands each payload to the upstream handler
//! ```
//!
//! # Design Decisions
//! - Pure functions, no state
//! - Payloads are opaque strings; only the envelope is interpreted
//! - Every encoded frame ends with a newline so streamed responses can be split

pub mod frame;

pub use frame::{decode_message_batch, DecodeError, Frame};
