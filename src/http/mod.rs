//! HTTP surface of the session engine.
//!
//! # Data Flow
//! ```text
//! POST {prefix}/{server}/{session}/xhr
//! POST {prefix}/{server}/{session}/xhr_streaming
//!     → handlers::open_transport: validate ids → registry.get_or_create
//!     → transport::open_exchange → wait for first chunk → 200 + streamed body
//!
//! POST {prefix}/{server}/{session}/xhr_send
//!     → body limit + timeout layers
//!     → handlers::xhr_send → registry.deliver → 204 / 404 / 500
//! ```

pub mod handlers;
pub mod server;

pub use server::{AppState, HttpServer};
