//! SockJS-style XHR transports: a persistent, ordered message channel emulated
//! over independent HTTP polling and streaming exchanges.

// Core engine
pub mod protocol;
pub mod session;
pub mod transport;

// Surfaces
pub mod client;
pub mod http;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::schema::AppConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use session::{EchoHandler, SessionHandler, Socket};
