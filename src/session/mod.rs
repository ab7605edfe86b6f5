//! Session subsystem.
//!
//! # Data Flow
//! ```text
//! xhr / xhr_streaming request
//!     → SessionRegistry::get_or_create(id)   (spawns timer::drive for new sessions)
//!     → Session::attach(listener)            (Open frame, queue flush, heartbeat)
//!
//! Application write (Socket::write)
//!     → Session::enqueue → listener, or queue while none is attached
//!
//! xhr_send request
//!     → SessionRegistry::deliver → Session::handle_inbound_batch → SessionHandler::on_message
//!
//! timer::drive
//!     → Session::on_timer (heartbeat, idle expiry, close grace)
//!     → SessionRegistry::remove once Closed
//! ```

pub mod engine;
pub mod error;
pub mod handler;
pub mod id;
pub mod queue;
pub mod registry;
pub mod state;
mod timer;

pub use engine::{Session, SessionSettings};
pub use error::{SendError, SessionError};
pub use handler::{EchoHandler, SessionHandler, Socket};
pub use id::{is_valid_segment, SessionId};
pub use queue::MessageQueue;
pub use registry::SessionRegistry;
pub use state::{CloseReason, SessionState};
