//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!     second signal  → immediate exit
//!
//! Shutdown (shutdown.rs):
//!     trigger → HttpServer stops accepting
//!             → SessionRegistry::shutdown (close frame 1001, then abort)
//!             → in-flight exchanges end → process exits
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{shutdown_on_signal, wait_for_signal};
