//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Build routes → Start admin + watcher → Listen
//!
//! Shutdown (shutdown.rs):
//!     Trigger → listeners stop accepting → in-flight requests drain → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then routes, then listeners
//! - One broadcast channel stops every listener

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{run, StartupError, StartupOptions};
