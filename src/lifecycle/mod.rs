//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validate config → clock → lists → limiter → inspector → audit → pipeline
//!
//! Running (maintenance.rs):
//!     periodic sweep of expired entries and idle counters
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → stop accepting → flush audit → save list snapshot
//! ```

pub mod maintenance;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{Shield, StartupError};
