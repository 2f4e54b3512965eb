//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers)
//!     → request.rs (client address, request metadata)
//!     → middleware/security.rs (security pipeline)
//!     → server.rs proxy handler (forward to upstream)
//!     → response.rs (hop-by-hop stripping, 502 mapping)
//!     → Send to client
//! ```

pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use server::HttpServer;
