//! Axum middleware functions.

pub mod security;

pub use security::security_middleware;
