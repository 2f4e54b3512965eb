//! Request-level protection for a storefront HTTP API.
//!
//! Every request is checked against the IP block/allow lists, a
//! per-address rate limit and, for write methods, a body and query scan
//! for script and SQL injection. Outcomes land in an append-only audit
//! trail that operators query through the admin API.

pub mod admin;
pub mod audit;
pub mod clock;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod security;
pub mod service;

pub use config::schema::ShieldConfig;
pub use http::HttpServer;
pub use lifecycle::{Shield, Shutdown};
pub use pipeline::SecurityPipeline;
pub use service::{SecurityService, ShieldService};
