//! Audit trail of security-relevant events.
//!
//! # Data Flow
//! ```text
//! pipeline / service
//!     → sink.rs (bounded queue, fire-and-forget)
//!     → background writer
//!     → store.rs (memory or JSON-lines file)
//!
//! admin API / service
//!     → sink.rs query (clamped paging)
//!     → query.rs (filter, newest first)
//! ```

pub mod event;
pub mod query;
pub mod sink;
pub mod store;

pub use event::{AuditAction, AuditCategory, RiskLevel, SecurityEvent, SecurityEventBuilder};
pub use query::{AuditFilter, PagedResult};
pub use sink::AuditSink;
pub use store::{AuditStore, AuditStoreError, FileAuditStore, MemoryAuditStore, DEFAULT_MEMORY_CAPACITY};
