//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → ip_reputation.rs (block / allow lists)
//!     → rate_limit.rs (per-address, per-endpoint windows)
//!     → inspection.rs (XSS / SQL injection patterns on mutating requests)
//!     → downstream handler
//!     → headers.rs (hardening headers on every response)
//! ```
//!
//! Each component owns its state behind a narrow API; the pipeline composes
//! them.

pub mod headers;
pub mod inspection;
pub mod ip_reputation;
pub mod rate_limit;

pub use inspection::{ContentInspector, PatternRule, ThreatKind, Verdict};
pub use ip_reputation::{
    EntryKind, IpListEntry, IpReputationGuard, Reputation, ReputationError, MAX_DURATION_HOURS,
};
pub use rate_limit::{RateDecision, RateLimitRule, RuleSet, RuleSetError, SlidingWindowLimiter};
