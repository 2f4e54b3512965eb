//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ShieldConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → rate limit rules swapped atomically
//! ```

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, AuditConfig, AutoBlockConfig, CategoryRoute, InspectionConfig,
    IpReputationConfig, ListenerConfig, ObservabilityConfig, RateLimitConfig,
    RateLimitRuleConfig, SecurityConfig, ShieldConfig, DEFAULT_RULE_PATTERN,
};
pub use validation::{validate_config, ValidationError};
