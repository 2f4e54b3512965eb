//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the shield.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

use crate::audit::AuditCategory;

/// Pattern name of the fallback rate limit rule.
pub const DEFAULT_RULE_PATTERN: &str = "default";

/// Root configuration for the request shield.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ShieldConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Storefront backend that admitted requests are forwarded to.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Per-address, per-endpoint rate limits.
    pub rate_limit: RateLimitConfig,

    /// Block/allow list behavior.
    pub ip_reputation: IpReputationConfig,

    /// Request content inspection.
    pub inspection: InspectionConfig,

    /// Automatic blocking after repeated violations.
    pub auto_block: AutoBlockConfig,

    /// Audit trail settings.
    pub audit: AuditConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Response hardening.
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream (storefront) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Backend address (e.g., "127.0.0.1:3000").
    pub address: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// A single rate limit rule as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RateLimitRuleConfig {
    /// Path prefix this rule applies to, or `default`.
    pub endpoint_pattern: String,

    /// Requests allowed per window.
    pub max_requests: u32,

    /// Window length in seconds.
    pub window_secs: u64,
}

impl RateLimitRuleConfig {
    pub fn new(endpoint_pattern: impl Into<String>, max_requests: u32, window_secs: u64) -> Self {
        Self {
            endpoint_pattern: endpoint_pattern.into(),
            max_requests,
            window_secs,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Rules; exactly one must use the `default` pattern.
    pub rules: Vec<RateLimitRuleConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rules: vec![
                RateLimitRuleConfig::new("/api/auth/login", 5, 60),
                RateLimitRuleConfig::new("/api/auth/register", 3, 300),
                RateLimitRuleConfig::new("/api/auth", 20, 60),
                RateLimitRuleConfig::new("/api/orders", 30, 60),
                RateLimitRuleConfig::new("/api/chat", 60, 60),
                RateLimitRuleConfig::new(DEFAULT_RULE_PATTERN, 100, 60),
            ],
        }
    }
}

/// Block/allow list configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IpReputationConfig {
    /// Proxies allowed to set X-Forwarded-For.
    pub trusted_proxies: Vec<IpAddr>,

    /// JSON snapshot of the lists, loaded at startup and saved on shutdown.
    pub snapshot_path: Option<String>,

    /// Interval of the maintenance sweep (expired entries, idle counters).
    pub sweep_interval_secs: u64,
}

impl Default for IpReputationConfig {
    fn default() -> Self {
        Self {
            trusted_proxies: Vec::new(),
            snapshot_path: None,
            sweep_interval_secs: 300,
        }
    }
}

/// Content inspection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InspectionConfig {
    /// Enable body/query inspection on mutating requests.
    pub enabled: bool,

    /// Largest body that will be buffered for inspection.
    pub max_body_bytes: usize,
}

impl Default for InspectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Automatic blocking configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AutoBlockConfig {
    /// Block addresses that keep tripping the inspector.
    pub enabled: bool,

    /// Violations within the window that trigger a block.
    pub violation_threshold: u32,

    /// Violation counting window in seconds.
    pub window_secs: u64,

    /// Length of the automatic block.
    pub block_duration_hours: u32,
}

impl Default for AutoBlockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            violation_threshold: 5,
            window_secs: 3600,
            block_duration_hours: 24,
        }
    }
}

/// Maps a path prefix to an audit category.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CategoryRoute {
    pub prefix: String,
    pub category: AuditCategory,
}

impl CategoryRoute {
    fn new(prefix: &str, category: AuditCategory) -> Self {
        Self {
            prefix: prefix.to_string(),
            category,
        }
    }
}

/// Audit trail configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Events buffered between request tasks and the writer.
    pub queue_capacity: usize,

    /// Largest page a query may return.
    pub max_page_size: usize,

    /// Events kept by the in-memory trail before the oldest are dropped.
    pub memory_capacity: usize,

    /// JSON-lines file for the trail; in-memory when absent.
    pub log_path: Option<String>,

    /// Category assignment for passed requests, longest prefix wins.
    pub routes: Vec<CategoryRoute>,

    /// Path prefixes that count as login attempts.
    pub login_paths: Vec<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            max_page_size: 200,
            memory_capacity: 100_000,
            log_path: None,
            routes: vec![
                CategoryRoute::new("/api/auth", AuditCategory::Auth),
                CategoryRoute::new("/api/orders", AuditCategory::Order),
                CategoryRoute::new("/api/checkout", AuditCategory::Order),
                CategoryRoute::new("/api/products", AuditCategory::Product),
                CategoryRoute::new("/api/admin", AuditCategory::Admin),
                CategoryRoute::new("/api/users", AuditCategory::User),
                CategoryRoute::new("/api/payments", AuditCategory::Payment),
            ],
            login_paths: vec!["/api/auth/login".to_string()],
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Attach security headers to every response.
    pub enable_headers: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
        }
    }
}
