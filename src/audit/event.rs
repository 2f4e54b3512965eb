//! Security event model.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    Login,
    LoginFailed,
    Logout,
    Register,
    PasswordChange,
    View,
    Create,
    Update,
    Delete,
    Export,
    AdminAction,
    RateLimitExceeded,
    RateLimitReset,
    SuspiciousActivity,
    BlockedIp,
    IpBlocked,
    IpUnblocked,
    IpWhitelisted,
    IpWhitelistRemoved,
    PayloadRejected,
}

impl AuditAction {
    /// Actions that destroy data or change security state.
    pub fn is_sensitive(self) -> bool {
        matches!(
            self,
            AuditAction::Delete
                | AuditAction::AdminAction
                | AuditAction::PasswordChange
                | AuditAction::Export
                | AuditAction::RateLimitReset
                | AuditAction::IpBlocked
                | AuditAction::IpUnblocked
                | AuditAction::IpWhitelisted
                | AuditAction::IpWhitelistRemoved
        )
    }
}

/// Which part of the storefront an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditCategory {
    Auth,
    Order,
    Product,
    Admin,
    Security,
    User,
    Payment,
    System,
}

/// Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// An append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub actor_id: Option<String>,
    pub actor_email: Option<String>,
    pub action: AuditAction,
    pub category: AuditCategory,
    pub source_address: Option<IpAddr>,
    pub endpoint: String,
    pub http_method: String,
    pub status_code: Option<u16>,
    pub succeeded: bool,
    pub error_detail: Option<String>,
    pub risk_level: RiskLevel,
    pub before_value: Option<serde_json::Value>,
    pub after_value: Option<serde_json::Value>,
    pub user_agent: Option<String>,
}

impl SecurityEvent {
    pub fn builder(action: AuditAction, category: AuditCategory) -> SecurityEventBuilder {
        SecurityEventBuilder::new(action, category)
    }
}

/// Builder for [`SecurityEvent`]; unset fields stay empty.
#[derive(Debug, Clone)]
pub struct SecurityEventBuilder {
    event: SecurityEvent,
}

impl SecurityEventBuilder {
    fn new(action: AuditAction, category: AuditCategory) -> Self {
        Self {
            event: SecurityEvent {
                id: Uuid::new_v4(),
                timestamp: Utc::now(),
                actor_id: None,
                actor_email: None,
                action,
                category,
                source_address: None,
                endpoint: String::new(),
                http_method: String::new(),
                status_code: None,
                succeeded: true,
                error_detail: None,
                risk_level: RiskLevel::Low,
                before_value: None,
                after_value: None,
                user_agent: None,
            },
        }
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.event.timestamp = timestamp;
        self
    }

    pub fn actor(mut self, id: Option<String>, email: Option<String>) -> Self {
        self.event.actor_id = id;
        self.event.actor_email = email;
        self
    }

    pub fn source(mut self, address: IpAddr) -> Self {
        self.event.source_address = Some(address);
        self
    }

    pub fn request(mut self, method: impl Into<String>, endpoint: impl Into<String>) -> Self {
        self.event.http_method = method.into();
        self.event.endpoint = endpoint.into();
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.event.status_code = Some(status);
        self
    }

    pub fn succeeded(mut self, succeeded: bool) -> Self {
        self.event.succeeded = succeeded;
        self
    }

    pub fn error(mut self, detail: impl Into<String>) -> Self {
        self.event.error_detail = Some(detail.into());
        self.event.succeeded = false;
        self
    }

    pub fn risk(mut self, level: RiskLevel) -> Self {
        self.event.risk_level = level;
        self
    }

    pub fn before(mut self, value: serde_json::Value) -> Self {
        self.event.before_value = Some(value);
        self
    }

    pub fn after(mut self, value: serde_json::Value) -> Self {
        self.event.after_value = Some(value);
        self
    }

    pub fn user_agent(mut self, agent: Option<String>) -> Self {
        self.event.user_agent = agent;
        self
    }

    pub fn build(self) -> SecurityEvent {
        self.event
    }
}
