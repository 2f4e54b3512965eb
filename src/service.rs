//! The security seam consumed by the rest of the application.
//!
//! Collaborators (chat, loyalty points, the admin API) talk to the shield
//! only through [`SecurityService`]. Every mutation is audited.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::audit::{
    AuditAction, AuditCategory, AuditFilter, AuditSink, AuditStoreError, PagedResult, RiskLevel,
    SecurityEvent,
};
use crate::clock::Clock;
use crate::observability::metrics;
use crate::security::{
    IpListEntry, IpReputationGuard, RateDecision, ReputationError, RuleSetError, SlidingWindowLimiter,
};

/// Method recorded on events raised through the service rather than HTTP.
const SERVICE_METHOD: &str = "SERVICE";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Audit(#[from] AuditStoreError),

    #[error(transparent)]
    Reputation(ReputationError),
}

impl From<ReputationError> for ServiceError {
    fn from(e: ReputationError) -> Self {
        match e {
            ReputationError::InvalidDuration => ServiceError::InvalidInput(e.to_string()),
            other => ServiceError::Reputation(other),
        }
    }
}

impl From<RuleSetError> for ServiceError {
    fn from(e: RuleSetError) -> Self {
        ServiceError::InvalidInput(e.to_string())
    }
}

#[async_trait]
pub trait SecurityService: Send + Sync {
    /// Record an event; never fails the caller.
    async fn log(&self, event: SecurityEvent);

    async fn audit_logs(&self, filter: AuditFilter) -> Result<PagedResult<SecurityEvent>, ServiceError>;

    async fn is_ip_blocked(&self, address: IpAddr) -> bool;

    async fn is_ip_whitelisted(&self, address: IpAddr) -> bool;

    async fn block_ip(
        &self,
        address: IpAddr,
        reason: String,
        actor: Option<String>,
        duration_hours: Option<u32>,
    ) -> Result<IpListEntry, ServiceError>;

    /// `false` when the address was not blocked.
    async fn unblock_ip(&self, address: IpAddr, actor: Option<String>) -> bool;

    async fn whitelist_ip(
        &self,
        address: IpAddr,
        actor: Option<String>,
        duration_hours: Option<u32>,
    ) -> Result<IpListEntry, ServiceError>;

    /// `false` when the address was not whitelisted.
    async fn remove_from_whitelist(&self, address: IpAddr, actor: Option<String>) -> bool;

    /// Consume one request against an explicit limit.
    async fn check_rate_limit(
        &self,
        address: IpAddr,
        endpoint: &str,
        max_requests: u32,
        window: Duration,
    ) -> Result<RateDecision, ServiceError>;

    /// Clear counters; returns how many were removed.
    async fn reset_rate_limit(&self, address: IpAddr, endpoint: Option<&str>, actor: Option<String>) -> usize;

    async fn blocked_addresses(&self) -> Vec<IpListEntry>;

    async fn whitelisted_addresses(&self) -> Vec<IpListEntry>;
}

/// In-process implementation over the shared shield components.
#[derive(Debug, Clone)]
pub struct ShieldService {
    reputation: Arc<IpReputationGuard>,
    limiter: Arc<SlidingWindowLimiter>,
    audit: AuditSink,
    clock: Arc<dyn Clock>,
}

impl ShieldService {
    pub fn new(
        reputation: Arc<IpReputationGuard>,
        limiter: Arc<SlidingWindowLimiter>,
        audit: AuditSink,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            reputation,
            limiter,
            audit,
            clock,
        }
    }

    pub fn reputation(&self) -> &Arc<IpReputationGuard> {
        &self.reputation
    }

    pub fn limiter(&self) -> &Arc<SlidingWindowLimiter> {
        &self.limiter
    }

    pub fn audit(&self) -> &AuditSink {
        &self.audit
    }

    fn audit_change(
        &self,
        action: AuditAction,
        category: AuditCategory,
        operation: &str,
        address: IpAddr,
        actor: Option<String>,
        before: Option<&IpListEntry>,
        after: Option<&IpListEntry>,
    ) {
        let mut event = SecurityEvent::builder(action, category)
            .timestamp(self.clock.utc())
            .actor(actor, None)
            .source(address)
            .request(SERVICE_METHOD, operation)
            .risk(RiskLevel::Medium);
        if let Some(before) = before.and_then(|e| serde_json::to_value(e).ok()) {
            event = event.before(before);
        }
        if let Some(after) = after.and_then(|e| serde_json::to_value(e).ok()) {
            event = event.after(after);
        }
        self.audit.record(event.build());
    }
}

#[async_trait]
impl SecurityService for ShieldService {
    async fn log(&self, event: SecurityEvent) {
        self.audit.record(event);
    }

    async fn audit_logs(&self, filter: AuditFilter) -> Result<PagedResult<SecurityEvent>, ServiceError> {
        Ok(self.audit.query(filter).await?)
    }

    async fn is_ip_blocked(&self, address: IpAddr) -> bool {
        self.reputation.is_blocked(address)
    }

    async fn is_ip_whitelisted(&self, address: IpAddr) -> bool {
        self.reputation.is_whitelisted(address)
    }

    async fn block_ip(
        &self,
        address: IpAddr,
        reason: String,
        actor: Option<String>,
        duration_hours: Option<u32>,
    ) -> Result<IpListEntry, ServiceError> {
        let before = self.reputation.active_block(address);
        let entry = self
            .reputation
            .block(address, reason, actor.clone(), false, duration_hours)?;

        tracing::info!(%address, ?actor, ?duration_hours, "Address blocked");
        metrics::record_blocked_addresses(self.reputation.blocked_entries().len());
        self.audit_change(
            AuditAction::IpBlocked,
            AuditCategory::Security,
            "block_ip",
            address,
            actor,
            before.as_ref(),
            Some(&entry),
        );
        Ok(entry)
    }

    async fn unblock_ip(&self, address: IpAddr, actor: Option<String>) -> bool {
        let before = self.reputation.active_block(address);
        if !self.reputation.unblock(address) {
            tracing::debug!(%address, "Unblock requested for address without an active block");
            return false;
        }

        tracing::info!(%address, ?actor, "Address unblocked");
        metrics::record_blocked_addresses(self.reputation.blocked_entries().len());
        self.audit_change(
            AuditAction::IpUnblocked,
            AuditCategory::Security,
            "unblock_ip",
            address,
            actor,
            before.as_ref(),
            None,
        );
        true
    }

    async fn whitelist_ip(
        &self,
        address: IpAddr,
        actor: Option<String>,
        duration_hours: Option<u32>,
    ) -> Result<IpListEntry, ServiceError> {
        let before = self.reputation.active_allow(address);
        let entry = self.reputation.whitelist(address, actor.clone(), duration_hours)?;

        tracing::info!(%address, ?actor, ?duration_hours, "Address whitelisted");
        self.audit_change(
            AuditAction::IpWhitelisted,
            AuditCategory::Security,
            "whitelist_ip",
            address,
            actor,
            before.as_ref(),
            Some(&entry),
        );
        Ok(entry)
    }

    async fn remove_from_whitelist(&self, address: IpAddr, actor: Option<String>) -> bool {
        let before = self.reputation.active_allow(address);
        if !self.reputation.remove_from_whitelist(address) {
            return false;
        }

        tracing::info!(%address, ?actor, "Address removed from whitelist");
        self.audit_change(
            AuditAction::IpWhitelistRemoved,
            AuditCategory::Security,
            "remove_from_whitelist",
            address,
            actor,
            before.as_ref(),
            None,
        );
        true
    }

    async fn check_rate_limit(
        &self,
        address: IpAddr,
        endpoint: &str,
        max_requests: u32,
        window: Duration,
    ) -> Result<RateDecision, ServiceError> {
        Ok(self
            .limiter
            .check_with_limit(address, endpoint, max_requests, window)?)
    }

    async fn reset_rate_limit(&self, address: IpAddr, endpoint: Option<&str>, actor: Option<String>) -> usize {
        let cleared = self.limiter.reset(address, endpoint);

        tracing::info!(%address, ?endpoint, cleared, "Rate limit counters reset");
        let event = SecurityEvent::builder(AuditAction::RateLimitReset, AuditCategory::Admin)
            .timestamp(self.clock.utc())
            .actor(actor, None)
            .source(address)
            .request(SERVICE_METHOD, endpoint.unwrap_or("*"))
            .risk(RiskLevel::Medium)
            .after(serde_json::json!({ "cleared": cleared }))
            .build();
        self.audit.record(event);
        cleared
    }

    async fn blocked_addresses(&self) -> Vec<IpListEntry> {
        self.reputation.blocked_entries()
    }

    async fn whitelisted_addresses(&self) -> Vec<IpListEntry> {
        self.reputation.whitelisted_entries()
    }
}
