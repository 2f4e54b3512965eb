//! Request security pipeline.
//!
//! # Data Flow
//! ```text
//! request
//!     → admit: IpReputationGuard (403) → SlidingWindowLimiter (429)
//!     → inspect: ContentInspector on POST/PUT/PATCH bodies (400 / 413)
//!     → downstream handler
//!     → record_outcome
//! every terminal outcome → exactly one audit event
//! ```
//!
//! All checks are synchronous and in-memory; the quota is consumed before
//! the first await, so a cancelled request keeps it.

pub mod auto_block;
pub mod classify;
pub mod rejection;
pub mod risk;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, Request, StatusCode};

use crate::audit::{AuditAction, AuditCategory, AuditSink, RiskLevel, SecurityEvent};
use crate::clock::Clock;
use crate::config::schema::{CategoryRoute, ShieldConfig};
use crate::http::request::user_agent;
use crate::observability::metrics;
use crate::security::{
    ContentInspector, IpReputationGuard, RateDecision, Reputation, SlidingWindowLimiter, Verdict,
};

pub use auto_block::ViolationTracker;
pub use rejection::{Rejection, RejectionCode};

/// Identity of the caller, inserted as a request extension by the host's
/// authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub email: Option<String>,
}

/// What the pipeline needs to know about a request.
#[derive(Debug, Clone)]
pub struct RequestFacts {
    pub address: IpAddr,
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub user_agent: Option<String>,
    pub actor: Option<Actor>,
}

impl RequestFacts {
    pub fn from_request<B>(request: &Request<B>, address: IpAddr) -> Self {
        Self {
            address,
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            query: request.uri().query().map(str::to_string),
            user_agent: user_agent(request.headers()),
            actor: request.extensions().get::<Actor>().cloned(),
        }
    }

    fn event(&self, action: AuditAction, category: AuditCategory) -> crate::audit::SecurityEventBuilder {
        let (actor_id, actor_email) = match &self.actor {
            Some(actor) => (Some(actor.id.clone()), actor.email.clone()),
            None => (None, None),
        };
        SecurityEvent::builder(action, category)
            .actor(actor_id, actor_email)
            .source(self.address)
            .request(self.method.as_str(), self.path.clone())
            .user_agent(self.user_agent.clone())
    }
}

/// Tunables taken from configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub rate_limit_enabled: bool,
    pub inspection_enabled: bool,
    pub max_body_bytes: usize,
    /// Budget for inspection plus the handler; overruns end in 408.
    pub request_timeout: Duration,
    pub auto_block_enabled: bool,
    pub auto_block_hours: u32,
    pub trusted_proxies: Vec<IpAddr>,
    pub routes: Vec<CategoryRoute>,
    pub login_paths: Vec<String>,
}

impl From<&ShieldConfig> for PipelineSettings {
    fn from(config: &ShieldConfig) -> Self {
        Self {
            rate_limit_enabled: config.rate_limit.enabled,
            inspection_enabled: config.inspection.enabled,
            max_body_bytes: config.inspection.max_body_bytes,
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
            auto_block_enabled: config.auto_block.enabled,
            auto_block_hours: config.auto_block.block_duration_hours,
            trusted_proxies: config.ip_reputation.trusted_proxies.clone(),
            routes: config.audit.routes.clone(),
            login_paths: config.audit.login_paths.clone(),
        }
    }
}

/// Ordered chain of security checks with short-circuit semantics.
#[derive(Debug)]
pub struct SecurityPipeline {
    reputation: Arc<IpReputationGuard>,
    limiter: Arc<SlidingWindowLimiter>,
    inspector: ContentInspector,
    violations: ViolationTracker,
    audit: AuditSink,
    clock: Arc<dyn Clock>,
    settings: PipelineSettings,
}

impl SecurityPipeline {
    pub fn new(
        reputation: Arc<IpReputationGuard>,
        limiter: Arc<SlidingWindowLimiter>,
        inspector: ContentInspector,
        violations: ViolationTracker,
        audit: AuditSink,
        clock: Arc<dyn Clock>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            reputation,
            limiter,
            inspector,
            violations,
            audit,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn violations(&self) -> &ViolationTracker {
        &self.violations
    }

    /// Address check, then rate check.
    pub fn admit(&self, facts: &RequestFacts) -> Result<(), Rejection> {
        if let Reputation::Blocked { reason, .. } = self.reputation.evaluate(facts.address) {
            tracing::warn!(address = %facts.address, path = %facts.path, %reason, "Blocked address rejected");
            return Err(self.reject(
                facts,
                AuditAction::BlockedIp,
                Rejection::new(RejectionCode::IpBlocked),
                &reason,
                None,
            ));
        }

        if self.settings.rate_limit_enabled {
            if let RateDecision::Denied { retry_after } =
                self.limiter.check_and_consume(facts.address, &facts.path)
            {
                tracing::warn!(
                    address = %facts.address,
                    path = %facts.path,
                    retry_after_secs = retry_after.as_secs(),
                    "Rate limit exceeded"
                );
                return Err(self.reject(
                    facts,
                    AuditAction::RateLimitExceeded,
                    Rejection::rate_limited(retry_after),
                    "rate limit exceeded",
                    None,
                ));
            }
        }

        Ok(())
    }

    /// Whether this request's body must be buffered and scanned.
    pub fn should_inspect(&self, method: &Method) -> bool {
        self.settings.inspection_enabled
            && matches!(*method, Method::POST | Method::PUT | Method::PATCH)
    }

    pub fn max_body_bytes(&self) -> usize {
        self.settings.max_body_bytes
    }

    pub fn request_timeout(&self) -> Duration {
        self.settings.request_timeout
    }

    pub fn trusted_proxies(&self) -> &[IpAddr] {
        &self.settings.trusted_proxies
    }

    /// Scan a buffered body (and the query string). Empty bodies pass.
    pub fn inspect(&self, facts: &RequestFacts, body: &[u8]) -> Result<(), Rejection> {
        if body.is_empty() {
            return Ok(());
        }

        match self.inspector.scan_request(body, facts.query.as_deref()) {
            Verdict::Clean => Ok(()),
            Verdict::Flagged { kind, rule } => {
                tracing::warn!(
                    address = %facts.address,
                    path = %facts.path,
                    %kind,
                    %rule,
                    "Malicious content detected"
                );
                metrics::record_inspection_hit(kind.as_str());

                let rejection = self.reject(
                    facts,
                    AuditAction::SuspiciousActivity,
                    Rejection::new(RejectionCode::SecurityViolation),
                    &format!("{kind} pattern `{rule}`"),
                    Some(RiskLevel::Critical),
                );

                if self.settings.auto_block_enabled && self.violations.record(facts.address) {
                    self.auto_block(facts);
                }
                Err(rejection)
            }
        }
    }

    /// The body exceeded the inspection limit.
    pub fn reject_oversized(&self, facts: &RequestFacts) -> Rejection {
        tracing::warn!(
            address = %facts.address,
            path = %facts.path,
            limit = self.settings.max_body_bytes,
            "Request body over inspection limit"
        );
        self.reject(
            facts,
            AuditAction::PayloadRejected,
            Rejection::new(RejectionCode::PayloadTooLarge),
            "body exceeds inspection limit",
            None,
        )
    }

    /// Audit a request that reached the handler.
    pub fn record_outcome(&self, facts: &RequestFacts, status: StatusCode) {
        let code = status.as_u16();
        let category = classify::category_for(&facts.path, &self.settings.routes);
        let action = classify::action_for(&facts.method, &facts.path, code, &self.settings.login_paths);
        let succeeded = code < 400;

        let mut event = facts
            .event(action, category)
            .timestamp(self.clock.utc())
            .status(code)
            .succeeded(succeeded)
            .risk(risk::derive_risk_level(code, action, category));
        if !succeeded {
            event = event.error(format!("upstream responded {code}"));
        }

        self.audit.record(event.build());
        metrics::record_request("passed");
    }

    fn reject(
        &self,
        facts: &RequestFacts,
        action: AuditAction,
        rejection: Rejection,
        detail: &str,
        risk_override: Option<RiskLevel>,
    ) -> Rejection {
        let status = rejection.status().as_u16();
        let risk = risk_override
            .unwrap_or_else(|| risk::derive_risk_level(status, action, AuditCategory::Security));

        let event = facts
            .event(action, AuditCategory::Security)
            .timestamp(self.clock.utc())
            .status(status)
            .error(format!("{}: {detail}", rejection.code))
            .risk(risk)
            .build();
        self.audit.record(event);

        metrics::record_request("rejected");
        metrics::record_rejection(rejection.code.as_str());
        rejection
    }

    fn auto_block(&self, facts: &RequestFacts) {
        let hours = self.settings.auto_block_hours;
        let reason = "Automatic block: repeated malicious payloads";
        match self
            .reputation
            .block(facts.address, reason, Some("system".to_string()), true, Some(hours))
        {
            Ok(entry) => {
                tracing::warn!(address = %facts.address, hours, "Address blocked automatically");
                metrics::record_auto_block();
                metrics::record_blocked_addresses(self.reputation.blocked_entries().len());

                let after = serde_json::to_value(&entry).unwrap_or(serde_json::Value::Null);
                let event = SecurityEvent::builder(AuditAction::IpBlocked, AuditCategory::Security)
                    .timestamp(self.clock.utc())
                    .actor(Some("system".to_string()), None)
                    .source(facts.address)
                    .request(facts.method.as_str(), facts.path.clone())
                    .risk(RiskLevel::High)
                    .after(after)
                    .build();
                self.audit.record(event);
            }
            Err(e) => tracing::error!(address = %facts.address, error = %e, "Automatic block failed"),
        }
    }

    /// Housekeeping: expired list entries, idle counters and strikes.
    pub fn sweep(&self) -> SweepReport {
        let report = SweepReport {
            expired_entries: self.reputation.sweep_expired(),
            idle_counters: self.limiter.evict_idle(),
            idle_strikes: self.violations.evict_idle(),
        };
        metrics::record_rate_limit_counters(self.limiter.tracked_keys());
        metrics::record_blocked_addresses(self.reputation.blocked_entries().len());
        report
    }
}

/// What one maintenance pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_entries: usize,
    pub idle_counters: usize,
    pub idle_strikes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditFilter, MemoryAuditStore};
    use crate::clock::MockClock;
    use crate::security::{RateLimitRule, RuleSet};
    use std::time::Duration;

    struct Harness {
        pipeline: SecurityPipeline,
        reputation: Arc<IpReputationGuard>,
        audit: AuditSink,
        clock: MockClock,
    }

    fn harness(max_requests: u32, violation_threshold: u32) -> Harness {
        let clock = MockClock::new();
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let reputation = Arc::new(IpReputationGuard::new(shared.clone()));
        let limiter = Arc::new(SlidingWindowLimiter::new(
            RuleSet::new(vec![RateLimitRule::new(
                "default",
                max_requests,
                Duration::from_secs(60),
            )])
            .unwrap(),
            shared.clone(),
        ));
        let (audit, _handle) = AuditSink::spawn(Arc::new(MemoryAuditStore::new()), 128, 100);
        let mut settings = PipelineSettings::from(&ShieldConfig::default());
        settings.auto_block_hours = 24;

        let pipeline = SecurityPipeline::new(
            reputation.clone(),
            limiter,
            ContentInspector::with_builtin_rules(),
            ViolationTracker::new(violation_threshold, Duration::from_secs(3600), shared.clone()),
            audit.clone(),
            shared,
            settings,
        );
        Harness {
            pipeline,
            reputation,
            audit,
            clock,
        }
    }

    fn facts(address: [u8; 4], method: Method, path: &str) -> RequestFacts {
        RequestFacts {
            address: IpAddr::from(address),
            method,
            path: path.to_string(),
            query: None,
            user_agent: Some("test-agent".to_string()),
            actor: None,
        }
    }

    async fn events(audit: &AuditSink, filter: AuditFilter) -> Vec<SecurityEvent> {
        audit.flush().await;
        audit.query(filter).await.unwrap().items
    }

    #[tokio::test]
    async fn test_blocked_address_rejected_and_audited_once() {
        let h = harness(10, 5);
        h.reputation
            .block(IpAddr::from([9, 9, 9, 9]), "fraud", None, false, None)
            .unwrap();

        let err = h
            .pipeline
            .admit(&facts([9, 9, 9, 9], Method::GET, "/api/products"))
            .unwrap_err();
        assert_eq!(err.code, RejectionCode::IpBlocked);

        let logged = events(&h.audit, AuditFilter::new()).await;
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].action, AuditAction::BlockedIp);
        assert!(!logged[0].succeeded);
        assert!(logged[0].error_detail.as_deref().unwrap().starts_with("IP_BLOCKED"));
        assert_eq!(logged[0].status_code, Some(403));
    }

    #[tokio::test]
    async fn test_blocked_address_does_not_consume_quota() {
        let h = harness(1, 5);
        let addr = IpAddr::from([9, 9, 9, 9]);
        h.reputation.block(addr, "x", None, false, None).unwrap();
        assert!(h.pipeline.admit(&facts([9, 9, 9, 9], Method::GET, "/")).is_err());

        h.reputation.unblock(addr);
        assert!(h.pipeline.admit(&facts([9, 9, 9, 9], Method::GET, "/")).is_ok());
    }

    #[tokio::test]
    async fn test_rate_limit_rejection_carries_retry_hint() {
        let h = harness(2, 5);
        let f = facts([1, 2, 3, 4], Method::GET, "/api/products");
        assert!(h.pipeline.admit(&f).is_ok());
        assert!(h.pipeline.admit(&f).is_ok());

        h.clock.advance(Duration::from_secs(15));
        let err = h.pipeline.admit(&f).unwrap_err();
        assert_eq!(err.code, RejectionCode::RateLimitExceeded);
        assert_eq!(err.retry_after, Some(Duration::from_secs(45)));

        let logged = events(&h.audit, AuditFilter::new().action(AuditAction::RateLimitExceeded)).await;
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].category, AuditCategory::Security);
    }

    #[tokio::test]
    async fn test_inspection_only_for_mutating_methods() {
        let h = harness(10, 5);
        assert!(h.pipeline.should_inspect(&Method::POST));
        assert!(h.pipeline.should_inspect(&Method::PATCH));
        assert!(!h.pipeline.should_inspect(&Method::GET));
        assert!(!h.pipeline.should_inspect(&Method::DELETE));
    }

    #[tokio::test]
    async fn test_flagged_content_is_critical() {
        let h = harness(10, 5);
        let f = facts([5, 5, 5, 5], Method::POST, "/api/reviews");
        let err = h
            .pipeline
            .inspect(&f, br#"{"comment":"<script>alert(1)</script>"}"#)
            .unwrap_err();
        assert_eq!(err.code, RejectionCode::SecurityViolation);

        let logged = events(
            &h.audit,
            AuditFilter::new()
                .category(AuditCategory::Security)
                .risk_level(RiskLevel::Critical),
        )
        .await;
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].action, AuditAction::SuspiciousActivity);
        assert_eq!(logged[0].status_code, Some(400));
    }

    #[tokio::test]
    async fn test_empty_body_is_not_inspected() {
        let h = harness(10, 5);
        let mut f = facts([5, 5, 5, 5], Method::POST, "/api/cart");
        f.query = Some("q=<script>".to_string());
        assert!(h.pipeline.inspect(&f, b"").is_ok());
    }

    #[tokio::test]
    async fn test_repeated_violations_trigger_automatic_block() {
        let h = harness(100, 2);
        let f = facts([6, 6, 6, 6], Method::POST, "/api/reviews");

        assert!(h.pipeline.inspect(&f, b"' OR '1'='1").is_err());
        assert!(h.pipeline.admit(&f).is_ok());
        assert!(h.pipeline.inspect(&f, b"' OR '1'='1").is_err());

        let entry = h.reputation.active_block(f.address).unwrap();
        assert!(matches!(entry.kind, crate::security::EntryKind::Block { is_automatic: true, .. }));
        assert!(entry.expires_at.is_some());
        assert_eq!(h.pipeline.admit(&f).unwrap_err().code, RejectionCode::IpBlocked);

        let blocked = events(&h.audit, AuditFilter::new().action(AuditAction::IpBlocked)).await;
        assert_eq!(blocked.len(), 1);
    }

    #[tokio::test]
    async fn test_passed_request_derivation() {
        let h = harness(10, 5);
        let mut f = facts([7, 7, 7, 7], Method::POST, "/api/auth/login");
        f.actor = Some(Actor {
            id: "u-1".to_string(),
            email: Some("a@example.com".to_string()),
        });

        h.pipeline.record_outcome(&f, StatusCode::UNAUTHORIZED);
        h.pipeline
            .record_outcome(&facts([7, 7, 7, 7], Method::GET, "/api/orders/3"), StatusCode::OK);

        let logged = events(&h.audit, AuditFilter::new()).await;
        assert_eq!(logged.len(), 2);

        let order = &logged[0];
        assert_eq!(order.action, AuditAction::View);
        assert_eq!(order.category, AuditCategory::Order);
        assert!(order.succeeded);
        assert_eq!(order.risk_level, RiskLevel::Low);

        let login = &logged[1];
        assert_eq!(login.action, AuditAction::LoginFailed);
        assert_eq!(login.category, AuditCategory::Auth);
        assert!(!login.succeeded);
        assert_eq!(login.risk_level, RiskLevel::Medium);
        assert_eq!(login.actor_id.as_deref(), Some("u-1"));
    }

    #[tokio::test]
    async fn test_oversized_body_rejection() {
        let h = harness(10, 5);
        let rejection = h
            .pipeline
            .reject_oversized(&facts([8, 8, 8, 8], Method::PUT, "/api/products/1"));
        assert_eq!(rejection.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let logged = events(&h.audit, AuditFilter::new().action(AuditAction::PayloadRejected)).await;
        assert_eq!(logged.len(), 1);
    }
}
