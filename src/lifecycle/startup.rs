//! Startup orchestration.
//!
//! Components are built in dependency order: clock, lists, limiter,
//! inspector, audit, pipeline, service. Any failure here is fatal.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::http::uri::InvalidUri;
use axum::Router;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::admin::{setup_admin_router, AdminState};
use crate::audit::{AuditSink, AuditStore, AuditStoreError, FileAuditStore, MemoryAuditStore};
use crate::clock::{Clock, SystemClock};
use crate::config::{validate_config, ShieldConfig, ValidationError};
use crate::http::HttpServer;
use crate::lifecycle::maintenance::MaintenanceTask;
use crate::lifecycle::shutdown::Shutdown;
use crate::pipeline::{PipelineSettings, SecurityPipeline, ViolationTracker};
use crate::security::{
    ContentInspector, IpReputationGuard, ReputationError, RuleSet, RuleSetError, SlidingWindowLimiter,
};
use crate::service::ShieldService;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    Config(Vec<ValidationError>),

    #[error("invalid rate limit rules: {0}")]
    Rules(#[from] RuleSetError),

    #[error("failed to open audit store: {0}")]
    Audit(#[from] AuditStoreError),

    #[error("failed to load IP list snapshot: {0}")]
    Snapshot(#[from] ReputationError),

    #[error("invalid upstream address: {0}")]
    Upstream(#[from] InvalidUri),
}

/// Every long-lived component of a running shield.
pub struct Shield {
    pub config: ShieldConfig,
    pub clock: Arc<dyn Clock>,
    pub reputation: Arc<IpReputationGuard>,
    pub limiter: Arc<SlidingWindowLimiter>,
    pub audit: AuditSink,
    pub pipeline: Arc<SecurityPipeline>,
    pub service: Arc<ShieldService>,
}

impl Shield {
    pub async fn build(config: ShieldConfig) -> Result<Self, StartupError> {
        Self::build_with_clock(config, Arc::new(SystemClock::new())).await
    }

    pub async fn build_with_clock(config: ShieldConfig, clock: Arc<dyn Clock>) -> Result<Self, StartupError> {
        validate_config(&config).map_err(StartupError::Config)?;

        let reputation = Arc::new(IpReputationGuard::new(clock.clone()));
        if let Some(path) = &config.ip_reputation.snapshot_path {
            reputation.load_snapshot(Path::new(path))?;
        }

        let rules = RuleSet::from_config(&config.rate_limit.rules)?;
        let limiter = Arc::new(SlidingWindowLimiter::new(rules, clock.clone()));
        let inspector = ContentInspector::with_builtin_rules();
        tracing::info!(
            rate_limit_rules = config.rate_limit.rules.len(),
            inspection_rules = inspector.rule_count(),
            "Security components initialized"
        );

        let store: Arc<dyn AuditStore> = match &config.audit.log_path {
            Some(path) => Arc::new(FileAuditStore::open(path).await?),
            None => Arc::new(MemoryAuditStore::with_capacity(config.audit.memory_capacity)),
        };
        // The writer task exits once every sink handle is gone.
        let (audit, _writer) =
            AuditSink::spawn(store, config.audit.queue_capacity, config.audit.max_page_size);

        let violations = ViolationTracker::new(
            config.auto_block.violation_threshold,
            Duration::from_secs(config.auto_block.window_secs),
            clock.clone(),
        );
        let pipeline = Arc::new(SecurityPipeline::new(
            reputation.clone(),
            limiter.clone(),
            inspector,
            violations,
            audit.clone(),
            clock.clone(),
            PipelineSettings::from(&config),
        ));
        let service = Arc::new(ShieldService::new(
            reputation.clone(),
            limiter.clone(),
            audit.clone(),
            clock.clone(),
        ));

        Ok(Self {
            config,
            clock,
            reputation,
            limiter,
            audit,
            pipeline,
            service,
        })
    }

    pub fn http_server(&self) -> Result<HttpServer, StartupError> {
        Ok(HttpServer::new(&self.config, self.pipeline.clone())?)
    }

    pub fn admin_router(&self) -> Router {
        setup_admin_router(AdminState::new(self.service.clone(), &self.config.admin.api_key))
    }

    pub fn spawn_maintenance(&self, shutdown: &Shutdown) -> JoinHandle<()> {
        let task = MaintenanceTask::new(
            self.pipeline.clone(),
            Duration::from_secs(self.config.ip_reputation.sweep_interval_secs),
        );
        tokio::spawn(task.run(shutdown.subscribe()))
    }

    /// Apply a reloaded configuration. Only rate limit rules change at
    /// runtime; other sections take effect on restart.
    pub fn apply_reload(&self, config: &ShieldConfig) -> Result<(), StartupError> {
        let rules = RuleSet::from_config(&config.rate_limit.rules)?;
        let count = rules.len();
        self.limiter.replace_rules(rules);
        tracing::info!(rules = count, "Rate limit rules reloaded");
        Ok(())
    }

    /// Flush the audit trail and persist the IP lists.
    pub async fn shutdown(self) {
        self.audit.flush().await;
        tracing::info!("Audit queue flushed");

        if let Some(path) = &self.config.ip_reputation.snapshot_path {
            if let Err(e) = self.reputation.save_snapshot(Path::new(path)) {
                tracing::error!(error = %e, "Failed to save IP list snapshot");
            }
        }
    }
}
