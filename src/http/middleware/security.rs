//! The security pipeline as axum middleware.
//!
//! Order of operations per request: resolve the client address, admit
//! (block list then rate limit), buffer and inspect mutating bodies, run the
//! handler, audit the outcome.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::request::{content_length, resolve_client_ip};
use crate::observability::metrics;
use crate::pipeline::{RequestFacts, SecurityPipeline};

/// Where a request left the pipeline after admission.
enum Outcome {
    /// Rejected by inspection; already audited.
    Rejected(Response),
    /// Reached the handler.
    Handled(Response),
}

pub async fn security_middleware(
    State(pipeline): State<Arc<SecurityPipeline>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let started = Instant::now();
    let address = resolve_client_ip(peer.ip(), request.headers(), pipeline.trusted_proxies());
    let facts = RequestFacts::from_request(&request, address);

    if let Err(rejection) = pipeline.admit(&facts) {
        metrics::record_pipeline_duration(started.elapsed());
        return rejection.into_response();
    }

    // The timeout lives inside the middleware so an overrun is still
    // audited as this request's outcome.
    let guarded = inspect_and_run(&pipeline, &facts, request, next, started);
    match tokio::time::timeout(pipeline.request_timeout(), guarded).await {
        Ok(Outcome::Rejected(response)) => response,
        Ok(Outcome::Handled(response)) => {
            pipeline.record_outcome(&facts, response.status());
            response
        }
        Err(_) => {
            tracing::warn!(
                address = %facts.address,
                path = %facts.path,
                timeout_secs = pipeline.request_timeout().as_secs_f64(),
                "Request timed out"
            );
            pipeline.record_outcome(&facts, StatusCode::REQUEST_TIMEOUT);
            StatusCode::REQUEST_TIMEOUT.into_response()
        }
    }
}

async fn inspect_and_run(
    pipeline: &SecurityPipeline,
    facts: &RequestFacts,
    request: Request<Body>,
    next: Next,
    started: Instant,
) -> Outcome {
    let request = if pipeline.should_inspect(request.method()) {
        let limit = pipeline.max_body_bytes();
        if content_length(request.headers()).is_some_and(|len| len > limit) {
            metrics::record_pipeline_duration(started.elapsed());
            return Outcome::Rejected(pipeline.reject_oversized(facts).into_response());
        }

        let (parts, body) = request.into_parts();
        let bytes = match axum::body::to_bytes(body, limit).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(address = %facts.address, error = %e, "Failed to buffer request body");
                metrics::record_pipeline_duration(started.elapsed());
                return Outcome::Rejected(pipeline.reject_oversized(facts).into_response());
            }
        };

        if let Err(rejection) = pipeline.inspect(facts, &bytes) {
            metrics::record_pipeline_duration(started.elapsed());
            return Outcome::Rejected(rejection.into_response());
        }
        Request::from_parts(parts, Body::from(bytes))
    } else {
        request
    };
    metrics::record_pipeline_duration(started.elapsed());

    Outcome::Handled(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditAction, AuditFilter, AuditSink, MemoryAuditStore};
    use crate::clock::{Clock, MockClock};
    use crate::config::ShieldConfig;
    use crate::pipeline::{PipelineSettings, ViolationTracker};
    use crate::security::{
        ContentInspector, IpReputationGuard, RateLimitRule, RuleSet, SlidingWindowLimiter,
    };
    use axum::{
        extract::connect_info::MockConnectInfo,
        http::{header, StatusCode},
        middleware,
        routing::{get, post},
        Router,
    };
    use std::time::Duration;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        audit: AuditSink,
        reputation: Arc<IpReputationGuard>,
    }

    fn app(max_requests: u32, max_body_bytes: usize) -> TestApp {
        let clock: Arc<dyn Clock> = Arc::new(MockClock::new());
        let reputation = Arc::new(IpReputationGuard::new(clock.clone()));
        let limiter = Arc::new(SlidingWindowLimiter::new(
            RuleSet::new(vec![RateLimitRule::new("default", max_requests, Duration::from_secs(60))])
                .unwrap(),
            clock.clone(),
        ));
        let (audit, _handle) = AuditSink::spawn(Arc::new(MemoryAuditStore::new()), 64, 100);
        let mut settings = PipelineSettings::from(&ShieldConfig::default());
        settings.max_body_bytes = max_body_bytes;
        settings.request_timeout = Duration::from_millis(200);

        let pipeline = Arc::new(SecurityPipeline::new(
            reputation.clone(),
            limiter,
            ContentInspector::with_builtin_rules(),
            ViolationTracker::new(5, Duration::from_secs(3600), clock.clone()),
            audit.clone(),
            clock,
            settings,
        ));

        let router = Router::new()
            .route("/api/products", get(|| async { "catalog" }))
            .route("/api/reviews", post(|body: String| async move { body }))
            .route(
                "/api/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
            .layer(middleware::from_fn_with_state(pipeline, security_middleware))
            .layer(MockConnectInfo(SocketAddr::from(([198, 51, 100, 1], 40000))));

        TestApp {
            router,
            audit,
            reputation,
        }
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_request(uri: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_clean_request_passes_and_is_audited() {
        let app = app(10, 1024);
        let response = app.router.clone().oneshot(get_request("/api/products")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        app.audit.flush().await;
        let logs = app.audit.query(AuditFilter::new()).await.unwrap();
        assert_eq!(logs.total, 1);
        assert!(logs.items[0].succeeded);
        assert_eq!(logs.items[0].action, AuditAction::View);
    }

    #[tokio::test]
    async fn test_blocked_peer_gets_403() {
        let app = app(10, 1024);
        app.reputation
            .block("198.51.100.1".parse().unwrap(), "abuse", None, false, None)
            .unwrap();

        let response = app.router.clone().oneshot(get_request("/api/products")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_rate_limited_request_gets_429() {
        let app = app(1, 1024);
        let first = app.router.clone().oneshot(get_request("/api/products")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.router.clone().oneshot(get_request("/api/products")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key(header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn test_malicious_body_never_reaches_handler() {
        let app = app(10, 1024);
        let response = app
            .router
            .clone()
            .oneshot(post_request("/api/reviews", r#"{"text":"<script>alert(1)</script>"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        app.audit.flush().await;
        let logs = app.audit.query(AuditFilter::new()).await.unwrap();
        assert_eq!(logs.total, 1);
        assert_eq!(logs.items[0].action, AuditAction::SuspiciousActivity);
    }

    #[tokio::test]
    async fn test_clean_body_is_forwarded_intact() {
        let app = app(10, 1024);
        let response = app
            .router
            .clone()
            .oneshot(post_request("/api/reviews", r#"{"text":"lovely mug"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"{"text":"lovely mug"}"#);
    }

    #[tokio::test]
    async fn test_oversized_body_gets_413() {
        let app = app(10, 8);
        let response = app
            .router
            .clone()
            .oneshot(post_request("/api/reviews", r#"{"text":"much too long"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_handler_timeout_is_audited_once() {
        let app = app(10, 1024);
        let response = app.router.clone().oneshot(get_request("/api/slow")).await.unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

        app.audit.flush().await;
        let logs = app.audit.query(AuditFilter::new()).await.unwrap();
        assert_eq!(logs.total, 1);
        assert_eq!(logs.items[0].status_code, Some(408));
        assert!(!logs.items[0].succeeded);
    }
}
