//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode, Uri},
    routing::any,
    Router,
};
use tokio::net::TcpListener;

use request_shield::config::ShieldConfig;
use request_shield::lifecycle::{Shield, Shutdown};

pub const ADMIN_KEY: &str = "integration-admin-key";

/// Counts requests that reached the mock storefront.
#[derive(Clone, Default)]
pub struct UpstreamHits(Arc<AtomicUsize>);

impl UpstreamHits {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Start a mock storefront that echoes `METHOD PATH BODY`, plus
/// `/status/{code}` answering with that status.
pub async fn start_mock_upstream() -> (SocketAddr, UpstreamHits) {
    let hits = UpstreamHits::default();
    let app = Router::new()
        .route("/status/{code}", any(status_handler))
        .fallback(echo_handler)
        .with_state(hits.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, hits)
}

async fn echo_handler(State(hits): State<UpstreamHits>, method: Method, uri: Uri, body: String) -> String {
    hits.0.fetch_add(1, Ordering::SeqCst);
    format!("{method} {} {body}", uri.path())
}

async fn status_handler(State(hits): State<UpstreamHits>, Path(code): Path<u16>) -> StatusCode {
    hits.0.fetch_add(1, Ordering::SeqCst);
    StatusCode::from_u16(code).unwrap_or(StatusCode::OK)
}

/// A running shield with both listeners on ephemeral ports.
pub struct TestShield {
    pub shield: Shield,
    pub proxy_url: String,
    pub admin_url: String,
    pub shutdown: Shutdown,
}

impl TestShield {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.proxy_url, path)
    }

    pub fn admin(&self, path: &str) -> String {
        format!("{}{}", self.admin_url, path)
    }

    pub fn admin_client(&self) -> reqwest::Client {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {ADMIN_KEY}").parse().unwrap(),
        );
        reqwest::Client::builder().default_headers(headers).build().unwrap()
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        self.shield.shutdown().await;
    }
}

/// Config pointing at `upstream`, admin API on, every request from
/// loopback treated as coming through a trusted proxy.
pub fn test_config(upstream: SocketAddr) -> ShieldConfig {
    let mut config = ShieldConfig::default();
    config.upstream.address = upstream.to_string();
    config.admin.enabled = true;
    config.admin.api_key = ADMIN_KEY.to_string();
    config.ip_reputation.trusted_proxies = vec!["127.0.0.1".parse().unwrap()];
    config
}

pub async fn start_shield(config: ShieldConfig) -> TestShield {
    let shield = Shield::build(config).await.unwrap();
    let shutdown = Shutdown::new();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = listener.local_addr().unwrap();
    let server = shield.http_server().unwrap();
    tokio::spawn(server.run(listener, shutdown.signalled()));

    let admin_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let admin_addr = admin_listener.local_addr().unwrap();
    let router = shield.admin_router();
    let stop = shutdown.signalled();
    tokio::spawn(async move {
        let _ = axum::serve(admin_listener, router).with_graceful_shutdown(stop).await;
    });

    TestShield {
        shield,
        proxy_url: format!("http://{proxy_addr}"),
        admin_url: format!("http://{admin_addr}"),
        shutdown,
    }
}
