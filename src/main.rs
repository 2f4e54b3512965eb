//! request-shield: security guard proxy for the storefront API.
//!
//! ```text
//!   client ──▶ request id ─▶ trace ─▶ timeout ─▶ security headers
//!                                                     │
//!                                                     ▼
//!                      ┌──────────── security pipeline ────────────┐
//!                      │ ip lists ─▶ rate limit ─▶ content scan     │──▶ 403 / 429 / 400 / 413
//!                      └───────────────────┬───────────────────────┘
//!                                          ▼
//!                                   upstream storefront
//!
//!   every outcome ──▶ audit queue ──▶ audit store ◀── admin API ◀── shield-cli
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use request_shield::config::watcher::ConfigWatcher;
use request_shield::config::{load_config, ShieldConfig};
use request_shield::lifecycle::signals::wait_for_signal;
use request_shield::lifecycle::{Shield, Shutdown};
use request_shield::observability::{logging, metrics};

const PLACEHOLDER_ADMIN_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

#[derive(Parser)]
#[command(name = "request-shield", version, about = "Security guard proxy for the storefront API")]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ShieldConfig::default(),
    };
    logging::init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        rate_limit_rules = config.rate_limit.rules.len(),
        "request-shield starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shield = Shield::build(config).await?;
    let shutdown = Shutdown::new();
    let maintenance = shield.spawn_maintenance(&shutdown);

    let listener = TcpListener::bind(&shield.config.listener.bind_address).await?;
    let server = shield.http_server()?;
    let server_task = tokio::spawn(server.run(listener, shutdown.signalled()));

    let admin_task = if shield.config.admin.enabled {
        if shield.config.admin.api_key == PLACEHOLDER_ADMIN_KEY {
            tracing::warn!("Admin API enabled with the placeholder key; set admin.api_key");
        }
        let admin_listener = TcpListener::bind(&shield.config.admin.bind_address).await?;
        tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
        let router = shield.admin_router();
        let stop = shutdown.signalled();
        Some(tokio::spawn(async move {
            axum::serve(admin_listener, router).with_graceful_shutdown(stop).await
        }))
    } else {
        None
    };

    // The watcher stops when dropped, so it lives until shutdown.
    let (_watcher, mut reloads) = match &args.config {
        Some(path) => {
            let (watcher, rx) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (Some(handle), Some(rx)),
                Err(e) => {
                    tracing::warn!(error = %e, "Config hot reload unavailable");
                    (None, None)
                }
            }
        }
        None => (None, None),
    };

    let signal = wait_for_signal();
    tokio::pin!(signal);
    loop {
        tokio::select! {
            _ = &mut signal => break,
            Some(next) = next_reload(&mut reloads) => {
                if let Err(e) = shield.apply_reload(&next) {
                    tracing::error!(error = %e, "Rejected config reload, keeping current rules");
                }
            }
        }
    }

    tracing::info!("Shutting down");
    shutdown.trigger();

    match server_task.await {
        Ok(Err(e)) => tracing::error!(error = %e, "HTTP server error"),
        Err(e) => tracing::error!(error = %e, "HTTP server task failed"),
        Ok(Ok(())) => {}
    }
    if let Some(task) = admin_task {
        if let Ok(Err(e)) = task.await {
            tracing::error!(error = %e, "Admin API error");
        }
    }
    let _ = maintenance.await;

    shield.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn next_reload(reloads: &mut Option<mpsc::UnboundedReceiver<ShieldConfig>>) -> Option<ShieldConfig> {
    match reloads {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
