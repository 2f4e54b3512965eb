//! Operator API, served on its own listener.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::service::ShieldService;

#[derive(Clone)]
pub struct AdminState {
    pub service: Arc<ShieldService>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(service: Arc<ShieldService>, api_key: &str) -> Self {
        Self {
            service,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/ip/blocked", get(list_blocked))
        .route("/admin/ip/whitelisted", get(list_whitelisted))
        .route("/admin/ip/block", post(block_address))
        .route("/admin/ip/block/{address}", delete(unblock_address))
        .route("/admin/ip/whitelist", post(whitelist_address))
        .route("/admin/ip/whitelist/{address}", delete(remove_whitelisted))
        .route("/admin/ip/{address}", get(get_address))
        .route("/admin/audit", get(query_audit))
        .route("/admin/rate-limit/{address}", delete(reset_rate_limit))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
