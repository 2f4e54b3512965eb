use std::net::IpAddr;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::audit::{AuditFilter, PagedResult, SecurityEvent};
use crate::security::IpListEntry;
use crate::service::{SecurityService, ServiceError};

/// Recorded as the actor when a request does not name one.
const DEFAULT_ACTOR: &str = "admin";

/// JSON error body returned by every admin route.
#[derive(Debug)]
pub enum AdminError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<ServiceError> for AdminError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::InvalidInput(msg) => AdminError::BadRequest(msg),
            other => AdminError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AdminError::BadRequest(m) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", m),
            AdminError::NotFound(m) => (StatusCode::NOT_FOUND, "NOT_FOUND", m),
            AdminError::Internal(m) => {
                tracing::error!(error = %m, "Admin request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", m)
            }
        };
        (status, Json(serde_json::json!({ "message": message, "error": code }))).into_response()
    }
}

fn parse_address(raw: &str) -> Result<IpAddr, AdminError> {
    raw.parse()
        .map_err(|_| AdminError::BadRequest(format!("'{raw}' is not an IP address")))
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub blocked_addresses: usize,
    pub whitelisted_addresses: usize,
    pub tracked_counters: usize,
    pub rate_limit_rules: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        blocked_addresses: state.service.blocked_addresses().await.len(),
        whitelisted_addresses: state.service.whitelisted_addresses().await.len(),
        tracked_counters: state.service.limiter().tracked_keys(),
        rate_limit_rules: state.service.limiter().rules().len(),
    })
}

#[derive(Serialize)]
pub struct AddressReport {
    pub address: IpAddr,
    pub blocked: bool,
    pub whitelisted: bool,
    pub block: Option<IpListEntry>,
    pub allow: Option<IpListEntry>,
    pub history: Vec<IpListEntry>,
}

pub async fn get_address(
    State(state): State<AdminState>,
    Path(raw): Path<String>,
) -> Result<Json<AddressReport>, AdminError> {
    let address = parse_address(&raw)?;
    let reputation = state.service.reputation();
    Ok(Json(AddressReport {
        address,
        blocked: state.service.is_ip_blocked(address).await,
        whitelisted: state.service.is_ip_whitelisted(address).await,
        block: reputation.active_block(address),
        allow: reputation.active_allow(address),
        history: reputation.history(address),
    }))
}

#[derive(Debug, Deserialize)]
pub struct BlockRequest {
    pub address: String,
    pub reason: String,
    pub duration_hours: Option<u32>,
    pub actor: Option<String>,
}

pub async fn block_address(
    State(state): State<AdminState>,
    Json(body): Json<BlockRequest>,
) -> Result<(StatusCode, Json<IpListEntry>), AdminError> {
    let address = parse_address(&body.address)?;
    if body.reason.trim().is_empty() {
        return Err(AdminError::BadRequest("reason must not be empty".into()));
    }
    let actor = body.actor.unwrap_or_else(|| DEFAULT_ACTOR.to_string());
    let entry = state
        .service
        .block_ip(address, body.reason, Some(actor), body.duration_hours)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

#[derive(Debug, Deserialize)]
pub struct WhitelistRequest {
    pub address: String,
    pub duration_hours: Option<u32>,
    pub actor: Option<String>,
}

pub async fn whitelist_address(
    State(state): State<AdminState>,
    Json(body): Json<WhitelistRequest>,
) -> Result<(StatusCode, Json<IpListEntry>), AdminError> {
    let address = parse_address(&body.address)?;
    let actor = body.actor.unwrap_or_else(|| DEFAULT_ACTOR.to_string());
    let entry = state
        .service
        .whitelist_ip(address, Some(actor), body.duration_hours)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ActorQuery {
    pub actor: Option<String>,
}

#[derive(Serialize)]
pub struct Removed {
    pub address: IpAddr,
    pub removed: bool,
}

pub async fn unblock_address(
    State(state): State<AdminState>,
    Path(raw): Path<String>,
    Query(query): Query<ActorQuery>,
) -> Result<Json<Removed>, AdminError> {
    let address = parse_address(&raw)?;
    let actor = query.actor.unwrap_or_else(|| DEFAULT_ACTOR.to_string());
    if !state.service.unblock_ip(address, Some(actor)).await {
        return Err(AdminError::NotFound(format!("{address} is not blocked")));
    }
    Ok(Json(Removed { address, removed: true }))
}

pub async fn remove_whitelisted(
    State(state): State<AdminState>,
    Path(raw): Path<String>,
    Query(query): Query<ActorQuery>,
) -> Result<Json<Removed>, AdminError> {
    let address = parse_address(&raw)?;
    let actor = query.actor.unwrap_or_else(|| DEFAULT_ACTOR.to_string());
    if !state.service.remove_from_whitelist(address, Some(actor)).await {
        return Err(AdminError::NotFound(format!("{address} is not whitelisted")));
    }
    Ok(Json(Removed { address, removed: true }))
}

pub async fn list_blocked(State(state): State<AdminState>) -> Json<Vec<IpListEntry>> {
    Json(state.service.blocked_addresses().await)
}

pub async fn list_whitelisted(State(state): State<AdminState>) -> Json<Vec<IpListEntry>> {
    Json(state.service.whitelisted_addresses().await)
}

pub async fn query_audit(
    State(state): State<AdminState>,
    Query(filter): Query<AuditFilter>,
) -> Result<Json<PagedResult<SecurityEvent>>, AdminError> {
    Ok(Json(state.service.audit_logs(filter).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetQuery {
    pub endpoint: Option<String>,
    pub actor: Option<String>,
}

#[derive(Serialize)]
pub struct ResetSummary {
    pub address: IpAddr,
    pub cleared: usize,
}

pub async fn reset_rate_limit(
    State(state): State<AdminState>,
    Path(raw): Path<String>,
    Query(query): Query<ResetQuery>,
) -> Result<Json<ResetSummary>, AdminError> {
    let address = parse_address(&raw)?;
    let actor = query.actor.unwrap_or_else(|| DEFAULT_ACTOR.to_string());
    let cleared = state
        .service
        .reset_rate_limit(address, query.endpoint.as_deref(), Some(actor))
        .await;
    Ok(Json(ResetSummary { address, cleared }))
}
