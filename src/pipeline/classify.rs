//! Mapping passed requests onto audit categories and actions.

use axum::http::Method;

use crate::audit::{AuditAction, AuditCategory};
use crate::config::schema::CategoryRoute;

/// Segment-aware, case-insensitive prefix test.
pub fn path_has_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => {
            let rest = &path[prefix.len()..];
            rest.is_empty() || rest.starts_with('/')
        }
        _ => false,
    }
}

/// Longest matching route decides; unmatched paths are `System`.
pub fn category_for(path: &str, routes: &[CategoryRoute]) -> AuditCategory {
    routes
        .iter()
        .filter(|route| path_has_prefix(path, &route.prefix))
        .max_by_key(|route| route.prefix.trim_end_matches('/').len())
        .map_or(AuditCategory::System, |route| route.category)
}

/// Login paths become `Login`/`LoginFailed`; everything else follows the
/// method.
pub fn action_for(method: &Method, path: &str, status: u16, login_paths: &[String]) -> AuditAction {
    if login_paths.iter().any(|p| path_has_prefix(path, p)) {
        return if status < 400 {
            AuditAction::Login
        } else {
            AuditAction::LoginFailed
        };
    }

    match *method {
        Method::POST => AuditAction::Create,
        Method::PUT | Method::PATCH => AuditAction::Update,
        Method::DELETE => AuditAction::Delete,
        _ => AuditAction::View,
    }
}
