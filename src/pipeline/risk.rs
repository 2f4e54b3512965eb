//! Risk level derivation for audited requests.

use crate::audit::{AuditAction, AuditCategory, RiskLevel};

/// Grade an outcome. Content inspection hits are graded Critical by the
/// caller and never pass through here.
pub fn derive_risk_level(status: u16, action: AuditAction, category: AuditCategory) -> RiskLevel {
    if status >= 500 {
        return RiskLevel::High;
    }
    if status == 401 || status == 403 {
        return RiskLevel::Medium;
    }
    if action == AuditAction::LoginFailed {
        return RiskLevel::Medium;
    }
    if action.is_sensitive() || category == AuditCategory::Admin {
        return RiskLevel::Medium;
    }
    RiskLevel::Low
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_are_high() {
        assert_eq!(
            derive_risk_level(502, AuditAction::View, AuditCategory::Product),
            RiskLevel::High
        );
    }

    #[test]
    fn test_auth_failures_are_medium() {
        assert_eq!(
            derive_risk_level(401, AuditAction::View, AuditCategory::User),
            RiskLevel::Medium
        );
        assert_eq!(
            derive_risk_level(403, AuditAction::BlockedIp, AuditCategory::Security),
            RiskLevel::Medium
        );
        assert_eq!(
            derive_risk_level(400, AuditAction::LoginFailed, AuditCategory::Auth),
            RiskLevel::Medium
        );
    }

    #[test]
    fn test_destructive_and_admin_are_medium() {
        assert_eq!(
            derive_risk_level(204, AuditAction::Delete, AuditCategory::Order),
            RiskLevel::Medium
        );
        assert_eq!(
            derive_risk_level(200, AuditAction::View, AuditCategory::Admin),
            RiskLevel::Medium
        );
    }

    #[test]
    fn test_ordinary_traffic_is_low() {
        assert_eq!(
            derive_risk_level(200, AuditAction::View, AuditCategory::Product),
            RiskLevel::Low
        );
        assert_eq!(
            derive_risk_level(429, AuditAction::RateLimitExceeded, AuditCategory::Security),
            RiskLevel::Low
        );
    }
}
