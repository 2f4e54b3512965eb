//! Client-visible policy rejections.

use std::fmt;
use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Machine-readable rejection code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionCode {
    IpBlocked,
    RateLimitExceeded,
    SecurityViolation,
    PayloadTooLarge,
}

impl RejectionCode {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectionCode::IpBlocked => "IP_BLOCKED",
            RejectionCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            RejectionCode::SecurityViolation => "SECURITY_VIOLATION",
            RejectionCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            RejectionCode::IpBlocked => StatusCode::FORBIDDEN,
            RejectionCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            RejectionCode::SecurityViolation => StatusCode::BAD_REQUEST,
            RejectionCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    fn message(self) -> &'static str {
        match self {
            RejectionCode::IpBlocked => "Access denied. Your IP address has been blocked.",
            RejectionCode::RateLimitExceeded => "Too many requests. Please try again later.",
            RejectionCode::SecurityViolation => "Request rejected due to potentially malicious content.",
            RejectionCode::PayloadTooLarge => "Request body is too large to be accepted.",
        }
    }
}

impl fmt::Display for RejectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A terminal pipeline outcome short of the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub code: RejectionCode,
    pub retry_after: Option<Duration>,
}

impl Rejection {
    pub fn new(code: RejectionCode) -> Self {
        Self {
            code,
            retry_after: None,
        }
    }

    pub fn rate_limited(retry_after: Duration) -> Self {
        Self {
            code: RejectionCode::RateLimitExceeded,
            retry_after: Some(retry_after),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.code.status()
    }

    /// Whole seconds to wait, rounded up and never below one.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after.map(|d| {
            let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
            secs.max(1)
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RejectionBody {
    message: &'static str,
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let retry_after = self.retry_after_secs();
        let body = RejectionBody {
            message: self.code.message(),
            error: self.code.as_str(),
            retry_after,
        };

        let mut response = (self.status(), Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_rate_limit_response_shape() {
        let response = Rejection::rate_limited(Duration::from_millis(41_200)).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");

        let json = body_json(response).await;
        assert_eq!(json["error"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(json["retryAfter"], 42);
        assert!(json["message"].is_string());
    }

    #[tokio::test]
    async fn test_blocked_response_has_no_retry_hint() {
        let response = Rejection::new(RejectionCode::IpBlocked).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());

        let json = body_json(response).await;
        assert_eq!(json["error"], "IP_BLOCKED");
        assert!(json.get("retryAfter").is_none());
    }

    #[test]
    fn test_retry_after_never_zero() {
        assert_eq!(Rejection::rate_limited(Duration::ZERO).retry_after_secs(), Some(1));
        assert_eq!(Rejection::rate_limited(Duration::from_secs(60)).retry_after_secs(), Some(60));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(RejectionCode::SecurityViolation.status(), StatusCode::BAD_REQUEST);
        assert_eq!(RejectionCode::PayloadTooLarge.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
