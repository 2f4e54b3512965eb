//! Request inspection helpers.
//!
//! Client address resolution: the socket peer is authoritative unless it is
//! a configured trusted proxy, in which case `X-Forwarded-For` is walked from
//! the right and the first untrusted hop wins.

use std::net::IpAddr;

use axum::http::{header, HeaderMap};

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";

/// Resolve the address a request should be attributed to.
pub fn resolve_client_ip(peer: IpAddr, headers: &HeaderMap, trusted_proxies: &[IpAddr]) -> IpAddr {
    if !trusted_proxies.contains(&peer) {
        return peer;
    }

    if let Some(chain) = headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        let hops: Vec<IpAddr> = chain
            .split(',')
            .filter_map(|hop| hop.trim().parse().ok())
            .collect();

        if let Some(client) = hops.iter().rev().find(|ip| !trusted_proxies.contains(ip)) {
            return *client;
        }
        if let Some(first) = hops.first() {
            return *first;
        }
    }

    headers
        .get(X_REAL_IP)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(peer)
}

pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Declared body length, if the client sent one.
pub fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_untrusted_peer_ignores_forwarded_header() {
        let h = headers(&[(X_FORWARDED_FOR, "1.1.1.1")]);
        assert_eq!(resolve_client_ip(ip("8.8.8.8"), &h, &[]), ip("8.8.8.8"));
    }

    #[test]
    fn test_trusted_peer_uses_rightmost_untrusted_hop() {
        let trusted = [ip("10.0.0.1"), ip("10.0.0.2")];
        let h = headers(&[(X_FORWARDED_FOR, "6.6.6.6, 203.0.113.7, 10.0.0.2")]);
        assert_eq!(resolve_client_ip(ip("10.0.0.1"), &h, &trusted), ip("203.0.113.7"));
    }

    #[test]
    fn test_trusted_peer_falls_back_to_real_ip_then_peer() {
        let trusted = [ip("10.0.0.1")];
        let h = headers(&[(X_REAL_IP, "198.51.100.4")]);
        assert_eq!(resolve_client_ip(ip("10.0.0.1"), &h, &trusted), ip("198.51.100.4"));
        assert_eq!(resolve_client_ip(ip("10.0.0.1"), &HeaderMap::new(), &trusted), ip("10.0.0.1"));
    }

    #[test]
    fn test_garbage_hops_are_skipped() {
        let trusted = [ip("10.0.0.1")];
        let h = headers(&[(X_FORWARDED_FOR, "nonsense, 192.0.2.9")]);
        assert_eq!(resolve_client_ip(ip("10.0.0.1"), &h, &trusted), ip("192.0.2.9"));
    }

    #[test]
    fn test_content_length() {
        assert_eq!(content_length(&headers(&[("content-length", "42")])), Some(42));
        assert_eq!(content_length(&HeaderMap::new()), None);
    }
}
