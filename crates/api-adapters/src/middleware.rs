//! tipline/crates/api-adapters/src/middleware.rs
//!
//! Request-side plumbing: client identification, CORS and response headers.

use axum::{
    extract::{ConnectInfo, FromRef, FromRequestParts, Request},
    http::{
        header::{CONTENT_TYPE, USER_AGENT},
        request::Parts,
        HeaderMap, HeaderName, HeaderValue, Method,
    },
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::cors::CorsLayer;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

const UNKNOWN: &str = "unknown";

/// Whether client-supplied forwarding headers name the caller. Anyone can
/// set them, so they only count behind a proxy that overwrites them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProxyPolicy {
    pub trust_forwarded_headers: bool,
}

impl ProxyPolicy {
    pub fn behind_proxy() -> Self {
        Self {
            trust_forwarded_headers: true,
        }
    }
}

/// Who is calling, as far as the request tells us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub network_address: String,
    pub client_signature: String,
    pub session_token: Option<String>,
}

impl<S> FromRequestParts<S> for ClientInfo
where
    ProxyPolicy: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let policy = ProxyPolicy::from_ref(state);
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(Self {
            network_address: client_address(&parts.headers, peer, policy),
            client_signature: header_str(&parts.headers, USER_AGENT.as_str())
                .unwrap_or(UNKNOWN)
                .to_string(),
            session_token: header_str(&parts.headers, SESSION_TOKEN_HEADER).map(str::to_string),
        })
    }
}

/// With a trusted proxy: first `X-Forwarded-For` hop, then `X-Real-IP`,
/// then the socket peer. Otherwise the socket peer only.
pub fn client_address(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    policy: ProxyPolicy,
) -> String {
    let peer_address = || {
        peer.map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| UNKNOWN.to_string())
    };

    if !policy.trust_forwarded_headers {
        return peer_address();
    }

    if let Some(first) = header_str(headers, "x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return first.to_string();
    }

    if let Some(real_ip) = header_str(headers, "x-real-ip") {
        return real_ip.to_string();
    }

    peer_address()
}

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

pub fn cors_policy() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            CONTENT_TYPE,
            HeaderName::from_static(ADMIN_TOKEN_HEADER),
            HeaderName::from_static(SESSION_TOKEN_HEADER),
        ])
        .max_age(Duration::from_secs(60 * 60))
}

/// Tip responses must not be cached or leak where the reader came from.
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
    headers.insert("Cache-Control", HeaderValue::from_static("no-store"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    const TRUSTED: ProxyPolicy = ProxyPolicy {
        trust_forwarded_headers: true,
    };

    #[test]
    fn forwarded_for_wins_behind_a_proxy() {
        let map = headers(&[
            ("x-forwarded-for", "198.51.100.1, 10.0.0.1"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        let peer = "127.0.0.1:9000".parse().ok();
        assert_eq!(client_address(&map, peer, TRUSTED), "198.51.100.1");
    }

    #[test]
    fn real_ip_then_peer() {
        let peer = "127.0.0.1:9000".parse().ok();
        assert_eq!(
            client_address(&headers(&[("x-real-ip", "198.51.100.2")]), peer, TRUSTED),
            "198.51.100.2"
        );
        assert_eq!(client_address(&HeaderMap::new(), peer, TRUSTED), "127.0.0.1");
        assert_eq!(client_address(&HeaderMap::new(), None, TRUSTED), "unknown");
    }

    #[test]
    fn empty_forwarded_entry_is_skipped() {
        let map = headers(&[("x-forwarded-for", " , 10.0.0.1"), ("x-real-ip", "198.51.100.2")]);
        assert_eq!(client_address(&map, None, TRUSTED), "198.51.100.2");
    }

    #[test]
    fn forwarding_headers_are_ignored_by_default() {
        let map = headers(&[
            ("x-forwarded-for", "198.51.100.1"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        let peer = "203.0.113.9:40000".parse().ok();
        assert_eq!(client_address(&map, peer, ProxyPolicy::default()), "203.0.113.9");
        assert_eq!(client_address(&map, None, ProxyPolicy::default()), "unknown");
    }
}
