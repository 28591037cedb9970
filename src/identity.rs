//! Deriving the rate limit identifier for a request.
//!
//! Callers presenting an API key are limited per key; everyone else per
//! client address. Keys are hashed before they reach the limiter so raw
//! credentials never sit in the window map.

use axum::extract::ConnectInfo;
use axum::http::HeaderMap;
use sha2::{Digest, Sha256};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Hex characters of the SHA-256 digest kept in a key fingerprint.
const FINGERPRINT_LEN: usize = 16;

/// Identifier for the caller behind `headers`.
pub fn identify(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trust_proxy: bool,
) -> String {
    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty());

    match api_key {
        Some(key) => format!("key:{}", api_key_fingerprint(key)),
        None => {
            let ip = extract_client_ip(headers, connect_info, trust_proxy);
            format!("ip:{}", normalize_ip(ip))
        }
    }
}

pub fn api_key_fingerprint(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    let mut hex = format!("{digest:x}");
    hex.truncate(FINGERPRINT_LEN);
    hex
}

/// Proxy headers consulted in order when `trust_proxy` is set. Only the
/// first (client-most) hop of a comma-separated list counts.
const PROXY_HEADERS: [&str; 2] = ["x-forwarded-for", "x-real-ip"];

/// Client address from trusted proxy headers, then the socket peer, then loopback.
pub fn extract_client_ip(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trust_proxy: bool,
) -> IpAddr {
    let from_proxy = PROXY_HEADERS
        .iter()
        .filter(|_| trust_proxy)
        .filter_map(|name| headers.get(*name)?.to_str().ok())
        .find_map(|value| value.split(',').next()?.trim().parse().ok());

    from_proxy
        .or_else(|| connect_info.map(|ConnectInfo(addr)| addr.ip()))
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Key an address the way a quota should see it: IPv4 (and IPv4-mapped IPv6)
/// as the plain dotted form, other IPv6 by its /64 allocation.
pub fn normalize_ip(ip: IpAddr) -> String {
    let v6 = match ip {
        IpAddr::V4(v4) => return v4.to_string(),
        IpAddr::V6(v6) => v6,
    };
    if let Some(v4) = v6.to_ipv4_mapped() {
        return v4.to_string();
    }

    let [a, b, c, d, ..] = v6.segments();
    format!("{a:x}:{b:x}:{c:x}:{d:x}::/64")
}
