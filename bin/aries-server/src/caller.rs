//! Best-effort caller identification for rate limiting.

use axum::http::HeaderMap;

/// Key shared by every caller whose address cannot be determined.
pub const UNKNOWN_CALLER: &str = "unknown";

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";
const CF_CONNECTING_IP: &str = "cf-connecting-ip";

/// Derive the rate-limit key for a request.
///
/// Proxy headers are trusted as sent: the gate is expected to run behind a
/// proxy or CDN that overwrites them.
pub fn caller_key(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    header(FORWARDED_FOR)
        .and_then(|list| list.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| header(REAL_IP))
        .or_else(|| header(CF_CONNECTING_IP))
        .unwrap_or(UNKNOWN_CALLER)
        .to_owned()
}

// ── Tests ──────────────────────────────────────────────────────────────────────
