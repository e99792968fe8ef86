//! Render service calls: authoritative fetch, observed shadow dispatch,
//! body normalization.

pub mod client;
pub mod correlation;
pub mod normalize;
pub mod shadow;

/// Headers that are never copied between hops (RFC 9110 §7.6.1), plus `host`,
/// which render services resolve from the target URL.
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "host",
    "connection",
    "transfer-encoding",
    "keep-alive",
    "upgrade",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
];

pub(crate) fn is_hop_by_hop(name: &http::HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}
