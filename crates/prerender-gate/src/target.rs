//! Reconstruct the page URL the client asked for and address it to the
//! render services.
//!
//! Render services take the page URL appended to their own base URL, e.g.
//! `https://service.prerender.io/https://example.com/blog?page=2`.

use std::sync::OnceLock;

use http::header::HOST;
use http::request::Parts;
use http::uri::Scheme;
use regex::Regex;

use crate::config::PrerenderSettings;

/// Cloudflare's visitor header, e.g. `{"scheme":"https"}`.
const CF_VISITOR_HEADER: &str = "cf-visitor";
const FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";
const FORWARDED_HOST_HEADER: &str = "x-forwarded-host";

/// Request extension set by TLS-terminating listeners.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecureConnection;

/// Per-request render service URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTargets {
    pub primary: String,
    /// `None` when no shadow service is configured.
    pub shadow: Option<String>,
}

/// Compute the render service URLs for `request`.
pub fn build_targets(request: &Parts, settings: &PrerenderSettings) -> BackendTargets {
    let page_url = page_url(request, settings);

    BackendTargets {
        primary: join(&settings.service_url, &page_url),
        shadow: settings
            .shadow_service_url
            .as_deref()
            .map(|base| join(base, &page_url)),
    }
}

/// The absolute URL of the page as the client sees it.
pub fn page_url(request: &Parts, settings: &PrerenderSettings) -> String {
    let path_and_query = request
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    format!(
        "{}://{}{}",
        protocol(request, settings),
        host(request, settings),
        path_and_query
    )
}

fn protocol<'a>(request: &'a Parts, settings: &'a PrerenderSettings) -> &'a str {
    if let Some(protocol) = settings.protocol.as_deref() {
        return protocol;
    }

    let header = |name: &str| request.headers.get(name).and_then(|v| v.to_str().ok());

    if let Some(forwarded) = header(FORWARDED_PROTO_HEADER) {
        return forwarded.split(',').next().unwrap_or_default().trim();
    }

    if let Some(scheme) = header(CF_VISITOR_HEADER).and_then(cf_visitor_scheme) {
        return scheme;
    }

    if is_encrypted(request) {
        "https"
    } else {
        "http"
    }
}

fn host<'a>(request: &'a Parts, settings: &'a PrerenderSettings) -> &'a str {
    if let Some(host) = settings.host.as_deref() {
        return host;
    }

    let header = |name: &str| request.headers.get(name).and_then(|v| v.to_str().ok());

    header(FORWARDED_HOST_HEADER)
        .or_else(|| header(HOST.as_str()))
        .or_else(|| request.uri.authority().map(|a| a.as_str()))
        .unwrap_or_default()
}

fn is_encrypted(request: &Parts) -> bool {
    request.extensions.get::<SecureConnection>().is_some()
        || request.uri.scheme() == Some(&Scheme::HTTPS)
}

fn cf_visitor_scheme(value: &str) -> Option<&'static str> {
    static SCHEME: OnceLock<Regex> = OnceLock::new();
    let re = SCHEME.get_or_init(|| {
        Regex::new(r#""scheme":"(http|https)""#).expect("static regex is valid")
    });

    match re.captures(value)?.get(1)?.as_str() {
        "https" => Some("https"),
        _ => Some("http"),
    }
}

/// Append `page_url` to `base`, inserting a slash unless `base` ends in one.
fn join(base: &str, page_url: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{page_url}")
    } else {
        format!("{base}/{page_url}")
    }
}
