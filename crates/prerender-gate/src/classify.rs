//! Eligibility classifier: decides whether a request gets a rendered snapshot.
//!
//! Pure and synchronous. Evaluated in a fixed order where the first "no" wins:
//! missing user agent, non-GET/HEAD method, loop marker header, static asset,
//! whitelist miss, blacklist hit. Only then does the crawler signal decide.

use http::header::{REFERER, USER_AGENT};
use http::request::Parts;
use http::Method;
use regex::RegexSet;

use crate::agents;
use crate::error::ConfigError;

/// Set by render services on their own page fetches. Requests carrying it
/// must reach the application, or the render would recurse.
pub const PRERENDER_MARKER_HEADER: &str = "x-prerender";

/// Sent by Buffer's link preview fetcher instead of a crawler user agent.
pub const BUFFERBOT_HEADER: &str = "x-bufferbot";

/// Legacy AJAX crawling query key.
pub const ESCAPED_FRAGMENT: &str = "_escaped_fragment_";

/// Whitelist and blacklist, compiled once at setup.
///
/// `None` means the list imposes no restriction. A configured but empty
/// whitelist matches nothing and therefore blocks every request.
#[derive(Debug, Clone, Default)]
pub struct EligibilityLists {
    whitelist: Option<RegexSet>,
    blacklist: Option<RegexSet>,
}

impl EligibilityLists {
    pub fn new(
        whitelist: Option<&[String]>,
        blacklist: Option<&[String]>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            whitelist: whitelist.map(|p| compile("whitelist", p)).transpose()?,
            blacklist: blacklist.map(|p| compile("blacklist", p)).transpose()?,
        })
    }

    /// Lists with no restriction at all.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    fn whitelist_rejects(&self, url: &str) -> bool {
        self.whitelist.as_ref().is_some_and(|set| !set.is_match(url))
    }

    fn blacklist_rejects(&self, url: &str, referer: Option<&str>) -> bool {
        self.blacklist.as_ref().is_some_and(|set| {
            set.is_match(url) || referer.is_some_and(|r| set.is_match(r))
        })
    }
}

fn compile(list: &'static str, patterns: &[String]) -> Result<RegexSet, ConfigError> {
    RegexSet::new(patterns).map_err(|source| ConfigError::InvalidPattern { list, source })
}

/// Decide whether `request` should be answered with a rendered snapshot.
pub fn should_prerender(request: &Parts, lists: &EligibilityLists) -> bool {
    let headers = &request.headers;

    let Some(user_agent) = headers.get(USER_AGENT) else {
        return false;
    };
    // A present but non-UTF-8 user agent cannot match any signature.
    let user_agent = user_agent.to_str().unwrap_or_default();

    if request.method != Method::GET && request.method != Method::HEAD {
        return false;
    }

    if headers.contains_key(PRERENDER_MARKER_HEADER) {
        return false;
    }

    let uri = &request.uri;
    let wants_snapshot = has_escaped_fragment(uri.query())
        || agents::is_crawler(user_agent)
        || headers.contains_key(BUFFERBOT_HEADER);

    if agents::is_static_asset(uri.path()) {
        return false;
    }

    let url = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());

    if lists.whitelist_rejects(url) {
        return false;
    }

    let referer = headers.get(REFERER).and_then(|r| r.to_str().ok());
    if lists.blacklist_rejects(url, referer) {
        return false;
    }

    wants_snapshot
}

fn has_escaped_fragment(query: Option<&str>) -> bool {
    query.is_some_and(|q| {
        url::form_urlencoded::parse(q.as_bytes()).any(|(key, _)| key == ESCAPED_FRAGMENT)
    })
}
