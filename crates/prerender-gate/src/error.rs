//! Error types for setup and for the render path.

use std::time::Duration;

/// Failure on the authoritative render path.
///
/// These never produce an error page: the middleware hands them to the next
/// handler (see [`crate::middleware::RenderFailure`]) and the application
/// answers the request as it normally would.
#[derive(Debug, thiserror::Error)]
pub enum PrerenderError {
    /// The render service could not be reached or the exchange failed.
    #[error("render service request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The render service did not answer within the configured timeout.
    #[error("render service timed out after {0:?}")]
    Timeout(Duration),

    /// The response body failed mid-stream.
    #[error("failed to read render response body: {0}")]
    Body(#[source] reqwest::Error),

    /// The response claimed gzip encoding but did not decode.
    #[error("failed to decompress render response: {0}")]
    Decompression(#[from] std::io::Error),

    /// The composed backend URL did not parse.
    #[error("invalid render target {target}: {source}")]
    InvalidTarget {
        target: String,
        #[source]
        source: url::ParseError,
    },
}

/// Invalid configuration, reported once at setup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A whitelist or blacklist entry is not a valid regular expression.
    #[error("invalid {list} pattern: {source}")]
    InvalidPattern {
        list: &'static str,
        #[source]
        source: regex::Error,
    },

    /// The shadow service was selected as authoritative but has no URL.
    #[error("engine `shadow` selected but no shadow service URL is configured")]
    MissingShadowService,

    /// `PRERENDER_ENGINE` names neither known engine.
    #[error("unknown render engine `{0}`")]
    UnknownEngine(String),

    /// A backend base URL is not an absolute http(s) URL.
    #[error("invalid {name} service URL `{url}`")]
    InvalidServiceUrl { name: &'static str, url: String },

    /// The render token cannot be sent as a header value.
    #[error("render token contains characters not allowed in a header")]
    InvalidToken,

    /// The outbound HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
