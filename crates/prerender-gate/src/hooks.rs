//! Capability hooks around the render.
//!
//! [`RenderCache`] runs before any render service is contacted and may answer
//! the request outright. [`RenderAuditor`] sees the outcome of the render and
//! may veto it, sending the request on to the application instead.

use futures_core::future::BoxFuture;
use http::request::Parts;
use http::StatusCode;

use crate::error::PrerenderError;
use crate::pipeline::RenderedPage;

/// Error type returned by hook implementations.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// A previously rendered page returned by a [`RenderCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedRender {
    /// Served as `200 text/html`.
    Html(String),
    /// Served with `status` (default 200) and `body` (default empty).
    Page {
        status: Option<StatusCode>,
        body: Option<String>,
    },
}

impl CachedRender {
    pub fn status(&self) -> StatusCode {
        match self {
            CachedRender::Html(_) => StatusCode::OK,
            CachedRender::Page { status, .. } => status.unwrap_or(StatusCode::OK),
        }
    }

    pub fn into_body(self) -> String {
        match self {
            CachedRender::Html(body) => body,
            CachedRender::Page { body, .. } => body.unwrap_or_default(),
        }
    }
}

/// What to do with a finished render.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuditDecision {
    /// Serve the render if there is one.
    #[default]
    Keep,
    /// Discard the render and let the application answer.
    Cancel,
}

/// Lookup run before rendering. Only consulted for eligible requests.
pub trait RenderCache: Send + Sync {
    /// Return a cached render to short-circuit the render services.
    ///
    /// Errors are logged and treated as a miss.
    fn lookup<'a>(&'a self, request: &'a Parts)
        -> BoxFuture<'a, Result<Option<CachedRender>, HookError>>;
}

/// Inspection run after every render attempt, successful or not.
pub trait RenderAuditor: Send + Sync {
    fn after_render<'a>(
        &'a self,
        error: Option<&'a PrerenderError>,
        request: &'a Parts,
        page: Option<&'a RenderedPage>,
    ) -> BoxFuture<'a, AuditDecision>;
}

/// Cache that never hits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl RenderCache for NoCache {
    fn lookup<'a>(
        &'a self,
        _request: &'a Parts,
    ) -> BoxFuture<'a, Result<Option<CachedRender>, HookError>> {
        Box::pin(async { Ok(None) })
    }
}

/// Auditor that keeps every render.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAudit;

impl RenderAuditor for NoAudit {
    fn after_render<'a>(
        &'a self,
        _error: Option<&'a PrerenderError>,
        _request: &'a Parts,
        _page: Option<&'a RenderedPage>,
    ) -> BoxFuture<'a, AuditDecision> {
        Box::pin(async { AuditDecision::Keep })
    }
}
