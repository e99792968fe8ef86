//! Pipeline controller: the per-request render decision.
//!
//! ```text
//! Start ─ineligible─────────────────────────────────► Fallthrough
//!   │
//!   └─eligible─► cache lookup ─hit─► Serve(cached)
//!                    │
//!                    └─miss─► render ─► audit ─cancel─► Fallthrough
//!                                         ├─page────► Serve(page)
//!                                         └─error───► Error(cause)
//! ```
//!
//! [`Prerender::decide`] performs no response I/O itself; the caller acts on
//! the returned [`RenderOutcome`], which guarantees that exactly one of
//! "write the page" and "call the next handler" happens.

use std::sync::Arc;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::request::Parts;

use crate::classify::should_prerender;
use crate::config::PrerenderSettings;
use crate::error::{ConfigError, PrerenderError};
use crate::hooks::{AuditDecision, CachedRender, NoAudit, NoCache, RenderAuditor, RenderCache};
use crate::proxy::client::RenderClient;
use crate::stats::RenderStats;
use crate::target::build_targets;

/// A rendered page, ready to be written to the client verbatim.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RenderedPage {
    /// A cached render, always served as HTML.
    pub fn from_cache(cached: CachedRender) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        Self {
            status: cached.status(),
            headers,
            body: Bytes::from(cached.into_body()),
        }
    }
}

impl IntoResponse for RenderedPage {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// What the middleware does with a request.
#[derive(Debug)]
pub enum RenderOutcome {
    /// Write this page and stop.
    Serve(RenderedPage),
    /// Hand the request to the next handler.
    Fallthrough,
    /// Hand the request to the next handler along with the render failure.
    Error(PrerenderError),
}

/// The render gate: settings, hooks and the render client.
pub struct Prerender {
    settings: PrerenderSettings,
    client: RenderClient,
    cache: Arc<dyn RenderCache>,
    auditor: Arc<dyn RenderAuditor>,
    stats: RenderStats,
}

/// Builder for [`Prerender`]; hooks default to no-ops.
pub struct PrerenderBuilder {
    settings: PrerenderSettings,
    cache: Arc<dyn RenderCache>,
    auditor: Arc<dyn RenderAuditor>,
    stats: RenderStats,
}

impl PrerenderBuilder {
    /// Lookup consulted before rendering.
    pub fn cache(mut self, cache: impl RenderCache + 'static) -> Self {
        self.cache = Arc::new(cache);
        self
    }

    /// Inspection run after rendering; may veto the page.
    pub fn auditor(mut self, auditor: impl RenderAuditor + 'static) -> Self {
        self.auditor = Arc::new(auditor);
        self
    }

    /// Share counters with the host application.
    pub fn stats(mut self, stats: RenderStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn build(self) -> Result<Prerender, ConfigError> {
        let client = RenderClient::new(&self.settings, self.stats.clone())?;
        Ok(Prerender {
            settings: self.settings,
            client,
            cache: self.cache,
            auditor: self.auditor,
            stats: self.stats,
        })
    }
}

impl Prerender {
    pub fn builder(settings: PrerenderSettings) -> PrerenderBuilder {
        PrerenderBuilder {
            settings,
            cache: Arc::new(NoCache),
            auditor: Arc::new(NoAudit),
            stats: RenderStats::new(),
        }
    }

    pub fn settings(&self) -> &PrerenderSettings {
        &self.settings
    }

    pub fn stats(&self) -> &RenderStats {
        &self.stats
    }

    /// Decide what happens to `request`.
    pub async fn decide(&self, request: &Parts, correlation_id: &str) -> RenderOutcome {
        self.stats.inc_requests();

        if !should_prerender(request, &self.settings.lists) {
            return RenderOutcome::Fallthrough;
        }
        self.stats.inc_eligible();

        match self.cache.lookup(request).await {
            Ok(Some(cached)) => {
                tracing::debug!("Serving cached render");
                self.stats.inc_cache_hits();
                self.stats.inc_served();
                return RenderOutcome::Serve(RenderedPage::from_cache(cached));
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Render cache lookup failed, rendering instead");
            }
        }

        let targets = build_targets(request, &self.settings);
        if self.settings.log_targets {
            tracing::info!(primary = %targets.primary, shadow = ?targets.shadow, "Render targets");
        } else {
            tracing::debug!(primary = %targets.primary, shadow = ?targets.shadow, "Render targets");
        }

        let (page, error) = match self.client.fetch(request, &targets, correlation_id).await {
            Ok(page) => (Some(page), None),
            Err(e) => (None, Some(e)),
        };

        let decision = self
            .auditor
            .after_render(error.as_ref(), request, page.as_ref())
            .await;

        match (decision, page, error) {
            (AuditDecision::Cancel, _, error) => {
                tracing::debug!("Render cancelled by auditor");
                self.stats.inc_cancelled();
                match error {
                    Some(e) => RenderOutcome::Error(e),
                    None => RenderOutcome::Fallthrough,
                }
            }
            (AuditDecision::Keep, Some(page), _) => {
                self.stats.inc_served();
                RenderOutcome::Serve(page)
            }
            (AuditDecision::Keep, None, Some(e)) => {
                self.stats.inc_render_errors();
                RenderOutcome::Error(e)
            }
            (AuditDecision::Keep, None, None) => RenderOutcome::Fallthrough,
        }
    }
}
