//! Authoritative render fetch.
//!
//! One GET per eligible page request goes to the service selected by the
//! engine setting and its response becomes the page. The other service, if
//! configured, receives the same request through the [`ShadowDispatcher`].

use std::time::Instant;

use axum::http::header::{ACCEPT_ENCODING, USER_AGENT};
use axum::http::{HeaderMap, HeaderValue};
use http::request::Parts;
use tracing::Instrument;

use super::correlation::CORRELATION_HEADER;
use super::is_hop_by_hop;
use super::normalize::normalize;
use super::shadow::ShadowDispatcher;
use crate::config::{Engine, PrerenderSettings};
use crate::error::{ConfigError, PrerenderError};
use crate::pipeline::RenderedPage;
use crate::stats::RenderStats;
use crate::target::BackendTargets;

/// Authenticates the gate to the render service.
pub const TOKEN_HEADER: &str = "x-prerender-token";

/// Issues render requests and selects which response is authoritative.
#[derive(Clone)]
pub struct RenderClient {
    client: reqwest::Client,
    observer: ShadowDispatcher,
    settings: ClientSettings,
}

#[derive(Clone)]
struct ClientSettings {
    timeout: std::time::Duration,
    token: Option<HeaderValue>,
    forward_headers: bool,
    engine: Engine,
}

impl RenderClient {
    /// Build the authoritative and observed HTTP clients, each with its own
    /// timeout.
    pub fn new(settings: &PrerenderSettings, stats: RenderStats) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;

        let shadow_client = reqwest::Client::builder()
            .timeout(settings.shadow_timeout)
            .build()?;

        let token = settings
            .token
            .as_deref()
            .map(HeaderValue::from_str)
            .transpose()
            .map_err(|_| ConfigError::InvalidToken)?;

        Ok(Self {
            client,
            observer: ShadowDispatcher::new(
                shadow_client,
                settings.shadow_timeout,
                settings.shadow_max_concurrent,
                stats,
            ),
            settings: ClientSettings {
                timeout: settings.timeout,
                token,
                forward_headers: settings.forward_headers,
                engine: settings.engine,
            },
        })
    }

    /// Headers sent to both render services.
    pub fn outbound_headers(&self, request: &Parts, correlation_id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if self.settings.forward_headers {
            for (name, value) in request.headers.iter() {
                if is_hop_by_hop(name) {
                    continue;
                }
                headers.append(name.clone(), value.clone());
            }
        }

        if let Some(user_agent) = request.headers.get(USER_AGENT) {
            headers.insert(USER_AGENT, user_agent.clone());
        }
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

        if let Some(token) = &self.settings.token {
            headers.insert(TOKEN_HEADER, token.clone());
        }

        if let Ok(id) = HeaderValue::from_str(correlation_id) {
            headers.insert(CORRELATION_HEADER, id);
        }

        headers
    }

    /// Render the page: observe the non-authoritative service in the
    /// background, then fetch and normalize the authoritative response.
    pub async fn fetch(
        &self,
        request: &Parts,
        targets: &BackendTargets,
        correlation_id: &str,
    ) -> Result<RenderedPage, PrerenderError> {
        let headers = self.outbound_headers(request, correlation_id);

        let (authoritative, observed) = match (self.settings.engine, &targets.shadow) {
            (Engine::Shadow, Some(shadow)) => (shadow, Some(&targets.primary)),
            (_, shadow) => (&targets.primary, shadow.as_ref()),
        };

        if let Some(observed) = observed {
            self.observer.dispatch(
                observed.clone(),
                headers.clone(),
                correlation_id.to_string(),
            );
        }

        self.render(authoritative, headers, correlation_id).await
    }

    async fn render(
        &self,
        target: &str,
        headers: HeaderMap,
        correlation_id: &str,
    ) -> Result<RenderedPage, PrerenderError> {
        let span = prerender_tracing::render_forward_span!(correlation_id, target);
        let start = Instant::now();

        async {
            let url = reqwest::Url::parse(target).map_err(|source| {
                PrerenderError::InvalidTarget {
                    target: target.to_string(),
                    source,
                }
            })?;

            let response = match self.client.get(url).headers(headers).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    let latency = start.elapsed().as_millis() as u64;
                    tracing::Span::current().record("latency_ms", latency);
                    tracing::Span::current().record("status", 0_u16);
                    return Err(self.transport_error(e));
                }
            };

            let status = response.status().as_u16();
            tracing::Span::current().record("status", status);

            let page = normalize(response).await.map_err(|e| match e {
                PrerenderError::Body(e) if e.is_timeout() => {
                    PrerenderError::Timeout(self.settings.timeout)
                }
                other => other,
            })?;

            let latency = start.elapsed().as_millis() as u64;
            tracing::Span::current().record("latency_ms", latency);
            tracing::info!(
                status = status,
                latency_ms = latency,
                body_bytes = page.body.len(),
                "Render complete"
            );

            Ok::<_, PrerenderError>(page)
        }
        .instrument(span)
        .await
    }

    fn transport_error(&self, e: reqwest::Error) -> PrerenderError {
        if e.is_timeout() {
            tracing::warn!(error = %e, "Render service timeout");
            PrerenderError::Timeout(self.settings.timeout)
        } else {
            tracing::warn!(error = %e, "Render service connection error");
            PrerenderError::Transport(e)
        }
    }
}
