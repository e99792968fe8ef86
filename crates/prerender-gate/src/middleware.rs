//! Axum binding for the render gate.
//!
//! ```ignore
//! let gate = Arc::new(Prerender::builder(settings).build()?);
//! let app = Router::new()
//!     .fallback(handle_app)
//!     .layer(axum::middleware::from_fn_with_state(gate, prerender));
//! ```

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::Instrument;

use crate::error::PrerenderError;
use crate::pipeline::{Prerender, RenderOutcome};
use crate::proxy::correlation;

/// Request extension carrying the render failure to the next handler.
#[derive(Debug, Clone)]
pub struct RenderFailure(pub Arc<PrerenderError>);

/// Serve a rendered snapshot, or pass the request on unchanged.
///
/// Exactly one of "write the snapshot" and "run `next`" happens. On a render
/// failure `next` runs with a [`RenderFailure`] extension attached; the
/// client never sees the failure itself.
pub async fn prerender(
    State(gate): State<Arc<Prerender>>,
    request: Request,
    next: Next,
) -> Response {
    let correlation_id = correlation::generate_id();
    let span = prerender_tracing::render_request_span!(
        &correlation_id,
        request.method(),
        request.uri().path()
    );

    let (parts, body) = request.into_parts();
    let outcome = gate
        .decide(&parts, &correlation_id)
        .instrument(span.clone())
        .await;

    match outcome {
        RenderOutcome::Serve(page) => {
            span.record("outcome", "served");
            page.into_response()
        }
        RenderOutcome::Fallthrough => {
            span.record("outcome", "fallthrough");
            next.run(Request::from_parts(parts, body)).await
        }
        RenderOutcome::Error(e) => {
            span.record("outcome", "error");
            span.in_scope(|| {
                tracing::warn!(error = %e, "Render failed, passing request through");
            });
            let mut request = Request::from_parts(parts, body);
            request.extensions_mut().insert(RenderFailure(Arc::new(e)));
            next.run(request).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::IntoFuture;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::http::header::{CONTENT_ENCODING, CONTENT_TYPE, USER_AGENT};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::Html;
    use axum::Router;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use futures_core::future::BoxFuture;
    use http::request::Parts;
    use std::io::Write;

    use crate::config::{PrerenderConfig, PrerenderSettings, ShadowConfig};
    use crate::hooks::{AuditDecision, CachedRender, HookError, RenderAuditor, RenderCache};
    use crate::pipeline::{PrerenderBuilder, RenderedPage};

    const GOOGLEBOT: &str = "Mozilla/5.0 (compatible; Googlebot/2.1)";
    const ORIGIN_BODY: &str = "origin app";

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(axum::serve(listener, app).into_future());
        addr
    }

    /// Render backend that counts hits and answers with `<html>ok</html>`.
    async fn html_backend(hits: Arc<AtomicUsize>) -> SocketAddr {
        serve(Router::new().fallback(move || {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Html("<html>ok</html>")
            }
        }))
        .await
    }

    fn refused_addr() -> SocketAddr {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr
    }

    fn settings(primary: SocketAddr, shadow: Option<SocketAddr>) -> PrerenderSettings {
        let prerender = PrerenderConfig {
            service_url: format!("http://{primary}/"),
            timeout_secs: 2,
            ..PrerenderConfig::default()
        };
        let shadow = ShadowConfig {
            service_url: shadow.map(|a| format!("http://{a}")).unwrap_or_default(),
            timeout_secs: 2,
            ..ShadowConfig::default()
        };
        PrerenderSettings::from_config(&prerender, &shadow).unwrap()
    }

    /// Application behind the gate: reports whether it saw a render failure.
    async fn origin(request: Request) -> (StatusCode, String) {
        match request.extensions().get::<RenderFailure>() {
            Some(RenderFailure(e)) => (StatusCode::OK, format!("{ORIGIN_BODY}; render error: {e}")),
            None => (StatusCode::OK, ORIGIN_BODY.to_string()),
        }
    }

    async fn gate(builder: PrerenderBuilder) -> SocketAddr {
        let gate = Arc::new(builder.build().unwrap());
        serve(
            Router::new()
                .fallback(origin)
                .layer(axum::middleware::from_fn_with_state(gate, prerender)),
        )
        .await
    }

    async fn get(addr: SocketAddr, path: &str, user_agent: &str) -> reqwest::Response {
        reqwest::Client::new()
            .get(format!("http://{addr}{path}"))
            .header(USER_AGENT, user_agent)
            .send()
            .await
            .unwrap()
    }

    struct StaticCache(CachedRender);

    impl RenderCache for StaticCache {
        fn lookup<'a>(
            &'a self,
            _request: &'a Parts,
        ) -> BoxFuture<'a, Result<Option<CachedRender>, HookError>> {
            Box::pin(async move { Ok(Some(self.0.clone())) })
        }
    }

    struct FailingCache;

    impl RenderCache for FailingCache {
        fn lookup<'a>(
            &'a self,
            _request: &'a Parts,
        ) -> BoxFuture<'a, Result<Option<CachedRender>, HookError>> {
            Box::pin(async { Err("cache offline".into()) })
        }
    }

    struct CancelAll;

    impl RenderAuditor for CancelAll {
        fn after_render<'a>(
            &'a self,
            _error: Option<&'a PrerenderError>,
            _request: &'a Parts,
            _page: Option<&'a RenderedPage>,
        ) -> BoxFuture<'a, AuditDecision> {
            Box::pin(async { AuditDecision::Cancel })
        }
    }

    #[tokio::test]
    async fn test_bot_receives_rendered_page() {
        let hits = Arc::new(AtomicUsize::new(0));
        let backend = html_backend(hits.clone()).await;
        let addr = gate(Prerender::builder(settings(backend, None))).await;

        let resp = get(addr, "/blog/post-1", GOOGLEBOT).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp
            .headers()
            .get(CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/html"));
        assert_eq!(resp.text().await.unwrap(), "<html>ok</html>");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_browser_falls_through() {
        let hits = Arc::new(AtomicUsize::new(0));
        let backend = html_backend(hits.clone()).await;
        let addr = gate(Prerender::builder(settings(backend, None))).await;

        let resp = get(addr, "/blog/post-1", "Mozilla/5.0 Chrome").await;
        assert_eq!(resp.text().await.unwrap(), ORIGIN_BODY);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_backend_receives_page_url_and_forced_headers() {
        let seen: Arc<tokio::sync::Mutex<Option<(String, HeaderMap)>>> = Default::default();
        let seen_clone = seen.clone();
        let backend = serve(Router::new().fallback(move |request: Request| {
            let seen = seen_clone.clone();
            async move {
                *seen.lock().await = Some((request.uri().to_string(), request.headers().clone()));
                Html("<html>ok</html>")
            }
        }))
        .await;
        let addr = gate(Prerender::builder(settings(backend, None))).await;

        get(addr, "/shop?item=7", GOOGLEBOT).await;

        let (uri, headers) = seen.lock().await.clone().expect("backend was called");
        assert_eq!(uri, format!("/http://{addr}/shop?item=7"));
        assert_eq!(headers.get(USER_AGENT).unwrap(), GOOGLEBOT);
        assert_eq!(headers.get("accept-encoding").unwrap(), "gzip");
        assert!(headers.contains_key(correlation::CORRELATION_HEADER));
    }

    #[tokio::test]
    async fn test_gzip_render_is_inflated() {
        let html = "<html><body>compressed snapshot</body></html>";
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(html.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let backend = serve(Router::new().fallback(move || {
            let compressed = compressed.clone();
            async move {
                (
                    [(CONTENT_ENCODING, "gzip"), (CONTENT_TYPE, "text/html")],
                    compressed,
                )
            }
        }))
        .await;
        let addr = gate(Prerender::builder(settings(backend, None))).await;

        let resp = get(addr, "/", GOOGLEBOT).await;
        assert!(resp.headers().get(CONTENT_ENCODING).is_none());
        assert_eq!(resp.text().await.unwrap(), html);
    }

    #[tokio::test]
    async fn test_undecodable_gzip_reaches_next_with_error() {
        let backend = serve(Router::new().fallback(|| async {
            (
                [(CONTENT_ENCODING, "gzip"), (CONTENT_TYPE, "text/html")],
                "<html>not actually gzip</html>",
            )
        }))
        .await;
        let addr = gate(Prerender::builder(settings(backend, None))).await;

        let resp = get(addr, "/", GOOGLEBOT).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.text().await.unwrap();
        assert!(body.starts_with(ORIGIN_BODY), "unexpected body: {body}");
        assert!(
            body.contains("failed to decompress render response"),
            "error not forwarded: {body}"
        );
    }

    #[tokio::test]
    async fn test_upstream_status_passed_through() {
        let backend = serve(Router::new().fallback(|| async {
            (StatusCode::NOT_FOUND, Html("<html>not found</html>"))
        }))
        .await;
        let addr = gate(Prerender::builder(settings(backend, None))).await;

        let resp = get(addr, "/missing", GOOGLEBOT).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.text().await.unwrap(), "<html>not found</html>");
    }

    #[tokio::test]
    async fn test_cancelled_render_falls_through() {
        let hits = Arc::new(AtomicUsize::new(0));
        let backend = html_backend(hits.clone()).await;
        let addr = gate(Prerender::builder(settings(backend, None)).auditor(CancelAll)).await;

        let resp = get(addr, "/", GOOGLEBOT).await;
        assert_eq!(resp.text().await.unwrap(), ORIGIN_BODY);
        // The render happened; only its result was discarded
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connection_refused_reaches_next_with_error() {
        let shadow_hits = Arc::new(AtomicUsize::new(0));
        let shadow = html_backend(shadow_hits.clone()).await;
        let addr = gate(Prerender::builder(settings(refused_addr(), Some(shadow)))).await;

        let resp = get(addr, "/", GOOGLEBOT).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.text().await.unwrap();
        assert!(body.starts_with(ORIGIN_BODY), "unexpected body: {body}");
        assert!(body.contains("render error"), "error not forwarded: {body}");

        tokio::time::sleep(Duration::from_millis(300)).await;
        // Shadow called once, independently, and never retried
        assert_eq!(shadow_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shadow_never_affects_response() {
        let primary_hits = Arc::new(AtomicUsize::new(0));
        let primary = html_backend(primary_hits.clone()).await;
        let shadow = serve(Router::new().fallback(|| async {
            (StatusCode::INTERNAL_SERVER_ERROR, "shadow exploded")
        }))
        .await;
        let addr = gate(Prerender::builder(settings(primary, Some(shadow)))).await;

        let resp = get(addr, "/", GOOGLEBOT).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.text().await.unwrap(), "<html>ok</html>");
        assert_eq!(primary_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shadow_engine_swaps_authority() {
        let primary_hits = Arc::new(AtomicUsize::new(0));
        let primary = html_backend(primary_hits.clone()).await;
        let shadow = serve(Router::new().fallback(|| async { Html("<html>shadow</html>") })).await;

        let mut settings = settings(primary, Some(shadow));
        settings.engine = crate::config::Engine::Shadow;
        let addr = gate(Prerender::builder(settings)).await;

        let resp = get(addr, "/", GOOGLEBOT).await;
        assert_eq!(resp.text().await.unwrap(), "<html>shadow</html>");

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(primary_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_hit_short_circuits() {
        let hits = Arc::new(AtomicUsize::new(0));
        let backend = html_backend(hits.clone()).await;
        let cache = StaticCache(CachedRender::Page {
            status: Some(StatusCode::ACCEPTED),
            body: Some("<html>cached</html>".into()),
        });
        let addr = gate(Prerender::builder(settings(backend, None)).cache(cache)).await;

        let resp = get(addr, "/", GOOGLEBOT).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "text/html");
        assert_eq!(resp.text().await.unwrap(), "<html>cached</html>");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cache_not_consulted_for_ineligible_requests() {
        let hits = Arc::new(AtomicUsize::new(0));
        let backend = html_backend(hits.clone()).await;
        let cache = StaticCache(CachedRender::Html("<html>cached</html>".into()));
        let addr = gate(Prerender::builder(settings(backend, None)).cache(cache)).await;

        let resp = get(addr, "/", "Mozilla/5.0 Chrome").await;
        assert_eq!(resp.text().await.unwrap(), ORIGIN_BODY);
    }

    #[tokio::test]
    async fn test_cache_error_is_a_miss() {
        let hits = Arc::new(AtomicUsize::new(0));
        let backend = html_backend(hits.clone()).await;
        let addr = gate(Prerender::builder(settings(backend, None)).cache(FailingCache)).await;

        let resp = get(addr, "/", GOOGLEBOT).await;
        assert_eq!(resp.text().await.unwrap(), "<html>ok</html>");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_render_times_out_into_fallthrough() {
        let backend = serve(Router::new().fallback(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Html("<html>late</html>")
        }))
        .await;
        let addr = gate(Prerender::builder(settings(backend, None))).await;

        let resp = get(addr, "/", GOOGLEBOT).await;
        let body = resp.text().await.unwrap();
        assert!(body.contains("timed out"), "unexpected body: {body}");
    }
}
