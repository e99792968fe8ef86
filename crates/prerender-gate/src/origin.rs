//! Origin passthrough: the "next handler" behind the render gate.
//!
//! Every request the gate does not answer is forwarded to the origin
//! application unchanged and the origin's response is streamed back verbatim.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use prerender_gate::proxy::HOP_BY_HOP_HEADERS;
use prerender_gate::RenderFailure;
use tracing::Instrument;

/// Largest request body forwarded to the origin.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Origin application client.
#[derive(Clone)]
pub struct OriginState {
    pub client: reqwest::Client,
    pub origin_url: Arc<str>,
}

/// Forward any request (any HTTP method) to the origin and stream the
/// response back.
pub async fn handle_origin(State(origin): State<OriginState>, request: Request) -> Response {
    let method = request.method().clone();
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .to_string();
    let url = format!("{}{path_and_query}", origin.origin_url.trim_end_matches('/'));

    let span = tracing::info_span!(
        "origin_forward",
        method = %method,
        url = %url,
        status = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );

    if let Some(RenderFailure(e)) = request.extensions().get::<RenderFailure>() {
        span.in_scope(|| tracing::debug!(error = %e, "Serving from origin after render failure"));
    }

    let headers = request.headers().clone();
    let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(error = %e, "Failed to read request body");
            return (StatusCode::BAD_REQUEST, "failed to read request body").into_response();
        }
    };

    let start = Instant::now();

    async {
        let mut req_builder = origin.client.request(method, &url).body(body);

        // Forward non-hop-by-hop headers from the original request
        for (name, value) in headers.iter() {
            if HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
                continue;
            }
            req_builder = req_builder.header(name, value);
        }
        // The origin sees the public host, as it would without the gate
        if !headers.contains_key("x-forwarded-host") {
            if let Some(host) = headers.get("host") {
                req_builder = req_builder.header("x-forwarded-host", host);
            }
        }

        build_response(req_builder.send().await, start)
    }
    .instrument(span)
    .await
}

/// Build an axum Response from the origin result, streaming the body back.
fn build_response(
    upstream_result: Result<reqwest::Response, reqwest::Error>,
    start: Instant,
) -> Response {
    let upstream_resp = match upstream_result {
        Ok(resp) => resp,
        Err(e) => {
            let latency = start.elapsed().as_millis() as u64;
            tracing::Span::current().record("latency_ms", latency);
            tracing::Span::current().record("status", 502_u16);

            if e.is_timeout() {
                tracing::error!(error = %e, "Origin timeout");
                return (StatusCode::GATEWAY_TIMEOUT, "origin timeout").into_response();
            }
            tracing::error!(error = %e, "Origin connection error");
            return (StatusCode::BAD_GATEWAY, "origin connection error").into_response();
        }
    };

    let status = upstream_resp.status();
    let latency = start.elapsed().as_millis() as u64;
    tracing::Span::current().record("latency_ms", latency);
    tracing::Span::current().record("status", status.as_u16());

    let mut response_builder = Response::builder().status(status);

    for (name, value) in upstream_resp.headers().iter() {
        if HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
            continue;
        }
        response_builder = response_builder.header(name, value);
    }

    let body = Body::from_stream(upstream_resp.bytes_stream());

    response_builder.body(body).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to build response");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
    })
}
