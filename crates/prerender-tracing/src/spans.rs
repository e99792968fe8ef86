//! Span builder helpers for render instrumentation.

/// Create a tracing span for one request handled by the prerender middleware.
///
/// Usage: `let span = render_request_span!(correlation_id, method, path);`
///
/// `outcome` is recorded once the pipeline settles on serve/fallthrough.
#[macro_export]
macro_rules! render_request_span {
    ($correlation_id:expr, $method:expr, $path:expr) => {
        tracing::info_span!(
            "render_request",
            correlation_id = %$correlation_id,
            method = %$method,
            path = %$path,
            outcome = tracing::field::Empty,
        )
    };
}

/// Create a tracing span for the authoritative render fetch.
#[macro_export]
macro_rules! render_forward_span {
    ($correlation_id:expr, $target:expr) => {
        tracing::info_span!(
            "render_forward",
            correlation_id = %$correlation_id,
            target = %$target,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
            gzip = tracing::field::Empty,
        )
    };
}

/// Create a tracing span for an observed (shadow) render fetch.
#[macro_export]
macro_rules! shadow_render_span {
    ($correlation_id:expr, $target:expr) => {
        tracing::info_span!(
            "shadow_render",
            correlation_id = %$correlation_id,
            target = %$target,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
            body_bytes = tracing::field::Empty,
        )
    };
}
