//! Observed render dispatch.
//!
//! The non-authoritative render service gets the same request as the
//! authoritative one so the two can be compared on latency and status. The
//! call runs on its own task: it is never awaited by the page request, its
//! failures are logged and dropped, and it is never retried.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use tokio::sync::Semaphore;
use tracing::Instrument;

use crate::stats::RenderStats;

/// Dispatches fire-and-forget render requests to the observed service.
#[derive(Clone)]
pub struct ShadowDispatcher {
    client: reqwest::Client,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
    stats: RenderStats,
}

impl ShadowDispatcher {
    /// Create a new dispatcher.
    ///
    /// - `timeout`: per-request timeout, covering the body read
    /// - `max_concurrent`: in-flight cap; requests beyond it are dropped
    pub fn new(
        client: reqwest::Client,
        timeout: Duration,
        max_concurrent: usize,
        stats: RenderStats,
    ) -> Self {
        Self {
            client,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            timeout,
            stats,
        }
    }

    /// Spawn a GET to `target` and return immediately.
    pub fn dispatch(&self, target: String, headers: HeaderMap, correlation_id: String) {
        let client = self.client.clone();
        let semaphore = self.semaphore.clone();
        let timeout = self.timeout;
        let stats = self.stats.clone();

        tokio::spawn(async move {
            let span = prerender_tracing::shadow_render_span!(&correlation_id, &target);

            async {
                // Non-blocking acquire: drop if at capacity
                let _permit = match semaphore.try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!("Shadow render semaphore full, dropping request");
                        stats.inc_shadow_dropped();
                        return;
                    }
                };

                let start = Instant::now();

                // The body is read inside the timeout so a stalled stream
                // cannot pin the connection.
                let result = tokio::time::timeout(timeout, async {
                    let resp = client.get(&target).headers(headers).send().await?;
                    let status = resp.status().as_u16();
                    let body = resp.bytes().await?;
                    Ok::<_, reqwest::Error>((status, body.len()))
                })
                .await;

                let latency = start.elapsed().as_millis() as u64;
                tracing::Span::current().record("latency_ms", latency);

                match result {
                    Ok(Ok((status, body_bytes))) => {
                        tracing::Span::current().record("status", status);
                        tracing::Span::current().record("body_bytes", body_bytes as u64);
                        stats.inc_shadow_completed();
                        tracing::info!(
                            status = status,
                            latency_ms = latency,
                            body_bytes = body_bytes,
                            "Shadow render complete"
                        );
                    }
                    Ok(Err(e)) => {
                        tracing::Span::current().record("status", 0_u16);
                        stats.inc_shadow_failed();
                        tracing::warn!(error = %e, latency_ms = latency, "Shadow render failed");
                    }
                    Err(_) => {
                        tracing::Span::current().record("status", 0_u16);
                        stats.inc_shadow_failed();
                        tracing::warn!(
                            latency_ms = latency,
                            timeout_ms = timeout.as_millis() as u64,
                            "Shadow render timed out"
                        );
                    }
                }
            }
            .instrument(span)
            .await;
        });
    }
}
