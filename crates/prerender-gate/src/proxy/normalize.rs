//! Render response normalization.
//!
//! Render requests advertise `Accept-Encoding: gzip`. A gzip body is inflated
//! as its chunks arrive and the encoding headers are dropped, so the page
//! handed to the client is always an identity-encoded body with headers that
//! describe it. Any other body is passed through byte for byte.

use std::io::Write;

use axum::http::header::{CONTENT_ENCODING, CONTENT_LENGTH};
use axum::http::HeaderMap;
use bytes::{Bytes, BytesMut};
use flate2::write::MultiGzDecoder;

use super::is_hop_by_hop;
use crate::error::PrerenderError;
use crate::pipeline::RenderedPage;

/// Incremental body accumulator, chosen from the response headers.
pub enum BodyDecoder {
    Plain(BytesMut),
    /// Decodes every concatenated gzip member, not only the first.
    Gzip(MultiGzDecoder<Vec<u8>>),
}

impl BodyDecoder {
    pub fn for_headers(headers: &HeaderMap) -> Self {
        if is_gzip(headers) {
            BodyDecoder::Gzip(MultiGzDecoder::new(Vec::new()))
        } else {
            BodyDecoder::Plain(BytesMut::new())
        }
    }

    /// Feed the next body chunk, in arrival order.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), PrerenderError> {
        match self {
            BodyDecoder::Plain(buf) => buf.extend_from_slice(chunk),
            BodyDecoder::Gzip(decoder) => decoder.write_all(chunk)?,
        }
        Ok(())
    }

    pub fn finish(self) -> Result<Bytes, PrerenderError> {
        match self {
            BodyDecoder::Plain(buf) => Ok(buf.freeze()),
            BodyDecoder::Gzip(decoder) => Ok(Bytes::from(decoder.finish()?)),
        }
    }
}

/// Whether the body is gzip-encoded.
pub fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("gzip"))
}

/// Response headers to relay to the client.
///
/// Hop-by-hop headers never apply to the re-framed body. After inflating,
/// `content-encoding` and `content-length` describe the wrong bytes.
pub fn relay_headers(upstream: &HeaderMap, inflated: bool) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream.iter() {
        if is_hop_by_hop(name) {
            continue;
        }
        if inflated && (name == CONTENT_ENCODING || name == CONTENT_LENGTH) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

/// Read a render response to completion and normalize it.
pub async fn normalize(mut response: reqwest::Response) -> Result<RenderedPage, PrerenderError> {
    let status = response.status();
    let gzip = is_gzip(response.headers());
    tracing::Span::current().record("gzip", gzip);

    let mut decoder = BodyDecoder::for_headers(response.headers());
    while let Some(chunk) = response.chunk().await.map_err(PrerenderError::Body)? {
        decoder.push(&chunk)?;
    }
    let body = decoder.finish()?;

    Ok(RenderedPage {
        status,
        headers: relay_headers(response.headers(), gzip),
        body,
    })
}
