//! Correlation IDs joining one page request to its render service calls.

use uuid::Uuid;

/// Sent on both the authoritative and the observed render request so the two
/// can be matched in render service logs.
pub const CORRELATION_HEADER: &str = "x-prerender-request-id";

/// Generate a new correlation ID (UUID v4).
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
