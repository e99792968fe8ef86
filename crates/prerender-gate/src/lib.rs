//! prerender-gate: serve pre-rendered page snapshots to crawlers and
//! link-preview bots.
//!
//! Eligible requests (GET/HEAD from a crawler, not a static asset, allowed by
//! the configured lists) are forwarded to a render service and the rendered
//! page is returned to the client. A second render service can be observed in
//! the background for comparison. Everything else, including every render
//! failure, falls through to the application.

pub mod agents;
pub mod classify;
pub mod config;
pub mod error;
pub mod hooks;
pub mod middleware;
pub mod pipeline;
pub mod proxy;
pub mod stats;
pub mod target;

pub use classify::{should_prerender, EligibilityLists};
pub use config::{Engine, GateConfig, PrerenderSettings};
pub use error::{ConfigError, PrerenderError};
pub use hooks::{AuditDecision, CachedRender, RenderAuditor, RenderCache};
pub use middleware::{prerender, RenderFailure};
pub use pipeline::{Prerender, RenderOutcome, RenderedPage};
pub use target::{build_targets, BackendTargets, SecureConnection};
