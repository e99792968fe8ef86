//! Tracing setup shared by prerender-gate binaries: fmt logging to stderr with
//! optional OTLP span export.

pub mod config;
pub mod otlp;
pub mod spans;

pub use config::{OtlpProtocol, TracingConfig};
pub use otlp::{init_tracing, TracingGuard};
