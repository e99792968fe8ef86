//! Subscriber installation, OTLP exporter setup and TracingGuard.

use anyhow::Result;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::config::{OtlpProtocol, TracingConfig};

/// RAII guard that shuts down the tracer provider on drop.
pub struct TracingGuard {
    provider: Option<SdkTracerProvider>,
}

impl TracingGuard {
    /// Whether spans are being exported over OTLP.
    pub fn exporting(&self) -> bool {
        self.provider.is_some()
    }
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        if let Some(ref mut provider) = self.provider {
            if let Err(e) = provider.shutdown() {
                eprintln!("Failed to shutdown tracer provider: {e}");
            }
        }
    }
}

/// Initialize the tracing subsystem with fmt logging and optional OTLP export.
///
/// If the OTLP exporter fails to initialize (e.g. endpoint unreachable),
/// falls back to fmt-only tracing so the gate can start without a collector.
///
/// Returns a [`TracingGuard`] that must be held for the lifetime of the application
/// to ensure traces are flushed on shutdown.
pub fn init_tracing(config: &TracingConfig) -> TracingGuard {
    let Some(endpoint) = config.otlp_endpoint.clone() else {
        install(config, None);
        return TracingGuard { provider: None };
    };

    match build_provider(config, &endpoint) {
        Ok(provider) => {
            let tracer = provider.tracer(config.service_name.clone());
            install(config, Some(tracing_opentelemetry::layer().with_tracer(tracer)));

            tracing::info!(
                endpoint = %endpoint,
                service = %config.service_name,
                protocol = ?config.protocol,
                "OpenTelemetry OTLP tracing initialized"
            );

            TracingGuard {
                provider: Some(provider),
            }
        }
        Err(e) => {
            install(config, None);

            tracing::warn!(
                error = %e,
                endpoint = %endpoint,
                "OTLP exporter failed to initialize, running with fmt-only tracing"
            );

            TracingGuard { provider: None }
        }
    }
}

/// Assemble and install the global subscriber.
fn install(config: &TracingConfig, otel: Option<OpenTelemetryLayer<Registry, SdkTracer>>) {
    let env_filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let json = config.json.then(|| {
        fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
    });
    let plain = (!config.json).then(|| {
        fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(otel)
        .with(json)
        .with(plain)
        .with(env_filter)
        .init();
}

/// Build a tracer provider with a batch OTLP exporter. Returns Err if the
/// exporter cannot be built.
fn build_provider(config: &TracingConfig, endpoint: &str) -> Result<SdkTracerProvider> {
    let otlp_exporter = match config.protocol {
        OtlpProtocol::Grpc => opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?,
        OtlpProtocol::Http => opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()?,
    };

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(otlp_exporter)
        .with_resource(
            opentelemetry_sdk::Resource::builder_empty()
                .with_service_name(config.service_name.clone())
                .build(),
        )
        .build())
}
