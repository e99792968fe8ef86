//! prerender-gate: reverse proxy that puts the render gate in front of an
//! origin application. Crawlers get rendered snapshots, everyone else gets
//! the origin.

mod origin;
mod server;

use std::sync::Arc;
use std::time::Duration;

use prerender_gate::stats::RenderStats;
use prerender_gate::{GateConfig, Prerender, PrerenderSettings};

use origin::OriginState;
use server::AppState;

fn main() -> anyhow::Result<()> {
    // Determine config path
    let config_path = {
        let args: Vec<String> = std::env::args().collect();
        args.iter()
            .position(|a| a == "--config")
            .and_then(|i| args.get(i + 1).cloned())
            .or_else(|| args.get(1).filter(|a| !a.starts_with('-')).cloned())
            .or_else(|| std::env::var("PRERENDER_GATE_CONFIG").ok())
            .unwrap_or_else(|| "prerender-gate.toml".to_string())
    };

    let config = GateConfig::load(&config_path)?;

    // The gRPC exporter needs a reactor context, so the runtime comes first
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let _tracing_guard = prerender_tracing::init_tracing(&config.tracing);

        tracing::info!(
            config_path = %config_path,
            listen_address = %config.server.listen_address,
            origin = %config.server.origin_url,
            service_url = %config.prerender.service_url,
            engine = ?config.prerender.engine,
            "Starting prerender-gate"
        );

        run(config).await
    })
}

async fn run(config: GateConfig) -> anyhow::Result<()> {
    let settings = PrerenderSettings::from_config(&config.prerender, &config.shadow)?;

    let stats = RenderStats::new();
    let gate = Prerender::builder(settings).stats(stats).build()?;

    let origin_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.server.origin_timeout_secs))
        .build()?;

    let state = AppState {
        listen_address: config.server.listen_address,
        gate: Arc::new(gate),
        origin: OriginState {
            client: origin_client,
            origin_url: config.server.origin_url.into(),
        },
    };

    server::run(state).await
}
