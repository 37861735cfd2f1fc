mod error;
mod layers;
mod routes;
mod state;

use clap::Parser;
use pulse_core::{GatewayPublisher, MetricsBackend, Settings, Simulator};
use state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber;

#[derive(Parser)]
#[command(name = "pulse")]
#[command(about = "Metrics apply/push service with strict apply-changes rate limiting", long_about = None)]
#[command(version)]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8000")]
    listen: SocketAddr,

    /// Disable the synthetic metrics simulator
    #[arg(long)]
    no_simulate: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let settings = Settings::from_env();
    let cors = layers::cors_layer(&settings)?;

    let publisher = GatewayPublisher::new(settings.gateway_url.clone(), settings.job_name.clone())?;
    let backend = Arc::new(MetricsBackend::new(Arc::new(publisher)));

    if backend.probe().await {
        info!("Connected to Prometheus pushgateway at {}", settings.gateway_url);
    } else {
        warn!(
            "Cannot connect to pushgateway at {} - make sure it is running and accessible",
            settings.gateway_url
        );
    }

    info!("Starting Metrics Simulator API on {}", cli.listen);
    info!("  Environment: {}", settings.environment);
    info!("  Prometheus gateway: {}", settings.gateway_url);
    info!("  Job name: {}", settings.job_name);
    info!("  Rate limiting:");
    info!(
        "    Apply changes: {} per 15 minutes",
        settings.apply_changes_per_window
    );
    info!(
        "    Other endpoints: {} per minute",
        settings.general_requests_per_minute
    );
    info!("  Authentication: disabled (public API)");
    info!("Endpoints:");
    info!("  GET  /health             - Health check");
    info!("  GET  /api/status         - Registry stats and limits");
    info!("  GET  /metrics            - Exposition snapshot");
    info!("  POST /api/metrics/apply  - Apply metrics (rate limited)");

    let state = AppState::new(settings.clone(), backend.clone());
    let app = routes::router(state).layer(cors);

    let shutdown = CancellationToken::new();
    let simulator = if cli.no_simulate {
        None
    } else {
        Some(Simulator::new(backend, settings.simulate_interval).spawn(shutdown.clone()))
    };

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await?;

    // The token is already cancelled by the shutdown future; wait for the
    // simulator's final tick to finish before exiting.
    if let Some(handle) = simulator {
        let _ = handle.await;
    }
    info!("Shut down Metrics Simulator API");

    Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received, draining in-flight requests");
    token.cancel();
}
