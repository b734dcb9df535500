use std::path::PathBuf;

use clap::Parser;

use mtls_proxy::config::load_config;
use mtls_proxy::lifecycle::{signals, DrainController};
use mtls_proxy::net::listener::Listener;
use mtls_proxy::observability::{logging, metrics};
use mtls_proxy::ProxyServer;

#[derive(Parser)]
#[command(name = "mtls-proxy")]
#[command(about = "Mutual-TLS terminating L4 reverse proxy", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "proxy.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Configuration errors are fatal before logging is up; they surface on
    // stderr through the error return.
    let config = load_config(&cli.config)?;

    logging::init(&config.observability);
    tracing::info!(
        config = %cli.config.display(),
        bind_address = %config.listener.bind_address,
        "mtls-proxy starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = Listener::bind(&config.listener).await?;

    let drain = DrainController::new();
    let drain_signal = drain.signal();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        drain.begin_drain();
    });

    let server = ProxyServer::new(config)?;
    server.run(listener, drain_signal).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
