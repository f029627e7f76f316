//! Intercepting TLS proxy.
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!   HTTPS :443 ──SNI────▶│ SniAcceptor ─┐                               │
//!                        │              ├─▶ Dispatcher ─▶ route table ──┼──▶ upstream
//!   HTTP  :80 ───Host───▶│ axum app ────┘      │              │         │
//!                        │                  /certs/*     intercept      │
//!                        │                               handlers       │
//!                        │                          ┌───────┴───────┐   │
//!                        │                    artifact cache   session  │
//!                        │                                      store   │
//!   echo ports ─────────▶│ byte echo                                    │
//!                        └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use intercept_proxy::config::load_config;
use intercept_proxy::lifecycle::{wait_for_signal, Shutdown};
use intercept_proxy::observability::{logging, metrics};
use intercept_proxy::ProxyServer;

#[derive(Parser)]
#[command(name = "intercept-proxy")]
#[command(about = "Intercepting TLS proxy with SNI-selected virtual hosts", long_about = None)]
struct Cli {
    /// Configuration file.
    #[arg(short, long, default_value = "proxy.toml")]
    config: PathBuf,

    /// Overrides `observability.log_level`.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }
    logging::init(&config.observability)?;

    tracing::info!("intercept-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        config = %cli.config.display(),
        hosts = config.hosts.len(),
        https_address = %config.listener.https_address,
        http_address = %config.listener.http_address,
        echo_ports = ?config.listener.echo_ports,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = ProxyServer::new(config)?;

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            wait_for_signal().await;
            shutdown.trigger();
        }
    });

    server.run(receiver).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
