//! # Keystone Server
//!
//! Main entry point for the Keystone cache-access layer.
//!
//! Loads configuration, builds the remote store and the cache façade, runs a
//! start-up self check and keeps the health monitor running until the
//! process is asked to stop.

use keystone_cache::register_metrics;
use keystone_config::ConfigLoader;
use keystone_core::{init_logging, CacheResult};
use keystone_server::app::AppBuilder;
use keystone_server::startup::{print_banner, print_startup_info};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Application error: {}", e);
        eprintln!("keystone-server: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> CacheResult<()> {
    // Load configuration
    let config_loader = ConfigLoader::from_default_location()?;
    let config = config_loader.get().await;

    // Initialize logging
    init_logging(&config.logging)?;

    print_banner();
    info!("Starting Keystone Server...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.environment);
    print_startup_info(&config);

    register_metrics();

    let app = AppBuilder::new().with_config(config).build()?;
    app.run(shutdown_signal()).await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        () = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}
