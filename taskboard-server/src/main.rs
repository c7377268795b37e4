//! Taskboard server -- REST task API with real-time WebSocket fan-out.
//!
//! Clients create, update, and delete tasks over HTTP; every change is pushed
//! to all clients connected on `/ws`. Clients may also push task events over
//! their WebSocket, which are rebroadcast to everyone.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:5040
//! cargo run --bin taskboard-server
//!
//! # Run on custom address
//! cargo run --bin taskboard-server -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! TASKBOARD_ADDR=127.0.0.1:8080 cargo run --bin taskboard-server
//! ```

use clap::Parser;
use taskboard_server::config::{ServerCliArgs, ServerConfig};
use taskboard_server::server;

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting taskboard server");

    let mut handle = match server::start_server(&config).await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %handle.addr, "server listening");

    tokio::select! {
        result = &mut handle.server => {
            if let Err(e) = result {
                tracing::error!(error = %e, "server task failed");
            }
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            handle.shutdown().await;
        }
    }
}
