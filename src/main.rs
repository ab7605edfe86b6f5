//! SockJS XHR echo server.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────────┐
//!   xhr /         │  ┌────────┐   ┌──────────┐   ┌─────────┐   ┌───────────┐ │
//!   xhr_streaming─┼─▶│  http  │──▶│ registry │──▶│ session │──▶│ listener  │─┼─▶ response
//!                 │  │handlers│   └──────────┘   │ engine  │   │poll/stream│ │   body
//!   xhr_send ─────┼─▶│        │──────────────────▶│         │   └───────────┘ │
//!                 │  └────────┘                  └────┬────┘                 │
//!                 │                                   │ on_message           │
//!                 │                              ┌────▼────┐                 │
//!                 │                              │ handler │ (echo)          │
//!                 │                              └─────────┘                 │
//!                 │  config · observability · lifecycle                      │
//!                 └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use sockjs_xhr::config::{load_config, AppConfig, ConfigWatcher};
use sockjs_xhr::lifecycle::{shutdown_on_signal, Shutdown};
use sockjs_xhr::observability::{logging, metrics};
use sockjs_xhr::{EchoHandler, HttpServer};

#[derive(Parser, Debug)]
#[command(name = "sockjs-xhr")]
#[command(about = "SockJS XHR polling and streaming echo server", long_about = None)]
struct Args {
    /// Path to a TOML configuration file; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "sockjs-xhr starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        prefix = %config.sockjs.prefix,
        session_timeout_ms = config.sockjs.session_timeout_ms,
        heartbeat_period_ms = config.sockjs.heartbeat_period_ms,
        max_bytes_streaming = config.sockjs.max_bytes_streaming,
        "Configuration loaded"
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

    // Keep the watcher alive for the lifetime of the server.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(shutdown_on_signal(shutdown));

    let server = HttpServer::new(config, Arc::new(EchoHandler));
    server.run(listener, config_updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
