use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use storefront_guard::config::{GuardConfig, LogFormat, LoggingConfig};
use storefront_guard::http::{status_routes, HttpServer, ThrottleState};
use storefront_guard::throttle::{MemoryStorage, ThrottlerGuard};

/// Request throttling guard for the storefront admin backend.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "GUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Log output format, overriding the configuration
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = GuardConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }

    init_tracing(&config.logging);

    info!("Starting Storefront Guard");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        info!(path = %path.display(), "Loaded configuration file");
    }
    info!(
        addr = %config.server.addr,
        rules = config.throttle.rules.len(),
        default_limit = config.throttle.default.limit,
        default_ttl_ms = config.throttle.default.ttl_ms,
        "Configuration loaded"
    );

    let storage = Arc::new(MemoryStorage::new());
    let sweeper =
        storage.spawn_sweeper(Duration::from_secs(config.storage.sweep_interval_secs));

    let guard = Arc::new(ThrottlerGuard::new(config.throttle.selector(), storage));
    let state = ThrottleState::new(guard, &config.throttle);
    info!("Throttler guard initialized");

    let server = HttpServer::new(config.server.addr, state);
    server
        .serve_with_shutdown(status_routes(), shutdown_signal())
        .await?;

    sweeper.abort();
    info!("Storefront Guard stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match logging.format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
