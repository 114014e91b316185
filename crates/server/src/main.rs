use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use encodeall_core::encoder::{EncoderCapabilities, EncoderStatus};
use encodeall_core::{load_config_or_default, validate_config};
use encodeall_server::api::create_router;
use encodeall_server::metrics::spawn_event_metrics;
use encodeall_server::state::{create_supervisor, AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("encode-all {}", VERSION);

    let config_path = std::env::var("ENCODEALL_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    validate_config(&config).context("Configuration validation failed")?;
    info!("Configuration loaded successfully");

    let ffmpeg_path = config.encoder.ffmpeg_path.clone();
    let status = EncoderStatus::check(&ffmpeg_path).await;
    if status.installed {
        info!(
            "Found encoder at {:?} (version {})",
            ffmpeg_path,
            status.version.as_deref().unwrap_or("unknown")
        );
    } else {
        warn!(
            "Encoder {:?} is not usable: {}",
            ffmpeg_path,
            status.error.as_deref().unwrap_or("unknown error")
        );
    }

    let capabilities = EncoderCapabilities::detect(&ffmpeg_path).await;
    info!(
        "Hardware encoders available: {}",
        capabilities.has_hardware_encoder()
    );

    let supervisor = create_supervisor(&config);
    let metrics_task = spawn_event_metrics(supervisor.subscribe());

    let state = Arc::new(AppState::new(
        config.clone(),
        supervisor.clone(),
        capabilities,
    ));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    let cancelled = supervisor.cancel_encoding(None).await;
    if cancelled > 0 {
        info!("Cancelled {} running jobs", cancelled);
    }
    metrics_task.abort();

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
