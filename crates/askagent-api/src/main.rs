use anyhow::{Context, Result};
use askagent_api::{AppState, build_router};
use askagent_core::{
    Agent, ConfigLoader, TelemetryOptions, init_telemetry, metrics::init_metrics_from_env,
};
use std::net::SocketAddr;
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ConfigLoader::load(None)?;

    init_telemetry(TelemetryOptions {
        env_filter: std::env::var("RUST_LOG")
            .ok()
            .or_else(|| Some(config.logging.level.clone())),
        with_ansi: false,
        to_stderr: false,
    })?;
    init_metrics_from_env("askagent-api")?;

    let addr: SocketAddr = std::env::var("ASKAGENT_API_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()
        .context("invalid ASKAGENT_API_ADDR")?;

    let request_limit = std::env::var("ASKAGENT_MAX_CONCURRENT_REQUESTS")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|limit| *limit > 0)
        .unwrap_or(16);

    let agent = Agent::from_config(config)?;
    let app = build_router(AppState::new(agent, request_limit));

    info!("askagent API listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
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

    info!("shutdown signal received, stopping server");
}
