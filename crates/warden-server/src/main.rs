//! Warden server: application entry point.

use std::process::ExitCode;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use warden_core::error::{WardenError, WardenResult};
use warden_server::config::ServerConfig;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> ExitCode {
    // Loaded first so RUST_LOG may come from the file.
    let env_file = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warden=info")),
        )
        .json()
        .init();

    match env_file {
        Ok(path) => info!(path = %path.display(), "Loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "Failed to read environment file"),
    }

    match run().await {
        Ok(()) => {
            info!("Warden server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, class = ?e.class(), "Warden server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> WardenResult<()> {
    let config = ServerConfig::from_env()?;
    info!("Starting Warden server...");

    let state = warden_server::build(config).await?;
    info!("Warden core ready");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| WardenError::Internal(format!("signal handler: {e}")))?;

    info!(in_flight = state.dispatcher.in_flight(), "Shutting down, draining background jobs");
    if tokio::time::timeout(SHUTDOWN_GRACE, state.dispatcher.flush())
        .await
        .is_err()
    {
        warn!(
            dropped = state.dispatcher.in_flight(),
            "Background jobs still pending at shutdown"
        );
    }
    Ok(())
}
