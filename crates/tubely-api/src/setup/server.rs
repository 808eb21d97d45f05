//! Server startup and graceful shutdown

use anyhow::Result;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tubely_core::Config;

/// Start the server; `shutdown` is cancelled when a termination signal arrives
/// so in-flight uploads stop staging and release their scratch files.
pub async fn start_server(config: &Config, app: Router, shutdown: CancellationToken) -> Result<()> {
    let addr = format!("0.0.0.0:{}", config.server_port());
    tracing::info!(addr = %addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let ingest = config.ingest();
    tracing::info!(
        max_video_mb = config.max_video_size_bytes() / 1024 / 1024,
        content_types = %ingest.allowed_content_types.join(","),
        storage_backend = %config.storage_backend(),
        media_tool_backend = %ingest.media_tool_backend,
        "Server ready and accepting connections"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then cancel `shutdown`.
///
/// # Panics
/// Panics if a signal handler cannot be installed.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
        },
    }

    tracing::info!("Shutting down gracefully...");
    shutdown.cancel();
}
