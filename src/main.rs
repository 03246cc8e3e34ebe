use std::sync::Arc;

use demo_mcp_server::{
    books_client::OpenLibraryClient, build_app, config::Config, domain::tools::build_registry,
    logging, AppState,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env().inspect_err(|err| {
        error!(error = %err, "invalid configuration");
    })?;
    let client = OpenLibraryClient::new(config.openlibrary_url.clone()).inspect_err(|err| {
        error!(error = %err, "failed to build book search client");
    })?;
    let registry = build_registry(Arc::new(client)).inspect_err(|err| {
        error!(error = %err, "failed to register tools");
    })?;
    let bind_socket = config.bind_socket().inspect_err(|err| {
        error!(error = %err, "invalid bind address");
    })?;
    let state = AppState::new(registry);
    let app = build_app(state);

    let listener = match tokio::net::TcpListener::bind(bind_socket).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(bind_socket = %bind_socket, error = %err, "failed to bind listener");
            return Err(err.into());
        }
    };

    info!(
        bind_addr = %config.bind_addr,
        port = config.port,
        "demo MCP server running on http://localhost:{}/mcp",
        config.port
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server shut down gracefully");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
        let _ = tokio::signal::ctrl_c().await;
        return;
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received Ctrl+C, initiating graceful shutdown"),
        _ = sigterm.recv() => info!("received SIGTERM, initiating graceful shutdown"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("received Ctrl+C, initiating graceful shutdown");
}
