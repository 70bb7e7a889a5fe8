use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use analyst_bridge::BridgeService;
use analyst_bridge::config::Config;
use analyst_bridge::server::router;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let config = Arc::new(Config::load());

    let bind: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid server.bind '{}' (expected host:port)", config.server.bind))?;
    let bearer_token = config.server.bearer_token.clone();

    let service = Arc::new(BridgeService::new(Arc::clone(&config)).await?);
    let app = router(service, bearer_token.clone());

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(
        %bind,
        backend = %config.dispatch.backend,
        hosted = config.analyst.hosted,
        auth = %bearer_token.as_deref().map(|_| "bearer").unwrap_or("none"),
        "Starting analyst bridge HTTP server"
    );

    axum::serve(listener, app).await?;
    tracing::info!("Server shutting down");
    Ok(())
}
