use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};

use analyst_bridge::BridgeService;
use analyst_bridge::config::Config;
use analyst_bridge::models::SessionConnection;

// Validates a semantic model YAML file from disk.
//
// Usage: validate_model <path/to/model.yaml>
// The session for the analyst backend comes from ANALYST_HOST / ANALYST_TOKEN.

fn load_yaml(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let path = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow!("usage: validate_model <path/to/model.yaml>"))?;
    let yaml = load_yaml(Path::new(&path))?;

    let session = SessionConnection::new(
        std::env::var("ANALYST_HOST").unwrap_or_default(),
        std::env::var("ANALYST_TOKEN").unwrap_or_default(),
    );

    let config = Arc::new(Config::load());
    let service = BridgeService::new(config).await?;

    service
        .validate(&yaml, &session)
        .await
        .with_context(|| format!("validation of {path} failed"))?;

    println!("{path}: OK");
    Ok(())
}
