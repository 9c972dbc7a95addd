use std::env;

use anyhow::Result;
use growwise_api::{build_app, ApiConfig};
use growwise_observability::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("growwise_api");

    let bind = env::var("GROWWISE_BIND").unwrap_or_else(|_| "0.0.0.0:5000".to_string());
    let config = ApiConfig::from_env();
    let market_cache = config.market_cache.display().to_string();

    let app = build_app(config).await?;

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(bind = %bind, market_cache = %market_cache, "growwise api started");

    axum::serve(listener, app).await?;
    Ok(())
}
