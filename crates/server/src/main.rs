//! waystation server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;
use waystation_client::{FetchConfig, HttpNetwork, Worker};
use waystation_core::{AppConfig, CacheDb};

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(bucket = %config.bucket_name(), origin = %config.origin, "Starting waystation server on stdio transport");

    let db = CacheDb::open(&config.db_path).await?;
    let network = HttpNetwork::new(FetchConfig {
        user_agent: config.user_agent.clone(),
        max_bytes: config.max_bytes,
        timeout: config.timeout(),
        origin: Some(config.origin_url()?),
        ..Default::default()
    })?;
    let worker = Arc::new(Worker::new(&config, db, Arc::new(network))?);

    match worker.start().await {
        Ok(state) => tracing::info!(%state, "worker ready"),
        Err(e) => tracing::warn!(error = %e, "worker install failed; retry with worker_install"),
    }

    let handler = handler::WaystationServer::new(&config, Arc::clone(&worker))?;
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    worker.tasks().drain().await;

    Ok(())
}
