//! pixelgraph server binary
//!
//! Wires the configured backend and blob store into an engine, mounts the
//! HTTP/WebSocket API, and serves until ctrl-c.

use pixelgraph_engine::EngineBuilder;
use pixelgraph_server::{api, ServerConfig};
use pixelgraph_store::{Backend, BlobStore, FsBlobStore, MemoryBackend, MemoryBlobStore, SqliteBackend};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    let config = ServerConfig::load()?;
    tracing::info!(driver = ?config.database.driver, "starting pixelgraph server");

    let backend: Arc<dyn Backend> = match config.database.driver {
        pixelgraph_server::DatabaseDriver::Memory => Arc::new(MemoryBackend::new()),
        pixelgraph_server::DatabaseDriver::Sqlite => {
            let url = config.database_url();
            tracing::info!(url = %url, "connecting to database");
            Arc::new(SqliteBackend::connect(&url).await?)
        }
    };
    let blobs: Arc<dyn BlobStore> = match config.database.driver {
        // The in-memory backend keeps blobs in memory too; mixing an
        // ephemeral graph store with durable blobs leaks files.
        pixelgraph_server::DatabaseDriver::Memory => Arc::new(MemoryBlobStore::new()),
        pixelgraph_server::DatabaseDriver::Sqlite => {
            Arc::new(FsBlobStore::new(config.blobs.root.clone()).await?)
        }
    };

    let engine = Arc::new(EngineBuilder::new(backend.clone(), blobs.clone()).build()?);
    let router = api::create_router(api::AppState {
        engine: engine.clone(),
        backend,
        blobs,
    });

    let addr = config.listen_addr()?;
    tracing::info!(addr = %addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    match Arc::try_unwrap(engine) {
        Ok(engine) => engine.shutdown().await,
        Err(_) => tracing::warn!("engine still referenced at shutdown"),
    }
    Ok(())
}
