mod app_state;
mod chat_payload;
mod chat_response;
mod error;
mod routes;
mod server_config;
mod upload_response;

use anyhow::{Context, Result};
use rag_engine::{RagConfig, RagSystem};

use crate::app_state::AppState;
use crate::server_config::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment variables and logging
    dotenv::dotenv().ok();
    env_logger::init();

    let rag_config = RagConfig::from_env().context("failed to load RAG configuration")?;
    let server_config = ServerConfig::from_env()?;

    let rag_system = RagSystem::from_config(&rag_config)?;
    rag_system
        .initialize()
        .await
        .context("failed to prepare the vector index")?;

    let app = routes::router(AppState::new(rag_system), &server_config);

    let listener = tokio::net::TcpListener::bind(&server_config.address)
        .await
        .with_context(|| format!("failed to bind {}", server_config.address))?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
