//! AI backend HTTP server

use ai_backend::{logging, server, AiService, Config, ModelSelection, OllamaClient};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    logging::init(&config.log_level);

    let client = OllamaClient::from_config(&config)?;
    info!(
        runtime = client.endpoint(),
        sql_model = %config.sql_model,
        explain_model = %config.explain_model,
        analyze_model = %config.analyze_model,
        "starting AI backend"
    );

    let service = Arc::new(AiService::new(
        Arc::new(client),
        ModelSelection::from_config(&config),
    ));

    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;

    server::serve(listener, service).await?;
    Ok(())
}
