use catalog_agent::{
    api::{shutdown_signal, start_server},
    AgentConfig, Orchestrator,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AgentConfig::from_env()?;

    info!("Catalog Agent - API Server");
    info!("Port: {}", config.port);

    let orchestrator = Arc::new(Orchestrator::from_config(&config).await?);

    info!(model = orchestrator.model_name(), "Orchestrator initialized");

    start_server(orchestrator, config.port, shutdown_signal()).await?;

    Ok(())
}
