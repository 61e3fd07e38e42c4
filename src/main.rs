use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use warden::llm::OpenAiClient;
use warden::{Settings, Supervisor, SupervisorConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::parse();

    let llm = Arc::new(
        OpenAiClient::new(&settings.base_url, &settings.api_key, &settings.model)
            .context("configuring the model client")?,
    );
    tracing::info!(model = %settings.model, persona = %settings.persona, "Starting supervisor");

    let supervisor = Supervisor::new(llm, Vec::new(), SupervisorConfig::from(&settings));

    let peer_config = settings
        .write_peer_config()
        .context("writing the peer connection file")?;
    tracing::info!(path = %peer_config.display(), "Wrote peer connection file");

    tokio::select! {
        result = supervisor.serve(&settings.bind, settings.control_port, settings.image_port) => {
            result.context("wire server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    Ok(())
}
