use anyhow::Result;
use greenlight::config::Config;
use greenlight::data::{MemoryStore, Models};
use greenlight::mailer::LogMailer;
use greenlight::server::Server;
use greenlight::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let config = Config::load()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "greenlight=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        env = %config.env,
        port = config.port,
        limiter_enabled = config.limiter_enabled,
        limiter_rps = config.limiter_rps,
        limiter_burst = config.limiter_burst,
        "Loaded configuration"
    );

    let models = Models::in_memory(Arc::new(MemoryStore::new()));
    let mailer = Arc::new(LogMailer::new(config.smtp_sender.clone()));
    let state = AppState::from_config(&config, models, mailer);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    Server::new(state, addr)
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
