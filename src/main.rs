use std::sync::Arc;

use anyhow::Context;
use reqwest::Client;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hero_draft_backend::{
    build_app,
    config::ServerConfig,
    db,
    services::{draft_hub::DraftHub, match_handoff},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("hero_draft_backend=info,tower_http=info")),
        )
        .init();

    let config = Arc::new(ServerConfig::from_env()?);

    let pool = db::connect(&config.database_url)
        .await
        .context("Could not connect to SQLite")?;

    let client = Client::new();
    let (completed_tx, completed_rx) = mpsc::unbounded_channel();
    tokio::spawn(match_handoff::run(
        client.clone(),
        config.match_webhook_url.clone(),
        completed_rx,
    ));

    let hub = DraftHub::launch(pool.clone(), completed_tx);
    hub.resume_active()
        .await
        .context("Could not resume active drafts")?;

    let app = build_app(pool, hub, config.clone(), client);

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("Could not bind {}", config.bind_addr()))?;
    info!("Started server on {}.", config.bind_addr());
    axum::serve(listener, app).await?;

    Ok(())
}
