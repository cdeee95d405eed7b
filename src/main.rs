use clap::Command;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod auth;
mod client;
mod config;
mod error;
mod server;

use client::ChatClient;
use config::Config;
use server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let matches = Command::new("chat-relay-service")
        .version(env!("CARGO_PKG_VERSION"))
        .about("HTTP relay to an OpenAI-compatible chat completion API")
        .subcommand(Command::new("serve").about("Start the HTTP server"))
        .subcommand(Command::new("check-config").about("Validate configuration and exit"))
        .get_matches();

    let config = Config::load()?;
    config.validate()?;

    match matches.subcommand() {
        Some(("check-config", _)) => {
            info!("✅ Configuration is valid");
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        // Default to serve
        _ => serve(config).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let token_provider = auth::provider_from_config(config.upstream.api_key.as_deref())?;
    let chat_client = ChatClient::new(
        config.completions_url(),
        config.upstream.deployment.clone(),
        token_provider,
    )?;

    let bind_addr = config.server.bind_addr.clone();
    let state = AppState {
        config: Arc::new(config.clone()),
        client: Arc::new(chat_client),
    };
    let router = server::create_router(state);

    info!("🚀 Starting chat-relay-service");
    info!("🌐 Listening on: {}", bind_addr);
    info!(
        "🤖 Upstream: {} (deployment: {})",
        config.upstream.endpoint, config.upstream.deployment
    );
    info!(
        "📦 Envelope: {:?}, system preamble: {}, debug errors: {}",
        config.relay.envelope, config.relay.system_preamble, config.relay.debug_errors
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install ctrl-c handler: {}", e);
        return;
    }
    info!("Shutdown signal received");
}
