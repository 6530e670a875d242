//! Realtime exchange gateway - entry point.

use anyhow::Result;
use clap::Parser;
use relay_core::Credentials;
use tracing::{info, warn};

/// Realtime exchange gateway
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via RELAY_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider (must be before any WS connections)
    relay_stream::init_crypto();

    let args = Args::parse();

    relay_telemetry::init_logging()?;

    info!("Starting relay gateway v{}", env!("CARGO_PKG_VERSION"));

    // Config path: CLI arg > RELAY_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("RELAY_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = relay_gateway::AppConfig::load_or_default(&config_path)?;

    let credentials = Credentials::from_env().unwrap_or_else(|| {
        warn!("RELAY_API_KEY/RELAY_API_SECRET not set, authenticated calls will be rejected");
        Credentials::new("", "")
    });

    let app = relay_gateway::Application::new(config, credentials)?;
    app.run().await?;

    Ok(())
}
