//! Kiwoom real-time market-data gateway - Entry Point

use anyhow::Result;
use clap::Parser;
use kiwoom_gateway::{AppConfig, Application};
use tracing::info;

/// Kiwoom real-time market-data gateway
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via KIWOOM_GATEWAY_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Issue an access token, print its expiry and exit
    #[arg(long)]
    check_token: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider (must be before any WS connections)
    kiwoom_ws::init_crypto();

    let args = Args::parse();

    let config_path = AppConfig::resolve_path(args.config);
    let config = AppConfig::from_file(&config_path)?;

    kiwoom_telemetry::init_logging(config.logging.filter.as_deref(), config.logging.format)?;

    info!("Starting Kiwoom gateway v{}", env!("CARGO_PKG_VERSION"));
    info!(config_path = %config_path, symbols = config.symbols.len(), "Configuration loaded");

    let app = Application::new(config)?;

    if args.check_token {
        match app.check_token().await? {
            Some(expires_at) => println!("token valid until {}", expires_at.to_rfc3339()),
            None => println!("token issued without expiry"),
        }
        return Ok(());
    }

    app.run().await?;

    Ok(())
}
