//! Towers Server
//!
//! Binary entry point serving the built-in functions.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use towers::common::config::TowersConfig;
use towers::functions::Dispatcher;
use towers::{builtin, TowersServer};

#[derive(Parser, Debug)]
#[command(name = "towers")]
#[command(about = "Named server functions over HTTP", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "towers.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Mount path prefix for function routes
    #[arg(long, env = "TOWERS_ENDPOINT")]
    endpoint: Option<String>,

    /// Host to bind to
    #[arg(long, env = "TOWERS_HOST")]
    host: Option<String>,

    /// HTTP port
    #[arg(short, long, env = "TOWERS_PORT")]
    port: Option<u16>,

    /// Value of Access-Control-Allow-Origin
    #[arg(long, env = "TOWERS_ALLOW_ORIGIN")]
    allow_origin: Option<String>,
}

impl Args {
    fn apply(self, config: &mut TowersConfig) {
        if let Some(endpoint) = self.endpoint {
            config.server.endpoint = endpoint;
        }
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(allow_origin) = self.allow_origin {
            config.server.allow_origin = allow_origin;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)))
        .init();

    info!("Towers v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = if args.config.exists() {
        TowersConfig::load(&args.config)?
    } else {
        info!("Using default configuration");
        TowersConfig::default()
    };
    args.apply(&mut config);

    let mut builder = Dispatcher::builder();
    builtin::register(&mut builder)?;
    let server = Arc::new(TowersServer::new(config, builder)?);

    // Handle shutdown signals
    let stopper = server.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for CTRL+C: {}", e);
            return;
        }
        info!("Received shutdown signal");
        if let Err(e) = stopper.shutdown().await {
            error!("Shutdown failed: {}", e);
        }
    });

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
