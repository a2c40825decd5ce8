//! devgate: local development gateway.
//!
//! ```text
//!   Client ──▶ devgate ──┬─▶ local overrides (mock dir)
//!                        ├─▶ static files
//!                        └─▶ upstream (HTTP + WebSocket)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use devgate::config::{load_config, parse_extension_list, ConfigOverrides, GatewayConfig};
use devgate::lifecycle::signals::spawn_signal_handler;
use devgate::observability::{logging, metrics};
use devgate::{GatewayBuilder, HttpServer, Shutdown};

#[derive(Debug, Parser)]
#[command(name = "devgate", version, about = "Local development gateway")]
struct Cli {
    /// TOML config file.
    #[arg(long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding override files.
    #[arg(long, env = "MOCK_DIR")]
    mock_dir: Option<PathBuf>,

    /// Upstream origin, e.g. http://localhost:3000.
    #[arg(long, env = "PROXY")]
    proxy: Option<String>,

    /// Port to listen on.
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Comma-separated path prefixes never probed for overrides.
    #[arg(long, env = "IGNORES", value_delimiter = ',')]
    ignores: Option<Vec<String>>,

    /// Comma-separated override extensions, highest priority first.
    #[arg(long, env = "INTERCEPTOR_EXTENSIONS")]
    extensions: Option<String>,

    /// Log level when RUST_LOG is unset.
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            root: self.mock_dir.clone(),
            proxy_target: self.proxy.clone(),
            port: self.port,
            ignores: self.ignores.clone(),
            extensions: self.extensions.as_deref().map(parse_extension_list),
            log_level: self.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let base = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    let config = cli.overrides().apply(base)?;

    logging::init(&config.observability.log_level);
    tracing::info!("devgate v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        root = %config.interceptor.root.display(),
        target = %config.proxy.target,
        extensions = ?config.interceptor.extensions,
        "Configuration loaded"
    );

    if let Some(addr) = &config.observability.metrics_address {
        match addr.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(metrics_address = %addr, error = %e, "Failed to parse metrics address"),
        }
    }

    let shutdown = Arc::new(Shutdown::new());
    let pipeline = Arc::new(
        GatewayBuilder::new(config.clone())
            .shutdown(shutdown.clone())
            .build()?,
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(&config, pipeline);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
