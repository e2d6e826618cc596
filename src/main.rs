use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use beamdrive::config::Config;
use beamdrive::engine::Engine;
use beamdrive::web::api;

#[derive(Parser)]
#[command(version, about = "Driveboard laser cutter host")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "beamdrive.toml")]
    config: PathBuf,
    /// Serial port of the driveboard, overriding the config file.
    #[arg(short, long)]
    port: Option<String>,
    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let mut config = Config::load(&cli.config)?;
    if let Some(port) = cli.port {
        config.serial_port = port;
    }
    tracing::info!(
        workspace = ?config.workspace,
        baudrate = config.baudrate,
        "starting beamdrive {}",
        env!("CARGO_PKG_VERSION")
    );

    let port = config.network_port;
    let engine = Arc::new(Engine::new(Arc::new(config)));

    // The board may not be attached yet; the API can connect later.
    if let Err(e) = engine.connect(None).await {
        tracing::warn!("initial serial connect failed: {e}");
    }

    let app = api::create_router(engine);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
