use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use loragw::config::Config;
use loragw::grpc::{self, LospanBackend};
use loragw::gw::{CommandHandler, KeepaliveSettings, LoggingHandler, StreamProcessor};
use loragw::lora::{HandlerSettings, LoraHandler};

#[derive(Parser)]
#[command(name = "loragw")]
#[command(about = "Sync devices and telemetry between a cloud control stream and a LoRaWAN network server")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "loragw.toml")]
    config: PathBuf,

    /// Log level, overrides [logging].level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config from {:?}: {}", cli.config, e);
        eprintln!("Using default configuration");
        Config::default()
    });
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("loragw v{}", env!("CARGO_PKG_VERSION"));
    info!("Control stream: {}", config.control.endpoint);
    info!("Network server: {}", config.lora.endpoint);

    let lora_channel = grpc::connect_lora(&config.lora)
        .await
        .context("Network server connection failed")?;
    let server = Arc::new(LospanBackend::new(lora_channel));
    let settings = HandlerSettings {
        timeout: config.lora.timeout(),
        message_port: config.lora.message_port,
    };
    let handler: Arc<dyn CommandHandler> = Arc::new(LoggingHandler::new(Arc::new(
        LoraHandler::new(server, settings),
    )));

    let control_channel = grpc::connect_control(&config.control)
        .await
        .context("Control stream connection failed")?;
    let (sink, source) = grpc::control::open(control_channel);
    info!("Control stream open");

    let keepalive = KeepaliveSettings {
        interval: config.keepalive.interval(),
        poll: config.keepalive.poll(),
    };
    let result = StreamProcessor::new(handler.clone(), keepalive)
        .run(sink, source)
        .await;

    handler.shutdown().await;

    match result {
        Ok(()) => {
            info!("Control stream finished");
            Ok(())
        }
        Err(e) => {
            error!("Control stream lost: {}", e);
            Err(e).context("Control stream terminated")
        }
    }
}
