//! # sfox-runner
//!
//! Main entry point for the sFOX market data simulator.
//!
//! Loads an optional JSON configuration file, starts the WebSocket feed
//! service, and runs until Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! sfox-runner config.json --log-level info
//! sfox-runner --listen 127.0.0.1:5000
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use sfox_feed::FeedService;
use tracing::info;

/// sFOX Market Data Simulator.
#[derive(Parser)]
#[command(name = "sfox-runner", about = "sFOX Market Data Simulator")]
struct Cli {
    /// Configuration file path (JSON). Defaults apply when omitted.
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,

    /// Override the listen address from the config.
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let mut config = sfox_core::config::load_or_default(cli.config.as_deref())?;
    if let Some(addr) = cli.listen {
        config.listen_addr = addr;
    }
    if cli.log_dir.is_some() {
        config.log.log_dir = cli.log_dir;
    }

    // 2. Initialize logging (guard flushes file output on drop)
    let _log_guard = sfox_core::logging::init_logging(&cli.log_level, &config.log);

    info!(
        "sfox-runner starting, config={}, log_level={}",
        cli.config.as_ref().map_or_else(|| "<defaults>".to_string(), |p| p.display().to_string()),
        cli.log_level,
    );
    info!(
        "tick interval {:?}, keep-alive {:?}, client timeout {:?}",
        config.feed.tick_interval(),
        config.ws.keep_alive(),
        config.ws.client_timeout(),
    );

    // 3. Bind and start the feed service
    let mut service = FeedService::bind(&config).await?;
    service.start();
    info!("listening on ws://{}{}, press Ctrl+C to stop", service.local_addr(), config.path);

    // 4. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    // 5. Stop: close connections, stop every generator
    let live = service.hub().registry().len();
    service.stop().await;

    info!("{live} feed(s) stopped, goodbye");
    Ok(())
}
