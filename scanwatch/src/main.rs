//! scanwatch - polls a stock screener and pushes matches to subscriber chats.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use scanwatch::ScanwatchService;
use scanwatch_common::config::{AppConfig, ConfigSource};
use scanwatch_common::logging::init_from_config;

#[derive(Parser, Debug)]
#[command(name = "scanwatch")]
#[command(version)]
#[command(about = "Screener alerts for subscriber Telegram chats.", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.scanwatch/config.json)
    #[arg(short, long, env = "SCANWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Run one cycle and exit
    #[arg(long)]
    once: bool,

    /// Ignore the session window (holidays and weekends still apply)
    #[arg(long)]
    test_mode: bool,

    /// Allow cycles on weekends
    #[arg(long)]
    weekends: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, source) =
        AppConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    config
        .apply_env_overrides()
        .context("Failed to apply environment overrides")?;
    if cli.test_mode {
        config.schedule.test_mode = true;
    }
    if cli.weekends {
        config.schedule.run_on_weekends = true;
    }

    init_from_config(&config.observability);
    tracing::info!("scanwatch v{}", env!("CARGO_PKG_VERSION"));
    match &source {
        ConfigSource::File(path) => tracing::info!(path = %path.display(), "Loaded config"),
        ConfigSource::Defaults { missing } => {
            tracing::info!(path = %missing.display(), "Config file not found, using defaults")
        }
    }

    config.validate().context("Invalid configuration")?;

    let service = ScanwatchService::new(&config)?;

    if cli.once {
        let report = service.run_once().await;
        tracing::info!(
            reason = %report.decision,
            processed = report.clients_processed,
            delivered = report.delivered,
            failed = report.delivery_failures,
            "Single cycle finished"
        );
        return Ok(());
    }

    service.start().await
}
