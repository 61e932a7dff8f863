use anyhow::{Context, Result};
use clap::Parser;
use crypto_mcp::{McpServer, ToolRouter};
use crypto_mcp_common::config::Config;
use market_data::Aggregator;
use std::path::PathBuf;
use tokio::io::{stdin, stdout, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Cryptocurrency market data MCP server (stdio)
#[derive(Parser, Debug)]
#[command(name = "crypto-mcp", version, about)]
struct Args {
    /// Optional TOML config file; environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries the protocol, logs go to stderr
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("Invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = Config::load(args.config.as_deref())?;
    info!(
        "Loaded configuration (binance key: {}, cmc keys: {})",
        config.binance.api_key.is_some(),
        config.cmc.api_keys.len()
    );

    let aggregator = Aggregator::from_config(&config).context("Failed to build providers")?;
    let server = McpServer::new(ToolRouter::new(aggregator));

    server
        .run(BufReader::new(stdin()), stdout())
        .await
        .context("stdio transport failed")?;

    Ok(())
}
