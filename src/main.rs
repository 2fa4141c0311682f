use anyhow::{Context, Result};
use candlewatch::{config::Config, data::Interval, ui::App};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "candlewatch", about = "Live candlestick charts in the terminal")]
struct Args {
    /// Config file (default: config/default.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Symbol to open instead of the saved session's
    #[arg(short, long)]
    symbol: Option<String>,

    /// Candle interval, e.g. 1s, 1m, 15m, 1h
    #[arg(short, long)]
    interval: Option<Interval>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(args.config)?;

    // Initialize logging (to file, not terminal since we use TUI)
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.logging.file)
        .with_context(|| format!("opening log file {}", config.logging.file.display()))?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(log_file))
                .with_ansi(false),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(
        "Starting candlewatch: backend {}, {} symbols in watchlist",
        config.backend.rest_url,
        config.market.watchlist.len()
    );

    let default_interval = config.market.default_interval;
    let mut app = App::new(config)?;
    match (args.symbol, args.interval) {
        (Some(symbol), interval) => app.select(&symbol, interval.unwrap_or(default_interval)),
        (None, Some(interval)) => app.set_interval(interval),
        (None, None) => {}
    }

    app.run().await?;

    Ok(())
}
