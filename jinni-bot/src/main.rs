//! jinni: issue tracker link bot for IRC.
//!
//! Reads its settings from a JSON file (see `Config`), connects, joins the
//! configured channels and stays connected, reconnecting with backoff.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use jinni_sdk::client;

use jinni_bot::bot::Jinni;
use jinni_bot::config::{Config, DEFAULT_CONFIG_PATH};

#[derive(Parser)]
#[command(name = "jinni", about = "Issue tracker link bot for IRC")]
struct Args {
    /// Path to the JSON config file
    #[arg(long, short, env = "JINNI_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "jinni_bot=info,jinni_sdk=info,jinni=info".into());
    if args.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = match Config::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Unable to start");
            std::process::exit(1);
        }
    };

    tracing::info!(
        server = %config.server_addr(),
        nick = %config.nickname,
        channels = ?config.channels,
        holdout_secs = config.bot.holdout_secs,
        "Starting jinni"
    );

    let bot = Arc::new(Jinni::new(&config)?);

    client::run_with_reconnect(
        config.connect_config(),
        config.reconnect_config(),
        move |handle, event| {
            let bot = Arc::clone(&bot);
            Box::pin(async move { bot.handle_event(&handle, event).await })
        },
    )
    .await
}
