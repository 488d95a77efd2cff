#![allow(non_snake_case)]

mod cli;

use rpcBatcher::config::AppConfig;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "failed to load CONFIG_FILE");
            std::process::exit(1);
        }
    };

    if let Err(err) = cli::cli(config).await {
        tracing::error!(error = %err, "command failed");
        std::process::exit(1);
    }
}
