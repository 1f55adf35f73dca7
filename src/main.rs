//! callbridge CLI entrypoint

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use callbridge::cli::Cli;
use callbridge::config;

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG wins; otherwise the configured level (INFO when config fails to load)
    let level = config::config()
        .map(|cfg| cfg.log_level)
        .unwrap_or("INFO")
        .to_ascii_lowercase();

    // Logs go to stderr so `handle` output stays parseable
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Parse and execute CLI
    let cli = Cli::parse();
    cli.execute().await
}
