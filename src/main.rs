//! ttlmemo - memoize a slow computation and watch its results expire
//!
//! Requests every key twice through a memoized async function and prints whether each
//! call was served from the cache.

use std::io;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ttlmemo::cli::{Cli, DemoConfig};
use ttlmemo::demo;

/// Installs a stderr logger controlled by `RUST_LOG`, defaulting to warnings only
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging();

    let config = match DemoConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    };
    let mut stdout = io::stdout().lock();
    demo::run(&config, &mut stdout).await?;

    Ok(())
}
