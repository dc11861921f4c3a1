use anyhow::Result;
use clap::Parser;
use std::path::Path;

use workcell::cli::{self, Cli, Commands};
use workcell::config::Config;
use workcell::paths::Paths;

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(Path::new(path), Paths::resolve()?)?,
        None => Config::load()?,
    };

    // Initialize logging
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    match cli.command {
        Commands::Status => cli::status::run(&config).await,
        Commands::Exec(args) => cli::exec::run(args, &config).await,
        Commands::Fs(args) => cli::fs::run(args, &config).await,
        Commands::Config(args) => cli::config::run(args, &config).await,
        Commands::Paths => cli::paths::run(&config),
    }
}
