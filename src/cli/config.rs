use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::fs;

use crate::config::Config;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,

    /// Write a default config file if none exists
    Init,
}

pub async fn run(args: ConfigArgs, config: &Config) -> Result<()> {
    match args.command {
        ConfigCommands::Show => {
            print!("{}", toml::to_string_pretty(config)?);
            Ok(())
        }
        ConfigCommands::Init => {
            let file = config.paths.config_file();
            if file.exists() {
                println!("Config already exists: {}", file.display());
                return Ok(());
            }
            if let Some(parent) = file.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            let defaults = toml::to_string_pretty(&Config::default())?;
            fs::write(&file, defaults)
                .with_context(|| format!("writing {}", file.display()))?;
            println!("Wrote {}", file.display());
            Ok(())
        }
    }
}
