pub mod config;
pub mod exec;
pub mod fs;
pub mod paths;
pub mod status;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "workcell")]
#[command(author, version, about = "A bounded workspace runtime for autonomous agents")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file
    #[arg(short, long, global = true, env = "WORKCELL_CONFIG")]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show isolation backend detection and sandbox configuration
    Status,

    /// Run a command inside the sandbox
    Exec(exec::ExecArgs),

    /// Operate on the virtual filesystem
    Fs(fs::FsArgs),

    /// Configuration management
    Config(config::ConfigArgs),

    /// Show resolved directory paths
    Paths,
}
