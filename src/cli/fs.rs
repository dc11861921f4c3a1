use anyhow::Result;
use clap::{Args, Subcommand};
use std::io::{Read, Write};

use crate::config::Config;
use crate::vfs::{EntryKind, FileSystem};

#[derive(Args)]
pub struct FsArgs {
    #[command(subcommand)]
    pub command: FsCommands,
}

#[derive(Subcommand)]
pub enum FsCommands {
    /// List a directory (virtual or backed)
    Ls { path: String },

    /// Print a file's bytes to stdout
    Cat { path: String },

    /// Write stdin (or --data) to a file
    Write {
        path: String,
        /// Literal content instead of reading stdin
        #[arg(long)]
        data: Option<String>,
    },

    /// Show metadata for a path
    Stat { path: String },

    /// Create a directory
    Mkdir { path: String },

    /// Copy a file (cross-mount copies are read-then-write)
    Cp { from: String, to: String },

    /// Move a file (cross-mount moves are copy-then-delete)
    Mv { from: String, to: String },

    /// Remove a file or directory
    Rm {
        path: String,
        #[arg(short, long)]
        recursive: bool,
    },
}

pub async fn run(args: FsArgs, config: &Config) -> Result<()> {
    let router = config.build_router()?;
    router.init().await?;

    match args.command {
        FsCommands::Ls { path } => {
            for entry in router.list(&path).await? {
                let kind = match entry.kind {
                    EntryKind::Directory => "dir",
                    EntryKind::File => "file",
                };
                match &entry.display {
                    Some(display) => println!(
                        "{:<5} {:>10}  {}  [{}:{}]",
                        kind, entry.size, entry.name, display.provider, display.name
                    ),
                    None => println!("{:<5} {:>10}  {}", kind, entry.size, entry.name),
                }
            }
        }
        FsCommands::Cat { path } => {
            let data = router.read(&path).await?;
            std::io::stdout().write_all(&data)?;
        }
        FsCommands::Write { path, data } => {
            let bytes = match data {
                Some(s) => s.into_bytes(),
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };
            router.write(&path, &bytes).await?;
        }
        FsCommands::Stat { path } => {
            let stat = router.stat(&path).await?;
            println!("Path:      {}", stat.path);
            println!(
                "Kind:      {}",
                match stat.kind {
                    EntryKind::Directory => "directory",
                    EntryKind::File => "file",
                }
            );
            println!("Size:      {} bytes", stat.size);
            if let Some(modified) = stat.modified_at {
                println!("Modified:  {}", modified.to_rfc3339());
            }
            if let Some(created) = stat.created_at {
                println!("Created:   {}", created.to_rfc3339());
            }
        }
        FsCommands::Mkdir { path } => router.mkdir(&path).await?,
        FsCommands::Cp { from, to } => router.copy(&from, &to).await?,
        FsCommands::Mv { from, to } => router.rename(&from, &to).await?,
        FsCommands::Rm { path, recursive } => router.remove(&path, recursive).await?,
    }

    Ok(())
}
