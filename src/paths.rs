//! XDG Base Directory Specification compliant path resolution.
//!
//! Every directory is resolved through a two-level fallback:
//! 1. workcell-specific env var (WORKCELL_CONFIG_DIR, etc.)
//! 2. XDG default via `etcetera` (~/.config, ~/.local/share, ...)
//!
//! All paths are absolute. Relative paths from env vars are ignored per XDG
//! spec.

use anyhow::Result;
use std::path::PathBuf;

/// Resolved directory paths for the whole application.
///
/// Created once at startup, threaded through Config. All paths are absolute.
#[derive(Debug, Clone, Default)]
pub struct Paths {
    /// Config directory: config.toml lives here
    pub config_dir: PathBuf,

    /// Data directory root: contains the default workspace
    pub data_dir: PathBuf,

    /// State directory: logs, runtime bookkeeping
    pub state_dir: PathBuf,

    /// Default executor workspace.
    /// May be overridden independently via WORKCELL_WORKSPACE.
    pub workspace: PathBuf,
}

impl Paths {
    /// Resolve all paths using real environment variables.
    pub fn resolve() -> Result<Self> {
        Self::resolve_with_env(|key| std::env::var(key))
    }

    /// Resolve paths with a custom env var lookup (for testing).
    pub fn resolve_with_env<F>(env_fn: F) -> Result<Self>
    where
        F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
    {
        use etcetera::BaseStrategy;

        let strategy = etcetera::choose_base_strategy()
            .map_err(|e| anyhow::anyhow!("Failed to determine base directories: {}", e))?;

        let config_dir = env_or(&env_fn, "WORKCELL_CONFIG_DIR", || {
            strategy.config_dir().join("workcell")
        });

        let data_dir = env_or(&env_fn, "WORKCELL_DATA_DIR", || {
            strategy.data_dir().join("workcell")
        });

        let state_dir = env_or(&env_fn, "WORKCELL_STATE_DIR", || {
            let base_state = strategy.state_dir().unwrap_or_else(|| strategy.data_dir());
            base_state.join("workcell")
        });

        let workspace = env_or(&env_fn, "WORKCELL_WORKSPACE", || data_dir.join("workspace"));

        Ok(Self {
            config_dir,
            data_dir,
            state_dir,
            workspace,
        })
    }

    /// Location of the TOML config file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}

fn env_or<F, D>(env_fn: &F, key: &str, default: D) -> PathBuf
where
    F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
    D: FnOnce() -> PathBuf,
{
    match env_fn(key) {
        Ok(value) if !value.is_empty() => {
            let path = PathBuf::from(value);
            if path.is_absolute() { path } else { default() }
        }
        _ => default(),
    }
}
