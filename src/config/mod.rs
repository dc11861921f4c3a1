//! Configuration loading and schema.
//!
//! TOML config with per-field serde defaults, resolved from the XDG config
//! directory (overridable per path via WORKCELL_* env vars). A missing file
//! is not an error — everything has a workable default.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::paths::Paths;
use crate::sandbox::{Detection, IsolationBackend};
use crate::vfs::{FileSystem, LocalFs, MountConfig, VfsRouter};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Resolved XDG-compliant paths (not serialized)
    #[serde(skip)]
    pub paths: Paths,

    #[serde(default)]
    pub workspace: WorkspaceConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Virtual filesystem mounts. Empty means: one local mount of the
    /// workspace at `/`.
    #[serde(default)]
    pub mounts: Vec<MountEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Executor working directory. Defaults to the XDG data workspace.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// Which isolation backend to use.
///
/// `auto` picks the platform's natural backend when available and falls back
/// to `none`; naming a real backend explicitly never falls back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendChoice {
    #[default]
    Auto,
    None,
    Seatbelt,
    Bubblewrap,
}

impl std::fmt::Display for BackendChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BackendChoice::Auto => "auto",
            BackendChoice::None => "none",
            BackendChoice::Seatbelt => "seatbelt",
            BackendChoice::Bubblewrap => "bubblewrap",
        };
        f.write_str(s)
    }
}

impl BackendChoice {
    /// Resolve the configured choice against a detection result.
    pub fn resolve(&self, detection: &Detection) -> IsolationBackend {
        match self {
            BackendChoice::Auto => {
                if detection.available {
                    detection.backend
                } else {
                    IsolationBackend::None
                }
            }
            BackendChoice::None => IsolationBackend::None,
            BackendChoice::Seatbelt => IsolationBackend::Seatbelt,
            BackendChoice::Bubblewrap => IsolationBackend::Bubblewrap,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Backend selection: auto | none | seatbelt | bubblewrap
    #[serde(default)]
    pub backend: BackendChoice,

    /// Allow outbound network access for sandboxed commands (default: false)
    #[serde(default)]
    pub allow_network: bool,

    /// Additional path allowances
    #[serde(default)]
    pub allow_paths: AllowPathsConfig,

    /// Verbatim Seatbelt profile replacing the generated one
    #[serde(default)]
    pub profile_override: Option<String>,

    /// Command timeout in milliseconds (default: 30000)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum captured output bytes per stream (default: 1MB)
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// Environment variables handed to every command. The parent's PATH is
    /// always added; nothing else from the host environment leaks in.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            backend: BackendChoice::default(),
            allow_network: false,
            allow_paths: AllowPathsConfig::default(),
            profile_override: None,
            timeout_ms: default_timeout_ms(),
            max_output_bytes: default_max_output_bytes(),
            env: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllowPathsConfig {
    /// Extra read-only paths (tilde-expanded)
    #[serde(default)]
    pub read: Vec<String>,

    /// Extra writable paths (tilde-expanded)
    #[serde(default)]
    pub write: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// One virtual mount: an absolute path prefix plus driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountEntry {
    pub path: String,

    #[serde(flatten)]
    pub config: MountConfig,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_output_bytes() -> usize {
    1_048_576
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load from the default XDG location; a missing file yields defaults.
    pub fn load() -> Result<Self> {
        let paths = Paths::resolve()?;
        let file = paths.config_file();
        if file.exists() {
            Self::load_from(&file, paths)
        } else {
            Ok(Self {
                paths,
                ..Self::default()
            })
        }
    }

    /// Load from an explicit file path.
    pub fn load_from(file: &Path, paths: Paths) -> Result<Self> {
        let text = fs::read_to_string(file)
            .with_context(|| format!("reading config file {}", file.display()))?;
        let mut config: Config = toml::from_str(&text)
            .with_context(|| format!("parsing config file {}", file.display()))?;
        config.paths = paths;
        Ok(config)
    }

    /// The executor working directory.
    pub fn workspace_path(&self) -> PathBuf {
        match &self.workspace.root {
            Some(root) => PathBuf::from(shellexpand::tilde(&root.to_string_lossy()).to_string()),
            None => self.paths.workspace.clone(),
        }
    }

    /// Build the filesystem router from the configured mounts.
    ///
    /// Cloud mount types (s3/gcs/r2) are configuration shapes without a
    /// driver here; configuring one is an error, not a silent skip.
    pub fn build_router(&self) -> Result<VfsRouter> {
        if self.mounts.is_empty() {
            let workspace = self.workspace_path();
            let fs: Arc<dyn FileSystem> = Arc::new(LocalFs::new("workspace", workspace));
            return Ok(VfsRouter::new(vec![("/".to_string(), fs)])?);
        }

        let mut mounts: Vec<(String, Arc<dyn FileSystem>)> = Vec::new();
        for entry in &self.mounts {
            match &entry.config {
                MountConfig::Local { root } => {
                    let expanded =
                        PathBuf::from(shellexpand::tilde(&root.to_string_lossy()).to_string());
                    let name = entry
                        .path
                        .rsplit('/')
                        .find(|s| !s.is_empty())
                        .unwrap_or("workspace")
                        .to_string();
                    mounts.push((entry.path.clone(), Arc::new(LocalFs::new(name, expanded))));
                }
                other => anyhow::bail!(
                    "mount {} has type '{}', which has no driver (configuration shape only)",
                    entry.path,
                    other.type_name()
                ),
            }
        }
        Ok(VfsRouter::new(mounts)?)
    }
}
