//! Declarative access-control policy for sandboxed commands.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::SandboxConfig;

/// What a sandboxed command may touch.
///
/// Immutable once the owning executor is constructed; consumed once per
/// command wrap. Writes are always allowed under the executor's workspace
/// root; everything here is additive to that.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IsolationPolicy {
    /// Allow outbound network access (default deny).
    #[serde(default)]
    pub allow_network: bool,

    /// Additional read-only paths.
    #[serde(default)]
    pub read_only_paths: Vec<PathBuf>,

    /// Additional writable paths.
    #[serde(default)]
    pub read_write_paths: Vec<PathBuf>,

    /// Verbatim replacement for the generated Seatbelt profile.
    #[serde(default)]
    pub profile_override: Option<String>,
}

impl IsolationPolicy {
    /// Build a policy from the sandbox config section, expanding `~` in
    /// user-supplied paths.
    pub fn from_config(config: &SandboxConfig) -> Self {
        let read_only_paths = config
            .allow_paths
            .read
            .iter()
            .map(|p| PathBuf::from(shellexpand::tilde(p).to_string()))
            .collect();

        let read_write_paths = config
            .allow_paths
            .write
            .iter()
            .map(|p| PathBuf::from(shellexpand::tilde(p).to_string()))
            .collect();

        Self {
            allow_network: config.allow_network,
            read_only_paths,
            read_write_paths,
            profile_override: config.profile_override.clone(),
        }
    }
}
