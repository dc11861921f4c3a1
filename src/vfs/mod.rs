//! Virtual filesystem layer.
//!
//! A [`FileSystem`] is a pluggable storage backend addressed by absolute
//! virtual paths. The [`router::VfsRouter`] composes many backends into one
//! namespace; [`local::LocalFs`] is the on-disk driver. Cloud mount types
//! (s3/gcs/r2) are defined as configuration shapes only — no driver here.

pub mod local;
pub mod path;
pub mod router;

pub use local::LocalFs;
pub use router::VfsRouter;

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Driver-specific mount configuration, discriminated by `type`.
///
/// Consumed by a sandbox executor to decide mountability: only `local`
/// carries a host path a spawned process can see directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MountConfig {
    Local {
        root: PathBuf,
    },
    S3 {
        bucket: String,
        #[serde(default)]
        prefix: String,
        #[serde(default)]
        region: Option<String>,
    },
    Gcs {
        bucket: String,
        #[serde(default)]
        prefix: String,
    },
    R2 {
        bucket: String,
        #[serde(default)]
        prefix: String,
        account_id: String,
    },
}

impl MountConfig {
    pub fn type_name(&self) -> &'static str {
        match self {
            MountConfig::Local { .. } => "local",
            MountConfig::S3 { .. } => "s3",
            MountConfig::Gcs { .. } => "gcs",
            MountConfig::R2 { .. } => "r2",
        }
    }
}

/// Display metadata a UI uses to render a filesystem's mount root.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FsDisplay {
    pub name: String,
    pub provider: String,
    pub icon: Option<String>,
}

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry in a directory listing.
#[derive(Debug, Clone, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
    /// Set when the entry is a mount root in a synthesized listing, so a UI
    /// can distinguish real mounts from intermediate virtual segments.
    pub display: Option<FsDisplay>,
}

/// Metadata for a single path.
#[derive(Debug, Clone, Serialize)]
pub struct FileStat {
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// Filesystem-layer failures.
///
/// `NoMount` is precondition-class: the caller addressed a path outside any
/// configured namespace.
#[derive(Debug, Error)]
pub enum VfsError {
    #[error("no mount for path {0}")]
    NoMount(String),

    #[error("duplicate mount path {0}")]
    DuplicateMount(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: String,
        operation: &'static str,
    },

    #[error("lifecycle failed on {failed} of {total} mounts: {details}")]
    Lifecycle {
        failed: usize,
        total: usize,
        details: String,
    },

    #[error("i/o error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl VfsError {
    /// Map an I/O error onto the virtual path it occurred at.
    pub fn from_io(path: &str, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => VfsError::NotFound(path.to_string()),
            std::io::ErrorKind::NotADirectory => VfsError::NotADirectory(path.to_string()),
            std::io::ErrorKind::IsADirectory => VfsError::IsADirectory(path.to_string()),
            _ => VfsError::Io {
                path: path.to_string(),
                source,
            },
        }
    }
}

/// A pluggable storage backend.
///
/// All paths are absolute virtual paths within this filesystem's own
/// namespace. `mount_config`, `init` and `destroy` are optional capabilities:
/// backends that cannot be mounted into a sandbox return `None`, and backends
/// with no setup/teardown keep the no-op defaults.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Display metadata (name, provider identity, icon).
    fn display(&self) -> FsDisplay;

    /// Mountability capability: a configuration an executor can inspect.
    fn mount_config(&self) -> Option<MountConfig> {
        None
    }

    async fn init(&self) -> Result<(), VfsError> {
        Ok(())
    }

    async fn destroy(&self) -> Result<(), VfsError> {
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, VfsError>;

    async fn write(&self, path: &str, data: &[u8]) -> Result<(), VfsError>;

    async fn list(&self, path: &str) -> Result<Vec<DirEntry>, VfsError>;

    async fn stat(&self, path: &str) -> Result<FileStat, VfsError>;

    async fn mkdir(&self, path: &str) -> Result<(), VfsError>;

    async fn remove(&self, path: &str, recursive: bool) -> Result<(), VfsError>;

    async fn copy(&self, from: &str, to: &str) -> Result<(), VfsError>;

    async fn rename(&self, from: &str, to: &str) -> Result<(), VfsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_config_is_tagged_by_type() {
        let config = MountConfig::S3 {
            bucket: "artifacts".to_string(),
            prefix: "runs/".to_string(),
            region: Some("us-east-1".to_string()),
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["type"], "s3");
        assert_eq!(json["bucket"], "artifacts");

        let back: MountConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn local_mount_config_roundtrip() {
        let toml_src = r#"
type = "local"
root = "/srv/data"
"#;
        let config: MountConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(
            config,
            MountConfig::Local {
                root: PathBuf::from("/srv/data")
            }
        );
        assert_eq!(config.type_name(), "local");
    }
}
