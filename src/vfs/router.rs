//! Virtual filesystem router.
//!
//! Holds a set of named mount points, each backed by an independent
//! [`FileSystem`], and presents them as one namespace. Every request path
//! resolves to exactly one backing mount by longest matching prefix; paths
//! that are ancestors of mounts are synthesized as virtual directories. The
//! mount table is immutable after construction — remounting means building a
//! new router.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use tracing::debug;

use super::path as vpath;
use super::{DirEntry, EntryKind, FileStat, FileSystem, FsDisplay, VfsError};

struct Mount {
    path: String,
    fs: Arc<dyn FileSystem>,
}

struct Resolved<'a> {
    mount_index: usize,
    fs: &'a Arc<dyn FileSystem>,
    /// Path within the backing filesystem; `/` when the request hit the
    /// mount root exactly.
    local_path: String,
}

/// Routes one unified path namespace across many filesystem backends.
pub struct VfsRouter {
    mounts: Vec<Mount>,
}

impl std::fmt::Debug for VfsRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VfsRouter")
            .field("mounts", &self.mount_paths())
            .finish()
    }
}

impl VfsRouter {
    /// Build a router from `(mount path, filesystem)` pairs.
    ///
    /// Mount paths are normalized; duplicates are rejected. Nested mounts
    /// (`/data` and `/data/archive`) are permitted — resolution picks the
    /// longest match.
    pub fn new(mounts: Vec<(String, Arc<dyn FileSystem>)>) -> Result<Self, VfsError> {
        let mut seen = HashSet::new();
        let mut table = Vec::new();
        for (raw, fs) in mounts {
            let normalized = vpath::normalize(&raw);
            if !seen.insert(normalized.clone()) {
                return Err(VfsError::DuplicateMount(normalized));
            }
            table.push(Mount {
                path: normalized,
                fs,
            });
        }
        Ok(Self { mounts: table })
    }

    /// Normalized mount paths, in table order.
    pub fn mount_paths(&self) -> Vec<&str> {
        self.mounts.iter().map(|m| m.path.as_str()).collect()
    }

    /// The backing filesystem at an exact mount path, if one exists.
    pub fn mount_at(&self, path: &str) -> Option<&Arc<dyn FileSystem>> {
        let normalized = vpath::normalize(path);
        self.mounts
            .iter()
            .find(|m| m.path == normalized)
            .map(|m| &m.fs)
    }

    fn resolve(&self, normalized: &str) -> Result<Resolved<'_>, VfsError> {
        let mut best: Option<usize> = None;
        for (i, mount) in self.mounts.iter().enumerate() {
            if !vpath::is_within(&mount.path, normalized) {
                continue;
            }
            match best {
                Some(b) if self.mounts[b].path.len() >= mount.path.len() => {}
                _ => best = Some(i),
            }
        }
        let Some(index) = best else {
            return Err(VfsError::NoMount(normalized.to_string()));
        };
        let mount = &self.mounts[index];
        let local_path = vpath::remainder(&mount.path, normalized);
        debug!(path = normalized, mount = %mount.path, local = %local_path, "resolved");
        Ok(Resolved {
            mount_index: index,
            fs: &mount.fs,
            local_path,
        })
    }

    /// Mounts strictly below `normalized`.
    fn mounts_below(&self, normalized: &str) -> Vec<&Mount> {
        self.mounts
            .iter()
            .filter(|m| m.path != normalized && vpath::is_within(normalized, &m.path))
            .collect()
    }

    /// Synthesize a listing for a path that is an ancestor of mounts:
    /// one directory entry per immediate child segment, deduplicated, with
    /// display metadata when the segment is itself a mount root.
    fn virtual_list(&self, normalized: &str) -> Option<Vec<DirEntry>> {
        let mut children: BTreeMap<String, Option<FsDisplay>> = BTreeMap::new();
        for mount in self.mounts_below(normalized) {
            let Some(segment) = vpath::first_segment_below(normalized, &mount.path) else {
                continue;
            };
            let child_path = vpath::join(normalized, segment);
            let display = (child_path == mount.path).then(|| mount.fs.display());
            let slot = children.entry(segment.to_string()).or_insert(None);
            if display.is_some() {
                *slot = display;
            }
        }
        if children.is_empty() {
            return None;
        }
        Some(
            children
                .into_iter()
                .map(|(name, display)| DirEntry {
                    name,
                    kind: EntryKind::Directory,
                    size: 0,
                    modified_at: Some(Utc::now()),
                    display,
                })
                .collect(),
        )
    }

    async fn fan_out_lifecycle<'a, F>(&'a self, op: &'static str, run: F) -> Result<(), VfsError>
    where
        F: Fn(&'a Arc<dyn FileSystem>) -> futures::future::BoxFuture<'a, Result<(), VfsError>>,
    {
        let results = join_all(self.mounts.iter().map(|m| run(&m.fs))).await;
        let failures: Vec<String> = self
            .mounts
            .iter()
            .zip(results)
            .filter_map(|(m, r)| r.err().map(|e| format!("{}: {}", m.path, e)))
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(VfsError::Lifecycle {
                failed: failures.len(),
                total: self.mounts.len(),
                details: format!("{op}: {}", failures.join("; ")),
            })
        }
    }
}

#[async_trait]
impl FileSystem for VfsRouter {
    fn display(&self) -> FsDisplay {
        FsDisplay {
            name: "workspace".to_string(),
            provider: "vfs".to_string(),
            icon: None,
        }
    }

    /// Every mounted filesystem initializes; one failure does not skip the
    /// others, and every failure is reported.
    async fn init(&self) -> Result<(), VfsError> {
        self.fan_out_lifecycle("init", |fs| Box::pin(fs.init())).await
    }

    async fn destroy(&self) -> Result<(), VfsError> {
        self.fan_out_lifecycle("destroy", |fs| Box::pin(fs.destroy()))
            .await
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, VfsError> {
        let normalized = vpath::normalize(path);
        let r = self.resolve(&normalized)?;
        r.fs.read(&r.local_path).await
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<(), VfsError> {
        let normalized = vpath::normalize(path);
        let r = self.resolve(&normalized)?;
        r.fs.write(&r.local_path, data).await
    }

    async fn list(&self, path: &str) -> Result<Vec<DirEntry>, VfsError> {
        let normalized = vpath::normalize(path);
        match self.resolve(&normalized) {
            Ok(r) => r.fs.list(&r.local_path).await,
            Err(VfsError::NoMount(_)) => self
                .virtual_list(&normalized)
                .ok_or(VfsError::NoMount(normalized)),
            Err(e) => Err(e),
        }
    }

    async fn stat(&self, path: &str) -> Result<FileStat, VfsError> {
        let normalized = vpath::normalize(path);
        match self.resolve(&normalized) {
            Ok(r) => {
                let mut stat = r.fs.stat(&r.local_path).await?;
                stat.path = normalized;
                Ok(stat)
            }
            Err(VfsError::NoMount(_)) if !self.mounts_below(&normalized).is_empty() => {
                Ok(FileStat {
                    path: normalized,
                    kind: EntryKind::Directory,
                    size: 0,
                    created_at: None,
                    modified_at: Some(Utc::now()),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn mkdir(&self, path: &str) -> Result<(), VfsError> {
        let normalized = vpath::normalize(path);
        let r = self.resolve(&normalized)?;
        r.fs.mkdir(&r.local_path).await
    }

    async fn remove(&self, path: &str, recursive: bool) -> Result<(), VfsError> {
        let normalized = vpath::normalize(path);
        let r = self.resolve(&normalized)?;
        r.fs.remove(&r.local_path, recursive).await
    }

    /// Same mount: delegate to the backend's native copy. Different mounts:
    /// read from the source, write to the destination.
    async fn copy(&self, from: &str, to: &str) -> Result<(), VfsError> {
        let src = self.resolve(&vpath::normalize(from))?;
        let dst = self.resolve(&vpath::normalize(to))?;
        if src.mount_index == dst.mount_index {
            src.fs.copy(&src.local_path, &dst.local_path).await
        } else {
            let data = src.fs.read(&src.local_path).await?;
            dst.fs.write(&dst.local_path, &data).await
        }
    }

    /// Cross-mount move is copy-then-delete: not atomic, and both copies
    /// transiently exist.
    async fn rename(&self, from: &str, to: &str) -> Result<(), VfsError> {
        let src = self.resolve(&vpath::normalize(from))?;
        let dst = self.resolve(&vpath::normalize(to))?;
        if src.mount_index == dst.mount_index {
            src.fs.rename(&src.local_path, &dst.local_path).await
        } else {
            let data = src.fs.read(&src.local_path).await?;
            dst.fs.write(&dst.local_path, &data).await?;
            src.fs.remove(&src.local_path, false).await
        }
    }
}
