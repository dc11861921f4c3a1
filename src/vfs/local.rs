//! Local-disk filesystem driver.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;

use super::path as vpath;
use super::{DirEntry, EntryKind, FileStat, FileSystem, FsDisplay, MountConfig, VfsError};

/// Filesystem backend rooted at a host directory.
///
/// Virtual paths are normalized before resolution; `..` segments are clamped
/// at the virtual root, so no request can address anything above `root`.
pub struct LocalFs {
    name: String,
    root: PathBuf,
}

impl LocalFs {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, virtual_path: &str) -> PathBuf {
        let normalized = vpath::normalize(virtual_path);
        if normalized == "/" {
            self.root.clone()
        } else {
            self.root.join(&normalized[1..])
        }
    }

    async fn ensure_parent(&self, host_path: &Path, virtual_path: &str) -> Result<(), VfsError> {
        if let Some(parent) = host_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| VfsError::from_io(virtual_path, e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl FileSystem for LocalFs {
    fn display(&self) -> FsDisplay {
        FsDisplay {
            name: self.name.clone(),
            provider: "local".to_string(),
            icon: Some("folder".to_string()),
        }
    }

    fn mount_config(&self) -> Option<MountConfig> {
        Some(MountConfig::Local {
            root: self.root.clone(),
        })
    }

    async fn init(&self) -> Result<(), VfsError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| VfsError::from_io("/", e))
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, VfsError> {
        fs::read(self.resolve(path))
            .await
            .map_err(|e| VfsError::from_io(path, e))
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<(), VfsError> {
        let host = self.resolve(path);
        self.ensure_parent(&host, path).await?;
        fs::write(&host, data)
            .await
            .map_err(|e| VfsError::from_io(path, e))
    }

    async fn list(&self, path: &str) -> Result<Vec<DirEntry>, VfsError> {
        let host = self.resolve(path);
        let mut dir = fs::read_dir(&host)
            .await
            .map_err(|e| VfsError::from_io(path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| VfsError::from_io(path, e))?
        {
            let meta = entry
                .metadata()
                .await
                .map_err(|e| VfsError::from_io(path, e))?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind: if meta.is_dir() {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                },
                size: meta.len(),
                modified_at: meta.modified().ok().map(DateTime::<Utc>::from),
                display: None,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn stat(&self, path: &str) -> Result<FileStat, VfsError> {
        let meta = fs::metadata(self.resolve(path))
            .await
            .map_err(|e| VfsError::from_io(path, e))?;
        Ok(FileStat {
            path: vpath::normalize(path),
            kind: if meta.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            },
            size: meta.len(),
            created_at: meta.created().ok().map(DateTime::<Utc>::from),
            modified_at: meta.modified().ok().map(DateTime::<Utc>::from),
        })
    }

    async fn mkdir(&self, path: &str) -> Result<(), VfsError> {
        fs::create_dir_all(self.resolve(path))
            .await
            .map_err(|e| VfsError::from_io(path, e))
    }

    async fn remove(&self, path: &str, recursive: bool) -> Result<(), VfsError> {
        let host = self.resolve(path);
        let meta = fs::metadata(&host)
            .await
            .map_err(|e| VfsError::from_io(path, e))?;
        let result = if meta.is_dir() {
            if recursive {
                fs::remove_dir_all(&host).await
            } else {
                fs::remove_dir(&host).await
            }
        } else {
            fs::remove_file(&host).await
        };
        result.map_err(|e| VfsError::from_io(path, e))
    }

    async fn copy(&self, from: &str, to: &str) -> Result<(), VfsError> {
        let dest = self.resolve(to);
        self.ensure_parent(&dest, to).await?;
        fs::copy(self.resolve(from), &dest)
            .await
            .map(|_| ())
            .map_err(|e| VfsError::from_io(from, e))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), VfsError> {
        let dest = self.resolve(to);
        self.ensure_parent(&dest, to).await?;
        fs::rename(self.resolve(from), &dest)
            .await
            .map_err(|e| VfsError::from_io(from, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, LocalFs) {
        let tmp = tempfile::tempdir().unwrap();
        let fs = LocalFs::new("scratch", tmp.path());
        (tmp, fs)
    }

    #[tokio::test]
    async fn write_read_roundtrip() {
        let (_tmp, fs) = fixture();
        fs.write("/notes/today.md", b"hello").await.unwrap();
        let data = fs.read("/notes/today.md").await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn read_missing_is_not_found() {
        let (_tmp, fs) = fixture();
        match fs.read("/nope.txt").await {
            Err(VfsError::NotFound(p)) => assert_eq!(p, "/nope.txt"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_is_sorted_and_typed() {
        let (_tmp, fs) = fixture();
        fs.write("/b.txt", b"b").await.unwrap();
        fs.write("/a.txt", b"a").await.unwrap();
        fs.mkdir("/sub").await.unwrap();

        let entries = fs.list("/").await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[2].kind, EntryKind::Directory);
        assert!(entries.iter().all(|e| e.display.is_none()));
    }

    #[tokio::test]
    async fn stat_reports_size_and_kind() {
        let (_tmp, fs) = fixture();
        fs.write("/f.bin", &[0u8; 42]).await.unwrap();

        let stat = fs.stat("/f.bin").await.unwrap();
        assert_eq!(stat.kind, EntryKind::File);
        assert_eq!(stat.size, 42);
        assert_eq!(stat.path, "/f.bin");
        assert!(stat.modified_at.is_some());
    }

    #[tokio::test]
    async fn remove_respects_recursive_flag() {
        let (_tmp, fs) = fixture();
        fs.write("/d/inner.txt", b"x").await.unwrap();

        assert!(fs.remove("/d", false).await.is_err());
        fs.remove("/d", true).await.unwrap();
        assert!(matches!(fs.stat("/d").await, Err(VfsError::NotFound(_))));
    }

    #[tokio::test]
    async fn copy_and_rename() {
        let (_tmp, fs) = fixture();
        fs.write("/src.txt", b"payload").await.unwrap();

        fs.copy("/src.txt", "/copies/dst.txt").await.unwrap();
        assert_eq!(fs.read("/src.txt").await.unwrap(), b"payload");
        assert_eq!(fs.read("/copies/dst.txt").await.unwrap(), b"payload");

        fs.rename("/src.txt", "/moved.txt").await.unwrap();
        assert!(matches!(
            fs.read("/src.txt").await,
            Err(VfsError::NotFound(_))
        ));
        assert_eq!(fs.read("/moved.txt").await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn parent_traversal_is_clamped_at_root() {
        let (_tmp, fs) = fixture();
        fs.write("/a.txt", b"inside").await.unwrap();

        // "/../a.txt" normalizes to "/a.txt" — never the host parent dir.
        let data = fs.read("/../a.txt").await.unwrap();
        assert_eq!(data, b"inside");
    }

    #[tokio::test]
    async fn reports_local_mount_config() {
        let (tmp, fs) = fixture();
        match fs.mount_config() {
            Some(MountConfig::Local { root }) => assert_eq!(root, tmp.path()),
            other => panic!("expected local mount config, got {other:?}"),
        }
    }
}
