//! Collaborator interface for the remote, file-backed log.

use crate::core::{LedgerError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Reference to one remote file (a path or provider-specific name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileRef(String);

impl FileRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FileRef {
    fn default() -> Self {
        Self::new("ledger-actions.json")
    }
}

impl std::fmt::Display for FileRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait CloudFileStore: Send + Sync {
    /// `Ok(None)` when the file does not exist yet.
    async fn download_file(&self, file: &FileRef) -> Result<Option<Vec<u8>>>;

    /// Replaces the file atomically: readers see the old or the new bytes.
    async fn upload_file(&self, file: &FileRef, bytes: Vec<u8>) -> Result<()>;
}

/// Process-local remote, used by tests and demos to stand in for a provider.
#[derive(Debug, Default)]
pub struct InMemoryCloudStore {
    files: Mutex<HashMap<FileRef, Vec<u8>>>,
    failing_downloads: AtomicU32,
    failing_uploads: AtomicU32,
    uploads: AtomicU64,
}

impl InMemoryCloudStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` downloads fail with `NetworkFailure`.
    pub fn fail_next_downloads(&self, count: u32) {
        self.failing_downloads.store(count, Ordering::SeqCst);
    }

    /// The next `count` uploads fail with `NetworkFailure` and leave the file
    /// untouched.
    pub fn fail_next_uploads(&self, count: u32) {
        self.failing_uploads.store(count, Ordering::SeqCst);
    }

    pub fn upload_count(&self) -> u64 {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn contents(&self, file: &FileRef) -> Result<Option<Vec<u8>>> {
        Ok(self.files.lock()?.get(file).cloned())
    }

    /// Overwrites a file directly, bypassing failure injection.
    pub fn put(&self, file: &FileRef, bytes: Vec<u8>) -> Result<()> {
        self.files.lock()?.insert(file.clone(), bytes);
        Ok(())
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl CloudFileStore for InMemoryCloudStore {
    async fn download_file(&self, file: &FileRef) -> Result<Option<Vec<u8>>> {
        if Self::take_failure(&self.failing_downloads) {
            return Err(LedgerError::NetworkFailure(format!(
                "download of '{}' interrupted",
                file
            )));
        }
        self.contents(file)
    }

    async fn upload_file(&self, file: &FileRef, bytes: Vec<u8>) -> Result<()> {
        if Self::take_failure(&self.failing_uploads) {
            return Err(LedgerError::NetworkFailure(format!(
                "upload of '{}' interrupted",
                file
            )));
        }
        self.put(file, bytes)?;
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A folder kept in sync by a desktop client (Drive, Dropbox, a NAS mount).
#[derive(Debug, Clone)]
pub struct DirectoryCloudStore {
    root: PathBuf,
}

impl DirectoryCloudStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, file: &FileRef) -> Result<PathBuf> {
        let name = Path::new(file.as_str());
        if name.is_absolute()
            || name
                .components()
                .any(|part| matches!(part, std::path::Component::ParentDir))
        {
            return Err(LedgerError::InvalidArgument(format!(
                "remote file '{}' must be relative to the sync folder",
                file
            )));
        }
        Ok(self.root.join(name))
    }
}

fn replace_file(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(target).map_err(|err| err.error)?;
    Ok(())
}

#[async_trait]
impl CloudFileStore for DirectoryCloudStore {
    async fn download_file(&self, file: &FileRef) -> Result<Option<Vec<u8>>> {
        let path = self.path_of(file)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(LedgerError::NetworkFailure(format!(
                "read {}: {}",
                path.display(),
                err
            ))),
        }
    }

    async fn upload_file(&self, file: &FileRef, bytes: Vec<u8>) -> Result<()> {
        let path = self.path_of(file)?;
        let target = path.clone();
        tokio::task::spawn_blocking(move || replace_file(&target, &bytes))
            .await
            .map_err(|err| LedgerError::NetworkFailure(err.to_string()))?
            .map_err(|err| {
                LedgerError::NetworkFailure(format!("write {}: {}", path.display(), err))
            })
    }
}
