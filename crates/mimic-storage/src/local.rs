use crate::traits::{StorageError, StorageResult};
use mimic_core::MediaKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Local filesystem store for uploaded and generated media files.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    /// Create a store rooted at `root`, creating the per-kind subdirectories.
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();

        for kind in [MediaKind::Image, MediaKind::Voice, MediaKind::Video] {
            let dir = root.join(kind.dir_name());
            fs::create_dir_all(&dir).await.map_err(|e| {
                StorageError::ConfigError(format!(
                    "Failed to create storage directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding files of `kind`.
    pub fn dir(&self, kind: MediaKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    /// Path for `{id}{ext}` under the `kind` directory, rejecting traversal.
    pub fn path_for(&self, kind: MediaKind, id: &str, ext: &str) -> StorageResult<PathBuf> {
        validate_component(id)?;
        validate_component(ext)?;
        Ok(self.dir(kind).join(format!("{}{}", id, ext)))
    }

    /// Write `data` to `{root}/{kind}/{id}{ext}` and return the path.
    pub async fn save(
        &self,
        kind: MediaKind,
        id: &str,
        ext: &str,
        data: &[u8],
    ) -> StorageResult<PathBuf> {
        let path = self.path_for(kind, id, ext)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;
        file.write_all(data).await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;
        file.sync_all().await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        tracing::debug!(
            path = %path.display(),
            kind = %kind,
            size_bytes = data.len(),
            "Saved media file"
        );

        Ok(path)
    }

    /// Delete a file if it exists under this store's root. Returns whether a file was removed.
    pub async fn delete(&self, path: &Path) -> StorageResult<bool> {
        if !path.starts_with(&self.root) {
            return Err(StorageError::InvalidKey(format!(
                "{} is outside {}",
                path.display(),
                self.root.display()
            )));
        }

        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "Failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Remove every file under the root whose modification time is older than `max_age`.
    ///
    /// Returns the number of files deleted. Files that cannot be inspected or removed
    /// are skipped.
    pub async fn sweep_older_than(&self, max_age: Duration) -> StorageResult<usize> {
        let now = SystemTime::now();
        let mut deleted = 0;
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let metadata = match entry.metadata().await {
                    Ok(metadata) => metadata,
                    Err(_) => continue,
                };

                if metadata.is_dir() {
                    pending.push(entry.path());
                    continue;
                }

                let age = metadata
                    .modified()
                    .ok()
                    .and_then(|modified| now.duration_since(modified).ok());

                if matches!(age, Some(age) if age > max_age) {
                    match fs::remove_file(entry.path()).await {
                        Ok(()) => deleted += 1,
                        Err(e) => tracing::warn!(
                            path = %entry.path().display(),
                            error = %e,
                            "Failed to remove expired file"
                        ),
                    }
                }
            }
        }

        Ok(deleted)
    }
}

fn validate_component(component: &str) -> StorageResult<()> {
    if component.contains("..") || component.contains('/') || component.contains('\\') {
        return Err(StorageError::InvalidKey(format!(
            "'{}' contains invalid characters",
            component
        )));
    }
    Ok(())
}
