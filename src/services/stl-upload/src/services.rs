//! Storage service for accepted uploads
//!
//! Bytes are streamed into a hidden staging file inside the upload directory
//! and only become visible under their final name through a no-clobber
//! rename once the whole part has been received.

use std::{io, path::PathBuf};

use chrono::Utc;
use tempfile::NamedTempFile;
use tokio::{fs, io::AsyncWriteExt, task};
use tracing::{debug, info, warn};

use crate::{
    config_types::StorageConfig,
    error::{UploadError, UploadResult},
    models::{StoredFile, UploadDirectory},
    utils::path,
};

const STAGING_PREFIX: &str = ".upload-";

/// Local disk storage rooted at the upload directory
#[derive(Debug)]
pub struct StorageService {
    upload_dir: UploadDirectory,
    max_name_attempts: u32,
}

impl StorageService {
    /// Create the upload directory if needed and make sure it is writable
    pub async fn new(config: &StorageConfig) -> UploadResult<Self> {
        let service = Self {
            upload_dir: config.upload_directory(),
            max_name_attempts: config.max_name_attempts.max(1),
        };

        let dir = service.upload_dir.path();
        fs::create_dir_all(&dir).await.map_err(|e| {
            UploadError::storage_failure(format!(
                "Failed to create upload directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        service.health_check().await?;

        info!("Upload directory ready: {}", dir.display());
        Ok(service)
    }

    pub fn upload_dir(&self) -> &UploadDirectory {
        &self.upload_dir
    }

    /// Open a staging file that receives the bytes of one upload
    pub async fn begin_upload(&self) -> UploadResult<StagedUpload> {
        let dir = self.upload_dir.path();
        let temp = task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(STAGING_PREFIX)
                .tempfile_in(dir)
        })
        .await??;

        let writer = fs::File::from_std(temp.as_file().try_clone()?);
        debug!("Staging upload at {}", temp.path().display());

        Ok(StagedUpload {
            temp,
            writer,
            size: 0,
        })
    }

    /// Move a fully received upload to its final name.
    ///
    /// The name starts from the current millisecond; when a file with that
    /// name already exists the discriminator is bumped instead of overwriting.
    pub async fn commit(
        &self,
        staged: StagedUpload,
        original_name: &str,
    ) -> UploadResult<StoredFile> {
        let size = staged.size;
        let temp = staged.finish().await?;

        let upload_dir = self.upload_dir.clone();
        let original = original_name.to_string();
        let attempts = self.max_name_attempts;
        let start = path::current_timestamp_millis();

        let (storage_name, stored_path) = task::spawn_blocking(move || {
            persist_unique(temp, &upload_dir, &original, start, attempts)
        })
        .await??;

        let stored = StoredFile {
            relative_path: self.upload_dir.relative_path(&storage_name),
            storage_name,
            path: stored_path,
            original_name: original_name.to_string(),
            size,
            stored_at: Utc::now(),
        };

        info!(
            "Stored upload {} as {} ({} bytes)",
            stored.original_name, stored.relative_path, stored.size
        );
        Ok(stored)
    }

    /// Verify the upload directory still accepts new files
    pub async fn health_check(&self) -> UploadResult<()> {
        let dir = self.upload_dir.path();
        task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(STAGING_PREFIX)
                .tempfile_in(&dir)
                .map(drop)
                .map_err(|e| {
                    UploadError::storage_failure(format!(
                        "Upload directory {} is not writable: {}",
                        dir.display(),
                        e
                    ))
                })
        })
        .await?
    }
}

/// An upload being received. Dropping it deletes the staging file.
#[derive(Debug)]
pub struct StagedUpload {
    temp: NamedTempFile,
    writer: fs::File,
    size: u64,
}

impl StagedUpload {
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> UploadResult<()> {
        self.writer.write_all(chunk).await?;
        self.size += chunk.len() as u64;
        Ok(())
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    async fn finish(mut self) -> UploadResult<NamedTempFile> {
        self.writer.flush().await?;
        self.writer.sync_all().await?;
        Ok(self.temp)
    }
}

fn persist_unique(
    mut temp: NamedTempFile,
    upload_dir: &UploadDirectory,
    original_name: &str,
    start_millis: i64,
    attempts: u32,
) -> UploadResult<(String, PathBuf)> {
    let mut millis = start_millis;

    for _ in 0..attempts {
        let storage_name = path::storage_name(millis, original_name);
        let target = upload_dir.file_path(&storage_name);

        match temp.persist_noclobber(&target) {
            Ok(file) => {
                drop(file);
                make_readable(&target)?;
                return Ok((storage_name, target));
            }
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                warn!("Storage name {} already taken, retrying", storage_name);
                temp = err.file;
                millis += 1;
            }
            Err(err) => return Err(err.error.into()),
        }
    }

    Err(UploadError::storage_failure(format!(
        "Could not find a free storage name for {} after {} attempts",
        original_name, attempts
    )))
}

#[cfg(unix)]
fn make_readable(target: &std::path::Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(target, std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn make_readable(_target: &std::path::Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn storage_config(root: &std::path::Path) -> StorageConfig {
        StorageConfig {
            root_dir: root.to_path_buf(),
            ..StorageConfig::default()
        }
    }

    fn dir_entries(dir: &std::path::Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_creates_upload_directory() {
        let root = tempdir().unwrap();
        let mut config = storage_config(root.path());
        config.upload_dir = PathBuf::from("nested/uploads");

        let service = StorageService::new(&config).await.unwrap();

        assert!(root.path().join("nested/uploads").is_dir());
        assert_eq!(service.upload_dir().relative_path("x.stl"), "nested/uploads/x.stl");
        // The writability check leaves nothing behind
        assert!(dir_entries(&root.path().join("nested/uploads")).is_empty());
    }

    #[tokio::test]
    async fn test_commit_writes_content() {
        let root = tempdir().unwrap();
        let service = StorageService::new(&storage_config(root.path())).await.unwrap();

        let mut staged = service.begin_upload().await.unwrap();
        staged.write_chunk(b"solid cube\n").await.unwrap();
        staged.write_chunk(b"endsolid cube\n").await.unwrap();
        assert_eq!(staged.size(), 25);

        let stored = service.commit(staged, "cube model.stl").await.unwrap();

        assert!(stored.storage_name.ends_with("-cube_model.stl"));
        assert_eq!(stored.relative_path, format!("uploads/{}", stored.storage_name));
        assert_eq!(stored.size, 25);
        assert_eq!(
            std::fs::read(&stored.path).unwrap(),
            b"solid cube\nendsolid cube\n"
        );
        assert_eq!(dir_entries(&root.path().join("uploads")), vec![stored.storage_name]);
    }

    #[tokio::test]
    async fn test_dropped_upload_leaves_nothing() {
        let root = tempdir().unwrap();
        let service = StorageService::new(&storage_config(root.path())).await.unwrap();

        let mut staged = service.begin_upload().await.unwrap();
        staged.write_chunk(b"partial").await.unwrap();
        assert_eq!(dir_entries(&root.path().join("uploads")).len(), 1);

        drop(staged);
        assert!(dir_entries(&root.path().join("uploads")).is_empty());
    }

    #[test]
    fn test_persist_never_overwrites() {
        let root = tempdir().unwrap();
        let upload_dir = UploadDirectory::new(root.path(), "uploads");
        std::fs::create_dir_all(upload_dir.path()).unwrap();
        std::fs::write(upload_dir.file_path("1000-a.stl"), b"first").unwrap();

        let mut temp = NamedTempFile::new_in(upload_dir.path()).unwrap();
        std::io::Write::write_all(&mut temp, b"second").unwrap();

        let (name, path) = persist_unique(temp, &upload_dir, "a.stl", 1000, 4).unwrap();

        assert_eq!(name, "1001-a.stl");
        assert_eq!(std::fs::read(upload_dir.file_path("1000-a.stl")).unwrap(), b"first");
        assert_eq!(std::fs::read(path).unwrap(), b"second");
    }

    #[test]
    fn test_persist_gives_up_after_attempts() {
        let root = tempdir().unwrap();
        let upload_dir = UploadDirectory::new(root.path(), "uploads");
        std::fs::create_dir_all(upload_dir.path()).unwrap();
        std::fs::write(upload_dir.file_path("7-a.stl"), b"taken").unwrap();

        let temp = NamedTempFile::new_in(upload_dir.path()).unwrap();
        let result = persist_unique(temp, &upload_dir, "a.stl", 7, 1);

        assert!(matches!(result, Err(UploadError::StorageFailure { .. })));
        // The staging file is removed once the error drops it
        assert_eq!(dir_entries(&upload_dir.path()), vec!["7-a.stl".to_string()]);
    }
}
