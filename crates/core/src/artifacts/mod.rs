//! Artifact store: derived paths and filesystem checks for converted images.
//!
//! An artifact lives next to its original with the format extension appended
//! (`photo.jpg` -> `photo.jpg.webp`), so originals with the same stem but
//! different extensions never collide.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::converter::{ConverterError, ImageFormat, SourceKind};

/// Result of an orphan sweep.
#[derive(Debug, Clone, Default)]
pub struct OrphanSweep {
    /// Orphaned artifact paths found.
    pub orphans: Vec<PathBuf>,
    /// Bytes freed (only set when deleting).
    pub freed_bytes: u64,
}

/// Path derivation and validation for conversion artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    media_root: PathBuf,
    max_file_size: u64,
}

impl ArtifactStore {
    /// Creates a store rooted at the trusted media directory.
    ///
    /// `max_file_size` of 0 means no size ceiling.
    pub fn new(media_root: impl Into<PathBuf>, max_file_size: u64) -> Self {
        Self {
            media_root: media_root.into(),
            max_file_size,
        }
    }

    /// The trusted media root.
    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    /// Derives the artifact path for an original and a target format.
    pub fn artifact_path(&self, original: &Path, format: ImageFormat) -> PathBuf {
        let mut name = original
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        name.push('.');
        name.push_str(format.extension());
        original.with_file_name(name)
    }

    /// Maps an artifact path back to the original it was derived from.
    ///
    /// Returns `None` if the path does not look like an artifact of a
    /// convertible original.
    pub fn original_for(&self, artifact: &Path) -> Option<PathBuf> {
        let name = artifact.file_name()?.to_str()?;
        let stem = name
            .strip_suffix(".webp")
            .or_else(|| name.strip_suffix(".avif"))?;
        let original = artifact.with_file_name(stem);
        let ext = original.extension()?.to_str()?;
        SourceKind::from_extension(ext)?;
        Some(original)
    }

    /// Whether the artifact for (original, format) already exists.
    pub async fn artifact_exists(&self, original: &Path, format: ImageFormat) -> bool {
        tokio::fs::metadata(self.artifact_path(original, format))
            .await
            .is_ok()
    }

    /// Validates a source image before any codec work.
    ///
    /// Returns the source size on success. Validation failures map onto the
    /// non-retryable converter errors.
    pub async fn validate_source(&self, path: &Path) -> Result<u64, ConverterError> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ConverterError::SourceNotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                return Err(ConverterError::PermissionDenied {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(ConverterError::Io(e)),
        };

        if !metadata.is_file() {
            return Err(ConverterError::InvalidFileType {
                path: path.to_path_buf(),
            });
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        if SourceKind::from_extension(ext).is_none() {
            return Err(ConverterError::InvalidFileType {
                path: path.to_path_buf(),
            });
        }

        let size = metadata.len();
        if self.max_file_size > 0 && size > self.max_file_size {
            return Err(ConverterError::FileTooLarge {
                path: path.to_path_buf(),
                size,
                max: self.max_file_size,
            });
        }

        // Readability check; metadata alone does not prove read access.
        if let Err(e) = tokio::fs::File::open(path).await {
            if e.kind() == ErrorKind::PermissionDenied {
                return Err(ConverterError::PermissionDenied {
                    path: path.to_path_buf(),
                });
            }
            return Err(ConverterError::Io(e));
        }

        Ok(size)
    }

    /// Verifies the artifact's parent directory accepts writes.
    pub async fn ensure_writable(&self, artifact: &Path) -> Result<(), ConverterError> {
        let parent = artifact.parent().unwrap_or(&self.media_root);
        let metadata = tokio::fs::metadata(parent).await.map_err(|_| {
            ConverterError::DestinationNotWritable {
                path: parent.to_path_buf(),
            }
        })?;
        if metadata.permissions().readonly() {
            return Err(ConverterError::DestinationNotWritable {
                path: parent.to_path_buf(),
            });
        }
        Ok(())
    }

    /// Finds artifacts whose original no longer exists.
    pub async fn find_orphans(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut orphans = Vec::new();
        let mut pending = vec![self.media_root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    debug!("Skipping unreadable directory {}: {}", dir.display(), e);
                    continue;
                }
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if let Some(original) = self.original_for(&path) {
                    if tokio::fs::metadata(&original).await.is_err() {
                        orphans.push(path);
                    }
                }
            }
        }

        orphans.sort();
        Ok(orphans)
    }

    /// Deletes orphaned artifacts and reports what was freed.
    pub async fn delete_orphans(&self) -> std::io::Result<OrphanSweep> {
        let orphans = self.find_orphans().await?;
        let mut sweep = OrphanSweep::default();

        for orphan in orphans {
            let size = tokio::fs::metadata(&orphan).await.map(|m| m.len()).unwrap_or(0);
            match tokio::fs::remove_file(&orphan).await {
                Ok(()) => {
                    sweep.freed_bytes += size;
                    sweep.orphans.push(orphan);
                }
                Err(e) => {
                    debug!("Failed to delete orphan {}: {}", orphan.display(), e);
                }
            }
        }

        if !sweep.orphans.is_empty() {
            info!(
                "Deleted {} orphaned artifacts, freed {} bytes",
                sweep.orphans.len(),
                sweep.freed_bytes
            );
        }
        Ok(sweep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ArtifactStore {
        ArtifactStore::new("/media", 0)
    }

    #[test]
    fn test_artifact_path_appends_extension() {
        let store = store();
        assert_eq!(
            store.artifact_path(Path::new("/media/photo.jpg"), ImageFormat::Webp),
            PathBuf::from("/media/photo.jpg.webp")
        );
        assert_eq!(
            store.artifact_path(Path::new("/media/sub/pic.png"), ImageFormat::Avif),
            PathBuf::from("/media/sub/pic.png.avif")
        );
    }

    #[test]
    fn test_original_for_round_trip() {
        let store = store();
        let artifact = store.artifact_path(Path::new("/media/photo.jpg"), ImageFormat::Webp);
        assert_eq!(
            store.original_for(&artifact),
            Some(PathBuf::from("/media/photo.jpg"))
        );
    }

    #[test]
    fn test_original_for_rejects_non_artifacts() {
        let store = store();
        assert_eq!(store.original_for(Path::new("/media/photo.jpg")), None);
        // Artifact-looking name whose "original" is not a convertible image.
        assert_eq!(store.original_for(Path::new("/media/notes.txt.webp")), None);
    }

    #[tokio::test]
    async fn test_validate_source_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), 0);
        let err = store
            .validate_source(&dir.path().join("missing.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConverterError::SourceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_validate_source_wrong_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, b"hello").await.unwrap();
        let store = ArtifactStore::new(dir.path(), 0);
        let err = store.validate_source(&path).await.unwrap_err();
        assert!(matches!(err, ConverterError::InvalidFileType { .. }));
    }

    #[tokio::test]
    async fn test_validate_source_too_large() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.jpg");
        tokio::fs::write(&path, vec![0u8; 64]).await.unwrap();
        let store = ArtifactStore::new(dir.path(), 16);
        let err = store.validate_source(&path).await.unwrap_err();
        assert!(matches!(err, ConverterError::FileTooLarge { size: 64, .. }));
    }

    #[tokio::test]
    async fn test_validate_source_ok() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.jpg");
        tokio::fs::write(&path, vec![0u8; 32]).await.unwrap();
        let store = ArtifactStore::new(dir.path(), 1024);
        assert_eq!(store.validate_source(&path).await.unwrap(), 32);
    }

    #[tokio::test]
    async fn test_orphan_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("keep.jpg");
        tokio::fs::write(&original, b"img").await.unwrap();
        tokio::fs::write(dir.path().join("keep.jpg.webp"), b"artifact")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("gone.jpg.webp"), b"orphaned")
            .await
            .unwrap();

        let store = ArtifactStore::new(dir.path(), 0);
        let orphans = store.find_orphans().await.unwrap();
        assert_eq!(orphans, vec![dir.path().join("gone.jpg.webp")]);

        let sweep = store.delete_orphans().await.unwrap();
        assert_eq!(sweep.orphans.len(), 1);
        assert_eq!(sweep.freed_bytes, 8);
        assert!(tokio::fs::metadata(dir.path().join("keep.jpg.webp"))
            .await
            .is_ok());
    }
}
