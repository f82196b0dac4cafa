//! Media library enumeration.
//!
//! Walks the trusted media root and yields the convertible originals that
//! batch runs are built from. Subjects are root-relative paths with `/`
//! separators, stable across scans.

use std::path::{Path, PathBuf};

use crate::converter::SourceKind;

/// One convertible original in the media library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    /// Root-relative path, `/`-separated.
    pub subject: String,
    /// File size in bytes.
    pub size: u64,
}

/// Read-only view over the media root.
#[derive(Debug, Clone)]
pub struct MediaLibrary {
    root: PathBuf,
}

impl MediaLibrary {
    /// Creates a library rooted at the media directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The media root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a subject identifier to an absolute path.
    pub fn resolve(&self, subject: &str) -> PathBuf {
        self.root.join(subject)
    }

    /// Whether a path has a convertible image extension.
    pub fn is_convertible(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(SourceKind::from_extension)
            .is_some()
    }

    /// Enumerates all convertible originals, sorted by subject.
    pub async fn scan(&self) -> std::io::Result<Vec<MediaFile>> {
        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !Self::is_convertible(&path) {
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let subject = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                let size = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
                files.push(MediaFile { subject, size });
            }
        }

        files.sort_by(|a, b| a.subject.cmp(&b.subject));
        Ok(files)
    }

    /// Enumerates with a limit/offset window applied after sorting.
    pub async fn scan_window(
        &self,
        limit: Option<usize>,
        offset: usize,
    ) -> std::io::Result<Vec<MediaFile>> {
        let files = self.scan().await?;
        let windowed = files
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect();
        Ok(windowed)
    }
}
