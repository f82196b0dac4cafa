//! Mock converter for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::converter::{ConvertRequest, ConverterError, ImageConverter, ImageFormat};

#[derive(Debug, Clone)]
struct ScriptedFailure {
    reason: String,
    retryable: bool,
}

/// Mock implementation of the [`ImageConverter`] trait.
///
/// Provides controllable behavior for testing:
/// - Records every submitted request for assertions
/// - Writes a destination file of a configurable size on success
/// - Scripted per-source and per-format failures
/// - Availability toggle
#[derive(Debug)]
pub struct MockConverter {
    requests: Arc<RwLock<Vec<ConvertRequest>>>,
    source_failures: Arc<RwLock<HashMap<PathBuf, ScriptedFailure>>>,
    format_failures: HashMap<ImageFormat, String>,
    available: bool,
    output_size: u64,
}

impl Default for MockConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConverter {
    pub fn new() -> Self {
        Self {
            requests: Arc::new(RwLock::new(Vec::new())),
            source_failures: Arc::new(RwLock::new(HashMap::new())),
            format_failures: HashMap::new(),
            available: true,
            output_size: 1024,
        }
    }

    /// Sets the size of the artifact written on success.
    pub fn with_output_size(mut self, size: u64) -> Self {
        self.output_size = size;
        self
    }

    /// Marks the converter as unavailable on the host.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Scripts every conversion to the given format to fail.
    pub fn failing_format(mut self, format: ImageFormat, reason: &str) -> Self {
        self.format_failures.insert(format, reason.to_string());
        self
    }

    /// Scripts conversions of the given source to fail.
    pub async fn fail_source(&self, source: impl Into<PathBuf>, reason: &str, retryable: bool) {
        self.source_failures.write().await.insert(
            source.into(),
            ScriptedFailure {
                reason: reason.to_string(),
                retryable,
            },
        );
    }

    /// Clears scripted per-source failures.
    pub async fn clear_failures(&self) {
        self.source_failures.write().await.clear();
    }

    /// Number of convert calls that reached the mock.
    pub async fn conversion_count(&self) -> usize {
        self.requests.read().await.len()
    }

    /// All requests recorded so far.
    pub async fn recorded_requests(&self) -> Vec<ConvertRequest> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl ImageConverter for MockConverter {
    fn name(&self) -> &str {
        "mock"
    }

    fn priority(&self) -> u32 {
        0
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    fn supported_formats(&self) -> &[ImageFormat] {
        &[ImageFormat::Avif, ImageFormat::Webp]
    }

    async fn convert(&self, request: &ConvertRequest) -> Result<(), ConverterError> {
        self.requests.write().await.push(request.clone());

        if let Some(failure) = self.source_failures.read().await.get(&request.source) {
            if failure.retryable {
                return Err(ConverterError::ConversionFailed {
                    reason: failure.reason.clone(),
                    stderr: None,
                });
            }
            return Err(ConverterError::PermissionDenied {
                path: request.source.clone(),
            });
        }

        if let Some(reason) = self.format_failures.get(&request.format) {
            return Err(ConverterError::ConversionFailed {
                reason: reason.clone(),
                stderr: None,
            });
        }

        tokio::fs::write(&request.destination, vec![0u8; self.output_size as usize])
            .await
            .map_err(ConverterError::Io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_requests_and_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockConverter::new().with_output_size(512);

        let request = ConvertRequest {
            source: dir.path().join("a.jpg"),
            destination: dir.path().join("a.jpg.webp"),
            format: ImageFormat::Webp,
            quality: 80,
        };
        mock.convert(&request).await.unwrap();

        assert_eq!(mock.conversion_count().await, 1);
        let written = tokio::fs::metadata(&request.destination).await.unwrap();
        assert_eq!(written.len(), 512);
    }

    #[tokio::test]
    async fn test_mock_scripted_source_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockConverter::new();
        let source = dir.path().join("bad.jpg");
        mock.fail_source(&source, "encoder exploded", true).await;

        let request = ConvertRequest {
            source,
            destination: dir.path().join("bad.jpg.webp"),
            format: ImageFormat::Webp,
            quality: 80,
        };
        let err = mock.convert(&request).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
