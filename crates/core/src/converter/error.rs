//! Error types for the converter module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during conversion.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// Source image does not exist.
    #[error("source file not found: {path}")]
    SourceNotFound { path: PathBuf },

    /// Source is not a convertible image type.
    #[error("invalid file type: {path}")]
    InvalidFileType { path: PathBuf },

    /// Source exceeds the configured size ceiling.
    #[error("file too large: {path} ({size} bytes, max {max})")]
    FileTooLarge { path: PathBuf, size: u64, max: u64 },

    /// Source or destination is not accessible.
    #[error("permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// The selected converter does not support the requested format.
    #[error("converter {converter} does not support format {format}")]
    UnsupportedFormat { converter: String, format: String },

    /// No converter capability is installed/enabled.
    #[error("no converter available")]
    NoConverter,

    /// Destination directory cannot be written.
    #[error("destination directory not writable: {path}")]
    DestinationNotWritable { path: PathBuf },

    /// The codec process failed.
    #[error("conversion failed: {reason}")]
    ConversionFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// The codec process exceeded its time budget.
    #[error("conversion timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// I/O error during conversion.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConverterError {
    /// Creates a new conversion failed error with stderr output.
    pub fn conversion_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::ConversionFailed {
            reason: reason.into(),
            stderr,
        }
    }

    /// Whether a task failing with this error may be re-enqueued.
    ///
    /// Retryability is a property of the error value: missing sources, bad
    /// file types, oversized files, permission problems and format mismatches
    /// will fail the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::SourceNotFound { .. }
                | Self::InvalidFileType { .. }
                | Self::FileTooLarge { .. }
                | Self::PermissionDenied { .. }
                | Self::UnsupportedFormat { .. }
                | Self::NoConverter
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_retryable_errors() {
        let err = ConverterError::SourceNotFound {
            path: PathBuf::from("/a.jpg"),
        };
        assert!(!err.is_retryable());

        let err = ConverterError::InvalidFileType {
            path: PathBuf::from("/a.txt"),
        };
        assert!(!err.is_retryable());

        let err = ConverterError::FileTooLarge {
            path: PathBuf::from("/a.jpg"),
            size: 100,
            max: 10,
        };
        assert!(!err.is_retryable());

        let err = ConverterError::PermissionDenied {
            path: PathBuf::from("/a.jpg"),
        };
        assert!(!err.is_retryable());

        assert!(!ConverterError::NoConverter.is_retryable());
    }

    #[test]
    fn test_retryable_errors() {
        let err = ConverterError::conversion_failed("cwebp exited with 1", None);
        assert!(err.is_retryable());

        let err = ConverterError::Timeout { timeout_secs: 30 };
        assert!(err.is_retryable());
    }
}
