//! Trait definitions for the converter module.

use async_trait::async_trait;

use super::error::ConverterError;
use super::types::{ConvertRequest, ImageFormat};

/// A codec capability that can convert raster images into modern formats.
///
/// Implementations wrap external encoder binaries. Selection between
/// implementations happens once at startup via the factory; lower `priority`
/// numbers are preferred.
#[async_trait]
pub trait ImageConverter: Send + Sync {
    /// Returns the name of this converter implementation.
    fn name(&self) -> &str;

    /// Selection priority (lower = preferred).
    fn priority(&self) -> u32;

    /// Whether the underlying codec tooling is installed and usable.
    async fn is_available(&self) -> bool;

    /// Returns the output formats this converter can produce.
    fn supported_formats(&self) -> &[ImageFormat];

    /// Converts one image. The destination file must exist on success.
    async fn convert(&self, request: &ConvertRequest) -> Result<(), ConverterError>;

    /// Whether this converter claims support for the given format.
    fn supports(&self, format: ImageFormat) -> bool {
        self.supported_formats().contains(&format)
    }
}
