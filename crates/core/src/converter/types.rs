//! Types for the converter module.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A modern image format that originals can be converted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    /// WebP (lossy/lossless, broad browser support)
    Webp,
    /// AVIF (AV1-based, best compression)
    Avif,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Webp => "webp",
            Self::Avif => "avif",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Webp => "image/webp",
            Self::Avif => "image/avif",
        }
    }

    /// All formats in serving preference order (AVIF compresses better).
    pub fn preference_order() -> &'static [ImageFormat] {
        &[Self::Avif, Self::Webp]
    }

    /// Parses a format name as used in config and API requests.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "webp" => Some(Self::Webp),
            "avif" => Some(Self::Avif),
            _ => None,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Target of a conversion request: one format or every enabled format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetFormat {
    /// Convert to all enabled formats.
    All,
    /// Convert to a single format.
    Format(ImageFormat),
}

impl Default for TargetFormat {
    fn default() -> Self {
        Self::All
    }
}

/// Source image kinds the system accepts as conversion input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Jpeg,
    Png,
    Gif,
}

impl SourceKind {
    /// Detects the source kind from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Returns the MIME type for this source kind.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
        }
    }
}

/// A single conversion request handed to a converter implementation.
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    /// Absolute path to the source image.
    pub source: std::path::PathBuf,
    /// Absolute path the artifact must be written to.
    pub destination: std::path::PathBuf,
    /// Target format.
    pub format: ImageFormat,
    /// Quality in [1, 100].
    pub quality: u8,
}
