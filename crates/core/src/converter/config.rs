//! Converter tooling configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the external codec binaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Path to the cwebp binary.
    #[serde(default = "default_cwebp_path")]
    pub cwebp_path: PathBuf,
    /// Path to the avifenc binary.
    #[serde(default = "default_avifenc_path")]
    pub avifenc_path: PathBuf,
    /// Path to the ImageMagick binary.
    #[serde(default = "default_magick_path")]
    pub magick_path: PathBuf,
    /// Per-invocation timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            cwebp_path: default_cwebp_path(),
            avifenc_path: default_avifenc_path(),
            magick_path: default_magick_path(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_cwebp_path() -> PathBuf {
    PathBuf::from("cwebp")
}

fn default_avifenc_path() -> PathBuf {
    PathBuf::from("avifenc")
}

fn default_magick_path() -> PathBuf {
    PathBuf::from("magick")
}

fn default_timeout_secs() -> u64 {
    60
}
