use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::converter::{ConverterConfig, ImageFormat};
use crate::scheduler::SchedulerConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub media: MediaConfig,
    #[serde(default)]
    pub conversion: ConversionConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub batch: SchedulerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("optipress.db")
}

/// Media library configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaConfig {
    /// Trusted root directory containing the originals.
    pub root: PathBuf,
}

/// When conversions are allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionMode {
    /// Batch and on-demand conversion.
    Auto,
    /// Only explicitly requested batches; no automatic enumeration.
    Manual,
    /// Batch only; the serving path never converts.
    CliOnly,
}

impl Default for ConversionMode {
    fn default() -> Self {
        Self::Auto
    }
}

/// Per-format settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FormatSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Quality in [1, 100].
    pub quality: u8,
}

fn default_true() -> bool {
    true
}

/// Conversion behavior configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversionConfig {
    /// Master switch for the whole conversion system.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_webp")]
    pub webp: FormatSettings,
    #[serde(default = "default_avif")]
    pub avif: FormatSettings,
    #[serde(default)]
    pub mode: ConversionMode,
    /// Source size ceiling in bytes; 0 = unlimited.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            webp: default_webp(),
            avif: default_avif(),
            mode: ConversionMode::default(),
            max_file_size: default_max_file_size(),
        }
    }
}

impl ConversionConfig {
    /// Enabled formats in serving preference order (AVIF first).
    pub fn enabled_formats(&self) -> Vec<ImageFormat> {
        let mut formats = Vec::new();
        if self.avif.enabled {
            formats.push(ImageFormat::Avif);
        }
        if self.webp.enabled {
            formats.push(ImageFormat::Webp);
        }
        formats
    }

    /// Configured quality for a format.
    pub fn quality_for(&self, format: ImageFormat) -> u8 {
        match format {
            ImageFormat::Webp => self.webp.quality,
            ImageFormat::Avif => self.avif.quality,
        }
    }
}

fn default_webp() -> FormatSettings {
    FormatSettings {
        enabled: true,
        quality: 80,
    }
}

fn default_avif() -> FormatSettings {
    FormatSettings {
        enabled: true,
        quality: 60,
    }
}

fn default_max_file_size() -> u64 {
    // 64 MiB
    64 * 1024 * 1024
}

/// Serving-path rate limiting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

fn default_max_requests() -> u32 {
    30
}

fn default_window_secs() -> u64 {
    60
}

/// Authentication configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Bearer token granting admin access (rate-limit bypass, batch control).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_token: Option<String>,
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub media: MediaConfig,
    pub conversion: ConversionConfig,
    pub batch: SchedulerConfig,
    pub rate_limit: RateLimitConfig,
    pub auth: SanitizedAuthConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub admin_token_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            media: config.media.clone(),
            conversion: config.conversion.clone(),
            batch: config.batch.clone(),
            rate_limit: config.rate_limit.clone(),
            auth: SanitizedAuthConfig {
                admin_token_configured: config.auth.admin_token.is_some(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Config {
        Config {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            media: MediaConfig {
                root: PathBuf::from("/media"),
            },
            conversion: ConversionConfig::default(),
            converter: ConverterConfig::default(),
            batch: SchedulerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            auth: AuthConfig::default(),
        }
    }

    #[test]
    fn test_enabled_formats_preference_order() {
        let config = minimal();
        assert_eq!(
            config.conversion.enabled_formats(),
            vec![ImageFormat::Avif, ImageFormat::Webp]
        );
    }

    #[test]
    fn test_enabled_formats_respects_toggles() {
        let mut config = minimal();
        config.conversion.avif.enabled = false;
        assert_eq!(config.conversion.enabled_formats(), vec![ImageFormat::Webp]);
    }

    #[test]
    fn test_sanitized_redacts_token() {
        let mut config = minimal();
        config.auth.admin_token = Some("secret".to_string());
        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.auth.admin_token_configured);
        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret"));
    }
}
