//! ImageMagick-based fallback converter.
//!
//! Slower and heavier than the dedicated encoders, but a single binary
//! covers both output formats. Used when cwebp/avifenc are not installed.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::config::ConverterConfig;
use super::error::ConverterError;
use super::traits::ImageConverter;
use super::types::{ConvertRequest, ImageFormat};

/// Converter using the ImageMagick `magick` binary.
pub struct MagickConverter {
    config: ConverterConfig,
}

impl MagickConverter {
    /// Creates a new converter with the given configuration.
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    fn build_args(request: &ConvertRequest) -> Vec<String> {
        // magick <input> -quality <q> <output>; the output format is
        // inferred from the destination extension.
        vec![
            request.source.to_string_lossy().to_string(),
            "-quality".to_string(),
            request.quality.to_string(),
            request.destination.to_string_lossy().to_string(),
        ]
    }
}

#[async_trait]
impl ImageConverter for MagickConverter {
    fn name(&self) -> &str {
        "imagemagick"
    }

    fn priority(&self) -> u32 {
        20
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.config.magick_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn supported_formats(&self) -> &[ImageFormat] {
        &[ImageFormat::Webp, ImageFormat::Avif]
    }

    async fn convert(&self, request: &ConvertRequest) -> Result<(), ConverterError> {
        let args = Self::build_args(request);

        debug!(
            "Running {} {}",
            self.config.magick_path.display(),
            args.join(" ")
        );

        let mut child = Command::new(&self.config.magick_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stderr_pipe = child.stderr.take();
        let wait = async {
            let mut stderr = String::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_string(&mut stderr).await;
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, stderr))
        };

        let timeout_secs = self.config.timeout_secs;
        let (status, stderr) = match timeout(Duration::from_secs(timeout_secs), wait).await {
            Ok(result) => result?,
            Err(_) => {
                // Kill the process on timeout
                let _ = child.kill().await;
                return Err(ConverterError::Timeout { timeout_secs });
            }
        };

        if !status.success() {
            return Err(ConverterError::conversion_failed(
                format!("magick exited with status {}", status.code().unwrap_or(-1)),
                if stderr.is_empty() {
                    None
                } else {
                    Some(stderr)
                },
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_args_carry_quality_and_destination() {
        let request = ConvertRequest {
            source: PathBuf::from("/media/b.png"),
            destination: PathBuf::from("/media/b.png.avif"),
            format: ImageFormat::Avif,
            quality: 55,
        };
        let args = MagickConverter::build_args(&request);
        assert_eq!(args[0], "/media/b.png");
        assert_eq!(args[1], "-quality");
        assert_eq!(args[2], "55");
        assert_eq!(args[3], "/media/b.png.avif");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_the_encoder() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow-magick");
        tokio::fs::write(
            &script,
            "#!/bin/sh\necho $$ > \"$(dirname \"$0\")/pid\"\nexec sleep 30\n",
        )
        .await
        .unwrap();
        let mut perms = tokio::fs::metadata(&script).await.unwrap().permissions();
        perms.set_mode(0o755);
        tokio::fs::set_permissions(&script, perms).await.unwrap();

        let converter = MagickConverter::new(ConverterConfig {
            magick_path: script,
            timeout_secs: 1,
            ..Default::default()
        });
        let request = ConvertRequest {
            source: dir.path().join("b.png"),
            destination: dir.path().join("b.png.webp"),
            format: ImageFormat::Webp,
            quality: 70,
        };

        let err = converter.convert(&request).await.unwrap_err();
        assert!(matches!(err, ConverterError::Timeout { timeout_secs: 1 }));

        let pid: u32 = tokio::fs::read_to_string(dir.path().join("pid"))
            .await
            .unwrap()
            .trim()
            .parse()
            .unwrap();

        let mut dead = false;
        for _ in 0..40 {
            match tokio::fs::read_to_string(format!("/proc/{}/stat", pid)).await {
                Err(_) => {
                    dead = true;
                    break;
                }
                Ok(stat) if stat.contains(") Z") => {
                    dead = true;
                    break;
                }
                Ok(_) => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
        assert!(dead, "encoder process still running after timeout");
    }
}
