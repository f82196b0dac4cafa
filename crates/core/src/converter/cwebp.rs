//! Converter backed by the libwebp/libavif command line encoders.
//!
//! Uses `cwebp` for WebP output and `avifenc` for AVIF output. Both tools
//! are invoked as child processes with a hard timeout; the child is killed
//! if the timeout elapses.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::RwLock;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::config::ConverterConfig;
use super::error::ConverterError;
use super::traits::ImageConverter;
use super::types::{ConvertRequest, ImageFormat};

const ALL_FORMATS: &[ImageFormat] = &[ImageFormat::Webp, ImageFormat::Avif];

/// Converter using the dedicated `cwebp` and `avifenc` encoders.
///
/// The two output formats need two separate binaries, so availability is
/// probed per format: `supported_formats` reflects the last probe and only
/// lists formats whose encoder answered.
pub struct CwebpConverter {
    config: ConverterConfig,
    probed: RwLock<&'static [ImageFormat]>,
}

impl CwebpConverter {
    /// Creates a new converter with the given configuration.
    pub fn new(config: ConverterConfig) -> Self {
        Self {
            config,
            // Until probed, claim both; the factory probes before selecting.
            probed: RwLock::new(ALL_FORMATS),
        }
    }

    fn binary_for(&self, format: ImageFormat) -> &Path {
        match format {
            ImageFormat::Webp => &self.config.cwebp_path,
            ImageFormat::Avif => &self.config.avifenc_path,
        }
    }

    fn build_args(request: &ConvertRequest) -> Vec<String> {
        match request.format {
            // cwebp -q <quality> <input> -o <output>
            ImageFormat::Webp => vec![
                "-q".to_string(),
                request.quality.to_string(),
                "-quiet".to_string(),
                request.source.to_string_lossy().to_string(),
                "-o".to_string(),
                request.destination.to_string_lossy().to_string(),
            ],
            // avifenc -q <quality> <input> <output>
            ImageFormat::Avif => vec![
                "-q".to_string(),
                request.quality.to_string(),
                request.source.to_string_lossy().to_string(),
                request.destination.to_string_lossy().to_string(),
            ],
        }
    }

    async fn probe_binary(path: &Path) -> bool {
        Command::new(path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl ImageConverter for CwebpConverter {
    fn name(&self) -> &str {
        "cwebp"
    }

    fn priority(&self) -> u32 {
        10
    }

    async fn is_available(&self) -> bool {
        let webp = Self::probe_binary(&self.config.cwebp_path).await;
        let avif = Self::probe_binary(&self.config.avifenc_path).await;
        let formats: &'static [ImageFormat] = match (webp, avif) {
            (true, true) => ALL_FORMATS,
            (true, false) => &[ImageFormat::Webp],
            (false, true) => &[ImageFormat::Avif],
            (false, false) => &[],
        };
        match self.probed.write() {
            Ok(mut probed) => *probed = formats,
            Err(poisoned) => *poisoned.into_inner() = formats,
        }
        !formats.is_empty()
    }

    fn supported_formats(&self) -> &[ImageFormat] {
        match self.probed.read() {
            Ok(probed) => *probed,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    async fn convert(&self, request: &ConvertRequest) -> Result<(), ConverterError> {
        let binary = self.binary_for(request.format);
        let args = Self::build_args(request);

        debug!(
            "Running {} {} for {}",
            binary.display(),
            args.join(" "),
            request.source.display()
        );

        let mut child = Command::new(binary)
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
                format!(
                    "{} exited with status {}",
                    binary.display(),
                    status.code().unwrap_or(-1)
                ),
                if stderr.is_empty() {
                    None
                } else {
                    Some(stderr)
                },
            ));
        }

        // Some encoders exit 0 without writing anything on odd inputs.
        if tokio::fs::metadata(&request.destination).await.is_err() {
            return Err(ConverterError::conversion_failed(
                format!(
                    "{} reported success but produced no output",
                    binary.display()
                ),
                None,
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
    fn test_webp_args() {
        let request = ConvertRequest {
            source: PathBuf::from("/media/a.jpg"),
            destination: PathBuf::from("/media/a.jpg.webp"),
            format: ImageFormat::Webp,
            quality: 82,
        };
        let args = CwebpConverter::build_args(&request);
        assert_eq!(args[0], "-q");
        assert_eq!(args[1], "82");
        assert!(args.contains(&"-o".to_string()));
        assert!(args.contains(&"/media/a.jpg.webp".to_string()));
    }

    #[test]
    fn test_avif_args_have_no_output_flag() {
        let request = ConvertRequest {
            source: PathBuf::from("/media/a.jpg"),
            destination: PathBuf::from("/media/a.jpg.avif"),
            format: ImageFormat::Avif,
            quality: 60,
        };
        let args = CwebpConverter::build_args(&request);
        assert!(!args.contains(&"-o".to_string()));
        assert_eq!(args.last().unwrap(), "/media/a.jpg.avif");
    }

    #[tokio::test]
    async fn test_unavailable_when_both_binaries_missing() {
        let converter = CwebpConverter::new(ConverterConfig {
            cwebp_path: PathBuf::from("/nonexistent/cwebp"),
            avifenc_path: PathBuf::from("/nonexistent/avifenc"),
            ..Default::default()
        });
        assert!(!converter.is_available().await);
        assert!(converter.supported_formats().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_avif_encoder_drops_the_format() {
        // /bin/true ignores "-version" and exits 0, standing in for an
        // installed cwebp; avifenc is missing.
        let converter = CwebpConverter::new(ConverterConfig {
            cwebp_path: PathBuf::from("/bin/true"),
            avifenc_path: PathBuf::from("/nonexistent/avifenc"),
            ..Default::default()
        });

        assert!(converter.is_available().await);
        assert_eq!(converter.supported_formats(), &[ImageFormat::Webp]);
        assert!(converter.supports(ImageFormat::Webp));
        assert!(!converter.supports(ImageFormat::Avif));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_the_encoder() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow-encoder");
        tokio::fs::write(
            &script,
            "#!/bin/sh\necho $$ > \"$(dirname \"$0\")/pid\"\nexec sleep 30\n",
        )
        .await
        .unwrap();
        let mut perms = tokio::fs::metadata(&script).await.unwrap().permissions();
        perms.set_mode(0o755);
        tokio::fs::set_permissions(&script, perms).await.unwrap();

        let converter = CwebpConverter::new(ConverterConfig {
            cwebp_path: script,
            timeout_secs: 1,
            ..Default::default()
        });
        let request = ConvertRequest {
            source: dir.path().join("a.jpg"),
            destination: dir.path().join("a.jpg.webp"),
            format: ImageFormat::Webp,
            quality: 80,
        };

        let err = converter.convert(&request).await.unwrap_err();
        assert!(matches!(err, ConverterError::Timeout { timeout_secs: 1 }));

        let pid: u32 = tokio::fs::read_to_string(dir.path().join("pid"))
            .await
            .unwrap()
            .trim()
            .parse()
            .unwrap();

        // The child must be dead (reaped, or a zombie pending reaping)
        // shortly after the timeout fires.
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
