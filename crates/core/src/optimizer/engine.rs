//! Optimizer implementation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::artifacts::ArtifactStore;
use crate::config::ConversionConfig;
use crate::converter::{
    ConvertRequest, ConverterError, ConverterFactory, ImageFormat, TargetFormat,
};
use crate::events::{EventHandle, SinkEvent};
use crate::optimizer::types::{ConversionOutcome, ConversionRecord, FormatFailure, OptimizerStats};
use crate::state::StateStore;

#[derive(Default)]
struct StatsCounters {
    conversions: AtomicU64,
    failures: AtomicU64,
    on_demand_hits: AtomicU64,
    on_demand_conversions: AtomicU64,
    space_saved: AtomicU64,
}

/// The conversion engine.
///
/// Owns no persistent state beyond statistics counters; conversion history
/// is written through the state store.
pub struct Optimizer {
    factory: Arc<ConverterFactory>,
    artifacts: ArtifactStore,
    settings: ConversionConfig,
    store: Arc<dyn StateStore>,
    events: Option<EventHandle>,
    stats: StatsCounters,
    /// Single-flight locks for on-demand conversions. Purely an efficiency
    /// refinement: the destination-exists check is what guarantees
    /// idempotence.
    inflight: Mutex<HashMap<(PathBuf, ImageFormat), Arc<Mutex<()>>>>,
}

impl Optimizer {
    /// Creates a new optimizer.
    pub fn new(
        factory: Arc<ConverterFactory>,
        artifacts: ArtifactStore,
        settings: ConversionConfig,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            factory,
            artifacts,
            settings,
            store,
            events: None,
            stats: StatsCounters::default(),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the event handle.
    pub fn with_events(mut self, events: EventHandle) -> Self {
        self.events = Some(events);
        self
    }

    /// The artifact store this optimizer derives paths with.
    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// The conversion settings snapshot.
    pub fn settings(&self) -> &ConversionConfig {
        &self.settings
    }

    /// Snapshot of the per-call statistics counters.
    pub fn stats(&self) -> OptimizerStats {
        OptimizerStats {
            conversions: self.stats.conversions.load(Ordering::Relaxed),
            failures: self.stats.failures.load(Ordering::Relaxed),
            on_demand_hits: self.stats.on_demand_hits.load(Ordering::Relaxed),
            on_demand_conversions: self.stats.on_demand_conversions.load(Ordering::Relaxed),
            space_saved: self.stats.space_saved.load(Ordering::Relaxed),
        }
    }

    /// Formats a target resolves to under the current settings.
    pub fn formats_for(&self, target: TargetFormat) -> Vec<ImageFormat> {
        let enabled = self.enabled_formats();
        match target {
            TargetFormat::All => enabled,
            TargetFormat::Format(format) => {
                if enabled.contains(&format) {
                    vec![format]
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn enabled_formats(&self) -> Vec<ImageFormat> {
        if !self.settings.enabled {
            return Vec::new();
        }
        self.settings.enabled_formats()
    }

    /// Converts one original into every enabled format.
    ///
    /// Validation failures are returned as `Err` without touching the codec.
    /// Per-format codec failures are collected in the outcome; partial
    /// success is allowed.
    pub async fn convert_all(
        &self,
        source: &Path,
        force: bool,
    ) -> Result<ConversionOutcome, ConverterError> {
        self.convert_formats(source, &self.enabled_formats(), force)
            .await
    }

    /// Converts one original into the given formats.
    pub async fn convert_formats(
        &self,
        source: &Path,
        formats: &[ImageFormat],
        force: bool,
    ) -> Result<ConversionOutcome, ConverterError> {
        let original_size = self.artifacts.validate_source(source).await?;
        let converter = self.factory.select().await.ok_or(ConverterError::NoConverter)?;

        let mut outcome = ConversionOutcome::new(source.to_path_buf());

        for &format in formats {
            let destination = self.artifacts.artifact_path(source, format);

            if !force && self.artifacts.artifact_exists(source, format).await {
                debug!("Artifact already exists: {}", destination.display());
                continue;
            }

            let result = self
                .convert_one(converter.as_ref(), source, &destination, format, original_size)
                .await;

            match result {
                Ok(record) => {
                    self.stats.conversions.fetch_add(1, Ordering::Relaxed);
                    self.stats
                        .space_saved
                        .fetch_add(record.space_saved, Ordering::Relaxed);
                    if let Some(ref events) = self.events {
                        events
                            .emit(SinkEvent::ConversionCompleted {
                                subject: source.to_string_lossy().to_string(),
                                format: format.to_string(),
                                space_saved: record.space_saved,
                            })
                            .await;
                    }
                    outcome.records.push(record);
                }
                Err(e) => {
                    self.stats.failures.fetch_add(1, Ordering::Relaxed);
                    outcome.failures.push(FormatFailure {
                        format,
                        error: e.to_string(),
                        retryable: e.is_retryable(),
                    });
                }
            }
        }

        Ok(outcome)
    }

    /// Converts one original to one format for a serving request.
    ///
    /// Idempotent: if the artifact already exists it is returned without a
    /// codec invocation. Concurrent requests for the same (source, format)
    /// serialize on a single-flight lock.
    pub async fn convert_on_demand(
        &self,
        source: &Path,
        format: ImageFormat,
    ) -> Result<PathBuf, ConverterError> {
        let destination = self.artifacts.artifact_path(source, format);

        if self.artifacts.artifact_exists(source, format).await {
            self.stats.on_demand_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(destination);
        }

        let key = (source.to_path_buf(), format);
        let flight = {
            let mut inflight = self.inflight.lock().await;
            Arc::clone(inflight.entry(key.clone()).or_default())
        };
        let _guard = flight.lock().await;

        // A concurrent request may have produced the artifact while we
        // waited on the lock.
        if self.artifacts.artifact_exists(source, format).await {
            self.stats.on_demand_hits.fetch_add(1, Ordering::Relaxed);
            self.release_flight(&key).await;
            return Ok(destination);
        }

        let original_size = match self.artifacts.validate_source(source).await {
            Ok(size) => size,
            Err(e) => {
                self.release_flight(&key).await;
                return Err(e);
            }
        };
        let converter = match self.factory.select().await {
            Some(converter) => converter,
            None => {
                self.release_flight(&key).await;
                return Err(ConverterError::NoConverter);
            }
        };

        let result = self
            .convert_one(converter.as_ref(), source, &destination, format, original_size)
            .await;
        self.release_flight(&key).await;

        match result {
            Ok(record) => {
                self.stats
                    .on_demand_conversions
                    .fetch_add(1, Ordering::Relaxed);
                self.stats
                    .space_saved
                    .fetch_add(record.space_saved, Ordering::Relaxed);
                Ok(destination)
            }
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    async fn release_flight(&self, key: &(PathBuf, ImageFormat)) {
        self.inflight.lock().await.remove(key);
    }

    async fn convert_one(
        &self,
        converter: &dyn crate::converter::ImageConverter,
        source: &Path,
        destination: &Path,
        format: ImageFormat,
        original_size: u64,
    ) -> Result<ConversionRecord, ConverterError> {
        self.artifacts.ensure_writable(destination).await?;

        if !converter.supports(format) {
            return Err(ConverterError::UnsupportedFormat {
                converter: converter.name().to_string(),
                format: format.to_string(),
            });
        }

        let quality = self.settings.quality_for(format);
        let request = ConvertRequest {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            format,
            quality,
        };
        converter.convert(&request).await?;

        let converted_size = tokio::fs::metadata(destination)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        let record = ConversionRecord::measure(format, original_size, converted_size, quality);

        let subject = source.to_string_lossy().to_string();
        if let Err(e) = self.store.append_record(&subject, &record) {
            warn!("Failed to record conversion for {}: {}", subject, e);
        }

        Ok(record)
    }
}
