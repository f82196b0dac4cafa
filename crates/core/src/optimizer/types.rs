//! Types for the conversion engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::converter::ImageFormat;

/// Number of conversion records kept per subject.
pub const HISTORY_LIMIT: usize = 10;

/// Outcome of one successful per-format conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRecord {
    pub format: ImageFormat,
    pub original_size: u64,
    pub converted_size: u64,
    /// `max(0, original - converted)`.
    pub space_saved: u64,
    /// Percent of the original shaved off, `space_saved / original * 100`.
    pub compression_ratio: f64,
    pub quality: u8,
    pub timestamp: DateTime<Utc>,
}

impl ConversionRecord {
    /// Builds a record from measured sizes, clamping savings at zero.
    pub fn measure(
        format: ImageFormat,
        original_size: u64,
        converted_size: u64,
        quality: u8,
    ) -> Self {
        let space_saved = original_size.saturating_sub(converted_size);
        let compression_ratio = if original_size == 0 {
            0.0
        } else {
            space_saved as f64 / original_size as f64 * 100.0
        };
        Self {
            format,
            original_size,
            converted_size,
            space_saved,
            compression_ratio,
            quality,
            timestamp: Utc::now(),
        }
    }
}

/// A per-format failure inside an otherwise valid conversion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatFailure {
    pub format: ImageFormat,
    pub error: String,
    pub retryable: bool,
}

/// Aggregate result of converting one original to several formats.
///
/// Partial success is normal: some formats may fail while others succeed.
/// The per-format failures stay individually inspectable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutcome {
    pub source: PathBuf,
    pub records: Vec<ConversionRecord>,
    pub failures: Vec<FormatFailure>,
}

impl ConversionOutcome {
    pub fn new(source: PathBuf) -> Self {
        Self {
            source,
            records: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// At least one format converted.
    pub fn any_success(&self) -> bool {
        !self.records.is_empty()
    }

    /// Every requested format failed (and at least one was requested).
    pub fn all_failed(&self) -> bool {
        self.records.is_empty() && !self.failures.is_empty()
    }

    /// Whether any of the per-format failures is worth retrying.
    pub fn any_retryable_failure(&self) -> bool {
        self.failures.iter().any(|f| f.retryable)
    }

    /// Total bytes saved across successful formats.
    pub fn total_space_saved(&self) -> u64 {
        self.records.iter().map(|r| r.space_saved).sum()
    }
}

/// Per-call statistics counters, aggregated by the optimizer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OptimizerStats {
    pub conversions: u64,
    pub failures: u64,
    pub on_demand_hits: u64,
    pub on_demand_conversions: u64,
    pub space_saved: u64,
}
