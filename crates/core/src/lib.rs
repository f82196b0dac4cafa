//! Core library for the optipress image conversion service.
//!
//! Converts JPEG/PNG/GIF originals into WebP and AVIF artifacts, either in
//! resource-bounded batch runs or on demand from the serving path.

pub mod artifacts;
pub mod config;
pub mod converter;
pub mod events;
pub mod media;
pub mod negotiate;
pub mod optimizer;
pub mod scheduler;
pub mod state;
pub mod testing;

pub use artifacts::{ArtifactStore, OrphanSweep};
pub use config::{
    load_config, validate_config, Config, ConfigError, ConversionMode, SanitizedConfig,
};
pub use converter::{
    ConverterConfig, ConverterError, ConverterFactory, CwebpConverter, ImageConverter,
    ImageFormat, MagickConverter, SourceKind, TargetFormat,
};
pub use events::{create_event_sink, EventHandle, EventWriter, SinkEvent};
pub use media::MediaLibrary;
pub use optimizer::{Optimizer, OptimizerStats};
pub use scheduler::{
    BatchOptions, BatchReport, BatchScheduler, BatchStatus, SchedulerError,
};
pub use state::{SqliteStateStore, StateError, StateStore};
