//! Image converter capability: trait, implementations and selection.

mod config;
mod cwebp;
mod error;
mod factory;
mod magick;
mod traits;
mod types;

pub use config::ConverterConfig;
pub use cwebp::CwebpConverter;
pub use error::ConverterError;
pub use factory::ConverterFactory;
pub use magick::MagickConverter;
pub use traits::ImageConverter;
pub use types::{ConvertRequest, ImageFormat, SourceKind, TargetFormat};
