//! Converter selection.
//!
//! Availability is probed once and the winning implementation is cached;
//! `refresh()` forces a re-probe (e.g. after installing an encoder).

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::config::ConverterConfig;
use super::cwebp::CwebpConverter;
use super::magick::MagickConverter;
use super::traits::ImageConverter;

/// Selects the best available converter from the known implementations.
pub struct ConverterFactory {
    candidates: Vec<Arc<dyn ImageConverter>>,
    selected: RwLock<Option<Option<Arc<dyn ImageConverter>>>>,
}

impl ConverterFactory {
    /// Creates a factory over the built-in converter implementations.
    pub fn new(config: ConverterConfig) -> Self {
        let mut candidates: Vec<Arc<dyn ImageConverter>> = vec![
            Arc::new(CwebpConverter::new(config.clone())),
            Arc::new(MagickConverter::new(config)),
        ];
        candidates.sort_by_key(|c| c.priority());
        Self {
            candidates,
            selected: RwLock::new(None),
        }
    }

    /// Creates a factory from explicit candidates (used by tests).
    pub fn from_candidates(mut candidates: Vec<Arc<dyn ImageConverter>>) -> Self {
        candidates.sort_by_key(|c| c.priority());
        Self {
            candidates,
            selected: RwLock::new(None),
        }
    }

    /// Returns the highest-priority available converter, if any.
    ///
    /// The probe result is cached; use [`refresh`](Self::refresh) to
    /// invalidate it.
    pub async fn select(&self) -> Option<Arc<dyn ImageConverter>> {
        if let Some(cached) = self.selected.read().await.as_ref() {
            return cached.clone();
        }

        let mut selected = None;
        for candidate in &self.candidates {
            if candidate.is_available().await {
                info!("Selected converter: {}", candidate.name());
                selected = Some(Arc::clone(candidate));
                break;
            }
        }
        if selected.is_none() {
            warn!("No image converter available; conversions will fail");
        }

        *self.selected.write().await = Some(selected.clone());
        selected
    }

    /// Drops the cached selection so the next call re-probes availability.
    pub async fn refresh(&self) {
        *self.selected.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::error::ConverterError;
    use crate::converter::types::{ConvertRequest, ImageFormat};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeConverter {
        name: &'static str,
        priority: u32,
        available: AtomicBool,
        probes: AtomicUsize,
    }

    impl FakeConverter {
        fn new(name: &'static str, priority: u32, available: bool) -> Self {
            Self {
                name,
                priority,
                available: AtomicBool::new(available),
                probes: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ImageConverter for FakeConverter {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> u32 {
            self.priority
        }

        async fn is_available(&self) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.available.load(Ordering::SeqCst)
        }

        fn supported_formats(&self) -> &[ImageFormat] {
            &[ImageFormat::Webp, ImageFormat::Avif]
        }

        async fn convert(&self, _request: &ConvertRequest) -> Result<(), ConverterError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_select_prefers_lower_priority_number() {
        let factory = ConverterFactory::from_candidates(vec![
            Arc::new(FakeConverter::new("fallback", 20, true)),
            Arc::new(FakeConverter::new("preferred", 10, true)),
        ]);
        let selected = factory.select().await.unwrap();
        assert_eq!(selected.name(), "preferred");
    }

    #[tokio::test]
    async fn test_select_skips_unavailable() {
        let factory = ConverterFactory::from_candidates(vec![
            Arc::new(FakeConverter::new("preferred", 10, false)),
            Arc::new(FakeConverter::new("fallback", 20, true)),
        ]);
        let selected = factory.select().await.unwrap();
        assert_eq!(selected.name(), "fallback");
    }

    #[tokio::test]
    async fn test_select_none_when_nothing_available() {
        let factory = ConverterFactory::from_candidates(vec![Arc::new(FakeConverter::new(
            "preferred",
            10,
            false,
        ))]);
        assert!(factory.select().await.is_none());
    }

    #[tokio::test]
    async fn test_selection_is_cached_until_refresh() {
        let probe_counter = Arc::new(FakeConverter::new("only", 10, true));
        let factory = ConverterFactory::from_candidates(vec![
            Arc::clone(&probe_counter) as Arc<dyn ImageConverter>
        ]);

        factory.select().await;
        factory.select().await;
        assert_eq!(probe_counter.probes.load(Ordering::SeqCst), 1);

        factory.refresh().await;
        factory.select().await;
        assert_eq!(probe_counter.probes.load(Ordering::SeqCst), 2);
    }
}
