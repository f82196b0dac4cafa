use std::sync::Arc;

use chrono::{DateTime, Utc};
use optipress_core::{
    BatchScheduler, Config, EventHandle, MediaLibrary, Optimizer, SanitizedConfig,
};

use crate::api::rate_limit::RateLimiter;

/// Shared application state
pub struct AppState {
    config: Config,
    optimizer: Arc<Optimizer>,
    scheduler: Arc<BatchScheduler>,
    library: MediaLibrary,
    events: EventHandle,
    rate_limiter: RateLimiter,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: Config,
        optimizer: Arc<Optimizer>,
        scheduler: Arc<BatchScheduler>,
        events: EventHandle,
    ) -> Self {
        let library = MediaLibrary::new(&config.media.root);
        let rate_limiter = RateLimiter::new(config.rate_limit.clone());
        Self {
            config,
            optimizer,
            scheduler,
            library,
            events,
            rate_limiter,
            started_at: Utc::now(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }

    pub fn scheduler(&self) -> &BatchScheduler {
        &self.scheduler
    }

    pub fn library(&self) -> &MediaLibrary {
        &self.library
    }

    pub fn events(&self) -> &EventHandle {
        &self.events
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whether the given bearer token matches the configured admin token.
    pub fn is_admin_token(&self, token: &str) -> bool {
        self.config
            .auth
            .admin_token
            .as_deref()
            .is_some_and(|admin| admin == token)
    }
}
