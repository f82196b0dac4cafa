use super::{types::Config, ConfigError};

/// Validate configuration
/// Checks the ranges the type system cannot express:
/// - quality values in [1, 100]
/// - memory fraction in (0, 1]
/// - non-zero tick budgets
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    for (name, quality) in [
        ("conversion.webp.quality", config.conversion.webp.quality),
        ("conversion.avif.quality", config.conversion.avif.quality),
    ] {
        if !(1..=100).contains(&quality) {
            return Err(ConfigError::ValidationError(format!(
                "{} must be in [1, 100], got {}",
                name, quality
            )));
        }
    }

    if config.batch.items_per_tick == 0 {
        return Err(ConfigError::ValidationError(
            "batch.items_per_tick cannot be 0".to_string(),
        ));
    }

    if config.batch.tick_time_ceiling_secs == 0 {
        return Err(ConfigError::ValidationError(
            "batch.tick_time_ceiling_secs cannot be 0".to_string(),
        ));
    }

    if !(config.batch.memory_fraction > 0.0 && config.batch.memory_fraction <= 1.0) {
        return Err(ConfigError::ValidationError(format!(
            "batch.memory_fraction must be in (0, 1], got {}",
            config.batch.memory_fraction
        )));
    }

    if config.rate_limit.window_secs == 0 {
        return Err(ConfigError::ValidationError(
            "rate_limit.window_secs cannot be 0".to_string(),
        ));
    }

    if config.media.root.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "media.root cannot be empty".to_string(),
        ));
    }

    Ok(())
}
