use crate::config::types::{
    Config, CrawlerConfig, ExtractorConfig, FetchConfig, FieldKind, OutputConfig, WatchdogConfig,
};
use crate::ConfigError;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_fetch_config(&config.fetch)?;
    validate_watchdog_config(&config.watchdog)?;
    validate_output_config(&config.output)?;
    validate_extractor_config(&config.extractor)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url must use http or https, got '{}'",
            config.base_url
        )));
    }

    if config.max_pages < 1 || config.max_pages == u32::MAX {
        return Err(ConfigError::Validation(format!(
            "max_pages must be between 1 and {}, got {}",
            u32::MAX - 1,
            config.max_pages
        )));
    }

    if config.limit < 1 {
        return Err(ConfigError::Validation("limit must be >= 1".to_string()));
    }

    if config.page_workers < 1 || config.page_workers > 16 {
        return Err(ConfigError::Validation(format!(
            "page_workers must be between 1 and 16, got {}",
            config.page_workers
        )));
    }

    if config.detail_workers < 1 || config.detail_workers > 100 {
        return Err(ConfigError::Validation(format!(
            "detail_workers must be between 1 and 100, got {}",
            config.detail_workers
        )));
    }

    if config.checkpoint_interval < 1 {
        return Err(ConfigError::Validation(
            "checkpoint_interval must be >= 1".to_string(),
        ));
    }

    if config.runtime_budget_secs < 1 {
        return Err(ConfigError::Validation(
            "runtime_budget_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates fetch policy configuration
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "max_attempts must be >= 1".to_string(),
        ));
    }

    validate_range(
        "retry_delay",
        config.retry_delay_min_ms,
        config.retry_delay_max_ms,
    )?;
    validate_range(
        "page_settle",
        config.page_settle_min_ms,
        config.page_settle_max_ms,
    )?;
    validate_range(
        "detail_settle",
        config.detail_settle_min_ms,
        config.detail_settle_max_ms,
    )?;

    if config.page_timeout_secs < 1 || config.detail_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "page_timeout_secs and detail_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.error_marker.is_empty() {
        return Err(ConfigError::Validation(
            "error_marker cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_range(name: &str, min: u64, max: u64) -> Result<(), ConfigError> {
    if min > max {
        return Err(ConfigError::Validation(format!(
            "{}_min_ms ({}) must not exceed {}_max_ms ({})",
            name, min, name, max
        )));
    }
    Ok(())
}

/// Validates watchdog configuration
fn validate_watchdog_config(config: &WatchdogConfig) -> Result<(), ConfigError> {
    if !(config.threshold_percent > 0.0 && config.threshold_percent <= 100.0) {
        return Err(ConfigError::Validation(format!(
            "threshold_percent must be in (0, 100], got {}",
            config.threshold_percent
        )));
    }

    if config.sustain_samples < 1 {
        return Err(ConfigError::Validation(
            "sustain_samples must be >= 1".to_string(),
        ));
    }

    if config.sample_interval_ms < 10 {
        return Err(ConfigError::Validation(format!(
            "sample_interval_ms must be >= 10ms, got {}ms",
            config.sample_interval_ms
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    let required = [
        ("data_path", &config.data_path),
        ("state_path", &config.state_path),
        ("marker_path", &config.marker_path),
        ("final_path", &config.final_path),
    ];

    for (name, value) in required {
        if value.is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    if config.data_path == config.state_path {
        return Err(ConfigError::Validation(
            "data_path and state_path must differ".to_string(),
        ));
    }

    Ok(())
}

/// Validates extractor selectors and field rules
fn validate_extractor_config(config: &ExtractorConfig) -> Result<(), ConfigError> {
    validate_selector(&config.title_selector)?;
    validate_selector(&config.parent_selector)?;

    let mut names = HashSet::new();
    for rule in &config.fields {
        if rule.name.is_empty() {
            return Err(ConfigError::Validation(
                "field name cannot be empty".to_string(),
            ));
        }

        if !names.insert(rule.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate field name '{}'",
                rule.name
            )));
        }

        validate_selector(&rule.selector)?;

        match &rule.kind {
            FieldKind::Text | FieldKind::List | FieldKind::Range { .. } => {}
            FieldKind::AfterHeading { heading } => validate_heading(&rule.name, heading)?,
            FieldKind::ListAfterHeading { heading, container } => {
                validate_heading(&rule.name, heading)?;
                validate_selector(container)?;
            }
            FieldKind::LinkParam { param } => {
                if param.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "field '{}' needs a non-empty param",
                        rule.name
                    )));
                }
            }
            FieldKind::Grouped { label, values, .. } => {
                validate_selector(label)?;
                validate_selector(values)?;
            }
        }
    }

    Ok(())
}

fn validate_heading(field: &str, heading: &str) -> Result<(), ConfigError> {
    if heading.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "field '{}' needs a non-empty heading",
            field
        )));
    }
    Ok(())
}

/// Checks that a CSS selector parses
fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector {
            selector: selector.to_string(),
            message: e.to_string(),
        })
}
