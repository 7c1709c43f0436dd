use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use sumi_harvest::config::load_config;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// println!("Detail workers: {}", config.crawler.detail_workers);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of configuration text
///
/// Stored with every run in the ledger, so runs made under different
/// settings can be told apart.
pub fn hash_config_text(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Computes a SHA-256 hash of the configuration file content
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(hash_config_text(&content))
}

/// Loads a configuration and returns both the config and its hash
///
/// Without a path the built-in defaults are used and hashed as an empty file.
pub fn load_config_with_hash(path: Option<&Path>) -> Result<(Config, String), ConfigError> {
    let content = match path {
        Some(path) => std::fs::read_to_string(path)?,
        None => String::new(),
    };
    let config = parse_config(&content)?;
    Ok((config, hash_config_text(&content)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::FieldKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[crawler]
base-url = "https://listings.example.com/search?page="
max-pages = 12
limit = 500
detail-workers = 8

[fetch]
max-attempts = 2

[watchdog]
enabled = false

[output]
data-path = "./progress.json"
state-path = "./state.json"

[extractor]
title-selector = "h3.name"
parent-selector = "span.owner"

[[extractor.fields]]
name = "Duration"
selector = "span.duration"
kind = "text"

[[extractor.fields]]
name = "Website"
selector = "a.website"
kind = "link-param"
param = "target"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.max_pages, 12);
        assert_eq!(config.crawler.limit, 500);
        assert_eq!(config.crawler.detail_workers, 8);
        // Unspecified keys keep their defaults
        assert_eq!(config.crawler.checkpoint_interval, 20);
        assert_eq!(config.fetch.max_attempts, 2);
        assert!(!config.watchdog.enabled);
        assert_eq!(config.output.data_path, "./progress.json");
        assert_eq!(config.extractor.fields.len(), 2);
        assert_eq!(
            config.extractor.fields[1].kind,
            FieldKind::LinkParam {
                param: "target".to_string()
            }
        );
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.crawler.max_pages, 1980);
        assert_eq!(config.crawler.limit, 40_000);
        assert_eq!(config.crawler.detail_workers, 25);
        assert_eq!(config.fetch.max_attempts, 3);
        assert_eq!(config.watchdog.sustain_samples, 15);
        assert_eq!(config.extractor.title_selector, "h2.StudyName");
        assert!(!config.extractor.fields.is_empty());
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/harvest.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unknown_field_kind_is_parse_error() {
        let result = parse_config(
            r#"
[[extractor.fields]]
name = "X"
selector = "p"
kind = "telepathy"
"#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
[crawler]
detail-workers = 0
"#;

        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("[crawler]\nlimit = 1\n");
        let file2 = create_temp_config("[crawler]\nlimit = 2\n");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_load_config_with_hash_without_file() {
        let (config, hash) = load_config_with_hash(None).unwrap();
        assert_eq!(config.crawler.limit, 40_000);
        assert_eq!(hash, hash_config_text(""));
    }
}
