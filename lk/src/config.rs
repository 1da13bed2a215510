//! Loadkit configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::compare::ComparisonConfig;
use crate::image::ImageLoadConfig;
use crate::operation::OperationConfig;
use crate::placeholder::PlaceholderConfig;
use crate::progressive::ProgressiveConfig;
use crate::registry::RegistryConfig;

/// Main loadkit configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Session registry
    pub registry: RegistryConfig,

    /// Defaults for standalone loading operations
    pub operation: OperationConfig,

    /// Progressive list loading
    pub progressive: ProgressiveConfig,

    /// Defaults for image reveals
    pub image: ImageLoadConfig,

    /// Placeholder display timing
    pub placeholder: PlaceholderConfig,

    /// Structural comparison layer
    pub comparison: ComparisonConfig,
}

impl Config {
    /// Reject values that would stall or disable loading outright
    pub fn validate(&self) -> Result<()> {
        if self.registry.max_concurrent_loaders == 0 {
            return Err(eyre::eyre!("registry.max-concurrent-loaders must be at least 1"));
        }
        if self.progressive.items_per_page == 0 {
            return Err(eyre::eyre!("progressive.items-per-page must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.image.threshold) {
            return Err(eyre::eyre!(
                "image.threshold must be between 0 and 1, got {}",
                self.image.threshold
            ));
        }
        if self.operation.backoff_base_ms > self.operation.backoff_max_ms {
            return Err(eyre::eyre!(
                "operation.backoff-base-ms ({}) exceeds backoff-max-ms ({})",
                self.operation.backoff_base_ms,
                self.operation.backoff_max_ms
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .loadkit.yml
        let local_config = PathBuf::from(".loadkit.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/loadkit/loadkit.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("loadkit").join("loadkit.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.registry.max_concurrent_loaders, 6);
        assert_eq!(config.operation.base_timeout_ms, 30_000);
        assert_eq!(config.progressive.items_per_page, 20);
        assert_eq!(config.placeholder.delay_ms, 200);
        assert_eq!(config.comparison.cache_capacity, 512);
        assert!(config.log_level.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
log-level: debug

registry:
  max-concurrent-loaders: 4
  sample-interval-ms: 10000

operation:
  base-timeout-ms: 15000
  auto-retry: true

progressive:
  items-per-page: 50
  adaptive-batching: true

image:
  placeholder-style: skeleton
  fade-duration-ms: 200

placeholder:
  min-display-ms: 800
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.registry.max_concurrent_loaders, 4);
        assert_eq!(config.registry.analytics_capacity, 100);
        assert_eq!(config.operation.base_timeout_ms, 15_000);
        assert!(config.operation.auto_retry);
        assert_eq!(config.progressive.items_per_page, 50);
        assert!(config.progressive.adaptive_batching);
        assert_eq!(config.image.fade_duration_ms, 200);
        assert_eq!(config.placeholder.min_display_ms, 800);
        assert_eq!(config.placeholder.delay_ms, 200);
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "progressive:\n  items-per-page: 7").unwrap();

        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.progressive.items_per_page, 7);
    }

    #[test]
    fn test_load_explicit_path_missing_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yml");
        let err = Config::load(Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("Failed to load config"));
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let mut config = Config::default();
        config.progressive.items_per_page = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_backoff() {
        let mut config = Config::default();
        config.operation.backoff_base_ms = 20_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_roundtrip_keeps_kebab_keys() {
        let yaml = serde_yaml::to_string(&Config::default()).unwrap();
        assert!(yaml.contains("max-concurrent-loaders: 6"));
        assert!(yaml.contains("items-per-page: 20"));
        assert!(!yaml.contains("log-level"));
    }
}
