//! Progressive loader configuration

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::operation::OperationConfig;

fn default_items_per_page() -> usize {
    let value = 20;
    debug!(value, "default_items_per_page: called");
    value
}

fn default_initial_load() -> bool {
    true
}

fn default_operation() -> OperationConfig {
    OperationConfig::for_kind("page")
}

/// Progressive loader configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressiveConfig {
    /// Items requested per page
    #[serde(rename = "items-per-page", default = "default_items_per_page")]
    pub items_per_page: usize,

    /// Load the first page on `start()`
    #[serde(rename = "initial-load", default = "default_initial_load")]
    pub initial_load: bool,

    /// Scale the page size with the registry's loading priority
    #[serde(rename = "adaptive-batching", default)]
    pub adaptive_batching: bool,

    /// Settings for each page fetch
    #[serde(default = "default_operation")]
    pub operation: OperationConfig,
}

impl Default for ProgressiveConfig {
    fn default() -> Self {
        Self {
            items_per_page: default_items_per_page(),
            initial_load: default_initial_load(),
            adaptive_batching: false,
            operation: default_operation(),
        }
    }
}

impl ProgressiveConfig {
    pub fn with_page_size(items_per_page: usize) -> Self {
        Self {
            items_per_page,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProgressiveConfig::default();
        assert_eq!(config.items_per_page, 20);
        assert!(config.initial_load);
        assert!(!config.adaptive_batching);
        assert_eq!(config.operation.kind, "page");
    }

    #[test]
    fn test_yaml_overrides() {
        let yaml = "items-per-page: 50\nadaptive-batching: true\noperation:\n  max-retries: 0\n";
        let config: ProgressiveConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.items_per_page, 50);
        assert!(config.adaptive_batching);
        assert!(config.initial_load);
        assert_eq!(config.operation.max_retries, 0);
        // Nested defaults come from OperationConfig, not the page default
        assert_eq!(config.operation.kind, "operation");
    }
}
