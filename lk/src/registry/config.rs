//! Registry configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Registry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Active loaders at which the global priority drops to `low`
    #[serde(rename = "max-concurrent-loaders", default = "default_max_concurrent_loaders")]
    pub max_concurrent_loaders: usize,

    /// Network re-sampling interval in milliseconds
    #[serde(rename = "sample-interval-ms", default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// Number of analytics records retained
    #[serde(rename = "analytics-capacity", default = "default_analytics_capacity")]
    pub analytics_capacity: usize,

    /// Buffer size of the event broadcast channel
    #[serde(rename = "event-buffer", default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_max_concurrent_loaders() -> usize {
    debug!("default_max_concurrent_loaders: called");
    6
}

fn default_sample_interval_ms() -> u64 {
    debug!("default_sample_interval_ms: called");
    30_000
}

fn default_analytics_capacity() -> usize {
    debug!("default_analytics_capacity: called");
    100
}

fn default_event_buffer() -> usize {
    debug!("default_event_buffer: called");
    64
}

impl Default for RegistryConfig {
    fn default() -> Self {
        debug!("RegistryConfig::default: called");
        Self {
            max_concurrent_loaders: 6,
            sample_interval_ms: 30_000,
            analytics_capacity: 100,
            event_buffer: 64,
        }
    }
}

impl RegistryConfig {
    /// Get the sampling interval as a Duration
    pub fn sample_interval(&self) -> Duration {
        debug!(sample_interval_ms = %self.sample_interval_ms, "RegistryConfig::sample_interval: called");
        Duration::from_millis(self.sample_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();
        assert_eq!(config.max_concurrent_loaders, 6);
        assert_eq!(config.sample_interval(), Duration::from_secs(30));
        assert_eq!(config.analytics_capacity, 100);
        assert_eq!(config.event_buffer, 64);
    }

    #[test]
    fn test_yaml_overrides() {
        let config: RegistryConfig = serde_yaml::from_str("max-concurrent-loaders: 2\nsample-interval-ms: 500").unwrap();
        assert_eq!(config.max_concurrent_loaders, 2);
        assert_eq!(config.sample_interval(), Duration::from_millis(500));
        assert_eq!(config.analytics_capacity, 100);
    }
}
