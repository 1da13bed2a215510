//! Comparison layer configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Comparison layer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonConfig {
    /// Maximum number of memoized identity pairs
    #[serde(rename = "cache-capacity", default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Average comparison time (microseconds) above which warnings are reported
    #[serde(rename = "warn-avg-micros", default = "default_warn_avg_micros")]
    pub warn_avg_micros: u64,
}

fn default_cache_capacity() -> usize {
    512
}

fn default_warn_avg_micros() -> u64 {
    1000
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            warn_avg_micros: default_warn_avg_micros(),
        }
    }
}

impl ComparisonConfig {
    /// Soft threshold as a Duration
    pub fn warn_avg(&self) -> Duration {
        Duration::from_micros(self.warn_avg_micros)
    }
}
