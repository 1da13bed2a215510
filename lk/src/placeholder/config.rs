//! Placeholder timer configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Placeholder timer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaceholderConfig {
    /// Loading must last this long before the placeholder appears
    #[serde(rename = "delay-ms")]
    pub delay_ms: u64,

    /// Once shown, the placeholder stays at least this long
    #[serde(rename = "min-display-ms")]
    pub min_display_ms: u64,

    /// Length of the entering and exiting transitions
    #[serde(rename = "transition-ms")]
    pub transition_ms: u64,
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        Self {
            delay_ms: 200,
            min_display_ms: 500,
            transition_ms: 150,
        }
    }
}

impl PlaceholderConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn min_display(&self) -> Duration {
        Duration::from_millis(self.min_display_ms)
    }

    pub fn transition(&self) -> Duration {
        Duration::from_millis(self.transition_ms)
    }
}
