//! Loading operation configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::Priority;

/// Per-operation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationConfig {
    /// Label used for ids and analytics, e.g. `page`
    pub kind: String,

    pub priority: Priority,

    /// Timeout before network scaling, in milliseconds
    #[serde(rename = "base-timeout-ms")]
    pub base_timeout_ms: u64,

    /// Maximum number of retries after the first attempt
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    #[serde(rename = "backoff-base-ms")]
    pub backoff_base_ms: u64,

    #[serde(rename = "backoff-max-ms")]
    pub backoff_max_ms: u64,

    /// How often the synthetic progress indicator advances
    #[serde(rename = "progress-interval-ms")]
    pub progress_interval_ms: u64,

    /// Retry automatically after `error` or `timeout`
    #[serde(rename = "auto-retry")]
    pub auto_retry: bool,
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            kind: "operation".to_string(),
            priority: Priority::Normal,
            base_timeout_ms: 30_000,
            max_retries: 3,
            backoff_base_ms: 1_000,
            backoff_max_ms: 10_000,
            progress_interval_ms: 200,
            auto_retry: false,
        }
    }
}

impl OperationConfig {
    /// Config for a given kind with every other field defaulted
    pub fn for_kind(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn base_timeout(&self) -> Duration {
        Duration::from_millis(self.base_timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(1))
    }
}
