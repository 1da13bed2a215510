//! Image pipeline configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::operation::OperationConfig;
use crate::platform::VisibilityOptions;

/// What to show while the target is pending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderStyle {
    /// Show the low-resolution placeholder source
    #[default]
    Blur,
    /// Show nothing
    Empty,
    /// Show a skeleton block; no source is displayed
    Skeleton,
}

fn default_quality() -> u8 {
    75
}

fn default_fade_duration_ms() -> u64 {
    300
}

fn default_swap_delay_ms() -> u64 {
    50
}

fn default_lazy() -> bool {
    true
}

fn default_root_margin_px() -> u32 {
    50
}

fn default_threshold() -> f64 {
    0.1
}

fn default_operation() -> OperationConfig {
    OperationConfig::for_kind("image")
}

/// Per-image configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageLoadConfig {
    #[serde(rename = "placeholder-source", default, skip_serializing_if = "Option::is_none")]
    pub placeholder_source: Option<String>,

    #[serde(rename = "placeholder-style", default)]
    pub placeholder_style: PlaceholderStyle,

    #[serde(default = "default_quality")]
    pub quality: u8,

    /// Issue a preload hint before any lazy gating
    #[serde(default)]
    pub priority: bool,

    #[serde(rename = "fade-duration-ms", default = "default_fade_duration_ms")]
    pub fade_duration_ms: u64,

    /// Pause between resolution and the displayed-source swap
    #[serde(rename = "swap-delay-ms", default = "default_swap_delay_ms")]
    pub swap_delay_ms: u64,

    /// Wait for the element to become visible before loading
    #[serde(default = "default_lazy")]
    pub lazy: bool,

    #[serde(rename = "root-margin-px", default = "default_root_margin_px")]
    pub root_margin_px: u32,

    #[serde(default = "default_threshold")]
    pub threshold: f64,

    #[serde(rename = "fallback-source", default, skip_serializing_if = "Option::is_none")]
    pub fallback_source: Option<String>,

    #[serde(default = "default_operation")]
    pub operation: OperationConfig,
}

impl Default for ImageLoadConfig {
    fn default() -> Self {
        Self {
            placeholder_source: None,
            placeholder_style: PlaceholderStyle::default(),
            quality: default_quality(),
            priority: false,
            fade_duration_ms: default_fade_duration_ms(),
            swap_delay_ms: default_swap_delay_ms(),
            lazy: default_lazy(),
            root_margin_px: default_root_margin_px(),
            threshold: default_threshold(),
            fallback_source: None,
            operation: default_operation(),
        }
    }
}

impl ImageLoadConfig {
    /// Eager config with a blur placeholder
    pub fn eager() -> Self {
        Self {
            lazy: false,
            ..Default::default()
        }
    }

    pub fn fade_duration(&self) -> Duration {
        Duration::from_millis(self.fade_duration_ms)
    }

    pub fn swap_delay(&self) -> Duration {
        Duration::from_millis(self.swap_delay_ms)
    }

    pub fn visibility_options(&self) -> VisibilityOptions {
        VisibilityOptions {
            root_margin_px: self.root_margin_px,
            threshold: self.threshold,
        }
    }

    /// Source shown while the target is pending
    pub fn pending_source(&self) -> Option<String> {
        match self.placeholder_style {
            PlaceholderStyle::Blur => self.placeholder_source.clone(),
            PlaceholderStyle::Empty | PlaceholderStyle::Skeleton => None,
        }
    }
}
