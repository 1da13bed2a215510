//! Loading priority

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Per-operation priority, also used for the registry's derived global level.
///
/// Only scales timeouts and batch sizes; nothing is reordered by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Registry is saturated; shed work
    Low,
    #[default]
    Normal,
    /// Slow network; batch more per request
    High,
    Critical,
}

impl Priority {
    /// Every level, lowest first
    pub const ALL: [Priority; 4] = [Self::Low, Self::Normal, Self::High, Self::Critical];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Above `normal`: callers should fetch larger batches
    pub fn is_elevated(self) -> bool {
        self > Self::Normal
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown loading priority '{}' (expected low, normal, high or critical)", s))
    }
}
