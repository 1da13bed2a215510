//! Loading operation states

use serde::{Deserialize, Serialize};

/// State of one loading attempt.
///
/// `idle -> loading -> {success | error | timeout | offline}`. The four
/// right-hand states are terminal for that attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoadingState {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
    Timeout,
    Offline,
}

impl LoadingState {
    /// Whether this state ends an attempt
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Timeout | Self::Offline)
    }

    /// Whether this state is a failed end of an attempt
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Error | Self::Timeout | Self::Offline)
    }
}

impl std::fmt::Display for LoadingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Loading => write!(f, "loading"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::Timeout => write!(f, "timeout"),
            Self::Offline => write!(f, "offline"),
        }
    }
}
