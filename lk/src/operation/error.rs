//! Loading failure taxonomy

use std::time::Duration;
use thiserror::Error;

use crate::domain::LoadingState;

/// Why a loading attempt failed.
///
/// A late result from a cancelled or superseded attempt is not an error; it
/// is discarded before it reaches this type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    /// The caller's operation rejected for a domain reason
    #[error("{message}")]
    Failed { message: String },

    /// The operation did not settle within its adaptive deadline
    #[error("Timed out after {after:?}")]
    Timeout { after: Duration },

    /// The operation failed while the host reported itself offline
    #[error("Offline: {message}")]
    Offline { message: String },
}

impl LoadError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Terminal state this failure puts an attempt in
    pub fn state(&self) -> LoadingState {
        match self {
            Self::Failed { .. } => LoadingState::Error,
            Self::Timeout { .. } => LoadingState::Timeout,
            Self::Offline { .. } => LoadingState::Offline,
        }
    }

    /// Whether an automatic retry is worthwhile.
    ///
    /// Offline failures wait for connectivity instead.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Failed { .. } => true,
            Self::Timeout { .. } => true,
            Self::Offline { .. } => false,
        }
    }
}
