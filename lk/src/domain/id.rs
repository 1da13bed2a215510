//! Operation identifiers

use serde::{Deserialize, Serialize};

/// Unique identifier of one loading attempt.
///
/// Backed by a UUIDv7 so ids sort by creation time. A retry gets a fresh id;
/// ids are never reused within a process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    /// Generate a new id tagged with the operation kind, e.g. `page-0193f2c1a4b8`
    pub fn generate(kind: &str) -> Self {
        let uuid = uuid::Uuid::now_v7().simple().to_string();
        Self(format!("{}-{}", kind, uuid))
    }

    /// Wrap an existing id string
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the full id string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the kind prefix
    pub fn kind(&self) -> &str {
        self.0.rsplit_once('-').map(|(kind, _)| kind).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OperationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
