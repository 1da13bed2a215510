//! Host image resolution seam

use async_trait::async_trait;
use eyre::Result;
use serde::{Deserialize, Serialize};

/// One image resolution request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRequest {
    /// Source locator, passed through uninterpreted
    pub source: String,
    /// Encoder quality hint, 1..=100
    pub quality: u8,
}

impl ImageRequest {
    pub fn new(source: impl Into<String>, quality: u8) -> Self {
        Self {
            source: source.into(),
            quality,
        }
    }
}

/// Resource-loading primitive of the host environment
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Resolve the image; `Ok` once it is ready to display
    async fn fetch(&self, request: &ImageRequest) -> Result<()>;

    /// Hint that `request` will be needed soon.
    ///
    /// Hosts without a preload mechanism can ignore it.
    fn preload(&self, _request: &ImageRequest) {}
}
