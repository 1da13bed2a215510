//! Progressive image pipeline
//!
//! Reveals a target image behind a placeholder, optionally waiting for the
//! host element to scroll into view, with a single fallback substitution on
//! failure.

mod config;
mod fetcher;
mod pipeline;

pub use config::{ImageLoadConfig, PlaceholderStyle};
pub use fetcher::{ImageFetcher, ImageRequest};
pub use pipeline::{ImageHandle, ImageLoadState, ImagePhase, ImagePipeline};
