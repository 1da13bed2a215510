//! Loadkit - Adaptive Resource-Loading Orchestration
//!
//! Decides when, how much and how aggressively to fetch paginated data,
//! reveal images and show placeholders, adapting to network conditions and
//! tolerating partial failure.
//!
//! # Core Concepts
//!
//! - **One registry per session**: every loading attempt registers with a
//!   [`LoadingRegistry`], which derives a global backpressure priority
//! - **Adaptive deadlines**: timeouts scale with sampled [`NetworkQuality`]
//! - **Stale results are dropped**: cancelled or superseded attempts never
//!   touch state
//! - **Degrade, don't fail**: missing connectivity or visibility sources fall
//!   back to `unknown` quality and always-visible elements
//!
//! # Modules
//!
//! - [`network`] - Network quality classification
//! - [`compare`] - Structural comparison with an identity-keyed cache
//! - [`operation`] - Retryable, cancelable loading state machine
//! - [`registry`] - Session-wide loader registry and analytics
//! - [`progressive`] - Incremental page loading
//! - [`image`] - Progressive image reveal
//! - [`placeholder`] - Placeholder display timing
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod compare;
pub mod config;
pub mod domain;
pub mod image;
pub mod network;
pub mod operation;
pub mod placeholder;
pub mod platform;
pub mod progressive;
pub mod registry;

// Re-export commonly used types
pub use compare::{Comparator, ComparisonStats, shallow_equal};
pub use config::Config;
pub use domain::{LoadingState, OperationId, Priority};
pub use image::{ImageFetcher, ImageLoadConfig, ImageLoadState, ImagePipeline};
pub use network::{NetworkQuality, classify};
pub use operation::{LoadError, LoadingOperation, OperationConfig, OperationSnapshot, RetryOutcome};
pub use placeholder::{PlaceholderConfig, PlaceholderState, PlaceholderTimer, TransitionPhase};
pub use platform::{ConnectivityProbe, VisibilityWatcher};
pub use progressive::{LoadMoreOutcome, PageSource, ProgressiveConfig, ProgressiveLoader, ProgressivePageState};
pub use registry::{LoadingAnalyticsRecord, LoadingRegistry, PerformanceMetrics, RegistryConfig};
