//! Session-wide loading registry
//!
//! Tracks every active loading operation, aggregates network quality and
//! online status, derives a global backpressure priority, and keeps a bounded
//! analytics history. One instance per application session, created with
//! [`LoadingRegistry::create`] and torn down with [`LoadingRegistry::dispose`].

mod analytics;
mod config;
mod core;
mod events;

pub use analytics::{AnalyticsBuffer, KindMetrics, LoadingAnalyticsRecord, PerformanceMetrics};
pub use config::RegistryConfig;
pub use core::{LoaderContext, LoaderUpdate, LoadingRegistry, derive_priority};
pub use events::RegistryEvent;
