//! Network quality classification
//!
//! Samples connection signals from a [`ConnectivityProbe`](crate::platform::ConnectivityProbe)
//! and classifies them into the ordinal [`NetworkQuality`] set used to scale
//! timeouts and batch sizes.

mod quality;

pub use quality::{ConnectionSignals, EffectiveType, NetworkQuality, classify, sample};
