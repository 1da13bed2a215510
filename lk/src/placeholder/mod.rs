//! Placeholder display timing
//!
//! Turns a raw "still loading" flag into a placeholder visibility that never
//! flashes for fast loads and never flickers once shown.

mod config;
mod timer;

pub use config::PlaceholderConfig;
pub use timer::{PlaceholderState, PlaceholderTimer, TransitionPhase};
