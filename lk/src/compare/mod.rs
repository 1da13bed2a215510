//! Structural comparison layer
//!
//! Decides whether a new value differs enough from the held one to be worth
//! propagating. Provides:
//! - [`shallow_equal`]: one-level strict comparison of JSON-shaped values
//! - [`Comparator`]: instrumented comparisons plus the domain comparators
//!   (`compare_auth_user`, `compare_profile`, `compare_coach`) backed by an
//!   identity-keyed LRU cache

mod cache;
mod comparator;
mod config;
mod entities;
mod shallow;

pub use cache::{ComparatorKind, ComparisonCache};
pub use comparator::{Comparator, ComparisonStats};
pub use config::ComparisonConfig;
pub use entities::{AuthUser, Coach, Profile};
pub use shallow::shallow_equal;
