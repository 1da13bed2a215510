//! Platform adapters
//!
//! The host environment supplies connection metadata and element visibility.
//! Both are abstracted behind small traits with degraded implementations for
//! hosts that lack the underlying primitive:
//! - [`ConnectivityProbe`]: connection signals and online status
//! - [`VisibilityWatcher`]: viewport intersection for a target element

mod connectivity;
mod visibility;

pub use connectivity::{ConnectivityProbe, ManualProbe, NoopProbe};
pub use visibility::{AlwaysVisible, ManualVisibility, VisibilityOptions, VisibilitySignal, VisibilityWatcher};
