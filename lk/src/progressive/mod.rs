//! Progressive data loading
//!
//! Pages through a caller-supplied [`PageSource`], appending each page in
//! request order and stopping at the first short or empty page. Page loads can
//! be triggered by hand or by a trailing sentinel becoming visible.

mod config;
mod loader;
mod source;

pub use config::ProgressiveConfig;
pub use loader::{LoadMoreOutcome, ProgressiveLoader, ProgressivePageState};
pub use source::{FnPageSource, PageSource};
