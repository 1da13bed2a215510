//! Loading operation state machine
//!
//! Runs one cancelable, retryable asynchronous operation with a timeout scaled
//! by network quality, reporting every settled attempt to the
//! [`LoadingRegistry`](crate::registry::LoadingRegistry).

mod backoff;
mod config;
mod error;
mod machine;

pub use backoff::{adjusted_timeout, backoff_delay, next_progress};
pub use config::OperationConfig;
pub use error::LoadError;
pub use machine::{LoadingOperation, OperationSnapshot, RetryOutcome};
