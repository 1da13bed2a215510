//! Core value types shared by every loading component

mod id;
mod priority;
mod state;

pub use id::OperationId;
pub use priority::Priority;
pub use state::LoadingState;
