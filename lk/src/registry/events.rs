//! Registry change notifications

use crate::domain::{OperationId, Priority};
use crate::network::NetworkQuality;

use super::analytics::LoadingAnalyticsRecord;

/// Notification broadcast to registry subscribers.
///
/// Subscribing returns a receiver; dropping it unsubscribes.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    LoaderRegistered { id: OperationId, active: usize },
    LoaderUnregistered { id: OperationId, active: usize },
    PriorityChanged { from: Priority, to: Priority },
    NetworkChanged { quality: NetworkQuality, online: bool },
    Analytics(LoadingAnalyticsRecord),
    Disposed,
}

impl RegistryEvent {
    /// Short name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::LoaderRegistered { .. } => "LoaderRegistered",
            Self::LoaderUnregistered { .. } => "LoaderUnregistered",
            Self::PriorityChanged { .. } => "PriorityChanged",
            Self::NetworkChanged { .. } => "NetworkChanged",
            Self::Analytics(_) => "Analytics",
            Self::Disposed => "Disposed",
        }
    }
}
