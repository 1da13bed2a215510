//! Registry implementation

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Instant;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{LoadingState, OperationId, Priority};
use crate::network::{self, NetworkQuality};
use crate::platform::ConnectivityProbe;

use super::analytics::{AnalyticsBuffer, LoadingAnalyticsRecord, PerformanceMetrics};
use super::config::RegistryConfig;
use super::events::RegistryEvent;

/// Fraction of max concurrency at which the priority is held at `normal`
const NORMAL_LOAD_RATIO: f64 = 0.7;

/// Lightweight projection of a loading operation held by the registry
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderContext {
    pub kind: String,
    pub priority: Priority,
    pub state: LoadingState,
    pub registered_at: Instant,
}

impl LoaderContext {
    /// Context for an attempt that has just started loading
    pub fn loading(kind: impl Into<String>, priority: Priority) -> Self {
        Self {
            kind: kind.into(),
            priority,
            state: LoadingState::Loading,
            registered_at: Instant::now(),
        }
    }
}

/// Partial update applied by [`LoadingRegistry::update_loader`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoaderUpdate {
    pub priority: Option<Priority>,
    pub state: Option<LoadingState>,
}

impl LoaderUpdate {
    pub fn state(state: LoadingState) -> Self {
        Self {
            state: Some(state),
            ..Default::default()
        }
    }
}

/// Backpressure heuristic for the global priority.
///
/// Saturated shed to `low`; near saturation hold `normal`; otherwise a slow
/// network asks for `high` so callers batch and wait more generously.
pub fn derive_priority(active: usize, max_concurrent: usize, quality: NetworkQuality) -> Priority {
    if active >= max_concurrent {
        Priority::Low
    } else if active as f64 >= max_concurrent as f64 * NORMAL_LOAD_RATIO {
        Priority::Normal
    } else if quality == NetworkQuality::Slow {
        Priority::High
    } else {
        Priority::Normal
    }
}

/// Internal state protected by the lock
struct RegistryInner {
    loaders: HashMap<OperationId, LoaderContext>,
    network_quality: NetworkQuality,
    online: bool,
    priority: Priority,
    analytics: AnalyticsBuffer,
    network_quality_changes: u64,
    disposed: bool,
}

impl RegistryInner {
    fn active_count(&self) -> usize {
        self.loaders
            .values()
            .filter(|l| l.state == LoadingState::Loading)
            .count()
    }

    /// Recompute the priority, returning the previous value if it changed
    fn recompute_priority(&mut self, max_concurrent: usize) -> Option<Priority> {
        let next = derive_priority(self.active_count(), max_concurrent, self.network_quality);
        if next == self.priority {
            return None;
        }
        let previous = self.priority;
        self.priority = next;
        Some(previous)
    }
}

/// The registry of in-flight loading operations for one session
pub struct LoadingRegistry {
    config: RegistryConfig,
    probe: Arc<dyn ConnectivityProbe>,
    inner: RwLock<RegistryInner>,
    events: broadcast::Sender<RegistryEvent>,
    sampler: Mutex<Option<JoinHandle<()>>>,
}

impl LoadingRegistry {
    /// Create the registry, taking an initial network sample
    pub fn create(config: RegistryConfig, probe: Arc<dyn ConnectivityProbe>) -> Arc<Self> {
        debug!(?config, "LoadingRegistry::create: called");
        let network_quality = network::sample(probe.as_ref());
        let online = probe.is_online();
        let (events, _) = broadcast::channel(config.event_buffer.max(1));

        let inner = RegistryInner {
            loaders: HashMap::new(),
            network_quality,
            online,
            priority: derive_priority(0, config.max_concurrent_loaders, network_quality),
            analytics: AnalyticsBuffer::new(config.analytics_capacity),
            network_quality_changes: 0,
            disposed: false,
        };

        info!(%network_quality, online, "Loading registry created");
        Arc::new(Self {
            config,
            probe,
            inner: RwLock::new(inner),
            events,
            sampler: Mutex::new(None),
        })
    }

    /// Create a registry with no connectivity source
    pub fn with_defaults() -> Arc<Self> {
        Self::create(RegistryConfig::default(), Arc::new(crate::platform::NoopProbe))
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Start periodic network re-sampling on the current tokio runtime.
    ///
    /// The sampler holds only a weak reference and stops on dispose or drop.
    pub fn start_sampling(self: &Arc<Self>) {
        debug!("LoadingRegistry::start_sampling: called");
        let Ok(mut sampler) = self.sampler.lock() else {
            return;
        };
        if sampler.is_some() {
            debug!("LoadingRegistry::start_sampling: already sampling");
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.config.sample_interval();
        *sampler = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately; the creation sample already covered it
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(registry) = weak.upgrade() else {
                    debug!("LoadingRegistry sampler: registry dropped, stopping");
                    break;
                };
                registry.resample();
            }
        }));
    }

    /// Handle an ambient connectivity-change notification
    pub fn notify_connectivity_change(&self) {
        debug!("LoadingRegistry::notify_connectivity_change: called");
        self.resample();
    }

    /// Read the probe and apply any change in quality or online status
    pub fn resample(&self) {
        let quality = network::sample(self.probe.as_ref());
        let online = self.probe.is_online();

        let mut emitted = Vec::new();
        {
            let Ok(mut inner) = self.inner.write() else {
                return;
            };
            if inner.disposed {
                debug!("LoadingRegistry::resample: disposed, ignoring");
                return;
            }

            let quality_changed = quality != inner.network_quality;
            let online_changed = online != inner.online;
            if !quality_changed && !online_changed {
                return;
            }

            if quality_changed {
                info!(from = %inner.network_quality, to = %quality, "Network quality changed");
                inner.network_quality = quality;
                inner.network_quality_changes += 1;
            }
            if online_changed {
                if online {
                    info!("Connectivity restored");
                } else {
                    warn!("Connectivity lost");
                }
                inner.online = online;
            }

            emitted.push(RegistryEvent::NetworkChanged { quality, online });
            if let Some(from) = inner.recompute_priority(self.config.max_concurrent_loaders) {
                emitted.push(RegistryEvent::PriorityChanged {
                    from,
                    to: inner.priority,
                });
            }
        }
        self.emit_all(emitted);
    }

    /// Register an operation. Re-registering an id replaces its context.
    pub fn register_loader(&self, id: OperationId, context: LoaderContext) {
        debug!(%id, kind = %context.kind, ?context.priority, "LoadingRegistry::register_loader: called");
        let mut emitted = Vec::new();
        {
            let Ok(mut inner) = self.inner.write() else {
                return;
            };
            if inner.disposed {
                debug!(%id, "LoadingRegistry::register_loader: disposed, ignoring");
                return;
            }
            inner.loaders.insert(id.clone(), context);
            let active = inner.active_count();
            emitted.push(RegistryEvent::LoaderRegistered { id, active });
            if let Some(from) = inner.recompute_priority(self.config.max_concurrent_loaders) {
                emitted.push(RegistryEvent::PriorityChanged {
                    from,
                    to: inner.priority,
                });
            }
        }
        self.emit_all(emitted);
    }

    /// Remove an operation. Unknown ids are ignored.
    pub fn unregister_loader(&self, id: &OperationId) {
        debug!(%id, "LoadingRegistry::unregister_loader: called");
        let mut emitted = Vec::new();
        {
            let Ok(mut inner) = self.inner.write() else {
                return;
            };
            if inner.loaders.remove(id).is_none() {
                debug!(%id, "LoadingRegistry::unregister_loader: not registered");
                return;
            }
            let active = inner.active_count();
            emitted.push(RegistryEvent::LoaderUnregistered { id: id.clone(), active });
            if let Some(from) = inner.recompute_priority(self.config.max_concurrent_loaders) {
                emitted.push(RegistryEvent::PriorityChanged {
                    from,
                    to: inner.priority,
                });
            }
        }
        self.emit_all(emitted);
    }

    /// Apply a partial update to a registered operation
    pub fn update_loader(&self, id: &OperationId, update: LoaderUpdate) {
        debug!(%id, ?update, "LoadingRegistry::update_loader: called");
        let mut emitted = Vec::new();
        {
            let Ok(mut inner) = self.inner.write() else {
                return;
            };
            let Some(context) = inner.loaders.get_mut(id) else {
                debug!(%id, "LoadingRegistry::update_loader: not registered");
                return;
            };
            if let Some(priority) = update.priority {
                context.priority = priority;
            }
            if let Some(state) = update.state {
                context.state = state;
            }
            if let Some(from) = inner.recompute_priority(self.config.max_concurrent_loaders) {
                emitted.push(RegistryEvent::PriorityChanged {
                    from,
                    to: inner.priority,
                });
            }
        }
        self.emit_all(emitted);
    }

    pub fn network_quality(&self) -> NetworkQuality {
        self.inner
            .read()
            .map(|i| i.network_quality)
            .unwrap_or_default()
    }

    pub fn is_online(&self) -> bool {
        self.inner.read().map(|i| i.online).unwrap_or(true)
    }

    /// Number of registered operations currently in `loading`
    pub fn active_loaders_count(&self) -> usize {
        self.inner.read().map(|i| i.active_count()).unwrap_or(0)
    }

    /// Derived global priority, consistent with the last completed mutation
    pub fn loading_priority(&self) -> Priority {
        self.inner.read().map(|i| i.priority).unwrap_or_default()
    }

    /// Snapshot of registered operations
    pub fn loaders(&self) -> Vec<(OperationId, LoaderContext)> {
        self.inner
            .read()
            .map(|i| i.loaders.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    /// Append a settled attempt to the analytics history
    pub fn add_analytics(&self, record: LoadingAnalyticsRecord) {
        debug!(
            operation_id = %record.operation_id,
            kind = %record.kind,
            success = record.success,
            duration_ms = record.duration_ms,
            "LoadingRegistry::add_analytics: called"
        );
        {
            let Ok(mut inner) = self.inner.write() else {
                return;
            };
            if inner.disposed {
                return;
            }
            inner.analytics.push(record.clone());
        }
        self.emit(RegistryEvent::Analytics(record));
    }

    /// Retained analytics records, oldest first
    pub fn analytics(&self) -> Vec<LoadingAnalyticsRecord> {
        self.inner.read().map(|i| i.analytics.to_vec()).unwrap_or_default()
    }

    /// Aggregate metrics over the retained history plus live state
    pub fn performance_metrics(&self) -> PerformanceMetrics {
        let Ok(inner) = self.inner.read() else {
            return PerformanceMetrics::default();
        };
        let mut metrics = PerformanceMetrics::from_records(inner.analytics.iter());
        metrics.network_quality_changes = inner.network_quality_changes;
        metrics.active_loaders = inner.active_count();
        metrics.priority = inner.priority;
        metrics.network_quality = inner.network_quality;
        metrics
    }

    /// Subscribe to registry events; drop the receiver to unsubscribe
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        debug!("LoadingRegistry::subscribe: new subscriber");
        self.events.subscribe()
    }

    /// Stop sampling and release every tracked operation
    pub fn dispose(&self) {
        debug!("LoadingRegistry::dispose: called");
        if let Ok(mut sampler) = self.sampler.lock()
            && let Some(handle) = sampler.take()
        {
            handle.abort();
        }
        {
            let Ok(mut inner) = self.inner.write() else {
                return;
            };
            if inner.disposed {
                return;
            }
            inner.disposed = true;
            inner.loaders.clear();
            inner.analytics.clear();
        }
        info!("Loading registry disposed");
        self.emit(RegistryEvent::Disposed);
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.read().map(|i| i.disposed).unwrap_or(true)
    }

    fn emit(&self, event: RegistryEvent) {
        debug!(event_type = event.event_type(), "LoadingRegistry::emit");
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn emit_all(&self, events: Vec<RegistryEvent>) {
        for event in events {
            self.emit(event);
        }
    }
}

impl Drop for LoadingRegistry {
    fn drop(&mut self) {
        if let Ok(mut sampler) = self.sampler.lock()
            && let Some(handle) = sampler.take()
        {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for LoadingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadingRegistry")
            .field("config", &self.config)
            .field("active_loaders", &self.active_loaders_count())
            .field("priority", &self.loading_priority())
            .finish()
    }
}
