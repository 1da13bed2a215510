//! Progressive loader state machine

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::domain::{LoadingState, Priority};
use crate::operation::{LoadError, LoadingOperation};
use crate::platform::VisibilitySignal;
use crate::registry::LoadingRegistry;

use super::config::ProgressiveConfig;
use super::source::PageSource;

/// Observable state of a progressive list
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressivePageState<T> {
    /// Loaded items in page order
    pub items: Vec<T>,
    /// Index of the next page to request
    pub page_index: usize,
    /// False after the first short or empty page
    pub has_more: bool,
    pub loading: bool,
    /// Error from the last page attempt; items are left intact
    pub error: Option<LoadError>,
}

impl<T> Default for ProgressivePageState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            page_index: 0,
            has_more: true,
            loading: false,
            error: None,
        }
    }
}

/// What a call to [`ProgressiveLoader::load_more`] did
#[derive(Debug, Clone, PartialEq)]
pub enum LoadMoreOutcome {
    /// A page was appended
    Loaded { count: usize, has_more: bool },
    /// Already loading or nothing more to load
    Skipped,
    /// The page failed; the same page is requested next time
    Failed(LoadError),
    /// The loader was reset while the page was in flight
    Discarded,
}

struct Control<T> {
    generation: u64,
    in_flight: Option<LoadingOperation<Vec<T>>>,
    fetches: usize,
}

/// Incremental loader over a [`PageSource`]
pub struct ProgressiveLoader<T> {
    config: ProgressiveConfig,
    registry: Arc<LoadingRegistry>,
    source: Arc<dyn PageSource<T>>,
    control: Mutex<Control<T>>,
    tx: watch::Sender<ProgressivePageState<T>>,
}

impl<T> ProgressiveLoader<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(registry: Arc<LoadingRegistry>, config: ProgressiveConfig, source: Arc<dyn PageSource<T>>) -> Self {
        debug!(?config, "ProgressiveLoader::new: called");
        let (tx, _) = watch::channel(ProgressivePageState::default());
        Self {
            config,
            registry,
            source,
            control: Mutex::new(Control {
                generation: 0,
                in_flight: None,
                fetches: 0,
            }),
            tx,
        }
    }

    pub fn config(&self) -> &ProgressiveConfig {
        &self.config
    }

    /// Load the first page if `initial_load` is set and nothing is loaded yet
    pub async fn start(&self) -> LoadMoreOutcome {
        debug!("ProgressiveLoader::start: called");
        if !self.config.initial_load {
            return LoadMoreOutcome::Skipped;
        }
        let pristine = {
            let state = self.tx.borrow();
            state.page_index == 0 && state.items.is_empty()
        };
        if !pristine {
            return LoadMoreOutcome::Skipped;
        }
        self.load_more().await
    }

    /// Page size for the next request
    pub fn page_size(&self) -> usize {
        let base = self.config.items_per_page.max(1);
        if !self.config.adaptive_batching {
            return base;
        }
        match self.registry.loading_priority() {
            priority if priority.is_elevated() => base * 3 / 2,
            Priority::Low => (base / 2).max(1),
            _ => base,
        }
    }

    /// Fetch and append the next page.
    ///
    /// No-op while a page is loading or after the last page.
    pub async fn load_more(&self) -> LoadMoreOutcome {
        let (generation, operation, page_size) = {
            let Ok(mut control) = self.control.lock() else {
                return LoadMoreOutcome::Skipped;
            };
            let (loading, has_more, page_index) = {
                let state = self.tx.borrow();
                (state.loading, state.has_more, state.page_index)
            };
            if loading || !has_more {
                debug!(loading, has_more, "ProgressiveLoader::load_more: skipped");
                return LoadMoreOutcome::Skipped;
            }

            let page_size = self.page_size();
            debug!(page_index, page_size, "ProgressiveLoader::load_more: requesting page");
            self.tx.send_modify(|s| {
                s.loading = true;
                s.error = None;
            });

            let source = Arc::clone(&self.source);
            let operation = LoadingOperation::new(
                Arc::clone(&self.registry),
                self.config.operation.clone(),
                move || {
                    let source = Arc::clone(&source);
                    async move { source.load_page(page_index, page_size).await }
                },
            );
            operation.start();
            control.in_flight = Some(operation.clone());
            control.fetches += 1;
            (control.generation, operation, page_size)
        };

        // Dropped before settling: release the page so the list can't wedge
        let guard = AbandonGuard::new(move || self.abandon(generation));
        let snapshot = operation.wait_settled().await;
        guard.disarm();

        let Ok(mut control) = self.control.lock() else {
            return LoadMoreOutcome::Discarded;
        };
        if control.generation != generation {
            debug!("ProgressiveLoader::load_more: reset while in flight, discarding page");
            return LoadMoreOutcome::Discarded;
        }
        control.in_flight = None;

        match snapshot.state {
            LoadingState::Success => {
                let page = snapshot.data.unwrap_or_default();
                let count = page.len();
                let has_more = count > 0 && count >= page_size;
                self.tx.send_modify(|s| {
                    s.items.extend(page);
                    s.page_index += 1;
                    s.has_more = has_more;
                    s.loading = false;
                });
                if !has_more {
                    info!(total = self.tx.borrow().items.len(), "Progressive list complete");
                }
                LoadMoreOutcome::Loaded { count, has_more }
            }
            state if state.is_failure() => {
                let error = snapshot
                    .error
                    .unwrap_or_else(|| LoadError::failed(format!("page ended in state {state}")));
                debug!(%error, "ProgressiveLoader::load_more: page failed");
                self.tx.send_modify(|s| {
                    s.loading = false;
                    s.error = Some(error.clone());
                });
                LoadMoreOutcome::Failed(error)
            }
            _ => {
                self.tx.send_modify(|s| s.loading = false);
                LoadMoreOutcome::Discarded
            }
        }
    }

    /// Undo an in-flight page whose `load_more` future went away
    fn abandon(&self, generation: u64) {
        let Ok(mut control) = self.control.lock() else {
            return;
        };
        if control.generation != generation {
            return;
        }
        debug!("ProgressiveLoader::abandon: page dropped before it settled");
        if let Some(operation) = control.in_flight.take() {
            operation.cancel();
        }
        self.tx.send_modify(|s| s.loading = false);
    }

    /// Clear everything for a fresh sequence from page 0.
    ///
    /// A page in flight is cancelled and its result discarded.
    pub fn reset(&self) {
        debug!("ProgressiveLoader::reset: called");
        let Ok(mut control) = self.control.lock() else {
            return;
        };
        control.generation += 1;
        if let Some(operation) = control.in_flight.take() {
            operation.cancel();
        }
        self.tx.send_replace(ProgressivePageState::default());
    }

    /// Keep loading pages while `sentinel` is visible.
    ///
    /// A failed page pauses automatic loading until the sentinel is hidden
    /// and shown again. Abort the returned handle to stop watching.
    pub fn watch_sentinel(self: &Arc<Self>, mut sentinel: VisibilitySignal) -> JoinHandle<()> {
        debug!("ProgressiveLoader::watch_sentinel: called");
        let weak = Arc::downgrade(self);
        let mut state_rx = self.subscribe();

        tokio::spawn(async move {
            let mut paused = false;
            let mut sentinel_live = true;
            loop {
                let ready = {
                    let state = state_rx.borrow_and_update();
                    if state.error.is_none() {
                        paused = false;
                    }
                    sentinel.is_visible() && state.has_more && !state.loading && !paused
                };

                if ready {
                    // A change from here on counts as a toggle after this page
                    sentinel.current();
                    let Some(loader) = weak.upgrade() else {
                        return;
                    };
                    if let LoadMoreOutcome::Failed(error) = loader.load_more().await {
                        debug!(%error, "ProgressiveLoader sentinel: pausing after failed page");
                        paused = true;
                    }
                    continue;
                }

                tokio::select! {
                    visible = sentinel.changed(), if sentinel_live => match visible {
                        // Paused while visible, so any change means it toggled
                        Some(_) => paused = false,
                        None => sentinel_live = false,
                    },
                    changed = state_rx.changed() => {
                        if changed.is_err() {
                            debug!("ProgressiveLoader sentinel: loader dropped, stopping");
                            return;
                        }
                    }
                }
            }
        })
    }

    pub fn state(&self) -> ProgressivePageState<T> {
        self.tx.borrow().clone()
    }

    pub fn items(&self) -> Vec<T> {
        self.tx.borrow().items.clone()
    }

    pub fn has_more(&self) -> bool {
        self.tx.borrow().has_more
    }

    pub fn is_loading(&self) -> bool {
        self.tx.borrow().loading
    }

    /// Number of page requests issued since creation
    pub fn fetch_count(&self) -> usize {
        self.control.lock().map(|c| c.fetches).unwrap_or(0)
    }

    /// Watch state changes; drop the receiver to unsubscribe
    pub fn subscribe(&self) -> watch::Receiver<ProgressivePageState<T>> {
        self.tx.subscribe()
    }

    /// Boolean loading signal, e.g. to drive a placeholder timer
    pub fn loading_signal(&self) -> watch::Receiver<bool> {
        let mut state_rx = self.subscribe();
        let (tx, rx) = watch::channel(state_rx.borrow_and_update().loading);
        tokio::spawn(async move {
            while state_rx.changed().await.is_ok() {
                let loading = state_rx.borrow_and_update().loading;
                tx.send_if_modified(|current| {
                    let changed = *current != loading;
                    *current = loading;
                    changed
                });
                if tx.is_closed() {
                    break;
                }
            }
        });
        rx
    }
}

/// Runs its callback on drop unless disarmed
struct AbandonGuard<F: FnOnce()> {
    on_drop: Option<F>,
}

impl<F: FnOnce()> AbandonGuard<F> {
    fn new(on_drop: F) -> Self {
        Self { on_drop: Some(on_drop) }
    }

    fn disarm(mut self) {
        self.on_drop = None;
    }
}

impl<F: FnOnce()> Drop for AbandonGuard<F> {
    fn drop(&mut self) {
        if let Some(on_drop) = self.on_drop.take() {
            on_drop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{ConnectionSignals, EffectiveType};
    use crate::platform::{ManualProbe, ManualVisibility, VisibilityOptions, VisibilityWatcher};
    use crate::progressive::FnPageSource;
    use crate::registry::RegistryConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn numbered_source(total: usize, calls: Arc<AtomicUsize>) -> Arc<dyn PageSource<usize>> {
        Arc::new(FnPageSource::new(move |page: usize, size: usize| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let start = page * size;
                Ok::<Vec<usize>, eyre::Report>((start..total.min(start + size)).collect())
            }
        }))
    }

    fn loader(total: usize, per_page: usize) -> (ProgressiveLoader<usize>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = ProgressiveLoader::new(
            LoadingRegistry::with_defaults(),
            ProgressiveConfig::with_page_size(per_page),
            numbered_source(total, calls.clone()),
        );
        (loader, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_pages_until_short_page() {
        let (loader, calls) = loader(45, 20);

        assert_eq!(loader.load_more().await, LoadMoreOutcome::Loaded { count: 20, has_more: true });
        assert_eq!(loader.load_more().await, LoadMoreOutcome::Loaded { count: 20, has_more: true });
        assert_eq!(loader.load_more().await, LoadMoreOutcome::Loaded { count: 5, has_more: false });
        assert_eq!(loader.load_more().await, LoadMoreOutcome::Skipped);

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let state = loader.state();
        assert_eq!(state.items, (0..45).collect::<Vec<_>>());
        assert_eq!(state.page_index, 3);
        assert!(!state.has_more);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_page_ends_sequence() {
        let (loader, _calls) = loader(40, 20);
        loader.load_more().await;
        loader.load_more().await;
        assert!(loader.has_more());
        assert_eq!(loader.load_more().await, LoadMoreOutcome::Loaded { count: 0, has_more: false });
        assert_eq!(loader.items().len(), 40);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_load_more_is_skipped() {
        let (loader, calls) = loader(100, 20);
        let (first, second) = tokio::join!(loader.load_more(), loader.load_more());
        assert_eq!(first, LoadMoreOutcome::Loaded { count: 20, has_more: true });
        assert_eq!(second, LoadMoreOutcome::Skipped);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_keeps_items_and_retries_same_page() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let source: Arc<dyn PageSource<usize>> = Arc::new(FnPageSource::new(move |page: usize, size: usize| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 1 {
                    return Err(eyre::eyre!("upstream 502"));
                }
                Ok::<Vec<usize>, eyre::Report>((page * size..page * size + size).collect())
            }
        }));
        let loader = ProgressiveLoader::new(LoadingRegistry::with_defaults(), ProgressiveConfig::with_page_size(10), source);

        loader.load_more().await;
        let outcome = loader.load_more().await;
        assert_eq!(outcome, LoadMoreOutcome::Failed(LoadError::failed("upstream 502")));

        let state = loader.state();
        assert_eq!(state.items.len(), 10);
        assert_eq!(state.page_index, 1);
        assert!(state.has_more);
        assert!(state.error.is_some());

        assert_eq!(loader.load_more().await, LoadMoreOutcome::Loaded { count: 10, has_more: true });
        let state = loader.state();
        assert_eq!(state.items, (0..20).collect::<Vec<_>>());
        assert!(state.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_discards_in_flight_page() {
        let (loader, _calls) = loader(100, 20);
        let loader = Arc::new(loader);
        loader.load_more().await;

        let pending = tokio::spawn({
            let loader = Arc::clone(&loader);
            async move { loader.load_more().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(loader.is_loading());

        loader.reset();
        assert_eq!(pending.await.unwrap(), LoadMoreOutcome::Discarded);

        let state = loader.state();
        assert!(state.items.is_empty());
        assert_eq!(state.page_index, 0);
        assert!(state.has_more);
        assert!(!state.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_respects_initial_load() {
        let (loader, calls) = loader(45, 20);
        assert!(matches!(loader.start().await, LoadMoreOutcome::Loaded { .. }));
        assert_eq!(loader.start().await, LoadMoreOutcome::Skipped);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let calls = Arc::new(AtomicUsize::new(0));
        let config = ProgressiveConfig {
            initial_load: false,
            ..ProgressiveConfig::with_page_size(20)
        };
        let lazy = ProgressiveLoader::new(LoadingRegistry::with_defaults(), config, numbered_source(45, calls.clone()));
        assert_eq!(lazy.start().await, LoadMoreOutcome::Skipped);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_adaptive_batching_on_slow_network() {
        let probe = Arc::new(ManualProbe::new(Some(ConnectionSignals::with_type(EffectiveType::TwoG))));
        let registry = LoadingRegistry::create(RegistryConfig::default(), probe);
        assert_eq!(registry.loading_priority(), Priority::High);

        let config = ProgressiveConfig {
            adaptive_batching: true,
            ..ProgressiveConfig::with_page_size(20)
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = ProgressiveLoader::new(registry, config, numbered_source(100, calls));
        assert_eq!(loader.page_size(), 30);
        assert_eq!(loader.load_more().await, LoadMoreOutcome::Loaded { count: 30, has_more: true });
    }

    #[tokio::test(start_paused = true)]
    async fn test_sentinel_loads_until_exhausted() {
        let (loader, calls) = loader(45, 20);
        let loader = Arc::new(loader);
        let visibility = ManualVisibility::new();
        let sentinel = visibility.observe("list-end", &VisibilityOptions::default());
        let watcher = loader.watch_sentinel(sentinel);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        visibility.set_visible("list-end", true);
        let mut rx = loader.subscribe();
        rx.wait_for(|s| !s.has_more && !s.loading).await.unwrap();

        // Sentinel still visible: no further loads
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(loader.items().len(), 45);
        watcher.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sentinel_pauses_after_error_until_toggled() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let source: Arc<dyn PageSource<usize>> = Arc::new(FnPageSource::new(move |page: usize, size: usize| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 1 {
                    return Err(eyre::eyre!("flaky"));
                }
                Ok::<Vec<usize>, eyre::Report>((page * size..(page * size + size).min(30)).collect())
            }
        }));
        let loader = Arc::new(ProgressiveLoader::new(
            LoadingRegistry::with_defaults(),
            ProgressiveConfig::with_page_size(10),
            source,
        ));
        let visibility = ManualVisibility::new();
        let sentinel = visibility.observe("list-end", &VisibilityOptions::default());
        visibility.set_visible("list-end", true);
        let watcher = loader.watch_sentinel(sentinel);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(loader.items().len(), 10);
        assert!(loader.state().error.is_some());

        visibility.set_visible("list-end", false);
        tokio::time::sleep(Duration::from_millis(10)).await;
        visibility.set_visible("list-end", true);

        let mut rx = loader.subscribe();
        rx.wait_for(|s| !s.has_more && !s.loading).await.unwrap();
        assert_eq!(loader.items(), (0..30).collect::<Vec<_>>());
        watcher.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_watcher_releases_page() {
        let registry = LoadingRegistry::with_defaults();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = Arc::new(ProgressiveLoader::new(
            registry.clone(),
            ProgressiveConfig::with_page_size(20),
            numbered_source(45, calls.clone()),
        ));
        let visibility = ManualVisibility::new();
        let sentinel = visibility.observe("list-end", &VisibilityOptions::default());
        visibility.set_visible("list-end", true);
        let watcher = loader.watch_sentinel(sentinel);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(loader.is_loading());
        assert_eq!(registry.active_loaders_count(), 1);

        watcher.abort();
        tokio::time::sleep(Duration::from_secs(60)).await;
        let state = loader.state();
        assert!(!state.loading);
        assert!(state.items.is_empty());
        assert!(state.has_more);
        assert_eq!(registry.active_loaders_count(), 0);

        assert_eq!(loader.load_more().await, LoadMoreOutcome::Loaded { count: 20, has_more: true });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_load_more_can_be_reissued() {
        let (loader, calls) = loader(45, 20);

        let timed_out = tokio::time::timeout(Duration::from_millis(10), loader.load_more()).await;
        assert!(timed_out.is_err());
        assert!(!loader.is_loading());

        // The abandoned page never lands
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(loader.items().is_empty());

        assert_eq!(loader.load_more().await, LoadMoreOutcome::Loaded { count: 20, has_more: true });
        assert_eq!(loader.items(), (0..20).collect::<Vec<_>>());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_fetches_are_tracked_by_registry() {
        let registry = LoadingRegistry::with_defaults();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = ProgressiveLoader::new(registry.clone(), ProgressiveConfig::with_page_size(20), numbered_source(45, calls));
        loader.load_more().await;
        loader.load_more().await;

        let analytics = registry.analytics();
        assert_eq!(analytics.len(), 2);
        assert!(analytics.iter().all(|r| r.kind == "page" && r.success));
        assert_eq!(registry.active_loaders_count(), 0);
    }
}
