//! Image reveal state machine

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::LoadingState;
use crate::operation::LoadingOperation;
use crate::platform::VisibilityWatcher;
use crate::registry::LoadingRegistry;

use super::config::ImageLoadConfig;
use super::fetcher::{ImageFetcher, ImageRequest};

/// Lifecycle of one image reveal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImagePhase {
    #[default]
    Idle,
    /// Lazy image waiting to become visible
    Waiting,
    Loading,
    Loaded,
    Failed,
}

/// Observable state of one image
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageLoadState {
    /// Source the host should currently render, if any
    pub displayed_source: Option<String>,
    pub loading: bool,
    pub loaded: bool,
    pub error: bool,
    pub progress_percent: u8,
    pub attempted_fallback: bool,
    pub phase: ImagePhase,
    /// Set on the swap: fade `displayed_source` in over this long
    pub fade: Option<Duration>,
}

impl ImageLoadState {
    /// Whether the reveal reached a final phase
    pub fn is_done(&self) -> bool {
        matches!(self.phase, ImagePhase::Loaded | ImagePhase::Failed)
    }
}

/// Handle to a running image reveal.
///
/// Dropping the handle stops the reveal and releases its registry entry.
#[derive(Debug)]
pub struct ImageHandle {
    rx: watch::Receiver<ImageLoadState>,
    task: JoinHandle<()>,
}

impl ImageHandle {
    pub fn state(&self) -> ImageLoadState {
        self.rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ImageLoadState> {
        self.rx.clone()
    }

    /// Wait for `loaded` or terminal `error`
    pub async fn wait_done(&self) -> ImageLoadState {
        let mut rx = self.rx.clone();
        let done = rx.wait_for(ImageLoadState::is_done).await.map(|state| state.clone());
        match done {
            Ok(state) => state,
            Err(_) => rx.borrow().clone(),
        }
    }
}

impl Drop for ImageHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Starts image reveals against a host fetcher and visibility source
pub struct ImagePipeline {
    registry: Arc<LoadingRegistry>,
    fetcher: Arc<dyn ImageFetcher>,
    visibility: Arc<dyn VisibilityWatcher>,
}

impl ImagePipeline {
    pub fn new(
        registry: Arc<LoadingRegistry>,
        fetcher: Arc<dyn ImageFetcher>,
        visibility: Arc<dyn VisibilityWatcher>,
    ) -> Self {
        debug!("ImagePipeline::new: called");
        Self {
            registry,
            fetcher,
            visibility,
        }
    }

    /// Begin revealing `target`
    pub fn load(&self, target: impl Into<String>, config: ImageLoadConfig) -> ImageHandle {
        let target = target.into();
        debug!(%target, lazy = config.lazy, priority = config.priority, "ImagePipeline::load: called");

        let initial = ImageLoadState {
            displayed_source: config.pending_source(),
            phase: if config.lazy {
                ImagePhase::Waiting
            } else {
                ImagePhase::Loading
            },
            loading: !config.lazy,
            ..Default::default()
        };
        let (tx, rx) = watch::channel(initial);

        if config.priority {
            debug!(%target, "ImagePipeline::load: issuing preload hint");
            self.fetcher.preload(&ImageRequest::new(target.as_str(), config.quality));
        }

        let reveal = Reveal {
            registry: Arc::clone(&self.registry),
            fetcher: Arc::clone(&self.fetcher),
            visibility: Arc::clone(&self.visibility),
            target,
            config,
            tx,
        };
        ImageHandle {
            rx,
            task: tokio::spawn(reveal.run()),
        }
    }
}

struct Reveal {
    registry: Arc<LoadingRegistry>,
    fetcher: Arc<dyn ImageFetcher>,
    visibility: Arc<dyn VisibilityWatcher>,
    target: String,
    config: ImageLoadConfig,
    tx: watch::Sender<ImageLoadState>,
}

impl Reveal {
    async fn run(self) {
        if self.config.lazy {
            let mut signal = self.visibility.observe(&self.target, &self.config.visibility_options());
            if !signal.wait_visible().await {
                debug!(target = %self.target, "Reveal::run: visibility source gone, loading now");
            }
            // One-shot: the observation ends here
            drop(signal);
            self.tx.send_modify(|s| {
                s.phase = ImagePhase::Loading;
                s.loading = true;
            });
        }

        let mut source = self.target.clone();
        loop {
            if self.attempt(&source).await {
                tokio::time::sleep(self.config.swap_delay()).await;
                info!(%source, "Image revealed");
                self.tx.send_modify(|s| {
                    s.displayed_source = Some(source.clone());
                    s.fade = Some(self.config.fade_duration());
                    s.loading = false;
                    s.loaded = true;
                    s.progress_percent = 100;
                    s.phase = ImagePhase::Loaded;
                });
                return;
            }

            let attempted_fallback = self.tx.borrow().attempted_fallback;
            let fallback = match &self.config.fallback_source {
                Some(fallback) if !attempted_fallback => fallback.clone(),
                _ => {
                    warn!(%source, "Image failed to load");
                    self.tx.send_modify(|s| {
                        s.loading = false;
                        s.error = true;
                        s.phase = ImagePhase::Failed;
                    });
                    return;
                }
            };
            debug!(%source, %fallback, "Reveal::run: trying fallback source");
            self.tx.send_modify(|s| {
                s.attempted_fallback = true;
                s.progress_percent = 0;
            });
            source = fallback;
        }
    }

    /// Resolve one source through a loading operation, mirroring its progress
    async fn attempt(&self, source: &str) -> bool {
        let fetcher = Arc::clone(&self.fetcher);
        let request = ImageRequest::new(source, self.config.quality);
        let operation = LoadingOperation::execute(Arc::clone(&self.registry), self.config.operation.clone(), move || {
            let fetcher = Arc::clone(&fetcher);
            let request = request.clone();
            async move { fetcher.fetch(&request).await }
        });

        let mut op_rx = operation.subscribe();
        loop {
            let (state, progress, retry_pending) = {
                let snapshot = op_rx.borrow_and_update();
                (snapshot.state, snapshot.progress, snapshot.retry_pending)
            };
            self.tx.send_if_modified(|s| {
                let changed = s.progress_percent != progress;
                s.progress_percent = progress;
                changed
            });
            if state.is_terminal() && !retry_pending {
                return state == LoadingState::Success;
            }
            if op_rx.changed().await.is_err() {
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::PlaceholderStyle;
    use crate::platform::{AlwaysVisible, ManualVisibility};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockFetcher {
        broken: HashSet<String>,
        fetched: Mutex<Vec<String>>,
        preloaded: Mutex<Vec<String>>,
    }

    impl MockFetcher {
        fn broken(sources: &[&str]) -> Self {
            Self {
                broken: sources.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }

        fn fetched(&self) -> Vec<String> {
            self.fetched.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ImageFetcher for MockFetcher {
        async fn fetch(&self, request: &ImageRequest) -> eyre::Result<()> {
            self.fetched.lock().unwrap().push(request.source.clone());
            tokio::time::sleep(Duration::from_millis(100)).await;
            if self.broken.contains(&request.source) {
                eyre::bail!("404 for {}", request.source);
            }
            Ok(())
        }

        fn preload(&self, request: &ImageRequest) {
            self.preloaded.lock().unwrap().push(request.source.clone());
        }
    }

    fn pipeline(fetcher: Arc<MockFetcher>, visibility: Arc<dyn VisibilityWatcher>) -> ImagePipeline {
        ImagePipeline::new(LoadingRegistry::with_defaults(), fetcher, visibility)
    }

    #[tokio::test(start_paused = true)]
    async fn test_eager_blur_swaps_to_target() {
        let fetcher = Arc::new(MockFetcher::default());
        let pipeline = pipeline(fetcher.clone(), Arc::new(AlwaysVisible));
        let config = ImageLoadConfig {
            placeholder_source: Some("coach-thumb.jpg".to_string()),
            ..ImageLoadConfig::eager()
        };

        let handle = pipeline.load("coach.jpg", config);
        let pending = handle.state();
        assert_eq!(pending.displayed_source.as_deref(), Some("coach-thumb.jpg"));
        assert!(pending.loading);
        assert_eq!(pending.phase, ImagePhase::Loading);

        let done = handle.wait_done().await;
        assert_eq!(done.displayed_source.as_deref(), Some("coach.jpg"));
        assert!(done.loaded);
        assert!(!done.loading);
        assert!(!done.error);
        assert_eq!(done.progress_percent, 100);
        assert_eq!(done.fade, Some(Duration::from_millis(300)));
        assert_eq!(fetcher.fetched(), vec!["coach.jpg"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fade_only_announced_with_swap() {
        let fetcher = Arc::new(MockFetcher::broken(&["coach.jpg"]));
        let failing = pipeline(fetcher, Arc::new(AlwaysVisible));
        let config = ImageLoadConfig {
            fade_duration_ms: 120,
            ..ImageLoadConfig::eager()
        };

        let handle = failing.load("coach.jpg", config);
        assert_eq!(handle.state().fade, None);
        let done = handle.wait_done().await;
        assert!(done.error);
        assert_eq!(done.fade, None);

        let fetcher = Arc::new(MockFetcher::default());
        let working = pipeline(fetcher, Arc::new(AlwaysVisible));
        let config = ImageLoadConfig {
            fade_duration_ms: 120,
            ..ImageLoadConfig::eager()
        };
        let done = working.load("coach.jpg", config).wait_done().await;
        assert_eq!(done.fade, Some(Duration::from_millis(120)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_skeleton_shows_no_source_while_pending() {
        let fetcher = Arc::new(MockFetcher::default());
        let pipeline = pipeline(fetcher, Arc::new(AlwaysVisible));
        let config = ImageLoadConfig {
            placeholder_source: Some("coach-thumb.jpg".to_string()),
            placeholder_style: PlaceholderStyle::Skeleton,
            ..ImageLoadConfig::eager()
        };
        let handle = pipeline.load("coach.jpg", config);
        assert_eq!(handle.state().displayed_source, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_swap_waits_for_delay() {
        let fetcher = Arc::new(MockFetcher::default());
        let pipeline = pipeline(fetcher, Arc::new(AlwaysVisible));
        let handle = pipeline.load("coach.jpg", ImageLoadConfig::eager());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!handle.state().loaded);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.state().loaded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lazy_waits_for_visibility_then_disconnects() {
        let fetcher = Arc::new(MockFetcher::default());
        let visibility = Arc::new(ManualVisibility::new());
        let pipeline = pipeline(fetcher.clone(), visibility.clone());

        let handle = pipeline.load("banner.jpg", ImageLoadConfig::default());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(handle.state().phase, ImagePhase::Waiting);
        assert!(fetcher.fetched().is_empty());
        assert_eq!(visibility.observer_count("banner.jpg"), 1);

        visibility.set_visible("banner.jpg", true);
        let done = handle.wait_done().await;
        assert!(done.loaded);
        assert_eq!(visibility.observer_count("banner.jpg"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_preloads_before_visibility() {
        let fetcher = Arc::new(MockFetcher::default());
        let visibility = Arc::new(ManualVisibility::new());
        let pipeline = pipeline(fetcher.clone(), visibility);
        let config = ImageLoadConfig {
            priority: true,
            ..Default::default()
        };

        let handle = pipeline.load("hero.jpg", config);
        assert_eq!(*fetcher.preloaded.lock().unwrap(), vec!["hero.jpg".to_string()]);
        assert_eq!(handle.state().phase, ImagePhase::Waiting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_fallback_substitution() {
        let fetcher = Arc::new(MockFetcher::broken(&["coach.jpg"]));
        let pipeline = pipeline(fetcher.clone(), Arc::new(AlwaysVisible));
        let config = ImageLoadConfig {
            fallback_source: Some("default-avatar.png".to_string()),
            ..ImageLoadConfig::eager()
        };

        let done = pipeline.load("coach.jpg", config).wait_done().await;
        assert!(done.loaded);
        assert!(done.attempted_fallback);
        assert_eq!(done.displayed_source.as_deref(), Some("default-avatar.png"));
        assert_eq!(fetcher.fetched(), vec!["coach.jpg", "default-avatar.png"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_failure_is_terminal() {
        let fetcher = Arc::new(MockFetcher::broken(&["coach.jpg", "default-avatar.png"]));
        let pipeline = pipeline(fetcher.clone(), Arc::new(AlwaysVisible));
        let config = ImageLoadConfig {
            placeholder_source: Some("coach-thumb.jpg".to_string()),
            fallback_source: Some("default-avatar.png".to_string()),
            ..ImageLoadConfig::eager()
        };

        let done = pipeline.load("coach.jpg", config).wait_done().await;
        assert!(done.error);
        assert!(!done.loaded);
        assert_eq!(done.phase, ImagePhase::Failed);
        assert_eq!(done.displayed_source.as_deref(), Some("coach-thumb.jpg"));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fetcher.fetched().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_without_fallback() {
        let fetcher = Arc::new(MockFetcher::broken(&["coach.jpg"]));
        let pipeline = pipeline(fetcher, Arc::new(AlwaysVisible));
        let done = pipeline.load("coach.jpg", ImageLoadConfig::eager()).wait_done().await;
        assert!(done.error);
        assert!(!done.attempted_fallback);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_registry() {
        let registry = LoadingRegistry::with_defaults();
        let fetcher = Arc::new(MockFetcher::default());
        let pipeline = ImagePipeline::new(registry.clone(), fetcher, Arc::new(AlwaysVisible));

        let handle = pipeline.load("coach.jpg", ImageLoadConfig::eager());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(registry.active_loaders_count(), 1);

        drop(handle);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(registry.active_loaders_count(), 0);
    }
}
