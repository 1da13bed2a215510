//! Viewport visibility signal source

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

/// Intersection options for a visibility observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibilityOptions {
    /// Margin around the viewport that still counts as visible
    #[serde(rename = "root-margin-px")]
    pub root_margin_px: u32,

    /// Fraction of the element that must intersect
    pub threshold: f64,
}

impl Default for VisibilityOptions {
    fn default() -> Self {
        Self {
            root_margin_px: 0,
            threshold: 0.0,
        }
    }
}

/// Receiving end of a visibility observation.
///
/// Dropping the signal disconnects the observation.
#[derive(Debug, Clone)]
pub struct VisibilitySignal {
    rx: watch::Receiver<bool>,
}

impl VisibilitySignal {
    /// Wrap a watch receiver carrying the element's visibility
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A signal that is visible now and never changes
    pub fn visible() -> Self {
        let (_tx, rx) = watch::channel(true);
        Self { rx }
    }

    /// Current visibility
    pub fn is_visible(&self) -> bool {
        *self.rx.borrow()
    }

    /// Current visibility, marking it seen so [`changed`](Self::changed)
    /// only reports later updates
    pub fn current(&mut self) -> bool {
        *self.rx.borrow_and_update()
    }

    /// Wait for the next visibility change.
    ///
    /// Returns `None` once the source has gone away.
    pub async fn changed(&mut self) -> Option<bool> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    /// Resolve once the element is visible.
    ///
    /// Returns `false` if the source went away before that happened.
    pub async fn wait_visible(&mut self) -> bool {
        debug!("VisibilitySignal::wait_visible: called");
        self.rx.wait_for(|visible| *visible).await.is_ok()
    }
}

/// Ambient mechanism for learning when an element enters the viewport
pub trait VisibilityWatcher: Send + Sync {
    /// Start observing `target`
    fn observe(&self, target: &str, options: &VisibilityOptions) -> VisibilitySignal;
}

/// Watcher for hosts without intersection support: everything is visible
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysVisible;

impl VisibilityWatcher for AlwaysVisible {
    fn observe(&self, target: &str, _options: &VisibilityOptions) -> VisibilitySignal {
        debug!(%target, "AlwaysVisible::observe: called");
        VisibilitySignal::visible()
    }
}

/// Watcher whose visibility is driven explicitly per target
#[derive(Debug, Default)]
pub struct ManualVisibility {
    targets: Mutex<HashMap<String, watch::Sender<bool>>>,
}

impl ManualVisibility {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the visibility of `target`, creating the observation if needed
    pub fn set_visible(&self, target: &str, visible: bool) {
        debug!(%target, visible, "ManualVisibility::set_visible: called");
        if let Ok(mut targets) = self.targets.lock() {
            match targets.get(target) {
                Some(tx) => {
                    // Observers only hear about actual changes
                    tx.send_if_modified(|current| {
                        let changed = *current != visible;
                        *current = visible;
                        changed
                    });
                }
                None => {
                    let (tx, _rx) = watch::channel(visible);
                    targets.insert(target.to_string(), tx);
                }
            }
        }
    }

    /// Number of live observers of `target`
    pub fn observer_count(&self, target: &str) -> usize {
        self.targets
            .lock()
            .ok()
            .and_then(|t| t.get(target).map(|tx| tx.receiver_count()))
            .unwrap_or(0)
    }
}

impl VisibilityWatcher for ManualVisibility {
    fn observe(&self, target: &str, options: &VisibilityOptions) -> VisibilitySignal {
        debug!(%target, ?options, "ManualVisibility::observe: called");
        let Ok(mut targets) = self.targets.lock() else {
            return VisibilitySignal::visible();
        };
        let tx = targets
            .entry(target.to_string())
            .or_insert_with(|| watch::channel(false).0);
        VisibilitySignal::new(tx.subscribe())
    }
}
