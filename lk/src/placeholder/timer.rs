//! Placeholder show/hide state machine

use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use super::config::PlaceholderConfig;

/// `exited -> entering -> entered -> exiting -> exited`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransitionPhase {
    #[default]
    Exited,
    Entering,
    Entered,
    Exiting,
}

impl fmt::Display for TransitionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited => write!(f, "exited"),
            Self::Entering => write!(f, "entering"),
            Self::Entered => write!(f, "entered"),
            Self::Exiting => write!(f, "exiting"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaceholderState {
    #[serde(rename = "show-placeholder")]
    pub show_placeholder: bool,
    pub phase: TransitionPhase,
}

struct Inner {
    generation: u64,
    loading: bool,
    shown_at: Option<Instant>,
    task: Option<JoinHandle<()>>,
    /// Entering -> entered; not cancelled by later flag changes
    transition: Option<JoinHandle<()>>,
    shows: u64,
}

struct Shared {
    config: PlaceholderConfig,
    inner: Mutex<Inner>,
    tx: watch::Sender<PlaceholderState>,
}

/// Debounced placeholder visibility for one loading flag
pub struct PlaceholderTimer {
    shared: Arc<Shared>,
}

impl fmt::Debug for PlaceholderTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaceholderTimer")
            .field("config", &self.shared.config)
            .field("state", &*self.shared.tx.borrow())
            .finish()
    }
}

impl PlaceholderTimer {
    pub fn new(config: PlaceholderConfig) -> Self {
        debug!(?config, "PlaceholderTimer::new: called");
        let (tx, _) = watch::channel(PlaceholderState::default());
        Self {
            shared: Arc::new(Shared {
                config,
                inner: Mutex::new(Inner {
                    generation: 0,
                    loading: false,
                    shown_at: None,
                    task: None,
                    transition: None,
                    shows: 0,
                }),
                tx,
            }),
        }
    }

    /// Feed the current loading flag. Repeating the same value is a no-op.
    pub fn track(&self, is_loading: bool) {
        self.shared.track(is_loading);
    }

    pub fn state(&self) -> PlaceholderState {
        *self.shared.tx.borrow()
    }

    pub fn show_placeholder(&self) -> bool {
        self.shared.tx.borrow().show_placeholder
    }

    pub fn phase(&self) -> TransitionPhase {
        self.shared.tx.borrow().phase
    }

    /// Number of times the placeholder has appeared
    pub fn show_count(&self) -> u64 {
        self.shared.inner.lock().map(|i| i.shows).unwrap_or(0)
    }

    /// Watch state changes; drop the receiver to unsubscribe
    pub fn subscribe(&self) -> watch::Receiver<PlaceholderState> {
        self.shared.tx.subscribe()
    }

    /// Drive the timer from a boolean loading signal until it closes
    pub fn follow(&self, mut loading: watch::Receiver<bool>) -> JoinHandle<()> {
        debug!("PlaceholderTimer::follow: called");
        let weak = Arc::downgrade(&self.shared);
        self.shared.track(*loading.borrow_and_update());
        tokio::spawn(async move {
            while loading.changed().await.is_ok() {
                let value = *loading.borrow_and_update();
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                shared.track(value);
            }
        })
    }
}

impl Drop for PlaceholderTimer {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.shared.inner.lock() {
            for task in [inner.task.take(), inner.transition.take()].into_iter().flatten() {
                task.abort();
            }
        }
    }
}

impl Shared {
    fn track(self: &Arc<Self>, is_loading: bool) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if inner.loading == is_loading {
            return;
        }
        debug!(is_loading, "PlaceholderTimer::track: called");
        inner.loading = is_loading;
        inner.generation += 1;
        if let Some(task) = inner.task.take() {
            task.abort();
        }
        let generation = inner.generation;
        let shown = self.tx.borrow().show_placeholder;

        if is_loading {
            if shown {
                debug!("PlaceholderTimer::track: hide cancelled, staying visible");
                if self.tx.borrow().phase == TransitionPhase::Exiting {
                    self.set_phase(TransitionPhase::Entered);
                }
                return;
            }
            let delay = self.config.delay();
            if delay.is_zero() {
                self.appear(&mut inner);
            } else {
                inner.task = Some(self.spawn_after(delay, generation, Step::Appear));
            }
        } else if shown {
            let elapsed = inner.shown_at.map(|t| t.elapsed()).unwrap_or_default();
            let remaining = self.config.min_display().saturating_sub(elapsed);
            debug!(?elapsed, ?remaining, "PlaceholderTimer::track: scheduling hide");
            inner.task = Some(self.spawn_after(remaining, generation, Step::Exit));
        } else {
            debug!("PlaceholderTimer::track: finished before delay, never shown");
        }
    }

    fn appear(self: &Arc<Self>, inner: &mut Inner) {
        inner.shown_at = Some(Instant::now());
        inner.shows += 1;
        self.tx.send_replace(PlaceholderState {
            show_placeholder: true,
            phase: TransitionPhase::Entering,
        });

        if let Some(task) = inner.transition.take() {
            task.abort();
        }
        let weak = Arc::downgrade(self);
        let wait = self.config.transition();
        inner.transition = Some(tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            if let Some(shared) = weak.upgrade() {
                shared.tx.send_if_modified(|s| {
                    if s.phase != TransitionPhase::Entering {
                        return false;
                    }
                    s.phase = TransitionPhase::Entered;
                    true
                });
            }
        }));
    }

    fn set_phase(&self, phase: TransitionPhase) {
        self.tx.send_if_modified(|s| {
            let changed = s.phase != phase;
            s.phase = phase;
            changed
        });
    }

    fn spawn_after(self: &Arc<Self>, wait: Duration, generation: u64, step: Step) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(run_steps(weak, wait, generation, step))
    }

    /// Apply `step` if still current; returns the follow-up step and its wait
    fn advance(self: &Arc<Self>, generation: u64, step: Step) -> Option<(Duration, Step)> {
        let Ok(mut inner) = self.inner.lock() else {
            return None;
        };
        if inner.generation != generation {
            debug!(?step, "PlaceholderTimer: stale step discarded");
            return None;
        }
        debug!(?step, "PlaceholderTimer: advancing");
        match step {
            Step::Appear => {
                self.appear(&mut inner);
                None
            }
            Step::Exit => {
                self.set_phase(TransitionPhase::Exiting);
                Some((self.config.transition(), Step::Exited))
            }
            Step::Exited => {
                inner.shown_at = None;
                self.tx.send_replace(PlaceholderState {
                    show_placeholder: false,
                    phase: TransitionPhase::Exited,
                });
                None
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Appear,
    Exit,
    Exited,
}

async fn run_steps(weak: Weak<Shared>, mut wait: Duration, generation: u64, mut step: Step) {
    loop {
        tokio::time::sleep(wait).await;
        let Some(shared) = weak.upgrade() else {
            return;
        };
        match shared.advance(generation, step) {
            Some((next_wait, next_step)) => {
                wait = next_wait;
                step = next_step;
            }
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    async fn advance(millis: u64) {
        tokio::time::sleep(ms(millis)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_load_never_shows() {
        let timer = PlaceholderTimer::new(PlaceholderConfig::default());
        let mut rx = timer.subscribe();

        timer.track(true);
        advance(150).await;
        timer.track(false);
        advance(2_000).await;

        assert!(!timer.show_placeholder());
        assert!(!rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().show_placeholder);
        assert_eq!(timer.show_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_show_after_delay_then_entered() {
        let timer = PlaceholderTimer::new(PlaceholderConfig::default());
        timer.track(true);

        advance(199).await;
        assert!(!timer.show_placeholder());

        advance(2).await;
        assert_eq!(
            timer.state(),
            PlaceholderState {
                show_placeholder: true,
                phase: TransitionPhase::Entering
            }
        );

        advance(150).await;
        assert_eq!(timer.phase(), TransitionPhase::Entered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_display_holds_placeholder() {
        let config = PlaceholderConfig {
            delay_ms: 0,
            ..Default::default()
        };
        let timer = PlaceholderTimer::new(config);

        timer.track(true);
        assert!(timer.show_placeholder());
        advance(50).await;
        timer.track(false);

        advance(440).await;
        assert!(timer.show_placeholder());
        assert_eq!(timer.phase(), TransitionPhase::Entered);

        advance(20).await;
        assert_eq!(timer.phase(), TransitionPhase::Exiting);
        assert!(timer.show_placeholder());

        advance(150).await;
        assert_eq!(
            timer.state(),
            PlaceholderState {
                show_placeholder: false,
                phase: TransitionPhase::Exited
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_load_hides_without_extra_wait() {
        let timer = PlaceholderTimer::new(PlaceholderConfig::default());
        timer.track(true);
        advance(1_500).await;
        timer.track(false);

        advance(1).await;
        assert_eq!(timer.phase(), TransitionPhase::Exiting);
        advance(150).await;
        assert!(!timer.show_placeholder());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_cancels_pending_hide() {
        let timer = PlaceholderTimer::new(PlaceholderConfig::default());
        timer.track(true);
        advance(300).await;
        timer.track(false);
        advance(100).await;
        timer.track(true);

        advance(2_000).await;
        assert!(timer.show_placeholder());
        assert_eq!(timer.phase(), TransitionPhase::Entered);
        assert_eq!(timer.show_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_value_is_noop() {
        let timer = PlaceholderTimer::new(PlaceholderConfig::default());
        timer.track(true);
        advance(150).await;
        timer.track(true);
        advance(60).await;
        assert!(timer.show_placeholder());
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_signal() {
        let timer = PlaceholderTimer::new(PlaceholderConfig::default());
        let (tx, rx) = watch::channel(false);
        let follower = timer.follow(rx);

        tx.send_replace(true);
        advance(250).await;
        assert!(timer.show_placeholder());

        tx.send_replace(false);
        advance(1_000).await;
        assert!(!timer.show_placeholder());
        assert_eq!(timer.show_count(), 1);
        follower.abort();
    }
}
