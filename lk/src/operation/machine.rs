//! The loading operation state machine

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::{FutureExt, TryFutureExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::{LoadingState, OperationId};
use crate::network::NetworkQuality;
use crate::registry::{LoaderContext, LoaderUpdate, LoadingAnalyticsRecord, LoadingRegistry};

use super::backoff::{adjusted_timeout, backoff_delay, next_progress};
use super::config::OperationConfig;
use super::error::LoadError;

type OperationFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, String>> + Send + Sync>;

/// Observable state of a loading operation
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSnapshot<T> {
    /// Id of the current or most recent attempt
    pub id: Option<OperationId>,
    pub state: LoadingState,
    /// Most recent successful result; kept across later attempts
    pub data: Option<T>,
    pub error: Option<LoadError>,
    /// 0..=100; synthetic below 90, exactly 100 on success
    pub progress: u8,
    /// Quality sampled when the current attempt started
    pub network_quality: NetworkQuality,
    pub retry_count: u32,
    /// A retry is waiting out its backoff
    pub retry_pending: bool,
    pub started_at: Option<Instant>,
    pub ended_at: Option<Instant>,
    /// Adaptive deadline of the current attempt
    pub timeout: Option<Duration>,
}

impl<T> Default for OperationSnapshot<T> {
    fn default() -> Self {
        Self {
            id: None,
            state: LoadingState::Idle,
            data: None,
            error: None,
            progress: 0,
            network_quality: NetworkQuality::Unknown,
            retry_count: 0,
            retry_pending: false,
            started_at: None,
            ended_at: None,
            timeout: None,
        }
    }
}

impl<T> OperationSnapshot<T> {
    pub fn is_loading(&self) -> bool {
        self.state == LoadingState::Loading
    }

    /// Duration of the last settled attempt
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some(end.saturating_duration_since(start)),
            _ => None,
        }
    }
}

/// Result of asking for a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Attempt `attempt` will start after `delay`
    Scheduled { attempt: u32, delay: Duration },
    /// The retry budget is spent; nothing was scheduled
    Exhausted,
}

/// How an attempt ended, before classification
enum Settlement<T> {
    Settled(Result<T, String>),
    TimedOut(Duration),
}

struct Control {
    generation: u64,
    retry_count: u32,
    current: Option<OperationId>,
    started_wall: Option<DateTime<Utc>>,
    attempt_task: Option<JoinHandle<()>>,
    retry_task: Option<JoinHandle<()>>,
}

impl Control {
    fn abort_tasks(&mut self) {
        if let Some(handle) = self.attempt_task.take() {
            handle.abort();
        }
        if let Some(handle) = self.retry_task.take() {
            handle.abort();
        }
    }
}

struct Shared<T> {
    config: OperationConfig,
    registry: Arc<LoadingRegistry>,
    operation: OperationFn<T>,
    control: Mutex<Control>,
    tx: watch::Sender<OperationSnapshot<T>>,
}

/// Handle to a single loading operation.
///
/// Clones share the same operation. Background tasks only hold weak
/// references, so dropping the last handle cancels any in-flight attempt and
/// releases its registry entry. Must be used inside a tokio runtime.
pub struct LoadingOperation<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for LoadingOperation<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for LoadingOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.shared.tx.borrow();
        f.debug_struct("LoadingOperation")
            .field("kind", &self.shared.config.kind)
            .field("state", &snapshot.state)
            .field("retry_count", &snapshot.retry_count)
            .finish()
    }
}

impl<T> LoadingOperation<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an idle operation; nothing runs until [`start`](Self::start)
    pub fn new<F, Fut, E>(registry: Arc<LoadingRegistry>, config: OperationConfig, operation: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        debug!(kind = %config.kind, "LoadingOperation::new: called");
        let operation: OperationFn<T> = Arc::new(move || operation().map_err(|e| e.to_string()).boxed());
        let (tx, _) = watch::channel(OperationSnapshot::default());
        let control = Control {
            generation: 0,
            retry_count: 0,
            current: None,
            started_wall: None,
            attempt_task: None,
            retry_task: None,
        };
        Self {
            shared: Arc::new(Shared {
                config,
                registry,
                operation,
                control: Mutex::new(control),
                tx,
            }),
        }
    }

    /// Create the operation and start its first attempt immediately
    pub fn execute<F, Fut, E>(registry: Arc<LoadingRegistry>, config: OperationConfig, operation: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let op = Self::new(registry, config, operation);
        op.start();
        op
    }

    pub fn config(&self) -> &OperationConfig {
        &self.shared.config
    }

    /// Start an attempt unless one is already loading
    pub fn start(&self) {
        debug!(kind = %self.shared.config.kind, "LoadingOperation::start: called");
        let Ok(mut control) = self.shared.control.lock() else {
            return;
        };
        if self.shared.tx.borrow().is_loading() {
            debug!("LoadingOperation::start: already loading");
            return;
        }
        self.shared.begin_attempt(&mut control);
    }

    /// Supersede any in-flight attempt and start afresh with the retry count reset
    pub fn refresh(&self) {
        debug!(kind = %self.shared.config.kind, "LoadingOperation::refresh: called");
        let Ok(mut control) = self.shared.control.lock() else {
            return;
        };
        if let Some(handle) = control.retry_task.take() {
            handle.abort();
        }
        control.retry_count = 0;
        self.shared.tx.send_modify(|s| {
            s.retry_count = 0;
            s.retry_pending = false;
        });
        self.shared.begin_attempt(&mut control);
    }

    /// Schedule a fresh attempt after exponential backoff.
    ///
    /// Once `max_retries` retries have been used this is a no-op that
    /// returns [`RetryOutcome::Exhausted`].
    pub fn retry(&self) -> RetryOutcome {
        self.shared.schedule_retry()
    }

    /// Abandon the in-flight attempt and any pending retry.
    ///
    /// The state returns to `idle`; a late result from the abandoned attempt
    /// is discarded without touching state.
    pub fn cancel(&self) {
        debug!(kind = %self.shared.config.kind, "LoadingOperation::cancel: called");
        let Ok(mut control) = self.shared.control.lock() else {
            return;
        };
        control.generation += 1;
        control.abort_tasks();
        if let Some(id) = control.current.take() {
            self.shared.registry.unregister_loader(&id);
        }
        self.shared.tx.send_modify(|s| {
            s.state = LoadingState::Idle;
            s.progress = 0;
            s.retry_pending = false;
        });
        info!(kind = %self.shared.config.kind, "Loading operation cancelled");
    }

    pub fn snapshot(&self) -> OperationSnapshot<T> {
        self.shared.tx.borrow().clone()
    }

    pub fn state(&self) -> LoadingState {
        self.shared.tx.borrow().state
    }

    pub fn data(&self) -> Option<T> {
        self.shared.tx.borrow().data.clone()
    }

    pub fn error(&self) -> Option<LoadError> {
        self.shared.tx.borrow().error.clone()
    }

    pub fn progress(&self) -> u8 {
        self.shared.tx.borrow().progress
    }

    /// Watch every snapshot change; drop the receiver to unsubscribe
    pub fn subscribe(&self) -> watch::Receiver<OperationSnapshot<T>> {
        self.shared.tx.subscribe()
    }

    /// Wait until nothing is loading and no retry is pending
    pub async fn wait_settled(&self) -> OperationSnapshot<T> {
        let mut rx = self.subscribe();
        let settled = rx
            .wait_for(|s| !s.is_loading() && !s.retry_pending)
            .await
            .map(|snapshot| snapshot.clone());
        match settled {
            Ok(snapshot) => snapshot,
            Err(_) => rx.borrow().clone(),
        }
    }
}

impl<T> Shared<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Start a new attempt, superseding whatever was in flight
    fn begin_attempt(self: &Arc<Self>, control: &mut Control) {
        control.generation += 1;
        let generation = control.generation;
        if let Some(handle) = control.attempt_task.take() {
            handle.abort();
        }
        if let Some(previous) = control.current.take() {
            self.registry.unregister_loader(&previous);
        }

        let kind = self.config.kind.as_str();
        let id = OperationId::generate(kind);
        let quality = self.registry.network_quality();
        let timeout = adjusted_timeout(self.config.base_timeout(), quality);
        debug!(%id, %quality, ?timeout, generation, "LoadingOperation: beginning attempt");

        self.registry
            .register_loader(id.clone(), LoaderContext::loading(kind, self.config.priority));
        control.current = Some(id.clone());
        control.started_wall = Some(Utc::now());

        let retry_count = control.retry_count;
        self.tx.send_modify(|s| {
            s.id = Some(id.clone());
            s.state = LoadingState::Loading;
            s.error = None;
            s.progress = 0;
            s.network_quality = quality;
            s.retry_count = retry_count;
            s.retry_pending = false;
            s.started_at = Some(Instant::now());
            s.ended_at = None;
            s.timeout = Some(timeout);
        });

        let future = (self.operation)();
        let weak = Arc::downgrade(self);
        let tick = self.config.progress_interval();
        control.attempt_task = Some(tokio::spawn(run_attempt(weak, generation, id, future, timeout, tick)));
    }

    /// Advance synthetic progress; false once the attempt is stale or settled
    fn advance_progress(&self, generation: u64) -> bool {
        let Ok(control) = self.control.lock() else {
            return false;
        };
        if control.generation != generation {
            return false;
        }
        let mut live = false;
        self.tx.send_if_modified(|s| {
            if !s.is_loading() {
                return false;
            }
            live = true;
            let next = next_progress(s.progress);
            let changed = next != s.progress;
            s.progress = next;
            changed
        });
        live
    }

    /// Apply the end of an attempt if it is still current
    fn settle(self: &Arc<Self>, generation: u64, id: OperationId, settlement: Settlement<T>) {
        let Ok(mut control) = self.control.lock() else {
            return;
        };
        if control.generation != generation {
            debug!(%id, generation, "LoadingOperation::settle: stale attempt discarded");
            self.registry.unregister_loader(&id);
            return;
        }
        if !self.tx.borrow().is_loading() {
            debug!(%id, "LoadingOperation::settle: already settled");
            return;
        }

        let online = self.registry.is_online();
        let outcome = match settlement {
            Settlement::Settled(Ok(data)) => Ok(data),
            Settlement::Settled(Err(message)) if !online => Err(LoadError::Offline { message }),
            Settlement::Settled(Err(message)) => Err(LoadError::Failed { message }),
            Settlement::TimedOut(after) => Err(LoadError::Timeout { after }),
        };
        let state = match &outcome {
            Ok(_) => LoadingState::Success,
            Err(e) => e.state(),
        };

        let ended = Instant::now();
        let started = self.tx.borrow().started_at.unwrap_or(ended);
        let duration = ended.saturating_duration_since(started);
        let started_wall = control.started_wall.take().unwrap_or_else(Utc::now);
        control.attempt_task = None;
        control.current = None;

        self.registry.update_loader(&id, LoaderUpdate::state(state));
        self.registry.unregister_loader(&id);

        let quality = self.tx.borrow().network_quality;
        self.registry.add_analytics(LoadingAnalyticsRecord {
            operation_id: id.clone(),
            kind: self.config.kind.clone(),
            started_at: started_wall,
            ended_at: Utc::now(),
            duration_ms: duration.as_millis() as u64,
            success: outcome.is_ok(),
            state,
            error_message: outcome.as_ref().err().map(|e| e.to_string()),
            network_quality: quality,
            cache_hit: None,
            retry_count: control.retry_count,
        });

        // Pending flag must be set before the terminal state is published
        if self.config.auto_retry && outcome.as_ref().err().is_some_and(|e| e.is_retryable()) {
            debug!(%id, "LoadingOperation::settle: auto-retrying");
            self.schedule_retry_locked(&mut control);
        }

        match outcome {
            Ok(data) => {
                debug!(%id, ?duration, "LoadingOperation::settle: success");
                self.tx.send_modify(|s| {
                    s.state = state;
                    s.data = Some(data);
                    s.error = None;
                    s.progress = 100;
                    s.ended_at = Some(ended);
                });
            }
            Err(error) => {
                match &error {
                    LoadError::Timeout { after } => warn!(%id, ?after, "Loading operation timed out"),
                    LoadError::Offline { .. } => warn!(%id, "Loading operation failed while offline"),
                    LoadError::Failed { message } => debug!(%id, %message, "LoadingOperation::settle: failed"),
                }
                self.tx.send_modify(|s| {
                    s.state = state;
                    s.error = Some(error);
                    s.ended_at = Some(ended);
                });
            }
        }
    }

    fn schedule_retry(self: &Arc<Self>) -> RetryOutcome {
        let Ok(mut control) = self.control.lock() else {
            return RetryOutcome::Exhausted;
        };
        self.schedule_retry_locked(&mut control)
    }

    fn schedule_retry_locked(self: &Arc<Self>, control: &mut Control) -> RetryOutcome {
        if control.retry_count >= self.config.max_retries {
            debug!(
                retry_count = control.retry_count,
                max_retries = self.config.max_retries,
                "LoadingOperation::retry: budget exhausted"
            );
            return RetryOutcome::Exhausted;
        }

        let delay = backoff_delay(control.retry_count, self.config.backoff_base(), self.config.backoff_max());
        control.retry_count += 1;
        let attempt = control.retry_count;
        let generation = control.generation;
        info!(kind = %self.config.kind, attempt, ?delay, "Scheduling retry");

        self.tx.send_modify(|s| {
            s.retry_count = attempt;
            s.retry_pending = true;
        });

        if let Some(handle) = control.retry_task.take() {
            handle.abort();
        }
        let weak = Arc::downgrade(self);
        control.retry_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let Ok(mut control) = shared.control.lock() else {
                return;
            };
            if control.generation != generation {
                debug!("LoadingOperation: retry superseded before it fired");
                return;
            }
            control.retry_task = None;
            shared.begin_attempt(&mut control);
        }));

        RetryOutcome::Scheduled { attempt, delay }
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        if let Ok(control) = self.control.get_mut() {
            control.abort_tasks();
            if let Some(id) = control.current.take() {
                debug!(%id, "LoadingOperation: dropped while loading, releasing");
                self.registry.unregister_loader(&id);
            }
        }
    }
}

async fn run_attempt<T>(
    weak: Weak<Shared<T>>,
    generation: u64,
    id: OperationId,
    mut future: BoxFuture<'static, Result<T, String>>,
    timeout: Duration,
    tick: Duration,
) where
    T: Clone + Send + Sync + 'static,
{
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut progress = tokio::time::interval_at(Instant::now() + tick, tick);

    let settlement = loop {
        tokio::select! {
            biased;

            result = &mut future => break Settlement::Settled(result),

            _ = &mut deadline => break Settlement::TimedOut(timeout),

            _ = progress.tick() => {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                if !shared.advance_progress(generation) {
                    return;
                }
            }
        }
    };

    if let Some(shared) = weak.upgrade() {
        shared.settle(generation, id, settlement);
    }
}
