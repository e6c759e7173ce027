//! Alert-sound scheduler: serializes alert playback onto one audio output.

use crate::audio::{AudioDeviceDescriptor, AudioDriver, DeviceRegistry};
use crate::catalog::{AssetCatalog, SoundAsset, SoundCategory};
use crate::config::Settings;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

mod error;
mod queue;
mod run_loop;
pub mod session;
mod state;

pub use error::SchedulerError;
pub use queue::{ScheduleQueue, DEFAULT_CAPACITY};
pub use session::{CancelSource, SessionOutcome, MIN_CYCLE_INTERVAL};
pub use state::{
    ActiveSessionInfo, PlaybackStrategy, QueueSnapshot, QueuedItemInfo, ScheduleItem, SchedulerStatus,
    ACTION_PRIORITY, FAULT_PRIORITY, INTRUSION_PRIORITY,
};

const SCHEDULER_LOG_TARGET: &str = "r_alertsound::scheduler";

/// Lifecycle of the processing loop: the scope it runs under and its task.
struct LoopLifecycle {
    scope: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// State shared between the facade and its processing loop.
pub(crate) struct SchedulerInner {
    queue: ScheduleQueue,
    catalog: Arc<AssetCatalog>,
    devices: Arc<DeviceRegistry>,
    driver: Arc<dyn AudioDriver>,
    settings: Settings,
    runtime: Handle,
    lifecycle: Mutex<LoopLifecycle>,
    /// Held by a playback session for its whole lifetime; at most one device
    /// handle is open while it is taken.
    session_gate: tokio::sync::Mutex<()>,
    active: Mutex<Option<ActiveSessionInfo>>,
}

fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SchedulerInner {
    pub(crate) fn strategy_for(&self, category: SoundCategory) -> PlaybackStrategy {
        match self.settings.policy(category) {
            Some(policy) => PlaybackStrategy::from_policy(policy.duration_secs, policy.auto_stop),
            None => PlaybackStrategy::PlayOnce,
        }
    }

    pub(crate) fn set_active(&self, info: Option<ActiveSessionInfo>) {
        *lock_recover(&self.active) = info;
    }

    fn spawn_loop(self: &Arc<Self>) {
        let mut lifecycle = lock_recover(&self.lifecycle);
        let scope = lifecycle.scope.clone();
        debug!(target: SCHEDULER_LOG_TARGET, "Spawning processing loop.");
        lifecycle.task = Some(
            self.runtime
                .spawn(run_loop::run_processing_loop(Arc::clone(self), scope)),
        );
    }
}

/// Public entry point. Cheap to clone; all clones drive the same queue.
#[derive(Clone)]
pub struct AlertScheduler {
    inner: Arc<SchedulerInner>,
}

impl AlertScheduler {
    /// Builds a scheduler bound to the current Tokio runtime.
    /// Queue capacity comes from `settings.queue_capacity`.
    pub fn new(
        settings: Settings,
        catalog: Arc<AssetCatalog>,
        devices: Arc<DeviceRegistry>,
        driver: Arc<dyn AudioDriver>,
    ) -> Result<Self, SchedulerError> {
        let runtime = Handle::try_current().map_err(|e| SchedulerError::NoRuntime(e.to_string()))?;
        let queue = ScheduleQueue::with_capacity(settings.queue_capacity)?;
        info!(target: SCHEDULER_LOG_TARGET, capacity = settings.queue_capacity, "Alert scheduler created.");
        Ok(Self {
            inner: Arc::new(SchedulerInner {
                queue,
                catalog,
                devices,
                driver,
                settings,
                runtime,
                lifecycle: Mutex::new(LoopLifecycle {
                    scope: CancellationToken::new(),
                    task: None,
                }),
                session_gate: tokio::sync::Mutex::new(()),
                active: Mutex::new(None),
            }),
        })
    }

    pub fn catalog(&self) -> &Arc<AssetCatalog> {
        &self.inner.catalog
    }

    pub fn devices(&self) -> &Arc<DeviceRegistry> {
        &self.inner.devices
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// Queues `asset` for playback and starts the processing loop if idle.
    /// Returns the alert's correlation id. `priority` is recorded only.
    pub fn schedule(
        &self,
        asset: Option<Arc<SoundAsset>>,
        priority: i32,
        cancel: CancellationToken,
    ) -> Result<String, SchedulerError> {
        let asset = asset.ok_or_else(|| SchedulerError::InvalidArgument("asset must not be empty".to_string()))?;
        let item = ScheduleItem::new(asset, priority, cancel);
        let correlation_id = item.correlation_id.clone();
        info!(
            target: SCHEDULER_LOG_TARGET,
            correlation_id = %correlation_id,
            asset = %item.asset.name(),
            category = %item.category(),
            priority,
            "Scheduling alert."
        );
        if self.inner.queue.enqueue(item) {
            self.inner.spawn_loop();
        }
        Ok(correlation_id)
    }

    /// Resolves the configured asset for `category` and schedules it with the
    /// category's fixed priority.
    pub fn notify(&self, category: SoundCategory, cancel: CancellationToken) -> Result<String, SchedulerError> {
        let priority = match category {
            SoundCategory::Action => ACTION_PRIORITY,
            SoundCategory::Intrusion => INTRUSION_PRIORITY,
            SoundCategory::Fault => FAULT_PRIORITY,
            SoundCategory::None => {
                return Err(SchedulerError::InvalidArgument("category 'none' has no configured sound".to_string()))
            }
        };
        let file_name = self
            .inner
            .settings
            .policy(category)
            .map(|p| p.file_name.clone())
            .unwrap_or_default();
        let asset = self.inner.catalog.find(&file_name).ok_or_else(|| {
            warn!(target: SCHEDULER_LOG_TARGET, %category, file = %file_name, "No catalog asset for category.");
            SchedulerError::AssetNotFound(format!("{} ({})", file_name, category))
        })?;
        self.schedule(Some(asset), priority, cancel)
    }

    pub fn notify_intrusion(&self, cancel: CancellationToken) -> Result<String, SchedulerError> {
        self.notify(SoundCategory::Intrusion, cancel)
    }

    pub fn notify_fault(&self, cancel: CancellationToken) -> Result<String, SchedulerError> {
        self.notify(SoundCategory::Fault, cancel)
    }

    pub fn notify_action_report(&self, cancel: CancellationToken) -> Result<String, SchedulerError> {
        self.notify(SoundCategory::Action, cancel)
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            queue: self.inner.queue.snapshot(),
            playing: lock_recover(&self.inner.active).clone(),
        }
    }

    pub fn set_capacity(&self, capacity: usize) -> Result<(), SchedulerError> {
        self.inner.queue.set_capacity(capacity)?;
        info!(target: SCHEDULER_LOG_TARGET, capacity, "Queue capacity updated.");
        Ok(())
    }

    /// Drops pending alerts of `category`. An in-flight session is untouched.
    pub fn clear_category(&self, category: SoundCategory) -> usize {
        let removed = self.inner.queue.remove_by_category(category);
        info!(target: SCHEDULER_LOG_TARGET, %category, removed, "Cleared pending alerts by category.");
        removed
    }

    /// Clears the queue, cancels the processing loop and waits until the
    /// in-flight session (if any) has released its device.
    #[instrument(skip(self))]
    pub async fn stop_all(&self) -> Result<(), SchedulerError> {
        let (joined, _gate) = self.halt().await;
        joined
    }

    /// Stop-all that returns still holding the session gate, so no session
    /// can open a device until the guard is dropped.
    async fn halt(&self) -> (Result<(), SchedulerError>, tokio::sync::MutexGuard<'_, ()>) {
        let (old_scope, task) = {
            let mut lifecycle = lock_recover(&self.inner.lifecycle);
            let old_scope = std::mem::replace(&mut lifecycle.scope, CancellationToken::new());
            (old_scope, lifecycle.task.take())
        };
        let cleared = self.inner.queue.clear();
        old_scope.cancel();
        info!(target: SCHEDULER_LOG_TARGET, cleared, "Stop-all requested.");

        // The gate frees only once the cancelled session has closed its device.
        // Queueing on it before the join also keeps any session of a newer loop
        // behind this stop, and covers a concurrent stop that took the handle.
        let gate = self.inner.session_gate.lock().await;
        let joined = match task {
            Some(task) => task.await.map_err(SchedulerError::from),
            None => Ok(()),
        };
        self.inner.catalog.reset_playing_flags();

        // Alerts scheduled while the old loop was unwinding still get played.
        if self.inner.queue.claim_if_pending() {
            debug!(target: SCHEDULER_LOG_TARGET, "Alerts arrived during stop-all, restarting processing loop.");
            self.inner.spawn_loop();
        }

        if let Err(e) = &joined {
            warn!(target: SCHEDULER_LOG_TARGET, "Processing loop ended abnormally: {}", e);
        }
        (joined, gate)
    }

    /// Switches the output device. An in-flight session is stopped and its
    /// device released before the selection changes.
    #[instrument(skip(self, device), fields(device = %device.name))]
    pub async fn select_device(&self, device: AudioDeviceDescriptor) -> Result<(), SchedulerError> {
        if self.inner.devices.find(&device.name).is_none() {
            return Err(SchedulerError::InvalidArgument(format!("unknown output device '{}'", device.name)));
        }
        self.swap_device(Some(device)).await
    }

    /// Reverts to the platform default device, with the same stop-before-swap rule.
    pub async fn reset_device(&self) -> Result<(), SchedulerError> {
        self.swap_device(None).await
    }

    async fn swap_device(&self, device: Option<AudioDeviceDescriptor>) -> Result<(), SchedulerError> {
        if let Ok(_gate) = self.inner.session_gate.try_lock() {
            self.inner.devices.set_selected(device);
            return Ok(());
        }
        info!(target: SCHEDULER_LOG_TARGET, "Output device busy, stopping playback before switching.");
        let (joined, _gate) = self.halt().await;
        self.inner.devices.set_selected(device);
        joined
    }
}
