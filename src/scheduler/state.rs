use crate::catalog::{SoundAsset, SoundCategory};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;

/// Priorities passed by the category notifiers. Lower means more urgent by
/// convention; the queue itself is strictly FIFO and only reports them.
pub const ACTION_PRIORITY: i32 = 0;
pub const INTRUSION_PRIORITY: i32 = 1;
pub const FAULT_PRIORITY: i32 = 2;

/// One pending playback request. Consumed exactly once by the processing loop.
#[derive(Debug, Clone)]
pub struct ScheduleItem {
    pub asset: Arc<SoundAsset>,
    pub enqueued_at: SystemTime,
    pub priority: i32,
    pub correlation_id: String,
    pub cancel: CancellationToken,
}

impl ScheduleItem {
    pub fn new(asset: Arc<SoundAsset>, priority: i32, cancel: CancellationToken) -> Self {
        Self {
            asset,
            enqueued_at: SystemTime::now(),
            priority,
            correlation_id: new_correlation_id(),
            cancel,
        }
    }

    pub fn category(&self) -> SoundCategory {
        self.asset.category()
    }

    pub(crate) fn info(&self) -> QueuedItemInfo {
        QueuedItemInfo {
            correlation_id: self.correlation_id.clone(),
            asset_name: self.asset.name().to_string(),
            category: self.asset.category(),
            priority: self.priority,
            enqueued_at: self.enqueued_at,
        }
    }
}

/// Short opaque id used to follow one alert through the logs.
fn new_correlation_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Status view of a queued item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedItemInfo {
    pub correlation_id: String,
    pub asset_name: String,
    pub category: SoundCategory,
    pub priority: i32,
    pub enqueued_at: SystemTime,
}

/// Point-in-time view of the schedule queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub length: usize,
    pub capacity: usize,
    pub processing: bool,
    pub items: Vec<QueuedItemInfo>,
}

/// The session currently holding the output device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSessionInfo {
    pub correlation_id: String,
    pub asset_name: String,
    pub category: SoundCategory,
    pub strategy: PlaybackStrategy,
    pub started_at: SystemTime,
}

/// What [`AlertScheduler::status`](crate::scheduler::AlertScheduler::status) reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerStatus {
    pub queue: QueueSnapshot,
    pub playing: Option<ActiveSessionInfo>,
}

impl SchedulerStatus {
    pub fn is_playing(&self) -> bool {
        self.playing.is_some()
    }
}

/// Temporal strategy applied to one playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStrategy {
    /// Replay from the start until the duration has elapsed.
    BoundedLoop(Duration),
    /// Replay until cancelled.
    ContinuousLoop,
    /// Play a single time.
    PlayOnce,
}

impl PlaybackStrategy {
    /// Maps a `(duration, auto_stop)` policy onto a strategy.
    pub fn from_policy(duration_secs: f64, auto_stop: bool) -> Self {
        if !auto_stop {
            PlaybackStrategy::ContinuousLoop
        } else if duration_secs.is_finite() && duration_secs > 0.0 {
            PlaybackStrategy::BoundedLoop(Duration::from_secs_f64(duration_secs))
        } else {
            PlaybackStrategy::PlayOnce
        }
    }
}
