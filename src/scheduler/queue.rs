use crate::catalog::SoundCategory;
use crate::scheduler::error::SchedulerError;
use crate::scheduler::state::{QueueSnapshot, ScheduleItem};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

const LOG_TARGET: &str = "r_alertsound::scheduler::queue";

pub const DEFAULT_CAPACITY: usize = 3;

#[derive(Debug)]
struct QueueState {
    items: VecDeque<ScheduleItem>,
    capacity: usize,
    /// True iff a processing loop task is alive for this queue.
    processing: bool,
}

impl QueueState {
    fn trim(&mut self) {
        while self.items.len() > self.capacity {
            if let Some(evicted) = self.items.pop_front() {
                warn!(
                    target: LOG_TARGET,
                    correlation_id = %evicted.correlation_id,
                    asset = %evicted.asset.name(),
                    capacity = self.capacity,
                    "Queue over capacity, evicted oldest pending alert."
                );
            }
        }
    }
}

/// Bounded FIFO backlog with oldest-first eviction. Also owns the
/// "processing active" flag so the loop's idle/active transitions happen
/// under the same lock as dequeue.
#[derive(Debug)]
pub struct ScheduleQueue {
    state: Mutex<QueueState>,
}

impl Default for ScheduleQueue {
    fn default() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                capacity: DEFAULT_CAPACITY,
                processing: false,
            }),
        }
    }
}

impl ScheduleQueue {
    pub fn with_capacity(capacity: usize) -> Result<Self, SchedulerError> {
        let queue = Self::default();
        queue.set_capacity(capacity)?;
        Ok(queue)
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends `item` and trims from the head. Returns true when the queue was
    /// idle and the caller must start a processing loop.
    pub fn enqueue(&self, item: ScheduleItem) -> bool {
        let mut state = self.lock();
        debug!(target: LOG_TARGET, correlation_id = %item.correlation_id, priority = item.priority, "Enqueued alert.");
        state.items.push_back(item);
        state.trim();
        if state.processing {
            false
        } else {
            state.processing = true;
            true
        }
    }

    /// Pops the head. An empty queue is marked idle in the same critical section.
    pub fn dequeue(&self) -> Option<ScheduleItem> {
        let mut state = self.lock();
        let item = state.items.pop_front();
        if item.is_none() {
            state.processing = false;
        }
        item
    }

    pub fn set_capacity(&self, capacity: usize) -> Result<(), SchedulerError> {
        if capacity < 1 {
            return Err(SchedulerError::InvalidArgument(format!(
                "queue capacity must be at least 1 (got {})",
                capacity
            )));
        }
        let mut state = self.lock();
        state.capacity = capacity;
        state.trim();
        Ok(())
    }

    pub fn remove_by_category(&self, category: SoundCategory) -> usize {
        let mut state = self.lock();
        let before = state.items.len();
        state.items.retain(|item| item.category() != category);
        before - state.items.len()
    }

    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let removed = state.items.len();
        state.items.clear();
        removed
    }

    pub fn is_processing(&self) -> bool {
        self.lock().processing
    }

    /// Marks the queue idle; used by a loop that exits on cancellation.
    pub(crate) fn mark_idle(&self) {
        self.lock().processing = false;
    }

    /// Claims the processing flag when items are waiting without a loop.
    pub(crate) fn claim_if_pending(&self) -> bool {
        let mut state = self.lock();
        if !state.processing && !state.items.is_empty() {
            state.processing = true;
            true
        } else {
            false
        }
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.lock();
        QueueSnapshot {
            length: state.items.len(),
            capacity: state.capacity,
            processing: state.processing,
            items: state.items.iter().map(ScheduleItem::info).collect(),
        }
    }
}
