// src/scheduler/run_loop.rs
use super::session::{self, SessionOutcome};
use super::SchedulerInner;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const LOG_TARGET: &str = "r_alertsound::scheduler::run_loop";

/// Drains the schedule queue one item at a time and exits as soon as the
/// queue is observed empty. `scope` is the facade's stop-everything token
/// captured when this loop was spawned.
pub(crate) async fn run_processing_loop(inner: Arc<SchedulerInner>, scope: CancellationToken) {
    info!(target: LOG_TARGET, "Processing loop started.");

    loop {
        if scope.is_cancelled() {
            inner.queue.mark_idle();
            info!(target: LOG_TARGET, "Processing loop scope cancelled. Going idle.");
            return;
        }

        let Some(item) = inner.queue.dequeue() else {
            info!(target: LOG_TARGET, "Queue drained. Processing loop idle.");
            return;
        };
        let correlation_id = item.correlation_id.clone();

        // Each item plays on its own task so a panic in one session is
        // contained and the loop moves on.
        let task = tokio::spawn(session::play_one(Arc::clone(&inner), item, scope.clone()));
        match task.await {
            Ok(Ok(SessionOutcome::Completed { cycles })) => {
                info!(target: LOG_TARGET, correlation_id = %correlation_id, cycles, "Alert playback completed.");
            }
            Ok(Ok(SessionOutcome::Cancelled(source))) => {
                info!(target: LOG_TARGET, correlation_id = %correlation_id, ?source, "Alert playback cancelled.");
            }
            Ok(Ok(SessionOutcome::DriverError(e))) => {
                error!(target: LOG_TARGET, correlation_id = %correlation_id, "Alert playback ended with a driver error: {}", e);
            }
            Ok(Err(e)) => {
                error!(target: LOG_TARGET, correlation_id = %correlation_id, "Alert could not be played: {}. Proceeding to next item.", e);
            }
            Err(e) => {
                inner.set_active(None);
                if e.is_panic() {
                    error!(target: LOG_TARGET, correlation_id = %correlation_id, "Playback task panicked: {:?}", e);
                } else {
                    warn!(target: LOG_TARGET, correlation_id = %correlation_id, "Playback task join error: {:?}", e);
                }
            }
        }
    }
}
